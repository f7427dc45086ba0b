use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Main configuration structure for Docwarden
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocwardenConfig {
    /// Workflow graph and authorization settings
    pub workflow: WorkflowSettings,
    /// Scheduler sweep settings
    pub scheduler: SchedulerSettings,
    /// Observability settings
    pub observability: ObservabilityConfig,
    /// Database settings (optional; in-memory store when absent)
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowSettings {
    /// TOML file with workflow graph definitions; built-in graphs when unset
    pub graphs_file: Option<String>,
    /// Cross-check asserted roles against the identity collaborator
    pub distrust_assertions: bool,
    /// Display label overrides for state codes
    #[serde(default)]
    pub display_names: HashMap<String, String>,
    /// Cached document snapshots kept for read paths
    pub cache_capacity: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerSettings {
    /// Seconds between sweep runs
    pub sweep_interval_seconds: u64,
    /// Emit overdue escalation events during sweeps
    pub escalation_enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Enable structured tracing output
    pub tracing_enabled: bool,
    /// Log level
    pub log_level: String,
    /// Emit JSON log lines instead of plain text
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for DocwardenConfig {
    fn default() -> Self {
        Self {
            workflow: WorkflowSettings {
                graphs_file: None,
                distrust_assertions: false,
                display_names: HashMap::new(),
                cache_capacity: 1024,
            },
            scheduler: SchedulerSettings {
                sweep_interval_seconds: 300,
                escalation_enabled: true,
            },
            observability: ObservabilityConfig {
                tracing_enabled: true,
                log_level: "info".to_string(),
                json_logs: true,
            },
            database: None,
        }
    }
}

impl DocwardenConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (docwarden.toml)
    /// 3. Environment variables (prefixed with DOCWARDEN_)
    pub fn load() -> Result<Self> {
        let defaults = Config::try_from(&DocwardenConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        if Path::new("docwarden.toml").exists() {
            builder = builder.add_source(File::with_name("docwarden"));
        }

        builder = builder.add_source(
            Environment::with_prefix("DOCWARDEN")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<DocwardenConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = DocwardenConfig::load_env_file();
        DocwardenConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static DocwardenConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = DocwardenConfig::default();
        let raw = toml::to_string_pretty(&config).unwrap();
        let parsed: DocwardenConfig = toml::from_str(&raw).unwrap();
        assert_eq!(
            parsed.scheduler.sweep_interval_seconds,
            config.scheduler.sweep_interval_seconds
        );
        assert!(!parsed.workflow.distrust_assertions);
        assert!(parsed.database.is_none());
    }
}
