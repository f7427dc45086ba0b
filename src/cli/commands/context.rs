//! Shared wiring for CLI commands: store, registry and the workflow
//! components built from configuration.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cache::StateCache;
use crate::config::DocwardenConfig;
use crate::executor::TransitionExecutor;
use crate::instance::WorkflowInstanceManager;
use crate::ledger::AuditLedger;
use crate::notify::{NotificationSink, TracingSink};
use crate::roles::StaticRoleResolver;
use crate::store::{MemoryStore, WorkflowStore};
use crate::sweep::Sweeper;
use crate::workflow::{DisplayNames, StateGraphRegistry};

pub struct AppContext {
    pub config: DocwardenConfig,
    pub store: Arc<dyn WorkflowStore>,
    pub registry: Arc<StateGraphRegistry>,
    pub executor: Arc<TransitionExecutor>,
    pub ledger: AuditLedger,
    pub sweeper: Sweeper,
    pub manager: WorkflowInstanceManager,
    pub names: DisplayNames,
}

impl AppContext {
    pub async fn from_config(config: DocwardenConfig) -> Result<Self> {
        let store = build_store(&config).await?;
        let registry = Arc::new(match &config.workflow.graphs_file {
            Some(path) => StateGraphRegistry::from_file(path)
                .with_context(|| format!("loading workflow graphs from {path}"))?,
            None => StateGraphRegistry::with_defaults(),
        });
        let notifier: Arc<dyn NotificationSink> = Arc::new(TracingSink);
        let cache = Arc::new(StateCache::new(
            store.clone(),
            config.workflow.cache_capacity,
        ));

        let mut executor = TransitionExecutor::new(
            store.clone(),
            registry.clone(),
            Arc::new(StaticRoleResolver::new()),
            notifier.clone(),
        )
        .with_cache(cache);
        if config.workflow.distrust_assertions {
            executor = executor.with_distrusted_assertions();
        }
        let executor = Arc::new(executor);

        let mut sweeper = Sweeper::new(
            store.clone(),
            registry.clone(),
            executor.clone(),
            notifier,
        );
        if !config.scheduler.escalation_enabled {
            sweeper = sweeper.without_escalation();
        }

        let ledger = AuditLedger::new(store.clone());
        let manager = WorkflowInstanceManager::new(store.clone(), registry.clone());
        let names = DisplayNames::with_overrides(config.workflow.display_names.clone());

        Ok(Self {
            config,
            store,
            registry,
            executor,
            ledger,
            sweeper,
            manager,
            names,
        })
    }
}

#[cfg(feature = "database")]
async fn build_store(config: &DocwardenConfig) -> Result<Arc<dyn WorkflowStore>> {
    match &config.database {
        Some(db) => {
            let store = crate::store::SqliteStore::new(&db.url, db.auto_migrate)
                .await
                .with_context(|| format!("opening database at {}", db.url))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

#[cfg(not(feature = "database"))]
async fn build_store(config: &DocwardenConfig) -> Result<Arc<dyn WorkflowStore>> {
    if config.database.is_some() {
        tracing::warn!("Database configured but the database feature is not enabled; using the in-memory store");
    }
    Ok(Arc::new(MemoryStore::new()))
}
