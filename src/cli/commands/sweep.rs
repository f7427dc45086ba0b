use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use std::sync::Arc;

use crate::cli::commands::AppContext;
use crate::notify::TracingSink;
use crate::shutdown::ShutdownCoordinator;
use crate::sweep::Sweeper;

pub async fn run(ctx: &AppContext, at: Option<String>, no_escalation: bool) -> Result<()> {
    let now = match at {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .with_context(|| format!("invalid --at timestamp: {raw}"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let report = if no_escalation {
        let sweeper = Sweeper::new(
            ctx.store.clone(),
            ctx.registry.clone(),
            ctx.executor.clone(),
            Arc::new(TracingSink),
        )
        .without_escalation();
        sweeper.run_sweep(now).await?
    } else {
        ctx.sweeper.run_sweep(now).await?
    };
    println!(
        "Sweep at {now}: {} transitioned, {} escalated",
        report.transitioned.len(),
        report.escalated.len()
    );
    for id in &report.transitioned {
        println!("  moved     {id}");
    }
    for id in &report.escalated {
        println!("  escalated {id}");
    }
    Ok(())
}

/// Run the sweep loop until interrupted.
pub async fn watch(ctx: &AppContext) -> Result<()> {
    let interval = std::time::Duration::from_secs(ctx.config.scheduler.sweep_interval_seconds);
    let coordinator = ShutdownCoordinator::new();
    let shutdown = coordinator.subscribe();

    info!(interval_secs = interval.as_secs(), "Starting sweep watch");
    tokio::select! {
        _ = ctx.sweeper.run_periodic(interval, shutdown) => {}
        result = coordinator.wait_for_signal() => {
            result?;
        }
    }
    println!("Sweep watch stopped");
    Ok(())
}
