use anyhow::Result;
use clap::Parser;

use docwarden::cli::{commands, Cli, Commands};
use docwarden::config;
use docwarden::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    config::init_config()?;
    let cfg = config::config()?.clone();
    if cfg.observability.tracing_enabled {
        telemetry::init_telemetry()?;
    }

    let cli = Cli::parse();
    let result = match cli.command {
        None => {
            println!("docwarden: run with --help for available commands");
            Ok(())
        }
        Some(Commands::Init { force }) => commands::init::run(force).await,
        Some(command) => {
            let ctx = commands::AppContext::from_config(cfg).await?;
            match command {
                Commands::Sweep { at, no_escalation } => {
                    commands::sweep::run(&ctx, at, no_escalation).await
                }
                Commands::Watch => commands::sweep::watch(&ctx).await,
                Commands::Verify { document_id } => commands::verify::run(&ctx, &document_id).await,
                Commands::History {
                    document_id,
                    since,
                    until,
                } => commands::history::run(&ctx, &document_id, since, until).await,
                Commands::Status => commands::status::run(&ctx).await,
                Commands::Init { .. } => unreachable!("handled above"),
            }
        }
    };

    telemetry::shutdown_telemetry();
    result
}
