use anyhow::Result;

use crate::cli::commands::AppContext;

pub async fn run(ctx: &AppContext) -> Result<()> {
    let snapshots = ctx.store.all_documents().await?;
    if snapshots.is_empty() {
        println!("No documents registered");
        return Ok(());
    }

    println!(
        "{:<12} {:<8} {:<18} {:<20} {:<8} DUE",
        "DOCUMENT", "VERSION", "WORKFLOW", "STATE", "TOKEN"
    );
    for s in snapshots {
        let due = match (&s.workflow.completed_at, &s.workflow.due_at) {
            (Some(done), _) => format!("completed {}", done.format("%Y-%m-%d")),
            (None, Some(due)) => due.format("%Y-%m-%d %H:%M").to_string(),
            (None, None) => "-".to_string(),
        };
        println!(
            "{:<12} {:<8} {:<18} {:<20} {:<8} {}",
            s.document.id.as_str(),
            s.document.version_label,
            s.document.workflow_type,
            ctx.names.label(&s.document.current_state),
            s.document.version,
            due,
        );
    }
    Ok(())
}
