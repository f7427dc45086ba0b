use anyhow::Result;

use crate::cli::commands::AppContext;
use crate::ledger::ChainStatus;
use crate::model::DocumentId;

/// Recompute a document's audit chain. Exit code 1 signals a broken chain so
/// scripted integrity checks can act on it.
pub async fn run(ctx: &AppContext, document_id: &str) -> Result<()> {
    let id = DocumentId::from(document_id);
    let status = ctx.ledger.verify_chain(&id).await?;
    let entries = ctx.ledger.entries(&id).await?;

    match status {
        ChainStatus::Valid => {
            println!("{id}: chain VALID ({} entries)", entries.len());
            Ok(())
        }
        ChainStatus::BrokenAt(index) => {
            println!("{id}: chain BROKEN at entry {index} of {}", entries.len());
            if let Some(entry) = entries.get(index as usize) {
                println!("  recorded_at: {}", entry.recorded_at);
                println!("  entry_hash:  {}", entry.entry_hash);
            }
            std::process::exit(1);
        }
    }
}
