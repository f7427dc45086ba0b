use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};

use crate::cli::commands::AppContext;
use crate::model::DocumentId;

pub async fn run(
    ctx: &AppContext,
    document_id: &str,
    since: Option<String>,
    until: Option<String>,
) -> Result<()> {
    let id = DocumentId::from(document_id);
    let range = match (parse(since)?, parse(until)?) {
        (Some(start), Some(end)) => Some((start, end)),
        (Some(start), None) => Some((start, Utc::now())),
        (None, Some(_)) => bail!("--until requires --since"),
        (None, None) => None,
    };

    let transitions = ctx.ledger.list_transitions(&id, range).await?;
    if transitions.is_empty() {
        println!("{id}: no transitions in range");
        return Ok(());
    }

    println!("{id}: {} transitions", transitions.len());
    for t in transitions {
        let from = ctx.names.label(&t.from_state);
        let to = ctx.names.label(&t.to_state);
        let comment = t.comment.as_deref().unwrap_or("-");
        println!(
            "  {}  {from} -> {to}  by {} ({})  {comment}",
            t.timestamp.to_rfc3339(),
            t.actor,
            t.asserted_role,
        );
    }
    Ok(())
}

fn parse(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .with_context(|| format!("invalid timestamp: {s}"))
    })
    .transpose()
}
