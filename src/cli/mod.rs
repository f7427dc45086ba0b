use clap::{Parser, Subcommand};

pub mod commands;

#[derive(Parser)]
#[command(name = "docwarden")]
#[command(about = "Controlled-document workflow engine with a tamper-evident audit trail")]
#[command(long_about = "Docwarden drives regulated documents through review, approval, \
                       effectiveness and obsolescence workflows. Every applied transition is \
                       recorded in an append-only, hash-chained audit ledger; 'docwarden verify' \
                       recomputes a document's chain end to end.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one scheduler sweep: date-gated transitions and overdue escalation
    Sweep {
        /// Clock override in RFC 3339, for rehearsing future-dated sweeps
        #[arg(long, help = "Evaluate the sweep as if it ran at this instant")]
        at: Option<String>,
        /// Skip overdue escalation, apply scheduled transitions only
        #[arg(long, help = "Do not emit overdue escalation events")]
        no_escalation: bool,
    },
    /// Run the sweep on an interval until interrupted
    Watch,
    /// Verify a document's audit chain from its first entry
    Verify {
        /// Document identifier
        document_id: String,
    },
    /// Show a document's transition history
    History {
        /// Document identifier
        document_id: String,
        /// Only transitions at or after this RFC 3339 instant
        #[arg(long)]
        since: Option<String>,
        /// Only transitions strictly before this RFC 3339 instant
        #[arg(long)]
        until: Option<String>,
    },
    /// Display all documents with their workflow states
    Status,
    /// Write a default docwarden.toml configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(long, help = "Overwrite docwarden.toml if it already exists")]
        force: bool,
    },
}
