//! Hash chain construction and verification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::model::{ActorId, DocumentId, DocumentTransition, Role, StateCode, TransitionOutcome};

/// Hex hash of "nothing before this": the prev link of every chain's first
/// entry.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// One entry in a document's audit chain. Construct only via [`seal_entry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLedgerEntry {
    pub document_id: DocumentId,
    /// Position in the document's chain, starting at 0.
    pub seq: u64,
    /// Canonical JSON of the [`LedgerPayload`] this entry attests to.
    pub payload: String,
    /// Hex SHA-256 of `payload`.
    pub payload_digest: String,
    /// `entry_hash` of the previous entry, or [`GENESIS_HASH`] at seq 0.
    pub prev_hash: String,
    /// Hex SHA-256 over `payload_digest || prev_hash`.
    pub entry_hash: String,
    pub recorded_at: DateTime<Utc>,
}

/// What an entry attests to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerPayload {
    Transition {
        document_id: DocumentId,
        from_state: StateCode,
        to_state: StateCode,
        actor: ActorId,
        asserted_role: Role,
        comment: Option<String>,
        timestamp: DateTime<Utc>,
        outcome: TransitionOutcome,
    },
    WorkflowStarted {
        document_id: DocumentId,
        workflow_type: String,
        actor: ActorId,
        timestamp: DateTime<Utc>,
    },
}

impl LedgerPayload {
    pub fn from_transition(t: &DocumentTransition) -> Self {
        LedgerPayload::Transition {
            document_id: t.document_id.clone(),
            from_state: t.from_state.clone(),
            to_state: t.to_state.clone(),
            actor: t.actor.clone(),
            asserted_role: t.asserted_role,
            comment: t.comment.clone(),
            timestamp: t.timestamp,
            outcome: t.outcome,
        }
    }

    /// Canonical byte representation that gets digested.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).expect("ledger payload serializes")
    }
}

/// Result of recomputing a chain from its first entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStatus {
    Valid,
    /// First entry index at which the recomputation disagrees with what is
    /// stored.
    BrokenAt(u64),
}

impl ChainStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, ChainStatus::Valid)
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn entry_hash(payload_digest: &str, prev_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload_digest.as_bytes());
    hasher.update(prev_hash.as_bytes());
    hex::encode(hasher.finalize())
}

/// Seal the next entry of a document's chain. `prev_hash` is the entry hash
/// of the current tail (`None` for an empty chain); the caller must hold the
/// chain tail stable while this entry is persisted.
pub fn seal_entry(
    document_id: &DocumentId,
    seq: u64,
    prev_hash: Option<&str>,
    payload: &LedgerPayload,
    recorded_at: DateTime<Utc>,
) -> AuditLedgerEntry {
    let payload_json = payload.canonical_json();
    let payload_digest = sha256_hex(payload_json.as_bytes());
    let prev_hash = prev_hash.unwrap_or(GENESIS_HASH).to_string();
    let entry_hash = entry_hash(&payload_digest, &prev_hash);
    AuditLedgerEntry {
        document_id: document_id.clone(),
        seq,
        payload: payload_json,
        payload_digest,
        prev_hash,
        entry_hash,
        recorded_at,
    }
}

/// Recompute digests and links over an ordered chain. Any disagreement with
/// the stored values reports the first broken index.
pub fn verify_entries(entries: &[AuditLedgerEntry]) -> ChainStatus {
    let mut expected_prev = GENESIS_HASH.to_string();
    for (index, entry) in entries.iter().enumerate() {
        let index = index as u64;
        if entry.seq != index {
            return ChainStatus::BrokenAt(index);
        }
        if entry.prev_hash != expected_prev {
            return ChainStatus::BrokenAt(index);
        }
        let recomputed_digest = sha256_hex(entry.payload.as_bytes());
        if recomputed_digest != entry.payload_digest {
            return ChainStatus::BrokenAt(index);
        }
        let recomputed_hash = entry_hash(&recomputed_digest, &entry.prev_hash);
        if recomputed_hash != entry.entry_hash {
            return ChainStatus::BrokenAt(index);
        }
        expected_prev = entry.entry_hash.clone();
    }
    ChainStatus::Valid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::states::*;

    fn payload(n: u64) -> LedgerPayload {
        LedgerPayload::Transition {
            document_id: DocumentId::from("SOP-001"),
            from_state: StateCode::from(DRAFT),
            to_state: StateCode::from(PENDING_REVIEW),
            actor: ActorId::new(format!("actor-{n}")),
            asserted_role: Role::Author,
            comment: None,
            timestamp: Utc::now(),
            outcome: TransitionOutcome::Applied,
        }
    }

    fn build_chain(len: u64) -> Vec<AuditLedgerEntry> {
        let doc = DocumentId::from("SOP-001");
        let mut entries: Vec<AuditLedgerEntry> = Vec::new();
        for seq in 0..len {
            let prev = entries.last().map(|e| e.entry_hash.as_str());
            entries.push(seal_entry(&doc, seq, prev, &payload(seq), Utc::now()));
        }
        entries
    }

    #[test]
    fn untouched_chain_verifies() {
        let entries = build_chain(5);
        assert_eq!(verify_entries(&entries), ChainStatus::Valid);
    }

    #[test]
    fn empty_chain_is_valid() {
        assert_eq!(verify_entries(&[]), ChainStatus::Valid);
    }

    #[test]
    fn mutated_payload_breaks_at_that_index() {
        let mut entries = build_chain(5);
        entries[2].payload = entries[2].payload.replace("actor-2", "mallory");
        assert_eq!(verify_entries(&entries), ChainStatus::BrokenAt(2));
    }

    #[test]
    fn mutated_payload_with_refreshed_digest_still_breaks() {
        // An attacker who also recomputes the digest still breaks the entry
        // hash, and recomputing that breaks the next entry's prev link.
        let mut entries = build_chain(5);
        entries[2].payload = entries[2].payload.replace("actor-2", "mallory");
        entries[2].payload_digest = sha256_hex(entries[2].payload.as_bytes());
        assert_eq!(verify_entries(&entries), ChainStatus::BrokenAt(2));

        entries[2].entry_hash = entry_hash(&entries[2].payload_digest, &entries[2].prev_hash);
        assert_eq!(verify_entries(&entries), ChainStatus::BrokenAt(3));
    }

    #[test]
    fn removed_entry_breaks_the_chain() {
        let mut entries = build_chain(5);
        entries.remove(1);
        assert_eq!(verify_entries(&entries), ChainStatus::BrokenAt(1));
    }

    #[test]
    fn reordered_entries_break_the_chain() {
        let mut entries = build_chain(4);
        entries.swap(1, 2);
        assert_eq!(verify_entries(&entries), ChainStatus::BrokenAt(1));
    }
}
