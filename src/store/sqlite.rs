//! SQLite-backed store, behind the `database` feature.
//!
//! All history tables are append-only at the schema level (triggers abort
//! updates and deletes), so tampering requires going around the storage
//! engine, and the chain verification catches it when someone does. A
//! process-wide commit lock keeps the chain tail stable between reading the
//! previous entry and inserting the next one; everything else rides on the
//! transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{migrate::MigrateDatabase, Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::StorageError;
use crate::ledger::chain::{self, AuditLedgerEntry, ChainStatus, LedgerPayload};
use crate::model::{
    ActorId, Document, DocumentId, DocumentSnapshot, DocumentTransition, DocumentWorkflow, Role,
    StateCode, TransitionOutcome,
};
use crate::store::{TransitionCommit, WorkflowStore};

pub struct SqliteStore {
    pool: SqlitePool,
    commit_lock: Mutex<()>,
}

impl SqliteStore {
    /// Connect, creating the database file and running migrations when asked.
    pub async fn new(database_url: &str, auto_migrate: bool) -> Result<Self, StorageError> {
        if !sqlx::Sqlite::database_exists(database_url).await? {
            info!(url = database_url, "Creating database");
            sqlx::Sqlite::create_database(database_url).await?;
        }
        let pool = SqlitePool::connect(database_url).await?;
        if auto_migrate {
            info!("Running database migrations");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| StorageError::Unavailable {
                    reason: format!("migration failed: {e}"),
                })?;
        }
        Ok(Self {
            pool,
            commit_lock: Mutex::new(()),
        })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            commit_lock: Mutex::new(()),
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn load_ledger(
        &self,
        id: &DocumentId,
    ) -> Result<Vec<AuditLedgerEntry>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT document_id, seq, payload, payload_digest, prev_hash, entry_hash, recorded_at
            FROM ledger_entries
            WHERE document_id = ?1
            ORDER BY seq ASC
            "#,
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| ledger_entry_from_row(&row)).collect()
    }

    async fn load_snapshot(
        &self,
        id: &DocumentId,
    ) -> Result<Option<DocumentSnapshot>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT d.id, d.title, d.version_label, d.workflow_type, d.current_state,
                   d.author, d.reviewer, d.approver, d.effective_date, d.obsolescence_date,
                   d.obsolescence_reason, d.version, d.created_at, d.updated_at,
                   w.workflow_type AS wf_type, w.started_at, w.due_at, w.escalated_at,
                   w.completed_at
            FROM documents d
            JOIN workflows w ON w.document_id = d.id
            WHERE d.id = ?1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| snapshot_from_row(&row)).transpose()
    }
}

#[async_trait]
impl WorkflowStore for SqliteStore {
    async fn create_document(
        &self,
        document: Document,
        workflow: DocumentWorkflow,
        genesis: LedgerPayload,
    ) -> Result<DocumentSnapshot, StorageError> {
        let _guard = self.commit_lock.lock().await;
        if self.load_snapshot(&document.id).await?.is_some() {
            return Err(StorageError::DocumentExists {
                document_id: document.id.clone(),
            });
        }

        let entry = chain::seal_entry(&document.id, 0, None, &genesis, Utc::now());
        let mut tx = self.pool.begin().await?;
        insert_document(&mut tx, &document).await?;
        insert_workflow(&mut tx, &workflow).await?;
        insert_ledger_entry(&mut tx, &entry).await?;
        tx.commit().await?;

        Ok(DocumentSnapshot { document, workflow })
    }

    async fn start_workflow(
        &self,
        id: &DocumentId,
        workflow: DocumentWorkflow,
        initial_state: StateCode,
        genesis: LedgerPayload,
    ) -> Result<DocumentSnapshot, StorageError> {
        let _guard = self.commit_lock.lock().await;
        let snapshot = self
            .load_snapshot(id)
            .await?
            .ok_or_else(|| StorageError::DocumentMissing {
                document_id: id.clone(),
            })?;
        if !snapshot.workflow.is_terminal() {
            return Err(StorageError::WorkflowActive {
                document_id: id.clone(),
                workflow_type: snapshot.workflow.workflow_type.clone(),
            });
        }
        let ledger = self.load_ledger(id).await?;
        if let ChainStatus::BrokenAt(index) = chain::verify_entries(&ledger) {
            return Err(StorageError::ChainBroken {
                document_id: id.clone(),
                broken_at: index,
            });
        }

        let seq = ledger.len() as u64;
        let prev = ledger.last().map(|e| e.entry_hash.as_str());
        let entry = chain::seal_entry(id, seq, prev, &genesis, Utc::now());

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            UPDATE documents
            SET workflow_type = ?1, current_state = ?2, updated_at = ?3
            WHERE id = ?4
            "#,
        )
        .bind(&workflow.workflow_type)
        .bind(initial_state.as_str())
        .bind(ts(workflow.started_at))
        .bind(id.as_str())
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            r#"
            UPDATE workflows
            SET workflow_type = ?1, started_at = ?2, due_at = NULL, escalated_at = NULL,
                completed_at = NULL
            WHERE document_id = ?3
            "#,
        )
        .bind(&workflow.workflow_type)
        .bind(ts(workflow.started_at))
        .bind(id.as_str())
        .execute(&mut *tx)
        .await?;
        insert_ledger_entry(&mut tx, &entry).await?;
        tx.commit().await?;

        self.load_snapshot(id)
            .await?
            .ok_or_else(|| StorageError::DocumentMissing {
                document_id: id.clone(),
            })
    }

    async fn snapshot(&self, id: &DocumentId) -> Result<Option<DocumentSnapshot>, StorageError> {
        self.load_snapshot(id).await
    }

    async fn commit_transition(
        &self,
        commit: TransitionCommit,
    ) -> Result<DocumentSnapshot, StorageError> {
        let _guard = self.commit_lock.lock().await;
        let snapshot = self
            .load_snapshot(&commit.document_id)
            .await?
            .ok_or_else(|| StorageError::DocumentMissing {
                document_id: commit.document_id.clone(),
            })?;

        // Fail closed on a broken chain before accepting anything new.
        let ledger = self.load_ledger(&commit.document_id).await?;
        if let ChainStatus::BrokenAt(index) = chain::verify_entries(&ledger) {
            return Err(StorageError::ChainBroken {
                document_id: commit.document_id.clone(),
                broken_at: index,
            });
        }

        if snapshot.document.version != commit.expected_version {
            return Err(StorageError::VersionConflict {
                document_id: commit.document_id.clone(),
                expected: commit.expected_version,
                actual: snapshot.document.version,
            });
        }

        let payload = LedgerPayload::from_transition(&commit.transition);
        let seq = ledger.len() as u64;
        let prev = ledger.last().map(|e| e.entry_hash.as_str());
        let entry = chain::seal_entry(&commit.document_id, seq, prev, &payload, Utc::now());

        let mut tx = self.pool.begin().await?;
        // The WHERE version clause is a second line of defense; the commit
        // lock already serialized us.
        let updated = sqlx::query(
            r#"
            UPDATE documents
            SET current_state = ?1,
                version = version + 1,
                updated_at = ?2,
                effective_date = COALESCE(?3, effective_date),
                obsolescence_date = COALESCE(?4, obsolescence_date),
                obsolescence_reason = COALESCE(?5, obsolescence_reason)
            WHERE id = ?6 AND version = ?7
            "#,
        )
        .bind(commit.to_state.as_str())
        .bind(ts(commit.transition.timestamp))
        .bind(commit.effective_date.map(ts))
        .bind(commit.obsolescence_date.map(ts))
        .bind(commit.obsolescence_reason.as_deref())
        .bind(commit.document_id.as_str())
        .bind(commit.expected_version as i64)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() != 1 {
            return Err(StorageError::VersionConflict {
                document_id: commit.document_id.clone(),
                expected: commit.expected_version,
                actual: snapshot.document.version,
            });
        }

        sqlx::query(
            r#"
            UPDATE workflows
            SET due_at = ?1, escalated_at = NULL, completed_at = ?2
            WHERE document_id = ?3
            "#,
        )
        .bind(commit.due_at.map(ts))
        .bind(
            commit
                .completes_workflow
                .then(|| ts(commit.transition.timestamp)),
        )
        .bind(commit.document_id.as_str())
        .execute(&mut *tx)
        .await?;

        let t = &commit.transition;
        sqlx::query(
            r#"
            INSERT INTO transitions
                (document_id, from_state, to_state, actor, asserted_role, comment, timestamp,
                 outcome)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(t.document_id.as_str())
        .bind(t.from_state.as_str())
        .bind(t.to_state.as_str())
        .bind(t.actor.as_str())
        .bind(t.asserted_role.to_string())
        .bind(t.comment.as_deref())
        .bind(ts(t.timestamp))
        .bind(outcome_str(t.outcome))
        .execute(&mut *tx)
        .await?;

        insert_ledger_entry(&mut tx, &entry).await?;
        tx.commit().await?;

        self.load_snapshot(&commit.document_id)
            .await?
            .ok_or_else(|| StorageError::DocumentMissing {
                document_id: commit.document_id.clone(),
            })
    }

    async fn transitions(
        &self,
        id: &DocumentId,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<DocumentTransition>, StorageError> {
        if self.load_snapshot(id).await?.is_none() {
            return Err(StorageError::DocumentMissing {
                document_id: id.clone(),
            });
        }
        let rows = match range {
            Some((start, end)) => {
                sqlx::query(
                    r#"
                    SELECT document_id, from_state, to_state, actor, asserted_role, comment,
                           timestamp, outcome
                    FROM transitions
                    WHERE document_id = ?1 AND timestamp >= ?2 AND timestamp < ?3
                    ORDER BY id ASC
                    "#,
                )
                .bind(id.as_str())
                .bind(ts(start))
                .bind(ts(end))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT document_id, from_state, to_state, actor, asserted_role, comment,
                           timestamp, outcome
                    FROM transitions
                    WHERE document_id = ?1
                    ORDER BY id ASC
                    "#,
                )
                .bind(id.as_str())
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(transition_from_row).collect()
    }

    async fn ledger_entries(
        &self,
        id: &DocumentId,
    ) -> Result<Vec<AuditLedgerEntry>, StorageError> {
        if self.load_snapshot(id).await?.is_none() {
            return Err(StorageError::DocumentMissing {
                document_id: id.clone(),
            });
        }
        self.load_ledger(id).await
    }

    async fn documents_in_states(
        &self,
        states: &[StateCode],
    ) -> Result<Vec<DocumentSnapshot>, StorageError> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (1..=states.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r#"
            SELECT d.id, d.title, d.version_label, d.workflow_type, d.current_state,
                   d.author, d.reviewer, d.approver, d.effective_date, d.obsolescence_date,
                   d.obsolescence_reason, d.version, d.created_at, d.updated_at,
                   w.workflow_type AS wf_type, w.started_at, w.due_at, w.escalated_at,
                   w.completed_at
            FROM documents d
            JOIN workflows w ON w.document_id = d.id
            WHERE w.completed_at IS NULL AND d.current_state IN ({placeholders})
            "#
        );
        let mut query = sqlx::query(&sql);
        for state in states {
            query = query.bind(state.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(snapshot_from_row).collect()
    }

    async fn overdue_workflows(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<DocumentSnapshot>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.title, d.version_label, d.workflow_type, d.current_state,
                   d.author, d.reviewer, d.approver, d.effective_date, d.obsolescence_date,
                   d.obsolescence_reason, d.version, d.created_at, d.updated_at,
                   w.workflow_type AS wf_type, w.started_at, w.due_at, w.escalated_at,
                   w.completed_at
            FROM documents d
            JOIN workflows w ON w.document_id = d.id
            WHERE w.completed_at IS NULL
              AND w.escalated_at IS NULL
              AND w.due_at IS NOT NULL
              AND w.due_at <= ?1
            "#,
        )
        .bind(ts(now))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(snapshot_from_row).collect()
    }

    async fn record_escalation(
        &self,
        id: &DocumentId,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let updated = sqlx::query("UPDATE workflows SET escalated_at = ?1 WHERE document_id = ?2")
            .bind(ts(at))
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        if updated.rows_affected() != 1 {
            return Err(StorageError::DocumentMissing {
                document_id: id.clone(),
            });
        }
        Ok(())
    }

    async fn all_documents(&self) -> Result<Vec<DocumentSnapshot>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.title, d.version_label, d.workflow_type, d.current_state,
                   d.author, d.reviewer, d.approver, d.effective_date, d.obsolescence_date,
                   d.obsolescence_reason, d.version, d.created_at, d.updated_at,
                   w.workflow_type AS wf_type, w.started_at, w.due_at, w.escalated_at,
                   w.completed_at
            FROM documents d
            JOIN workflows w ON w.document_id = d.id
            ORDER BY d.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(snapshot_from_row).collect()
    }
}

fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn decode(reason: String) -> StorageError {
    StorageError::Database(sqlx::Error::Decode(reason.into()))
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| decode(format!("bad timestamp {raw:?}: {e}")))
}

fn parse_ts_opt(raw: Option<String>) -> Result<Option<DateTime<Utc>>, StorageError> {
    raw.as_deref().map(parse_ts).transpose()
}

fn parse_role(raw: &str) -> Result<Role, StorageError> {
    raw.parse().map_err(decode)
}

fn outcome_str(outcome: TransitionOutcome) -> &'static str {
    match outcome {
        TransitionOutcome::Applied => "applied",
        TransitionOutcome::Rejected => "rejected",
    }
}

fn parse_outcome(raw: &str) -> Result<TransitionOutcome, StorageError> {
    match raw {
        "applied" => Ok(TransitionOutcome::Applied),
        "rejected" => Ok(TransitionOutcome::Rejected),
        other => Err(decode(format!("bad transition outcome {other:?}"))),
    }
}

fn snapshot_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<DocumentSnapshot, StorageError> {
    let id = DocumentId::new(row.get::<String, _>("id"));
    let document = Document {
        id: id.clone(),
        title: row.get("title"),
        version_label: row.get("version_label"),
        workflow_type: row.get("workflow_type"),
        current_state: StateCode::new(row.get::<String, _>("current_state")),
        author: ActorId::new(row.get::<String, _>("author")),
        reviewer: row.get::<Option<String>, _>("reviewer").map(ActorId::new),
        approver: row.get::<Option<String>, _>("approver").map(ActorId::new),
        effective_date: parse_ts_opt(row.get("effective_date"))?,
        obsolescence_date: parse_ts_opt(row.get("obsolescence_date"))?,
        obsolescence_reason: row.get("obsolescence_reason"),
        version: row.get::<i64, _>("version") as u64,
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
        updated_at: parse_ts(&row.get::<String, _>("updated_at"))?,
    };
    let workflow = DocumentWorkflow {
        document_id: id,
        workflow_type: row.get("wf_type"),
        started_at: parse_ts(&row.get::<String, _>("started_at"))?,
        due_at: parse_ts_opt(row.get("due_at"))?,
        escalated_at: parse_ts_opt(row.get("escalated_at"))?,
        completed_at: parse_ts_opt(row.get("completed_at"))?,
    };
    Ok(DocumentSnapshot { document, workflow })
}

fn transition_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<DocumentTransition, StorageError> {
    Ok(DocumentTransition {
        document_id: DocumentId::new(row.get::<String, _>("document_id")),
        from_state: StateCode::new(row.get::<String, _>("from_state")),
        to_state: StateCode::new(row.get::<String, _>("to_state")),
        actor: ActorId::new(row.get::<String, _>("actor")),
        asserted_role: parse_role(&row.get::<String, _>("asserted_role"))?,
        comment: row.get("comment"),
        timestamp: parse_ts(&row.get::<String, _>("timestamp"))?,
        outcome: parse_outcome(&row.get::<String, _>("outcome"))?,
    })
}

fn ledger_entry_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<AuditLedgerEntry, StorageError> {
    Ok(AuditLedgerEntry {
        document_id: DocumentId::new(row.get::<String, _>("document_id")),
        seq: row.get::<i64, _>("seq") as u64,
        payload: row.get("payload"),
        payload_digest: row.get("payload_digest"),
        prev_hash: row.get("prev_hash"),
        entry_hash: row.get("entry_hash"),
        recorded_at: parse_ts(&row.get::<String, _>("recorded_at"))?,
    })
}

async fn insert_document(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    document: &Document,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO documents
            (id, title, version_label, workflow_type, current_state, author, reviewer,
             approver, effective_date, obsolescence_date, obsolescence_reason, version,
             created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(document.id.as_str())
    .bind(&document.title)
    .bind(&document.version_label)
    .bind(&document.workflow_type)
    .bind(document.current_state.as_str())
    .bind(document.author.as_str())
    .bind(document.reviewer.as_ref().map(ActorId::as_str))
    .bind(document.approver.as_ref().map(ActorId::as_str))
    .bind(document.effective_date.map(ts))
    .bind(document.obsolescence_date.map(ts))
    .bind(document.obsolescence_reason.as_deref())
    .bind(document.version as i64)
    .bind(ts(document.created_at))
    .bind(ts(document.updated_at))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_workflow(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    workflow: &DocumentWorkflow,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO workflows
            (document_id, workflow_type, started_at, due_at, escalated_at, completed_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(workflow.document_id.as_str())
    .bind(&workflow.workflow_type)
    .bind(ts(workflow.started_at))
    .bind(workflow.due_at.map(ts))
    .bind(workflow.escalated_at.map(ts))
    .bind(workflow.completed_at.map(ts))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_ledger_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    entry: &AuditLedgerEntry,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO ledger_entries
            (document_id, seq, payload, payload_digest, prev_hash, entry_hash, recorded_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(entry.document_id.as_str())
    .bind(entry.seq as i64)
    .bind(&entry.payload)
    .bind(&entry.payload_digest)
    .bind(&entry.prev_hash)
    .bind(&entry.entry_hash)
    .bind(ts(entry.recorded_at))
    .execute(&mut **tx)
    .await
    .map_err(|e| match e {
        // A collision on (document_id, seq) means another writer appended
        // concurrently; surface it as a ledger append failure.
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::LedgerAppend {
            document_id: entry.document_id.clone(),
            reason: "concurrent append to ledger tail".to_string(),
        },
        other => StorageError::Database(other),
    })?;
    Ok(())
}
