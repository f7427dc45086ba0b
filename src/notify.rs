//! Notification collaborator seam.
//!
//! The core emits lifecycle events; delivery and formatting belong to the
//! external notification service. The default sink just logs.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{ActorId, DocumentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TaskAssigned,
    Overdue,
    TransitionApplied,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub document_id: DocumentId,
    pub kind: NotificationKind,
    pub actor_id: ActorId,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Hand an event to the notification collaborator. Delivery failures are
    /// the collaborator's concern; this must not fail the transition that
    /// produced the event.
    async fn deliver(&self, event: NotificationEvent);
}

/// Default sink: structured log line per event.
#[derive(Debug, Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn deliver(&self, event: NotificationEvent) {
        info!(
            document_id = %event.document_id,
            kind = ?event.kind,
            actor_id = %event.actor_id,
            "Notification event emitted"
        );
    }
}

/// Test sink that records every event it receives.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    events: Arc<Mutex<Vec<NotificationEvent>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().expect("sink lock poisoned").clone()
    }

    pub fn events_of_kind(&self, kind: NotificationKind) -> Vec<NotificationEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }
}

#[async_trait]
impl NotificationSink for CollectingSink {
    async fn deliver(&self, event: NotificationEvent) {
        self.events.lock().expect("sink lock poisoned").push(event);
    }
}
