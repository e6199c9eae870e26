//! Change notification channels and wire payloads.
//!
//! The storage layer raises a lightweight notification per inserted note
//! (decoupled from the row itself); the listener decodes these payloads
//! and dispatches per channel. The `summary_completed` / `summary_failed`
//! channels carry monitoring-only payloads published back by the
//! orchestrator and retry subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Channel raised by the database trigger after an admin note insert.
pub const CHANNEL_NOTE_CREATED: &str = "admin_notes_created";

/// Channel published after a summary has been persisted.
pub const CHANNEL_SUMMARY_COMPLETED: &str = "summary_completed";

/// Channel published when summarization fails or a job is abandoned.
pub const CHANNEL_SUMMARY_FAILED: &str = "summary_failed";

/// Payload carried on [`CHANNEL_NOTE_CREATED`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteCreatedPayload {
    pub id: Uuid,
    pub student_id: Uuid,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Payload carried on [`CHANNEL_SUMMARY_COMPLETED`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryCompletedPayload {
    pub id: Uuid,
    pub student_id: Uuid,
    pub note_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Payload carried on [`CHANNEL_SUMMARY_FAILED`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryFailedPayload {
    pub student_id: Uuid,
    pub note_id: Uuid,
    pub error: String,
    pub created_at: DateTime<Utc>,
}

/// A typed notification bound to its channel.
///
/// Publishers take this enum rather than raw channel/payload strings so
/// payload shapes cannot drift per call site.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    NoteCreated(NoteCreatedPayload),
    SummaryCompleted(SummaryCompletedPayload),
    SummaryFailed(SummaryFailedPayload),
}

impl Notification {
    /// The channel this notification is delivered on.
    pub fn channel(&self) -> &'static str {
        match self {
            Self::NoteCreated(_) => CHANNEL_NOTE_CREATED,
            Self::SummaryCompleted(_) => CHANNEL_SUMMARY_COMPLETED,
            Self::SummaryFailed(_) => CHANNEL_SUMMARY_FAILED,
        }
    }

    /// Serialize the payload for the wire.
    pub fn payload_json(&self) -> crate::Result<String> {
        let json = match self {
            Self::NoteCreated(p) => serde_json::to_string(p)?,
            Self::SummaryCompleted(p) => serde_json::to_string(p)?,
            Self::SummaryFailed(p) => serde_json::to_string(p)?,
        };
        Ok(json)
    }
}
