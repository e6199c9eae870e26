//! Core data structures shared across the noteflow crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use uuid::Uuid;

// =============================================================================
// NOTES & SUMMARIES
// =============================================================================

/// An administrative note about a student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminNote {
    pub id: Uuid,
    pub student_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Request to insert a new admin note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNoteRequest {
    pub student_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
}

/// A persisted AI summary of a student's recent notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentSummary {
    pub id: Uuid,
    pub student_id: Uuid,
    pub summary: String,
    /// Number of source notes the summary was built from.
    pub note_count: i64,
    /// The newest note included in the summary.
    pub last_note_id: Uuid,
    /// Model identifier reported by the provider.
    pub model: String,
    pub created_at: DateTime<Utc>,
}

/// Request to persist a new summary.
#[derive(Debug, Clone)]
pub struct CreateSummaryRequest {
    pub student_id: Uuid,
    pub summary: String,
    pub note_count: i64,
    pub last_note_id: Uuid,
    pub model: String,
}

// =============================================================================
// COMPLETIONS
// =============================================================================

/// Chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message in a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Provider-agnostic completion request, built per orchestration attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl CompletionRequest {
    /// Provider-independent structural validation. Each backend layers its
    /// own limits (supported models, token ceiling, temperature range) on top.
    pub fn validate(&self) -> crate::Result<()> {
        if self.messages.is_empty() {
            return Err(crate::Error::InvalidRequest(
                "messages must not be empty".into(),
            ));
        }
        if self.temperature < 0.0 {
            return Err(crate::Error::InvalidRequest(format!(
                "temperature must be non-negative, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(crate::Error::InvalidRequest(
                "max_tokens must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Why the provider stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Other(String),
}

/// Result returned by a provider for one completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResult {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    pub model: String,
    pub finish_reason: FinishReason,
}

// =============================================================================
// RETRY SUBSYSTEM
// =============================================================================

/// Failed job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryJobStatus {
    /// Awaiting its next scheduled attempt.
    Failed,
    /// Claimed by the scheduler, attempt in flight.
    Retrying,
    /// Retry budget exhausted; terminal, retained for audit.
    Abandoned,
}

impl RetryJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Failed => "failed",
            Self::Retrying => "retrying",
            Self::Abandoned => "abandoned",
        }
    }
}

impl std::str::FromStr for RetryJobStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "failed" => Ok(Self::Failed),
            "retrying" => Ok(Self::Retrying),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(crate::Error::Internal(format!(
                "unknown retry job status: {}",
                other
            ))),
        }
    }
}

/// A durable record of one failed orchestration attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedJob {
    pub id: Uuid,
    /// Dispatcher key; the payload is opaque to the retry subsystem.
    pub job_type: String,
    pub payload: JsonValue,
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<JsonValue>,
    /// Attempts made so far, including the original failure (>= 1).
    pub attempt_count: i32,
    pub max_retries: i32,
    pub next_retry_at: DateTime<Utc>,
    pub failed_at: DateTime<Utc>,
    pub last_attempted_at: Option<DateTime<Utc>>,
    pub status: RetryJobStatus,
}

/// Insert request for a new failed job.
#[derive(Debug, Clone)]
pub struct NewFailedJob {
    pub job_type: String,
    pub payload: JsonValue,
    pub error_message: String,
    pub error_detail: Option<JsonValue>,
    pub max_retries: i32,
    pub next_retry_at: DateTime<Utc>,
}

/// Append-only audit record of one retry attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryLogEntry {
    pub id: Uuid,
    pub failed_job_id: Uuid,
    pub attempt_number: i32,
    pub error: String,
    pub attempted_at: DateTime<Utc>,
}

/// Insert request for a retry log entry.
#[derive(Debug, Clone)]
pub struct NewRetryLogEntry {
    pub failed_job_id: Uuid,
    pub attempt_number: i32,
    pub error: String,
}

/// Aggregate failed-job counts for monitoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailedJobStats {
    pub total: i64,
    pub by_type: HashMap<String, i64>,
    pub by_status: HashMap<String, i64>,
}
