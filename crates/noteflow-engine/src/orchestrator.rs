//! Summarization orchestrator.
//!
//! Reacts to note-created events: pulls the student's recent notes, asks
//! the active provider for a summary, persists it, and announces the
//! result. Failures on the event path are absorbed into the retry queue
//! so the listener never stalls; failures on the retry path propagate so
//! the scheduler can apply its backoff policy.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};

use noteflow_core::defaults::{HISTORY_LIMIT, MAX_RETRIES};
use noteflow_core::{
    AdminNote, ChatMessage, CompletionRequest, CreateSummaryRequest, Error, NoteCreatedPayload,
    NoteRepository, Notification, NotificationPublisher, Result, SummaryCompletedPayload,
    SummaryFailedPayload, SummaryRepository,
};
use noteflow_providers::{ActiveProvider, UseCase};

use crate::retry::{JobExecutor, RetryQueue};

/// Job type key for summarization retries.
pub const JOB_NOTE_SUMMARY: &str = "note_summary";

const SYSTEM_PROMPT: &str = "You are an assistant that summarizes administrative notes about a \
student for school staff. Write a concise summary of the notes below, highlighting recurring \
themes, recent changes, and anything requiring follow-up. Use neutral, factual language.";

/// Orchestrator tunables.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Recent notes pulled into one prompt.
    pub history_limit: i64,
    /// Retry budget handed to recorded failed jobs.
    pub max_retries: i32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            history_limit: HISTORY_LIMIT,
            max_retries: MAX_RETRIES,
        }
    }
}

/// Drives one summarization per note-created event.
pub struct SummaryOrchestrator {
    notes: Arc<dyn NoteRepository>,
    summaries: Arc<dyn SummaryRepository>,
    provider: Arc<ActiveProvider>,
    publisher: Arc<dyn NotificationPublisher>,
    retry: Arc<RetryQueue>,
    config: OrchestratorConfig,
}

impl SummaryOrchestrator {
    pub fn new(
        notes: Arc<dyn NoteRepository>,
        summaries: Arc<dyn SummaryRepository>,
        provider: Arc<ActiveProvider>,
        publisher: Arc<dyn NotificationPublisher>,
        retry: Arc<RetryQueue>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            notes,
            summaries,
            provider,
            publisher,
            retry,
            config,
        }
    }

    /// Event-path entry point. Never returns an error: a failed run is
    /// recorded as a durable failed job and announced on the failure
    /// channel, and the listener moves on to the next event.
    pub async fn process_note_created(&self, event: NoteCreatedPayload) {
        debug!(
            note_id = %event.id,
            student_id = %event.student_id,
            "Processing note-created event"
        );

        if let Err(e) = self.run_summary(&event).await {
            error!(
                note_id = %event.id,
                student_id = %event.student_id,
                error = %e,
                "Summarization failed, recording for retry"
            );

            let payload = match serde_json::to_value(&event) {
                Ok(v) => v,
                Err(serde_err) => {
                    // Unserializable event payloads cannot be retried.
                    error!(error = %serde_err, "Could not serialize event for retry");
                    return;
                }
            };
            self.retry
                .record_failed_job(JOB_NOTE_SUMMARY, payload, &e, self.config.max_retries)
                .await;

            self.announce_failure(&event, &e).await;
        }
    }

    /// Retry-path entry point. Decodes the stored payload and reruns the
    /// summary, propagating any failure to the scheduler.
    pub async fn execute_job(&self, payload: &JsonValue) -> Result<()> {
        let event: NoteCreatedPayload = serde_json::from_value(payload.clone())?;
        self.run_summary(&event).await.map(|_| ())
    }

    /// One full summarization pass. Returns the completed-summary payload,
    /// or `None` when the student has no notes (a benign no-op).
    async fn run_summary(
        &self,
        event: &NoteCreatedPayload,
    ) -> Result<Option<SummaryCompletedPayload>> {
        let start = Instant::now();

        let mut notes = self
            .notes
            .recent_for_student(event.student_id, self.config.history_limit)
            .await?;
        if notes.is_empty() {
            debug!(student_id = %event.student_id, "No notes to summarize");
            return Ok(None);
        }

        let last_note_id = notes[0].id;
        let note_count = notes.len() as i64;
        // Repository returns newest first; the prompt reads chronologically.
        notes.reverse();
        let prompt = build_prompt(&notes);

        let provider = self.provider.current().await;
        let settings = UseCase::Summarization.settings();
        let request = CompletionRequest {
            model: provider.info().model,
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            system_prompt: Some(SYSTEM_PROMPT.to_string()),
        };

        let result = provider.generate_completion(&request).await?;

        let summary_id = self
            .summaries
            .insert(CreateSummaryRequest {
                student_id: event.student_id,
                summary: result.content,
                note_count,
                last_note_id,
                model: result.model,
            })
            .await?;

        info!(
            student_id = %event.student_id,
            summary_id = %summary_id,
            note_count = note_count,
            duration_ms = start.elapsed().as_millis() as u64,
            "Summary persisted"
        );

        let completed = SummaryCompletedPayload {
            id: summary_id,
            student_id: event.student_id,
            note_count,
            created_at: Utc::now(),
        };
        // Monitoring channel only; a publish failure must not fail the run.
        if let Err(e) = self
            .publisher
            .publish(&Notification::SummaryCompleted(completed.clone()))
            .await
        {
            warn!(error = %e, "Failed to publish summary_completed");
        }

        Ok(Some(completed))
    }

    async fn announce_failure(&self, event: &NoteCreatedPayload, error: &Error) {
        let notification = Notification::SummaryFailed(SummaryFailedPayload {
            student_id: event.student_id,
            note_id: event.id,
            error: error.to_string(),
            created_at: Utc::now(),
        });
        if let Err(e) = self.publisher.publish(&notification).await {
            warn!(error = %e, "Failed to publish summary_failed");
        }
    }
}

fn build_prompt(notes: &[AdminNote]) -> String {
    notes
        .iter()
        .map(|note| {
            format!(
                "Date: {}\nAuthor: {}\nContent: {}",
                note.created_at.format("%Y-%m-%d %H:%M"),
                note.author_id,
                note.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

/// Bridges failed `note_summary` jobs back into the orchestrator.
pub struct NoteSummaryExecutor {
    orchestrator: Arc<SummaryOrchestrator>,
}

impl NoteSummaryExecutor {
    pub fn new(orchestrator: Arc<SummaryOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl JobExecutor for NoteSummaryExecutor {
    fn job_type(&self) -> &'static str {
        JOB_NOTE_SUMMARY
    }

    async fn execute(&self, payload: &JsonValue) -> Result<()> {
        self.orchestrator.execute_job(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    #[test]
    fn prompt_contains_dated_blocks_with_separators() {
        let author = Uuid::new_v4();
        let notes = vec![
            AdminNote {
                id: Uuid::new_v4(),
                student_id: Uuid::new_v4(),
                author_id: author,
                content: "First meeting".to_string(),
                created_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            },
            AdminNote {
                id: Uuid::new_v4(),
                student_id: Uuid::new_v4(),
                author_id: author,
                content: "Follow-up call".to_string(),
                created_at: Utc.with_ymd_and_hms(2026, 3, 8, 14, 30, 0).unwrap(),
            },
        ];

        let prompt = build_prompt(&notes);
        assert!(prompt.contains("Date: 2026-03-01 09:00"));
        assert!(prompt.contains("Content: Follow-up call"));
        assert_eq!(prompt.matches("\n---\n").count(), 1);
        // Chronological order preserved.
        assert!(prompt.find("First meeting").unwrap() < prompt.find("Follow-up call").unwrap());
    }
}
