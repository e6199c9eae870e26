//! Repository and pub/sub trait definitions.
//!
//! The engine depends on these seams only; the Postgres implementations
//! live in `noteflow-db`, and tests substitute in-memory ones.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::events::Notification;
use crate::models::{
    AdminNote, CreateNoteRequest, CreateSummaryRequest, FailedJob, FailedJobStats, NewFailedJob,
    NewRetryLogEntry, RetryLogEntry, StudentSummary,
};
use crate::Result;

// =============================================================================
// STORAGE
// =============================================================================

/// Admin note storage.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Insert a new note. The change notification is raised by the storage
    /// layer itself (database trigger), not by this call.
    async fn insert(&self, req: CreateNoteRequest) -> Result<AdminNote>;

    /// Fetch a note by ID.
    async fn fetch(&self, id: Uuid) -> Result<Option<AdminNote>>;

    /// The most recent `limit` notes for a student, newest first.
    async fn recent_for_student(&self, student_id: Uuid, limit: i64) -> Result<Vec<AdminNote>>;
}

/// Persisted summary storage.
#[async_trait]
pub trait SummaryRepository: Send + Sync {
    /// Persist a new summary, returning its ID.
    async fn insert(&self, req: CreateSummaryRequest) -> Result<Uuid>;

    /// The most recent summary for a student, if any.
    async fn latest_for_student(&self, student_id: Uuid) -> Result<Option<StudentSummary>>;
}

/// Durable failed-job storage. The retry subsystem is the only caller;
/// no other component reads or writes these rows.
#[async_trait]
pub trait FailedJobRepository: Send + Sync {
    /// Insert a new failed job with `attempt_count = 1` and status `failed`.
    async fn insert(&self, job: NewFailedJob) -> Result<Uuid>;

    /// Fetch a job by ID.
    async fn get(&self, id: Uuid) -> Result<Option<FailedJob>>;

    /// Claim up to `limit` due jobs (`status = failed`, `next_retry_at <= now`,
    /// `attempt_count < max_retries`), marking each `retrying` and stamping
    /// `last_attempted_at`.
    async fn claim_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<FailedJob>>;

    /// Claim one specific job for a manual retry. Returns `None` when the
    /// job does not exist.
    async fn claim_by_id(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<FailedJob>>;

    /// Put a claimed job back on the schedule after a failed attempt.
    async fn reschedule(
        &self,
        id: Uuid,
        attempt_count: i32,
        next_retry_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Mark a claimed job terminally abandoned.
    async fn abandon(&self, id: Uuid, attempt_count: i32) -> Result<()>;

    /// Restore a claimed job to `failed` without progressing its attempt
    /// count (unknown-job-type path).
    async fn restore_failed(&self, id: Uuid) -> Result<()>;

    /// Delete a job after a successful retry.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Append one retry audit log entry.
    async fn append_log(&self, entry: NewRetryLogEntry) -> Result<()>;

    /// Audit log entries for a job, oldest first.
    async fn logs_for_job(&self, failed_job_id: Uuid) -> Result<Vec<RetryLogEntry>>;

    /// Aggregate counts for monitoring.
    async fn stats(&self) -> Result<FailedJobStats>;

    /// Delete abandoned jobs that failed before `cutoff`, returning the count.
    async fn delete_abandoned_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Delete retry log entries attempted before `cutoff`, returning the count.
    async fn prune_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

// =============================================================================
// PUB/SUB
// =============================================================================

/// Outbound notification publisher (best-effort channels).
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    /// Publish a typed notification on its channel.
    async fn publish(&self, notification: &Notification) -> Result<()>;
}

/// Handler invoked with the raw payload of each delivered event.
///
/// Handlers decode the payload themselves; a decode failure must be
/// swallowed (logged) so one malformed event cannot stall a channel.
pub type EventHandler = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

/// A live subscription that can be torn down.
#[async_trait]
pub trait SubscriptionHandle: Send + Sync {
    /// Stop delivery and release the underlying transport resources.
    async fn unsubscribe(self: Box<Self>) -> Result<()>;
}

/// Pub/sub transport: one handler per named channel.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Subscribe to `channel`, invoking `handler` for each delivery.
    /// Handlers on different channels run independently.
    async fn subscribe(
        &self,
        channel: &str,
        handler: EventHandler,
    ) -> Result<Box<dyn SubscriptionHandle>>;
}
