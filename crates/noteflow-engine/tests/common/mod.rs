//! In-memory trait implementations shared by the engine integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use noteflow_core::{
    AdminNote, CreateNoteRequest, CreateSummaryRequest, Error, EventHandler, FailedJob,
    FailedJobRepository, FailedJobStats, NewFailedJob, NewRetryLogEntry, NoteRepository,
    Notification, NotificationPublisher, Result, RetryJobStatus, RetryLogEntry, StudentSummary,
    Subscriber, SubscriptionHandle, SummaryRepository,
};

// ---------------------------------------------------------------------------
// Notes
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryNotes {
    notes: Mutex<Vec<AdminNote>>,
}

impl InMemoryNotes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a note with an explicit creation time.
    pub fn seed(&self, student_id: Uuid, content: &str, created_at: DateTime<Utc>) -> AdminNote {
        let note = AdminNote {
            id: Uuid::new_v4(),
            student_id,
            author_id: Uuid::new_v4(),
            content: content.to_string(),
            created_at,
        };
        self.notes.lock().unwrap().push(note.clone());
        note
    }
}

#[async_trait]
impl NoteRepository for InMemoryNotes {
    async fn insert(&self, req: CreateNoteRequest) -> Result<AdminNote> {
        let note = AdminNote {
            id: Uuid::new_v4(),
            student_id: req.student_id,
            author_id: req.author_id,
            content: req.content,
            created_at: Utc::now(),
        };
        self.notes.lock().unwrap().push(note.clone());
        Ok(note)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<AdminNote>> {
        Ok(self
            .notes
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.id == id)
            .cloned())
    }

    async fn recent_for_student(&self, student_id: Uuid, limit: i64) -> Result<Vec<AdminNote>> {
        let mut matching: Vec<AdminNote> = self
            .notes
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.student_id == student_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit as usize);
        Ok(matching)
    }
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemorySummaries {
    rows: Mutex<Vec<StudentSummary>>,
}

impl InMemorySummaries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<StudentSummary> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl SummaryRepository for InMemorySummaries {
    async fn insert(&self, req: CreateSummaryRequest) -> Result<Uuid> {
        let summary = StudentSummary {
            id: Uuid::new_v4(),
            student_id: req.student_id,
            summary: req.summary,
            note_count: req.note_count,
            last_note_id: req.last_note_id,
            model: req.model,
            created_at: Utc::now(),
        };
        let id = summary.id;
        self.rows.lock().unwrap().push(summary);
        Ok(id)
    }

    async fn latest_for_student(&self, student_id: Uuid) -> Result<Option<StudentSummary>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.student_id == student_id)
            .max_by_key(|s| s.created_at)
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Failed jobs
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryFailedJobs {
    jobs: Mutex<HashMap<Uuid, FailedJob>>,
    logs: Mutex<Vec<RetryLogEntry>>,
}

impl InMemoryFailedJobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all_jobs(&self) -> Vec<FailedJob> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }

    pub fn all_logs(&self) -> Vec<RetryLogEntry> {
        self.logs.lock().unwrap().clone()
    }
}

#[async_trait]
impl FailedJobRepository for InMemoryFailedJobs {
    async fn insert(&self, job: NewFailedJob) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let row = FailedJob {
            id,
            job_type: job.job_type,
            payload: job.payload,
            error_message: job.error_message,
            error_detail: job.error_detail,
            attempt_count: 1,
            max_retries: job.max_retries,
            next_retry_at: job.next_retry_at,
            failed_at: Utc::now(),
            last_attempted_at: None,
            status: RetryJobStatus::Failed,
        };
        self.jobs.lock().unwrap().insert(id, row);
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<FailedJob>> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn claim_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<FailedJob>> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut due: Vec<Uuid> = jobs
            .values()
            .filter(|j| {
                j.status == RetryJobStatus::Failed
                    && j.next_retry_at <= now
                    && j.attempt_count < j.max_retries
            })
            .map(|j| j.id)
            .collect();
        due.sort_by_key(|id| jobs[id].next_retry_at);
        due.truncate(limit as usize);

        let mut claimed = Vec::with_capacity(due.len());
        for id in due {
            let job = jobs.get_mut(&id).unwrap();
            job.status = RetryJobStatus::Retrying;
            job.last_attempted_at = Some(now);
            claimed.push(job.clone());
        }
        Ok(claimed)
    }

    async fn claim_by_id(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<FailedJob>> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&id) {
            Some(job) if job.status != RetryJobStatus::Retrying => {
                job.status = RetryJobStatus::Retrying;
                job.last_attempted_at = Some(now);
                Ok(Some(job.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn reschedule(
        &self,
        id: Uuid,
        attempt_count: i32,
        next_retry_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&id).ok_or(Error::JobNotFound(id))?;
        job.status = RetryJobStatus::Failed;
        job.attempt_count = attempt_count;
        job.next_retry_at = next_retry_at;
        Ok(())
    }

    async fn abandon(&self, id: Uuid, attempt_count: i32) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&id).ok_or(Error::JobNotFound(id))?;
        job.status = RetryJobStatus::Abandoned;
        job.attempt_count = attempt_count;
        Ok(())
    }

    async fn restore_failed(&self, id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&id).ok_or(Error::JobNotFound(id))?;
        job.status = RetryJobStatus::Failed;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.jobs.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn append_log(&self, entry: NewRetryLogEntry) -> Result<()> {
        self.logs.lock().unwrap().push(RetryLogEntry {
            id: Uuid::new_v4(),
            failed_job_id: entry.failed_job_id,
            attempt_number: entry.attempt_number,
            error: entry.error,
            attempted_at: Utc::now(),
        });
        Ok(())
    }

    async fn logs_for_job(&self, failed_job_id: Uuid) -> Result<Vec<RetryLogEntry>> {
        let mut logs: Vec<RetryLogEntry> = self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.failed_job_id == failed_job_id)
            .cloned()
            .collect();
        logs.sort_by_key(|l| l.attempted_at);
        Ok(logs)
    }

    async fn stats(&self) -> Result<FailedJobStats> {
        let jobs = self.jobs.lock().unwrap();
        let mut stats = FailedJobStats::default();
        for job in jobs.values() {
            stats.total += 1;
            *stats.by_type.entry(job.job_type.clone()).or_insert(0) += 1;
            *stats
                .by_status
                .entry(job.status.as_str().to_string())
                .or_insert(0) += 1;
        }
        Ok(stats)
    }

    async fn delete_abandoned_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|_, j| !(j.status == RetryJobStatus::Abandoned && j.failed_at < cutoff));
        Ok((before - jobs.len()) as u64)
    }

    async fn prune_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut logs = self.logs.lock().unwrap();
        let before = logs.len();
        logs.retain(|l| l.attempted_at >= cutoff);
        Ok((before - logs.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Pub/sub
// ---------------------------------------------------------------------------

/// Publisher that records every notification for assertion.
#[derive(Default)]
pub struct RecordingPublisher {
    sent: Mutex<Vec<Notification>>,
    fail: Mutex<bool>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_on(&self, channel: &str) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.channel() == channel)
            .cloned()
            .collect()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.fail.lock().unwrap() = failing;
    }
}

#[async_trait]
impl NotificationPublisher for RecordingPublisher {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        if *self.fail.lock().unwrap() {
            return Err(Error::Internal("publisher down".into()));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

#[derive(Default)]
struct SubscriberState {
    handlers: HashMap<String, EventHandler>,
    failing: Vec<String>,
}

/// In-process subscriber: tests deliver payloads by hand.
#[derive(Clone, Default)]
pub struct ChannelSubscriber {
    state: Arc<Mutex<SubscriberState>>,
}

impl ChannelSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make future subscriptions to `channel` fail.
    pub fn fail_channel(&self, channel: &str) {
        self.state.lock().unwrap().failing.push(channel.to_string());
    }

    /// Channels with a live subscription.
    pub fn active_channels(&self) -> Vec<String> {
        let mut channels: Vec<String> =
            self.state.lock().unwrap().handlers.keys().cloned().collect();
        channels.sort();
        channels
    }

    /// Deliver a raw payload to the handler subscribed on `channel`.
    pub async fn deliver(&self, channel: &str, payload: &str) {
        let handler = self.state.lock().unwrap().handlers.get(channel).cloned();
        if let Some(handler) = handler {
            handler(payload.to_string()).await;
        }
    }
}

struct ChannelSubscriptionHandle {
    channel: String,
    state: Arc<Mutex<SubscriberState>>,
}

#[async_trait]
impl SubscriptionHandle for ChannelSubscriptionHandle {
    async fn unsubscribe(self: Box<Self>) -> Result<()> {
        self.state.lock().unwrap().handlers.remove(&self.channel);
        Ok(())
    }
}

#[async_trait]
impl Subscriber for ChannelSubscriber {
    async fn subscribe(
        &self,
        channel: &str,
        handler: EventHandler,
    ) -> Result<Box<dyn SubscriptionHandle>> {
        let mut state = self.state.lock().unwrap();
        if state.failing.iter().any(|c| c == channel) {
            return Err(Error::Subscription(format!(
                "transport refused channel {}",
                channel
            )));
        }
        state.handlers.insert(channel.to_string(), handler);
        Ok(Box::new(ChannelSubscriptionHandle {
            channel: channel.to_string(),
            state: self.state.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Event helpers
// ---------------------------------------------------------------------------

pub fn note_created_event(note: &AdminNote) -> noteflow_core::NoteCreatedPayload {
    noteflow_core::NoteCreatedPayload {
        id: note.id,
        student_id: note.student_id,
        author_id: note.author_id,
        created_at: note.created_at,
    }
}
