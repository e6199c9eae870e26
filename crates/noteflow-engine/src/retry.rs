//! Retry and recovery subsystem.
//!
//! Failed orchestration runs become durable rows worked off by a
//! background scheduler. Attempts follow an exponential backoff ladder
//! with symmetric jitter; once the budget is exhausted the job is marked
//! abandoned and retained for audit. Every attempt leaves a log entry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use noteflow_core::defaults::{
    BACKOFF_JITTER, BACKOFF_LADDER_SECS, RETRY_BATCH_SIZE, RETRY_INTERVAL_MS,
};
use noteflow_core::{
    Error, FailedJob, FailedJobRepository, FailedJobStats, NewFailedJob, NewRetryLogEntry,
    NoteCreatedPayload, Notification, NotificationPublisher, Result, SummaryFailedPayload,
};

/// Executes one kind of retried job.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Dispatcher key matched against [`FailedJob::job_type`].
    fn job_type(&self) -> &'static str;

    /// Rerun the job from its stored payload.
    async fn execute(&self, payload: &JsonValue) -> Result<()>;
}

/// Base backoff for an attempt number (1-indexed), without jitter.
/// Attempts past the ladder clamp to the last rung.
pub fn backoff_base(attempt: i32) -> Duration {
    let index = (attempt.max(1) as usize - 1).min(BACKOFF_LADDER_SECS.len() - 1);
    Duration::seconds(BACKOFF_LADDER_SECS[index])
}

/// Backoff for an attempt with symmetric jitter applied.
///
/// Jitter spreads retry storms: every delay lands uniformly within
/// ±25% of its ladder rung.
pub fn backoff_delay(attempt: i32) -> Duration {
    let base_secs = backoff_base(attempt).num_seconds() as f64;
    let jitter = rand::thread_rng().gen_range(-BACKOFF_JITTER..=BACKOFF_JITTER);
    Duration::seconds((base_secs * (1.0 + jitter)).round() as i64)
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Jobs claimed per tick.
    pub batch_size: i64,
    /// Tick interval.
    pub interval: StdDuration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            batch_size: RETRY_BATCH_SIZE,
            interval: StdDuration::from_millis(RETRY_INTERVAL_MS),
        }
    }
}

/// Durable retry queue with a pluggable executor table.
pub struct RetryQueue {
    store: Arc<dyn FailedJobRepository>,
    publisher: Arc<dyn NotificationPublisher>,
    executors: RwLock<HashMap<&'static str, Arc<dyn JobExecutor>>>,
    config: RetryConfig,
}

impl RetryQueue {
    pub fn new(
        store: Arc<dyn FailedJobRepository>,
        publisher: Arc<dyn NotificationPublisher>,
        config: RetryConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            executors: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Register the executor for a job type, replacing any previous one.
    pub async fn register_executor(&self, executor: Arc<dyn JobExecutor>) {
        let job_type = executor.job_type();
        info!(job_type = job_type, "Registered retry executor");
        self.executors.write().await.insert(job_type, executor);
    }

    /// Record a failed run as a durable job scheduled for its first retry.
    ///
    /// This sits on the event path's failure branch, so it never returns
    /// an error; a storage failure here is logged and dropped.
    pub async fn record_failed_job(
        &self,
        job_type: &str,
        payload: JsonValue,
        cause: &Error,
        max_retries: i32,
    ) {
        let next_retry_at = Utc::now() + backoff_delay(1);
        let job = NewFailedJob {
            job_type: job_type.to_string(),
            payload,
            error_message: cause.to_string(),
            error_detail: Some(serde_json::json!({ "retryable": cause.is_retryable() })),
            max_retries,
            next_retry_at,
        };

        match self.store.insert(job).await {
            Ok(id) => {
                info!(
                    job_id = %id,
                    job_type = job_type,
                    next_retry_at = %next_retry_at,
                    "Recorded failed job"
                );
            }
            Err(e) => {
                error!(
                    job_type = job_type,
                    error = %e,
                    "Could not record failed job, retry is lost"
                );
            }
        }
    }

    /// Claim and process every due job, sequentially. Returns the number
    /// of jobs processed this tick.
    pub async fn run_due_jobs(&self, now: DateTime<Utc>) -> Result<usize> {
        let jobs = self.store.claim_due(now, self.config.batch_size).await?;
        let count = jobs.len();
        if count > 0 {
            debug!(count = count, "Claimed due retry jobs");
        }
        for job in jobs {
            if let Err(e) = self.handle_retry(job).await {
                // An undispatchable job was already restored; surface it
                // for operator attention and keep draining the batch.
                warn!(error = %e, "Claimed job could not be dispatched");
            }
        }
        Ok(count)
    }

    /// Manually retry one specific job, bypassing its schedule.
    pub async fn retry_job(&self, id: uuid::Uuid) -> Result<()> {
        let job = self
            .store
            .claim_by_id(id, Utc::now())
            .await?
            .ok_or(Error::JobNotFound(id))?;
        self.handle_retry(job).await
    }

    /// Run one claimed job and settle its row. A job whose type has no
    /// registered executor is restored untouched and reported as
    /// [`Error::UnknownJobType`]; executor failures are settled through
    /// the backoff policy and are not errors of this call.
    async fn handle_retry(&self, job: FailedJob) -> Result<()> {
        let executor = self.executors.read().await.get(job.job_type.as_str()).cloned();
        let Some(executor) = executor else {
            // Put the row back untouched so a future deployment that
            // registers the executor can still pick it up.
            warn!(
                job_id = %job.id,
                job_type = %job.job_type,
                "No executor registered for job type, restoring job"
            );
            if let Err(e) = self.store.restore_failed(job.id).await {
                error!(job_id = %job.id, error = %e, "Could not restore unclaimed job");
            }
            return Err(Error::UnknownJobType(job.job_type));
        };

        let attempt = job.attempt_count + 1;
        debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = attempt,
            max_retries = job.max_retries,
            "Retrying job"
        );

        match executor.execute(&job.payload).await {
            Ok(()) => {
                info!(job_id = %job.id, attempt = attempt, "Retry succeeded");
                if let Err(e) = self.store.delete(job.id).await {
                    error!(job_id = %job.id, error = %e, "Could not delete completed job");
                }
            }
            Err(cause) => {
                if let Err(e) = self
                    .store
                    .append_log(NewRetryLogEntry {
                        failed_job_id: job.id,
                        attempt_number: attempt,
                        error: cause.to_string(),
                    })
                    .await
                {
                    error!(job_id = %job.id, error = %e, "Could not append retry log entry");
                }

                if attempt < job.max_retries {
                    let next_retry_at = Utc::now() + backoff_delay(attempt);
                    warn!(
                        job_id = %job.id,
                        attempt = attempt,
                        next_retry_at = %next_retry_at,
                        error = %cause,
                        "Retry failed, rescheduling"
                    );
                    if let Err(e) = self.store.reschedule(job.id, attempt, next_retry_at).await {
                        error!(job_id = %job.id, error = %e, "Could not reschedule job");
                    }
                } else {
                    error!(
                        job_id = %job.id,
                        attempt = attempt,
                        error = %cause,
                        "Retry budget exhausted, abandoning job"
                    );
                    if let Err(e) = self.store.abandon(job.id, attempt).await {
                        error!(job_id = %job.id, error = %e, "Could not mark job abandoned");
                    }
                    self.announce_abandoned(&job, &cause).await;
                }
            }
        }
        Ok(())
    }

    /// Best-effort failure announcement for an abandoned summarization job.
    async fn announce_abandoned(&self, job: &FailedJob, cause: &Error) {
        let Ok(event) = serde_json::from_value::<NoteCreatedPayload>(job.payload.clone()) else {
            return;
        };
        let notification = Notification::SummaryFailed(SummaryFailedPayload {
            student_id: event.student_id,
            note_id: event.id,
            error: cause.to_string(),
            created_at: Utc::now(),
        });
        if let Err(e) = self.publisher.publish(&notification).await {
            warn!(error = %e, "Failed to publish summary_failed for abandoned job");
        }
    }

    /// Aggregate failed-job counts.
    pub async fn stats(&self) -> Result<FailedJobStats> {
        self.store.stats().await
    }

    /// Audit log for one job, oldest first.
    pub async fn logs_for_job(&self, id: uuid::Uuid) -> Result<Vec<noteflow_core::RetryLogEntry>> {
        self.store.logs_for_job(id).await
    }

    /// Delete abandoned jobs older than `days`. Their audit logs are
    /// retained; use [`prune_retry_logs`](Self::prune_retry_logs) for those.
    pub async fn cleanup_old_jobs(&self, days: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(days);
        let removed = self.store.delete_abandoned_before(cutoff).await?;
        info!(removed = removed, days = days, "Cleaned up abandoned jobs");
        Ok(removed)
    }

    /// Delete retry log entries older than `days`.
    pub async fn prune_retry_logs(&self, days: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(days);
        let removed = self.store.prune_logs_before(cutoff).await?;
        info!(removed = removed, days = days, "Pruned retry logs");
        Ok(removed)
    }

    /// Start the background scheduler loop.
    pub fn start(self: Arc<Self>) -> RetrySchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let interval = self.config.interval;

        let task: JoinHandle<()> = tokio::spawn(async move {
            info!(interval_ms = interval.as_millis() as u64, "Retry scheduler started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Retry scheduler stopping");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = self.run_due_jobs(Utc::now()).await {
                            error!(error = %e, "Retry scheduler tick failed");
                        }
                    }
                }
            }
        });

        RetrySchedulerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle for stopping the scheduler loop.
pub struct RetrySchedulerHandle {
    shutdown: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl RetrySchedulerHandle {
    /// Signal shutdown and wait for the loop to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(()).await;
        if let Err(e) = self.task.await {
            error!(error = %e, "Retry scheduler task panicked");
        }
    }
}
