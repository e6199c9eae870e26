//! # noteflow-engine
//!
//! The orchestration core of noteflow: a change listener that reacts to
//! note-created notifications, a summarization orchestrator driving the
//! active AI provider, and a durable retry subsystem for failed runs.
//!
//! [`Noteflow`] wires the three together over the storage and pub/sub
//! traits, so production runs against PostgreSQL while tests substitute
//! in-memory implementations.

pub mod listener;
pub mod orchestrator;
pub mod retry;

pub use listener::{decoding_handler, ChangeListener};
pub use orchestrator::{
    NoteSummaryExecutor, OrchestratorConfig, SummaryOrchestrator, JOB_NOTE_SUMMARY,
};
pub use retry::{
    backoff_base, backoff_delay, JobExecutor, RetryConfig, RetryQueue, RetrySchedulerHandle,
};

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use noteflow_core::{
    FailedJobStats, NoteCreatedPayload, NoteRepository, NotificationPublisher, Result,
    RetryLogEntry, Subscriber, SummaryCompletedPayload, SummaryFailedPayload, SummaryRepository,
    CHANNEL_NOTE_CREATED, CHANNEL_SUMMARY_COMPLETED, CHANNEL_SUMMARY_FAILED,
};
use noteflow_providers::{ActiveProvider, ProviderConfig, ProviderKind, ProviderStatus};

/// Engine-wide configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub orchestrator: OrchestratorConfig,
    pub retry: RetryConfig,
}

/// Assembled orchestration engine.
pub struct Noteflow {
    listener: Arc<ChangeListener>,
    orchestrator: Arc<SummaryOrchestrator>,
    retry: Arc<RetryQueue>,
    provider: Arc<ActiveProvider>,
    scheduler: Mutex<Option<RetrySchedulerHandle>>,
}

impl Noteflow {
    /// Wire the engine from its component seams.
    pub async fn new(
        notes: Arc<dyn NoteRepository>,
        summaries: Arc<dyn SummaryRepository>,
        failed_jobs: Arc<dyn noteflow_core::FailedJobRepository>,
        publisher: Arc<dyn NotificationPublisher>,
        subscriber: Arc<dyn Subscriber>,
        provider: Arc<ActiveProvider>,
        config: EngineConfig,
    ) -> Self {
        let retry = Arc::new(RetryQueue::new(
            failed_jobs,
            publisher.clone(),
            config.retry,
        ));

        let orchestrator = Arc::new(SummaryOrchestrator::new(
            notes,
            summaries,
            provider.clone(),
            publisher,
            retry.clone(),
            config.orchestrator,
        ));

        retry
            .register_executor(Arc::new(NoteSummaryExecutor::new(orchestrator.clone())))
            .await;

        let listener = Arc::new(ChangeListener::new(subscriber));
        let event_target = orchestrator.clone();
        listener
            .register(
                CHANNEL_NOTE_CREATED,
                decoding_handler(
                    CHANNEL_NOTE_CREATED,
                    move |event: NoteCreatedPayload| {
                        let orchestrator = event_target.clone();
                        async move { orchestrator.process_note_created(event).await }
                    },
                ),
            )
            .await;

        // Monitoring-only channels: decode and log, no further dispatch.
        listener
            .register(
                CHANNEL_SUMMARY_COMPLETED,
                decoding_handler(
                    CHANNEL_SUMMARY_COMPLETED,
                    |event: SummaryCompletedPayload| async move {
                        debug!(
                            summary_id = %event.id,
                            student_id = %event.student_id,
                            note_count = event.note_count,
                            "Summary completed"
                        );
                    },
                ),
            )
            .await;
        listener
            .register(
                CHANNEL_SUMMARY_FAILED,
                decoding_handler(
                    CHANNEL_SUMMARY_FAILED,
                    |event: SummaryFailedPayload| async move {
                        warn!(
                            student_id = %event.student_id,
                            note_id = %event.note_id,
                            error = %event.error,
                            "Summary failed"
                        );
                    },
                ),
            )
            .await;

        Self {
            listener,
            orchestrator,
            retry,
            provider,
            scheduler: Mutex::new(None),
        }
    }

    /// Wire the engine against a connected PostgreSQL database.
    pub async fn from_database(
        db: &noteflow_db::Database,
        provider: Arc<ActiveProvider>,
        config: EngineConfig,
    ) -> Self {
        let pool = db.pool().clone();
        Self::new(
            Arc::new(noteflow_db::PgNoteRepository::new(pool.clone())),
            Arc::new(noteflow_db::PgSummaryRepository::new(pool.clone())),
            Arc::new(noteflow_db::PgFailedJobRepository::new(pool.clone())),
            Arc::new(noteflow_db::PgNotificationPublisher::new(pool.clone())),
            Arc::new(noteflow_db::PgSubscriber::new(pool)),
            provider,
            config,
        )
        .await
    }

    /// Start the change listener and the retry scheduler. Idempotent.
    pub async fn start(&self) -> Result<()> {
        self.listener.start().await?;

        let mut scheduler = self.scheduler.lock().await;
        if scheduler.is_none() {
            *scheduler = Some(self.retry.clone().start());
        }
        info!("Noteflow engine started");
        Ok(())
    }

    /// Stop the listener and scheduler. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        self.listener.stop().await?;

        if let Some(handle) = self.scheduler.lock().await.take() {
            handle.stop().await;
        }
        info!("Noteflow engine stopped");
        Ok(())
    }

    /// Whether the change listener is currently subscribed.
    pub async fn is_running(&self) -> bool {
        self.listener.is_running().await
    }

    /// Run one summarization pass outside the listener path.
    pub async fn process_note_created(&self, event: NoteCreatedPayload) {
        self.orchestrator.process_note_created(event).await;
    }

    /// Describe the active provider, probing its health.
    pub async fn provider_status(&self) -> ProviderStatus {
        self.provider.status().await
    }

    /// Hot-swap the active provider, gated on the candidate's health.
    pub async fn switch_provider(
        &self,
        kind: ProviderKind,
        config: &ProviderConfig,
    ) -> Result<()> {
        self.provider.switch(kind, config).await
    }

    /// Aggregate failed-job counts for monitoring.
    pub async fn failed_job_stats(&self) -> Result<FailedJobStats> {
        self.retry.stats().await
    }

    /// Audit log for one failed job, oldest first.
    pub async fn retry_logs(&self, job_id: uuid::Uuid) -> Result<Vec<RetryLogEntry>> {
        self.retry.logs_for_job(job_id).await
    }

    /// Manually retry a failed job now.
    pub async fn retry_job(&self, job_id: uuid::Uuid) -> Result<()> {
        self.retry.retry_job(job_id).await
    }

    /// Delete abandoned jobs older than `days`.
    pub async fn cleanup_old_jobs(&self, days: i64) -> Result<u64> {
        self.retry.cleanup_old_jobs(days).await
    }

    /// Delete retry log entries older than `days`.
    pub async fn prune_retry_logs(&self, days: i64) -> Result<u64> {
        self.retry.prune_retry_logs(days).await
    }

    /// The retry queue, for direct scheduling control in tests and tools.
    pub fn retry_queue(&self) -> &Arc<RetryQueue> {
        &self.retry
    }
}
