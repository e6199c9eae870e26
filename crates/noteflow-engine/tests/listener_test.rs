//! Change listener lifecycle and the end-to-end event path through the
//! engine facade.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use common::{
    note_created_event, ChannelSubscriber, InMemoryFailedJobs, InMemoryNotes, InMemorySummaries,
    RecordingPublisher,
};
use noteflow_core::{
    Error, CHANNEL_NOTE_CREATED, CHANNEL_SUMMARY_COMPLETED, CHANNEL_SUMMARY_FAILED,
};
use noteflow_engine::{decoding_handler, ChangeListener, EngineConfig, Noteflow};
use noteflow_providers::{
    ActiveProvider, MockProvider, ProviderConfig, ProviderKind, ProviderRegistry,
};

struct Harness {
    engine: Noteflow,
    notes: Arc<InMemoryNotes>,
    summaries: Arc<InMemorySummaries>,
    subscriber: ChannelSubscriber,
}

async fn harness() -> Harness {
    let notes = Arc::new(InMemoryNotes::new());
    let summaries = Arc::new(InMemorySummaries::new());
    let subscriber = ChannelSubscriber::new();
    let active = Arc::new(ActiveProvider::new(
        ProviderRegistry::builtin(),
        Arc::new(MockProvider::new().with_response("Listener summary.")),
    ));

    let engine = Noteflow::new(
        notes.clone(),
        summaries.clone(),
        Arc::new(InMemoryFailedJobs::new()),
        Arc::new(RecordingPublisher::new()),
        Arc::new(subscriber.clone()),
        active,
        EngineConfig::default(),
    )
    .await;

    Harness {
        engine,
        notes,
        summaries,
        subscriber,
    }
}

#[tokio::test]
async fn started_engine_summarizes_delivered_events() {
    let h = harness().await;
    h.engine.start().await.unwrap();
    assert!(h.engine.is_running().await);
    assert_eq!(
        h.subscriber.active_channels(),
        vec![
            CHANNEL_NOTE_CREATED.to_string(),
            CHANNEL_SUMMARY_COMPLETED.to_string(),
            CHANNEL_SUMMARY_FAILED.to_string(),
        ]
    );

    let note = h.notes.seed(Uuid::new_v4(), "Delivered via channel", Utc::now());
    let payload = serde_json::to_string(&note_created_event(&note)).unwrap();
    h.subscriber.deliver(CHANNEL_NOTE_CREATED, &payload).await;

    assert_eq!(h.summaries.all().len(), 1);
    h.engine.stop().await.unwrap();
}

#[tokio::test]
async fn start_is_idempotent() {
    let h = harness().await;
    h.engine.start().await.unwrap();
    h.engine.start().await.unwrap();
    assert_eq!(h.subscriber.active_channels().len(), 3);
    h.engine.stop().await.unwrap();
}

#[tokio::test]
async fn stop_tears_down_subscriptions_and_is_idempotent() {
    let h = harness().await;
    h.engine.start().await.unwrap();
    h.engine.stop().await.unwrap();
    h.engine.stop().await.unwrap();

    assert!(!h.engine.is_running().await);
    assert!(h.subscriber.active_channels().is_empty());

    // Deliveries after stop go nowhere.
    let note = h.notes.seed(Uuid::new_v4(), "after stop", Utc::now());
    let payload = serde_json::to_string(&note_created_event(&note)).unwrap();
    h.subscriber.deliver(CHANNEL_NOTE_CREATED, &payload).await;
    assert!(h.summaries.all().is_empty());
}

#[tokio::test]
async fn engine_restarts_after_stop() {
    let h = harness().await;
    h.engine.start().await.unwrap();
    h.engine.stop().await.unwrap();
    h.engine.start().await.unwrap();

    let note = h.notes.seed(Uuid::new_v4(), "second life", Utc::now());
    let payload = serde_json::to_string(&note_created_event(&note)).unwrap();
    h.subscriber.deliver(CHANNEL_NOTE_CREATED, &payload).await;
    assert_eq!(h.summaries.all().len(), 1);
    h.engine.stop().await.unwrap();
}

#[tokio::test]
async fn malformed_payload_is_dropped_and_channel_survives() {
    let h = harness().await;
    h.engine.start().await.unwrap();

    h.subscriber
        .deliver(CHANNEL_NOTE_CREATED, "{\"id\": \"not-a-uuid\"}")
        .await;
    assert!(h.summaries.all().is_empty());

    let note = h.notes.seed(Uuid::new_v4(), "still alive", Utc::now());
    let payload = serde_json::to_string(&note_created_event(&note)).unwrap();
    h.subscriber.deliver(CHANNEL_NOTE_CREATED, &payload).await;
    assert_eq!(h.summaries.all().len(), 1);
    h.engine.stop().await.unwrap();
}

#[tokio::test]
async fn monitoring_channels_are_observed_without_side_effects() {
    let h = harness().await;
    h.engine.start().await.unwrap();

    let completed = serde_json::json!({
        "id": Uuid::new_v4(),
        "student_id": Uuid::new_v4(),
        "note_count": 3,
        "created_at": Utc::now(),
    });
    h.subscriber
        .deliver(CHANNEL_SUMMARY_COMPLETED, &completed.to_string())
        .await;

    let failed = serde_json::json!({
        "student_id": Uuid::new_v4(),
        "note_id": Uuid::new_v4(),
        "error": "provider timeout",
        "created_at": Utc::now(),
    });
    h.subscriber
        .deliver(CHANNEL_SUMMARY_FAILED, &failed.to_string())
        .await;

    // Both channels decode and log only; nothing is persisted.
    assert!(h.summaries.all().is_empty());
    h.engine.stop().await.unwrap();
}

#[tokio::test]
async fn failed_subscription_rolls_back_every_channel() {
    let subscriber = ChannelSubscriber::new();
    let listener = ChangeListener::new(Arc::new(subscriber.clone()));
    let counter = Arc::new(AtomicUsize::new(0));

    for channel in ["alpha", "beta"] {
        let counter = counter.clone();
        listener
            .register(
                channel,
                decoding_handler(channel, move |_: serde_json::Value| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            )
            .await;
    }
    subscriber.fail_channel("beta");

    let err = listener.start().await.unwrap_err();
    assert!(matches!(err, Error::Subscription(_)));
    assert!(!listener.is_running().await);
    assert!(
        subscriber.active_channels().is_empty(),
        "partial subscriptions must be rolled back"
    );
}

#[tokio::test]
async fn start_without_handlers_is_rejected() {
    let listener = ChangeListener::new(Arc::new(ChannelSubscriber::new()));
    assert!(matches!(
        listener.start().await,
        Err(Error::Subscription(_))
    ));
}

#[tokio::test]
async fn provider_status_and_health_gated_switch() {
    let h = harness().await;

    let status = h.engine.provider_status().await;
    assert_eq!(status.provider, ProviderKind::Mock);
    assert!(status.healthy);

    // Switching to OpenAI without credentials must fail the gate and
    // leave the mock provider active.
    let err = h
        .engine
        .switch_provider(ProviderKind::OpenAi, &ProviderConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ProviderSwitch(_)));
    assert_eq!(h.engine.provider_status().await.provider, ProviderKind::Mock);

    // Switching to the always-healthy mock succeeds.
    h.engine
        .switch_provider(ProviderKind::Mock, &ProviderConfig::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn failed_job_stats_start_empty() {
    let h = harness().await;
    let stats = h.engine.failed_job_stats().await.unwrap();
    assert_eq!(stats.total, 0);
}
