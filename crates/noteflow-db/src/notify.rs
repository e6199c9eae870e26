//! LISTEN/NOTIFY transport for change notifications.
//!
//! Publishing goes through `pg_notify` with bind parameters, so channel
//! names and payloads are never interpolated into SQL text. Each
//! subscription runs on its own dedicated listener connection; an error
//! on one channel never stalls another.

use async_trait::async_trait;
use sqlx::postgres::PgListener;
use sqlx::{Pool, Postgres};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use noteflow_core::defaults::SUBSCRIBER_RECONNECT_DELAY_MS;
use noteflow_core::{
    Error, EventHandler, Notification, NotificationPublisher, Result, SubscriptionHandle,
    Subscriber,
};

/// Publishes typed notifications via `pg_notify`.
pub struct PgNotificationPublisher {
    pool: Pool<Postgres>,
}

impl PgNotificationPublisher {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationPublisher for PgNotificationPublisher {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        let channel = notification.channel();
        let payload = notification.payload_json()?;

        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(channel)
            .bind(&payload)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "publisher",
            channel = channel,
            "Published notification"
        );
        Ok(())
    }
}

/// Subscribes to notification channels over dedicated listener connections.
pub struct PgSubscriber {
    pool: Pool<Postgres>,
}

impl PgSubscriber {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Subscriber for PgSubscriber {
    async fn subscribe(
        &self,
        channel: &str,
        handler: EventHandler,
    ) -> Result<Box<dyn SubscriptionHandle>> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| Error::Subscription(format!("listener connect failed: {}", e)))?;
        listener
            .listen(channel)
            .await
            .map_err(|e| Error::Subscription(format!("LISTEN {} failed: {}", channel, e)))?;

        info!(
            subsystem = "db",
            component = "subscriber",
            channel = channel,
            "Subscribed to channel"
        );

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let channel_name = channel.to_string();

        let task: JoinHandle<()> = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!(
                            subsystem = "db",
                            component = "subscriber",
                            channel = %channel_name,
                            "Subscription shutting down"
                        );
                        break;
                    }
                    result = listener.recv() => {
                        match result {
                            Ok(notification) => {
                                let payload = notification.payload().to_string();
                                handler(payload).await;
                            }
                            Err(e) => {
                                // PgListener re-establishes its LISTEN set on the
                                // next recv after a dropped connection; back off
                                // briefly and keep the loop alive.
                                warn!(
                                    subsystem = "db",
                                    component = "subscriber",
                                    channel = %channel_name,
                                    error = %e,
                                    "Listener connection error, retrying"
                                );
                                tokio::time::sleep(std::time::Duration::from_millis(
                                    SUBSCRIBER_RECONNECT_DELAY_MS,
                                ))
                                .await;
                            }
                        }
                    }
                }
            }
        });

        Ok(Box::new(PgSubscriptionHandle {
            channel: channel.to_string(),
            shutdown: shutdown_tx,
            task,
        }))
    }
}

/// Handle for one live channel subscription.
pub struct PgSubscriptionHandle {
    channel: String,
    shutdown: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

#[async_trait]
impl SubscriptionHandle for PgSubscriptionHandle {
    async fn unsubscribe(self: Box<Self>) -> Result<()> {
        if self.shutdown.send(()).await.is_err() {
            // Task already exited; nothing to tear down.
            return Ok(());
        }
        if let Err(e) = self.task.await {
            error!(
                subsystem = "db",
                component = "subscriber",
                channel = %self.channel,
                error = %e,
                "Subscription task panicked during shutdown"
            );
        }
        Ok(())
    }
}
