//! Change notification listener.
//!
//! Bridges the pub/sub transport to registered per-channel handlers.
//! Starting is all-or-nothing: if any channel fails to subscribe, every
//! subscription already established is torn down and the listener stays
//! stopped. `start` and `stop` are both idempotent.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use noteflow_core::{Error, EventHandler, Result, Subscriber, SubscriptionHandle};

struct ListenerState {
    running: bool,
    subscriptions: Vec<Box<dyn SubscriptionHandle>>,
}

/// Subscribes registered handlers to their channels on start.
pub struct ChangeListener {
    subscriber: Arc<dyn Subscriber>,
    handlers: Mutex<HashMap<String, EventHandler>>,
    state: Mutex<ListenerState>,
}

impl ChangeListener {
    pub fn new(subscriber: Arc<dyn Subscriber>) -> Self {
        Self {
            subscriber,
            handlers: Mutex::new(HashMap::new()),
            state: Mutex::new(ListenerState {
                running: false,
                subscriptions: Vec::new(),
            }),
        }
    }

    /// Register a handler for a channel. Registrations made while the
    /// listener is running take effect on the next start.
    pub async fn register(&self, channel: impl Into<String>, handler: EventHandler) {
        let channel = channel.into();
        debug!(channel = %channel, "Registered channel handler");
        self.handlers.lock().await.insert(channel, handler);
    }

    /// Start listening on every registered channel.
    ///
    /// Already running is a no-op. A subscription failure on any channel
    /// rolls back the ones already established and returns
    /// [`Error::Subscription`].
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.running {
            debug!("Listener already running, start is a no-op");
            return Ok(());
        }

        let handlers = self.handlers.lock().await.clone();
        if handlers.is_empty() {
            return Err(Error::Subscription(
                "no channel handlers registered".into(),
            ));
        }

        let mut established: Vec<Box<dyn SubscriptionHandle>> = Vec::with_capacity(handlers.len());
        for (channel, handler) in &handlers {
            match self.subscriber.subscribe(channel, handler.clone()).await {
                Ok(handle) => established.push(handle),
                Err(e) => {
                    warn!(
                        channel = %channel,
                        error = %e,
                        "Subscription failed, rolling back listener start"
                    );
                    for handle in established {
                        if let Err(rollback_err) = handle.unsubscribe().await {
                            warn!(error = %rollback_err, "Rollback unsubscribe failed");
                        }
                    }
                    return Err(Error::Subscription(format!(
                        "failed to subscribe to {}: {}",
                        channel, e
                    )));
                }
            }
        }

        info!(channels = handlers.len(), "Change listener started");
        state.subscriptions = established;
        state.running = true;
        Ok(())
    }

    /// Tear down every active subscription. Already stopped is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.running {
            debug!("Listener not running, stop is a no-op");
            return Ok(());
        }

        for handle in state.subscriptions.drain(..) {
            if let Err(e) = handle.unsubscribe().await {
                warn!(error = %e, "Unsubscribe failed during listener stop");
            }
        }
        state.running = false;
        info!("Change listener stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }
}

/// Wrap an async callback in a handler that decodes the raw payload first.
///
/// A payload that fails to decode is logged and dropped; the channel keeps
/// delivering subsequent events.
pub fn decoding_handler<T, F, Fut>(channel: &'static str, callback: F) -> EventHandler
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let callback = Arc::new(callback);
    Arc::new(move |payload: String| {
        let callback = callback.clone();
        Box::pin(async move {
            match serde_json::from_str::<T>(&payload) {
                Ok(decoded) => callback(decoded).await,
                Err(e) => {
                    warn!(
                        channel = channel,
                        error = %e,
                        "Dropping malformed notification payload"
                    );
                }
            }
        })
    })
}
