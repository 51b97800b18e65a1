//! Real-time fan-out of persisted records to live subscribers.

pub mod ws;

use crate::port::{QueueError, StreamBroker};
use futures::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const RESUBSCRIBE_INITIAL: Duration = Duration::from_millis(500);
const RESUBSCRIBE_MAX: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum BroadcastError {
    #[error("Failed to encode record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Fan-out channel subscription failed: {0}")]
    Subscribe(#[from] QueueError),
}

/// Receiving half handed to one live subscriber.
///
/// Dropping it disconnects the subscriber.
pub struct Subscription {
    id: Uuid,
    receiver: mpsc::Receiver<Arc<str>>,
    broadcaster: Weak<Broadcaster>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next payload, or `None` once the broadcaster dropped this subscriber.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(broadcaster) = self.broadcaster.upgrade() {
            broadcaster.disconnect(self.id);
        }
    }
}

pub struct Broadcaster {
    broker: Arc<dyn StreamBroker>,
    channel: String,
    outbox_capacity: usize,
    subscribers: Mutex<HashMap<Uuid, mpsc::Sender<Arc<str>>>>,
    listener_started: AtomicBool,
}

impl Broadcaster {
    pub fn new(broker: Arc<dyn StreamBroker>, channel: impl Into<String>, outbox_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            broker,
            channel: channel.into(),
            outbox_capacity: outbox_capacity.max(1),
            subscribers: Mutex::new(HashMap::new()),
            listener_started: AtomicBool::new(false),
        })
    }

    /// Register a subscriber and make sure the channel listener is running.
    pub fn connect(self: &Arc<Self>) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.outbox_capacity);
        let id = Uuid::new_v4();
        let total = {
            let mut subscribers = self.subscribers.lock();
            subscribers.insert(id, sender);
            subscribers.len()
        };
        info!("Subscriber {} connected ({} active)", id, total);
        self.ensure_listener();

        Subscription {
            id,
            receiver,
            broadcaster: Arc::downgrade(self),
        }
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn disconnect(&self, id: Uuid) -> bool {
        let removed = self.subscribers.lock().remove(&id).is_some();
        if removed {
            info!("Subscriber {} disconnected", id);
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn listener_running(&self) -> bool {
        self.listener_started.load(Ordering::Acquire)
    }

    /// Serialize once and push to every subscriber. Returns how many received it.
    pub fn broadcast<T: Serialize>(&self, record: &T) -> Result<usize, BroadcastError> {
        let payload: Arc<str> = Arc::from(serde_json::to_string(record)?);
        Ok(self.broadcast_raw(payload))
    }

    /// Push an already encoded payload. A subscriber whose outbox is full or
    /// closed is dropped on the spot.
    pub fn broadcast_raw(&self, payload: Arc<str>) -> usize {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|_, outbox| outbox.try_send(payload.clone()).is_ok());
        let dropped = before - subscribers.len();
        if dropped > 0 {
            debug!("Dropped {} subscribers that could not keep up", dropped);
        }
        subscribers.len()
    }

    fn ensure_listener(self: &Arc<Self>) {
        if self
            .listener_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let weak = Arc::downgrade(self);
        let broker = self.broker.clone();
        let channel = self.channel.clone();
        tokio::spawn(listen(weak, broker, channel));
    }
}

/// Forward every channel message to the broadcaster for as long as it exists.
async fn listen(broadcaster: Weak<Broadcaster>, broker: Arc<dyn StreamBroker>, channel: String) {
    let mut backoff = RESUBSCRIBE_INITIAL;
    loop {
        match broker.subscribe(&channel).await {
            Ok(mut messages) => {
                info!("Listening for persisted records on '{}'", channel);
                backoff = RESUBSCRIBE_INITIAL;
                while let Some(payload) = messages.next().await {
                    let Some(broadcaster) = broadcaster.upgrade() else {
                        return;
                    };
                    broadcaster.broadcast_raw(Arc::from(payload));
                }
                warn!("Subscription to '{}' ended, resubscribing", channel);
            }
            Err(e) => warn!("Cannot subscribe to '{}': {}", channel, BroadcastError::from(e)),
        }

        if broadcaster.strong_count() == 0 {
            return;
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(RESUBSCRIBE_MAX);
    }
}
