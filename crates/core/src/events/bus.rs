//! Per-owner publish/subscribe transport for progress events.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use super::ProgressEvent;
use crate::metrics::{EVENTS_LAGGED, EVENTS_PUBLISHED, EVENTS_UNDELIVERED};

/// Stream of events for one owner. Dropping it ends the subscription.
pub type EventStream = BoxStream<'static, ProgressEvent>;

/// Transport between event producers (dispatcher) and consumers (gateway).
///
/// One logical channel per owner. No acknowledgement and no replay: an event
/// published while nobody is subscribed is dropped.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish to the event's owner channel. Returns how many subscribers received it.
    async fn publish(&self, event: ProgressEvent) -> usize;

    /// Subscribe to every subsequent event for `owner_id`.
    async fn subscribe(&self, owner_id: &str) -> EventStream;
}

/// In-process bus backed by one tokio broadcast channel per owner.
pub struct BroadcastEventBus {
    capacity: usize,
    channels: Mutex<HashMap<String, broadcast::Sender<ProgressEvent>>>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Number of owner channels currently held.
    pub async fn channel_count(&self) -> usize {
        let mut channels = self.channels.lock().await;
        channels.retain(|_, sender| sender.receiver_count() > 0);
        channels.len()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventBus for BroadcastEventBus {
    async fn publish(&self, event: ProgressEvent) -> usize {
        EVENTS_PUBLISHED
            .with_label_values(&[event.kind.as_str()])
            .inc();

        let mut channels = self.channels.lock().await;
        let Some(sender) = channels.get(&event.owner_id) else {
            EVENTS_UNDELIVERED.inc();
            return 0;
        };

        if sender.receiver_count() == 0 {
            debug!(owner_id = %event.owner_id, "Dropping channel with no subscribers");
            channels.remove(&event.owner_id);
            EVENTS_UNDELIVERED.inc();
            return 0;
        }

        sender.send(event).unwrap_or(0)
    }

    async fn subscribe(&self, owner_id: &str) -> EventStream {
        let receiver = {
            let mut channels = self.channels.lock().await;
            channels.retain(|_, sender| sender.receiver_count() > 0);
            channels
                .entry(owner_id.to_string())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };

        let owner_id = owner_id.to_string();
        futures::stream::unfold(receiver, move |mut receiver| {
            let owner_id = owner_id.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(event) => return Some((event, receiver)),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(owner_id = %owner_id, skipped = n, "Event subscriber lagged");
                            EVENTS_LAGGED.inc_by(n);
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        })
        .boxed()
    }
}
