use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use screenflow_core::EventBus;

use crate::metrics::{WS_CONNECTIONS_PRUNED, WS_MESSAGES_SENT};

/// Process-unique id of one socket.
pub type ConnectionId = u64;

/// What a socket task gets back from [`ConnectionRegistry::register`].
pub struct RegisteredConnection {
    pub id: ConnectionId,
    /// Frames to write to the socket.
    pub frames: mpsc::Receiver<String>,
    /// Signalled when the registry drops this connection.
    pub closed: Arc<Notify>,
}

struct Connection {
    sender: mpsc::Sender<String>,
    closed: Arc<Notify>,
}

struct OwnerEntry {
    connections: HashMap<ConnectionId, Connection>,
    forwarder: Option<JoinHandle<()>>,
}

/// Owner → open connections, guarded by one mutex.
///
/// A connection whose outbound buffer is full or whose socket task has gone
/// away is pruned on the send attempt that finds it; the others still get
/// the frame. Owner entries are removed with their last connection.
pub struct ConnectionRegistry {
    bus: Arc<dyn EventBus>,
    buffer: usize,
    next_id: AtomicU64,
    owners: Mutex<HashMap<String, OwnerEntry>>,
}

impl ConnectionRegistry {
    /// `buffer` bounds the frames queued per connection.
    pub fn new(bus: Arc<dyn EventBus>, buffer: usize) -> Self {
        Self {
            bus,
            buffer: buffer.max(1),
            next_id: AtomicU64::new(1),
            owners: Mutex::new(HashMap::new()),
        }
    }

    /// Add a connection for `owner_id`. The first connection of an owner
    /// starts forwarding that owner's bus events to all of its connections.
    pub async fn register(self: &Arc<Self>, owner_id: &str) -> RegisteredConnection {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, frames) = mpsc::channel(self.buffer);
        let closed = Arc::new(Notify::new());

        let mut owners = self.owners.lock().await;
        let entry = owners
            .entry(owner_id.to_string())
            .or_insert_with(|| OwnerEntry {
                connections: HashMap::new(),
                forwarder: None,
            });
        entry.connections.insert(
            id,
            Connection {
                sender,
                closed: Arc::clone(&closed),
            },
        );

        if entry.forwarder.is_none() {
            // Subscribe before returning so nothing published after the
            // handshake is missed.
            let events = self.bus.subscribe(owner_id).await;
            entry.forwarder = Some(self.spawn_forwarder(owner_id.to_string(), events));
        }

        info!(
            owner_id = %owner_id,
            connection_id = id,
            connections = entry.connections.len(),
            "WebSocket connection registered"
        );
        RegisteredConnection { id, frames, closed }
    }

    /// Remove a connection. Removing the last one stops the owner's subscription.
    pub async fn unregister(&self, owner_id: &str, id: ConnectionId) {
        let mut owners = self.owners.lock().await;
        let Some(entry) = owners.get_mut(owner_id) else {
            return;
        };
        entry.connections.remove(&id);
        debug!(owner_id = %owner_id, connection_id = id, "WebSocket connection unregistered");

        if entry.connections.is_empty() {
            Self::remove_owner(&mut owners, owner_id);
        }
    }

    /// Deliver `frame` to every connection of `owner_id`. Returns how many
    /// connections accepted it.
    pub async fn send_to_owner(&self, owner_id: &str, frame: &str) -> usize {
        let mut owners = self.owners.lock().await;
        let Some(entry) = owners.get_mut(owner_id) else {
            return 0;
        };

        let mut delivered = 0;
        entry.connections.retain(|id, connection| {
            match connection.sender.try_send(frame.to_string()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(e) => {
                    warn!(owner_id = %owner_id, connection_id = id, error = %e, "Pruning WebSocket connection");
                    WS_CONNECTIONS_PRUNED.inc();
                    connection.closed.notify_one();
                    false
                }
            }
        });

        if entry.connections.is_empty() {
            Self::remove_owner(&mut owners, owner_id);
        }
        delivered
    }

    /// Drop every connection and subscription (server shutdown).
    pub async fn close_all(&self) {
        let mut owners = self.owners.lock().await;
        for (_, entry) in owners.drain() {
            for connection in entry.connections.values() {
                connection.closed.notify_one();
            }
            if let Some(forwarder) = entry.forwarder {
                forwarder.abort();
            }
        }
    }

    /// Number of owners with at least one connection.
    pub async fn owner_count(&self) -> usize {
        self.owners.lock().await.len()
    }

    /// Number of open connections for one owner.
    pub async fn connection_count(&self, owner_id: &str) -> usize {
        self.owners
            .lock()
            .await
            .get(owner_id)
            .map_or(0, |e| e.connections.len())
    }

    /// Total open connections.
    pub async fn total_connections(&self) -> usize {
        self.owners
            .lock()
            .await
            .values()
            .map(|e| e.connections.len())
            .sum()
    }

    fn remove_owner(owners: &mut HashMap<String, OwnerEntry>, owner_id: &str) {
        if let Some(entry) = owners.remove(owner_id) {
            if let Some(forwarder) = entry.forwarder {
                forwarder.abort();
            }
            debug!(owner_id = %owner_id, "Owner has no connections left");
        }
    }

    fn spawn_forwarder(
        self: &Arc<Self>,
        owner_id: String,
        mut events: screenflow_core::events::EventStream,
    ) -> JoinHandle<()> {
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let frame = match event.to_json() {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize progress event");
                        continue;
                    }
                };
                let delivered = registry.send_to_owner(&owner_id, &frame).await;
                WS_MESSAGES_SENT
                    .with_label_values(&[event.kind.as_str()])
                    .inc_by(delivered as u64);
                if delivered == 0 {
                    break;
                }
            }
            debug!(owner_id = %owner_id, "Event forwarder stopped");
        })
    }
}
