//! Work queue trait and types.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from work queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The delivery is unknown (already acked, or never handed out).
    #[error("unknown delivery: {0}")]
    UnknownDelivery(String),

    /// Backing storage failed.
    #[error("queue storage error: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for QueueError {
    fn from(e: rusqlite::Error) -> Self {
        QueueError::Storage(e.to_string())
    }
}

/// One unit of pipeline work: process `document_id` for generation `attempt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub document_id: String,
    pub owner_id: String,
    pub attempt: u32,
}

impl WorkItem {
    pub fn new(document_id: impl Into<String>, owner_id: impl Into<String>, attempt: u32) -> Self {
        Self {
            document_id: document_id.into(),
            owner_id: owner_id.into(),
            attempt,
        }
    }

    /// Stable identity of the item; enqueueing the same id twice is a no-op.
    pub fn task_id(&self) -> String {
        format!("{}:{}", self.document_id, self.attempt)
    }
}

/// Token for the `delivery_count`-th hand-out of `task_id`.
pub(crate) fn delivery_token(task_id: &str, delivery_count: u32) -> String {
    format!("{}#{}", task_id, delivery_count)
}

/// A claimed work item, invisible to other consumers until acked, nacked or its lease lapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Unique per claim. Once the item is handed to another claimer, this
    /// token no longer acks, nacks or extends it.
    pub delivery_id: String,
    pub item: WorkItem,
    /// How many times this item has been handed out, including this one.
    pub delivery_count: u32,
}

impl Delivery {
    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }
}

/// Durable at-least-once queue of [`WorkItem`]s.
///
/// A claimed item stays leased to its consumer. It is removed only by
/// [`ack`](WorkQueue::ack); if the consumer dies, the lease expires and the
/// item is handed to the next claimer.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Add an item. Returns false if an item with the same task id is already queued or leased.
    async fn enqueue(&self, item: WorkItem) -> Result<bool, QueueError>;

    /// Lease the oldest visible item, if any. Never blocks waiting for work.
    async fn claim(&self) -> Result<Option<Delivery>, QueueError>;

    /// Remove a delivered item for good.
    async fn ack(&self, delivery_id: &str) -> Result<(), QueueError>;

    /// Release a delivered item so it can be claimed again immediately.
    async fn nack(&self, delivery_id: &str) -> Result<(), QueueError>;

    /// Renew the lease of a held delivery for another full lease period.
    async fn extend(&self, delivery_id: &str) -> Result<(), QueueError>;

    /// Number of items not yet acked (visible and leased).
    async fn pending(&self) -> Result<usize, QueueError>;

    /// How long a claim stays invisible without renewal.
    fn lease(&self) -> Duration;
}
