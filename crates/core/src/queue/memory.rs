//! In-process work queue with lease-based redelivery.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::types::delivery_token;
use super::{Delivery, QueueError, WorkItem, WorkQueue};

struct Entry {
    item: WorkItem,
    task_id: String,
    delivery_count: u32,
    /// Token of the latest claim.
    delivery_id: Option<String>,
    leased_until: Option<Instant>,
}

impl Entry {
    fn is_visible(&self, now: Instant) -> bool {
        self.leased_until.map_or(true, |until| until <= now)
    }

    fn is_held_by(&self, delivery_id: &str) -> bool {
        self.delivery_id.as_deref() == Some(delivery_id)
    }
}

/// Work queue held in memory. Items do not survive a restart; the dispatcher
/// rebuilds them from document status on start.
pub struct MemoryWorkQueue {
    lease: Duration,
    entries: Mutex<VecDeque<Entry>>,
}

impl MemoryWorkQueue {
    pub fn new(lease: Duration) -> Self {
        Self {
            lease,
            entries: Mutex::new(VecDeque::new()),
        }
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn enqueue(&self, item: WorkItem) -> Result<bool, QueueError> {
        let task_id = item.task_id();
        let mut entries = self.entries.lock().await;

        if entries.iter().any(|e| e.task_id == task_id) {
            debug!(task_id = %task_id, "Work item already queued");
            return Ok(false);
        }

        entries.push_back(Entry {
            item,
            task_id,
            delivery_count: 0,
            delivery_id: None,
            leased_until: None,
        });
        Ok(true)
    }

    async fn claim(&self) -> Result<Option<Delivery>, QueueError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let Some(entry) = entries.iter_mut().find(|e| e.is_visible(now)) else {
            return Ok(None);
        };

        entry.leased_until = Some(now + self.lease);
        entry.delivery_count += 1;
        let delivery_id = delivery_token(&entry.task_id, entry.delivery_count);
        entry.delivery_id = Some(delivery_id.clone());

        Ok(Some(Delivery {
            delivery_id,
            item: entry.item.clone(),
            delivery_count: entry.delivery_count,
        }))
    }

    async fn ack(&self, delivery_id: &str) -> Result<(), QueueError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| !e.is_held_by(delivery_id));

        if entries.len() == before {
            return Err(QueueError::UnknownDelivery(delivery_id.to_string()));
        }
        Ok(())
    }

    async fn nack(&self, delivery_id: &str) -> Result<(), QueueError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.is_held_by(delivery_id))
            .ok_or_else(|| QueueError::UnknownDelivery(delivery_id.to_string()))?;
        entry.leased_until = None;
        entry.delivery_id = None;
        Ok(())
    }

    async fn extend(&self, delivery_id: &str) -> Result<(), QueueError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.is_held_by(delivery_id))
            .ok_or_else(|| QueueError::UnknownDelivery(delivery_id.to_string()))?;
        entry.leased_until = Some(Instant::now() + self.lease);
        Ok(())
    }

    async fn pending(&self) -> Result<usize, QueueError> {
        Ok(self.entries.lock().await.len())
    }

    fn lease(&self) -> Duration {
        self.lease
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(doc: &str, attempt: u32) -> WorkItem {
        WorkItem::new(doc, "user-1", attempt)
    }

    #[tokio::test]
    async fn test_claims_in_fifo_order() {
        let queue = MemoryWorkQueue::new(Duration::from_secs(60));
        queue.enqueue(item("a", 0)).await.unwrap();
        queue.enqueue(item("b", 0)).await.unwrap();

        let first = queue.claim().await.unwrap().unwrap();
        let second = queue.claim().await.unwrap().unwrap();
        assert_eq!(first.item.document_id, "a");
        assert_eq!(second.item.document_id, "b");
        assert!(queue.claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent_per_attempt() {
        let queue = MemoryWorkQueue::new(Duration::from_secs(60));
        assert!(queue.enqueue(item("a", 0)).await.unwrap());
        assert!(!queue.enqueue(item("a", 0)).await.unwrap());
        assert!(queue.enqueue(item("a", 1)).await.unwrap());
        assert_eq!(queue.pending().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_ack_removes_item() {
        let queue = MemoryWorkQueue::new(Duration::from_secs(60));
        queue.enqueue(item("a", 0)).await.unwrap();

        let delivery = queue.claim().await.unwrap().unwrap();
        queue.ack(&delivery.delivery_id).await.unwrap();

        assert_eq!(queue.pending().await.unwrap(), 0);
        assert!(matches!(
            queue.ack(&delivery.delivery_id).await,
            Err(QueueError::UnknownDelivery(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_lease_is_redelivered() {
        let queue = MemoryWorkQueue::new(Duration::from_millis(30));
        queue.enqueue(item("a", 0)).await.unwrap();

        let first = queue.claim().await.unwrap().unwrap();
        assert!(!first.is_redelivery());
        assert!(queue.claim().await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(60)).await;

        let second = queue.claim().await.unwrap().unwrap();
        assert_eq!(second.item, first.item);
        assert_ne!(second.delivery_id, first.delivery_id);
        assert_eq!(second.delivery_count, 2);
        assert!(second.is_redelivery());
    }

    #[tokio::test]
    async fn test_superseded_delivery_cannot_ack() {
        let queue = MemoryWorkQueue::new(Duration::from_millis(30));
        queue.enqueue(item("a", 0)).await.unwrap();

        let first = queue.claim().await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let second = queue.claim().await.unwrap().unwrap();

        for result in [
            queue.ack(&first.delivery_id).await,
            queue.nack(&first.delivery_id).await,
            queue.extend(&first.delivery_id).await,
        ] {
            assert!(matches!(result, Err(QueueError::UnknownDelivery(_))));
        }
        assert_eq!(queue.pending().await.unwrap(), 1);

        queue.ack(&second.delivery_id).await.unwrap();
        assert_eq!(queue.pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_extend_keeps_item_leased() {
        let queue = MemoryWorkQueue::new(Duration::from_millis(100));
        queue.enqueue(item("a", 0)).await.unwrap();

        let delivery = queue.claim().await.unwrap().unwrap();
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(40)).await;
            queue.extend(&delivery.delivery_id).await.unwrap();
        }

        assert!(queue.claim().await.unwrap().is_none());
        queue.ack(&delivery.delivery_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_nack_makes_item_visible() {
        let queue = MemoryWorkQueue::new(Duration::from_secs(60));
        queue.enqueue(item("a", 0)).await.unwrap();

        let delivery = queue.claim().await.unwrap().unwrap();
        queue.nack(&delivery.delivery_id).await.unwrap();

        let again = queue.claim().await.unwrap().unwrap();
        assert_eq!(again.item, delivery.item);
    }
}
