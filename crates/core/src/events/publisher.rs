//! Convenience wrapper that turns pipeline happenings into progress events.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use super::{EventBus, ProgressEvent};
use crate::document::Document;
use crate::status::QueueStatus;

/// Publishes progress events on an [`EventBus`].
///
/// Publishing is fire-and-forget: the bus drops events nobody listens to,
/// and nothing here ever reports an error back to the caller.
#[derive(Clone)]
pub struct ProgressPublisher {
    bus: Arc<dyn EventBus>,
}

impl ProgressPublisher {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    pub async fn publish(&self, event: ProgressEvent) {
        let delivered = self.bus.publish(event).await;
        debug!(delivered, "Published progress event");
    }

    /// A stage checkpoint for one document.
    pub async fn document_progress(
        &self,
        document: &Document,
        progress: u8,
        status: &str,
        stage: &str,
    ) {
        self.publish(
            ProgressEvent::document(
                &document.owner_id,
                &document.batch_id,
                &document.id,
                progress,
                status,
                stage,
            )
            .with_extra("filename", document.filename.as_str()),
        )
        .await;
    }

    /// Terminal success for one document.
    pub async fn document_completed(&self, document: &Document) {
        let mut event = ProgressEvent::document(
            &document.owner_id,
            &document.batch_id,
            &document.id,
            100,
            "Completed successfully",
            "completed",
        )
        .with_extra("filename", document.filename.as_str());

        if let Some(score) = document.match_score {
            event = event.with_extra("match_score", score);
        }
        if let Some(name) = document.candidate_name() {
            event = event.with_extra("candidate_name", name);
        }
        self.publish(event).await;
    }

    /// Terminal failure for one document.
    pub async fn document_failed(&self, document: &Document, error: &str) {
        self.publish(
            ProgressEvent::document(
                &document.owner_id,
                &document.batch_id,
                &document.id,
                100,
                format!("Failed: {}", error),
                "failed",
            )
            .with_extra("filename", document.filename.as_str())
            .with_extra("error", error),
        )
        .await;
    }

    /// A document went back to the queue after an explicit retry.
    pub async fn document_requeued(&self, document: &Document) {
        self.publish(
            ProgressEvent::document(
                &document.owner_id,
                &document.batch_id,
                &document.id,
                0,
                "Queued for retry",
                "queued",
            )
            .with_extra("filename", document.filename.as_str())
            .with_extra("attempt", document.attempt),
        )
        .await;
    }

    /// Batch aggregate, carrying every field of the snapshot.
    pub async fn batch_progress(&self, owner_id: &str, status: &QueueStatus) {
        let label = if status.is_finished() {
            "Completed"
        } else {
            "Processing"
        };
        let fields = serde_json::to_value(status).unwrap_or_else(|_| json!({}));

        self.publish(
            ProgressEvent::batch(owner_id, &status.batch_id, status.percentage.round() as u8, label)
                .with_fields(fields),
        )
        .await;
    }
}
