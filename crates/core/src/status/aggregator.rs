//! Batch queue status computation.

use std::sync::Arc;

use crate::document::{Document, DocumentFilter, DocumentStatus, DocumentStore};

use super::{QueuePreviewEntry, QueueStatus, StatusConfig, StatusError};

/// Computes [`QueueStatus`] snapshots from the document store.
///
/// Reads only; never publishes. The dispatcher and the HTTP layer both call it.
pub struct QueueStatusAggregator {
    store: Arc<dyn DocumentStore>,
    config: StatusConfig,
}

impl QueueStatusAggregator {
    pub fn new(store: Arc<dyn DocumentStore>, config: StatusConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &StatusConfig {
        &self.config
    }

    /// Current snapshot of `batch_id`.
    pub fn compute(&self, batch_id: &str) -> Result<QueueStatus, StatusError> {
        if self.store.get_batch(batch_id)?.is_none() {
            return Err(StatusError::BatchNotFound(batch_id.to_string()));
        }

        let documents = self
            .store
            .list_documents(&DocumentFilter::new().with_batch(batch_id).with_limit(i64::MAX))?;

        Ok(summarize(batch_id, &documents, &self.config))
    }
}

/// Builds a snapshot from a batch's documents, given oldest first.
pub fn summarize(batch_id: &str, documents: &[Document], config: &StatusConfig) -> QueueStatus {
    let mut queued = 0u32;
    let mut processing = 0u32;
    let mut completed = 0u32;
    let mut failed = 0u32;

    for document in documents {
        match document.status {
            DocumentStatus::Queued => queued += 1,
            DocumentStatus::Processing => processing += 1,
            DocumentStatus::Completed | DocumentStatus::Shortlisted | DocumentStatus::Rejected => {
                completed += 1
            }
            DocumentStatus::Failed => failed += 1,
        }
    }

    let total = documents.len() as u32;
    let average = average_seconds(documents, config);
    let estimated_time_seconds = f64::from(queued + processing) * average;

    let queue_preview = documents
        .iter()
        .filter(|d| d.status == DocumentStatus::Queued)
        .take(config.preview_limit)
        .enumerate()
        .map(|(index, document)| {
            let position = index + 1;
            QueuePreviewEntry {
                document_id: document.id.clone(),
                filename: document.filename.clone(),
                position,
                estimated_wait_seconds: round_to(position as f64 * average, 2),
            }
        })
        .collect();

    QueueStatus {
        batch_id: batch_id.to_string(),
        total,
        queued,
        processing,
        completed,
        failed,
        percentage: percentage(completed + failed, total),
        estimated_time_seconds: round_to(estimated_time_seconds, 2),
        estimated_time_minutes: round_to(estimated_time_seconds / 60.0, 1),
        average_seconds_per_document: round_to(average, 2),
        queue_preview,
    }
}

fn percentage(resolved: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_to(f64::from(resolved) / f64::from(total) * 100.0, 2).clamp(0.0, 100.0)
}

fn average_seconds(documents: &[Document], config: &StatusConfig) -> f64 {
    let samples: Vec<f64> = documents
        .iter()
        .filter(|d| {
            matches!(
                d.status,
                DocumentStatus::Completed | DocumentStatus::Shortlisted | DocumentStatus::Rejected
            )
        })
        .filter_map(Document::processing_seconds)
        .filter(|s| s.is_finite() && *s >= 0.0)
        .collect();

    if samples.is_empty() || samples.len() < config.min_samples {
        return config.default_seconds_per_document;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
