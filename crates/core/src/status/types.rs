//! Queue status snapshot types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::StoreError;

/// Errors from computing a queue status.
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("batch not found: {0}")]
    BatchNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One waiting document in the queue preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuePreviewEntry {
    pub document_id: String,
    pub filename: String,
    /// 1-based position among queued documents.
    pub position: usize,
    pub estimated_wait_seconds: f64,
}

/// Point-in-time summary of a batch, computed from document statuses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub batch_id: String,
    pub total: u32,
    pub queued: u32,
    pub processing: u32,
    /// Includes reviewed (shortlisted/rejected) documents.
    pub completed: u32,
    pub failed: u32,
    /// Resolved share of the batch, 0-100, two decimals.
    pub percentage: f64,
    pub estimated_time_seconds: f64,
    /// One decimal.
    pub estimated_time_minutes: f64,
    pub average_seconds_per_document: f64,
    pub queue_preview: Vec<QueuePreviewEntry>,
}

impl QueueStatus {
    pub fn resolved(&self) -> u32 {
        self.completed + self.failed
    }

    pub fn is_finished(&self) -> bool {
        self.total > 0 && self.queued == 0 && self.processing == 0
    }
}
