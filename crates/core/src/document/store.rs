//! Document storage trait and request types.

use thiserror::Error;

use super::{Batch, Document, DocumentStatus, TransitionError};

/// Error type for document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record not found.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Requested status change is not in the lifecycle table.
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    /// The write belongs to an attempt that has since been superseded.
    #[error("stale attempt for document {document_id}: expected {expected}, current {current}")]
    StaleAttempt {
        document_id: String,
        expected: u32,
        current: u32,
    },

    /// Operation violates a store-level rule (e.g. deleting a running document).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub(crate) fn document_not_found(id: &str) -> Self {
        StoreError::NotFound {
            kind: "document",
            id: id.to_string(),
        }
    }

    pub(crate) fn batch_not_found(id: &str) -> Self {
        StoreError::NotFound {
            kind: "batch",
            id: id.to_string(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Request to create a batch.
#[derive(Debug, Clone)]
pub struct CreateBatchRequest {
    pub owner_id: String,
    pub title: String,
    /// Linked job requirement (enables matching).
    pub requirement: Option<String>,
}

/// Request to register a confirmed upload as a new queued document.
#[derive(Debug, Clone)]
pub struct CreateDocumentRequest {
    pub batch_id: String,
    pub storage_key: String,
    pub filename: String,
    pub mime_type: String,
}

/// Result of a successful pipeline run, persisted on completion.
#[derive(Debug, Clone, Default)]
pub struct DocumentOutcome {
    pub structured_record: serde_json::Value,
    pub match_score: Option<u8>,
    pub match_rationale: Option<String>,
}

/// Filter for listing documents.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub batch_id: Option<String>,
    pub owner_id: Option<String>,
    pub statuses: Vec<DocumentStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl DocumentFilter {
    pub fn new() -> Self {
        Self {
            limit: 1000,
            ..Default::default()
        }
    }

    pub fn with_batch(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_status(mut self, status: DocumentStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Persistent store for documents and batches.
///
/// Status writes go through the lifecycle table and, where an attempt is
/// given, are compare-and-set on the document's current attempt. Counter
/// updates happen in the same transaction as the status write so that
/// `processed + failed <= total` holds at every commit.
pub trait DocumentStore: Send + Sync {
    /// Create an empty batch.
    fn create_batch(&self, request: CreateBatchRequest) -> Result<Batch, StoreError>;

    /// Get a batch by ID.
    fn get_batch(&self, id: &str) -> Result<Option<Batch>, StoreError>;

    /// Batches of an owner, newest first.
    fn list_batches(&self, owner_id: &str, limit: i64, offset: i64)
        -> Result<Vec<Batch>, StoreError>;

    /// Delete a batch with all of its documents. Returns the deleted documents
    /// so their stored objects can be removed.
    ///
    /// Refused with `Conflict` while any document is being processed.
    fn delete_batch(&self, id: &str) -> Result<Vec<Document>, StoreError>;

    /// Register a confirmed upload as a queued document and bump the batch total.
    fn add_document(&self, request: CreateDocumentRequest) -> Result<Document, StoreError>;

    /// Get a document by ID.
    fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError>;

    /// List documents matching the filter, oldest first.
    fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>, StoreError>;

    /// Claim a document for `attempt`: `Queued -> Processing`.
    ///
    /// Re-claiming a document already `Processing` under the same attempt
    /// (a redelivery) succeeds without a transition.
    fn claim_document(&self, id: &str, attempt: u32) -> Result<Document, StoreError>;

    /// `Processing -> Completed`, persisting the outcome and bumping `processed`.
    fn complete_document(
        &self,
        id: &str,
        attempt: u32,
        outcome: DocumentOutcome,
    ) -> Result<Document, StoreError>;

    /// `Processing -> Failed`, recording the error and bumping `failed`.
    fn fail_document(&self, id: &str, attempt: u32, error: &str)
        -> Result<Document, StoreError>;

    /// `Failed -> Queued` for an explicit retry: bumps the attempt and gives back the failed slot.
    fn reset_for_retry(&self, id: &str) -> Result<Document, StoreError>;

    /// `Completed -> Shortlisted | Rejected`.
    fn review_document(&self, id: &str, outcome: DocumentStatus)
        -> Result<Document, StoreError>;

    /// Permanently delete a document, adjusting the batch counters. Returns the deleted row.
    fn delete_document(&self, id: &str) -> Result<Document, StoreError>;
}
