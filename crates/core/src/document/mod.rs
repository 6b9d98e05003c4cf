//! Documents, batches and the document lifecycle.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteDocumentStore;
pub use store::{
    CreateBatchRequest, CreateDocumentRequest, DocumentFilter, DocumentOutcome, DocumentStore,
    StoreError,
};
pub use types::{
    normalize_profile_handle, record_profile_handle, Batch, BatchStatus, Document, DocumentStatus,
    TransitionError,
};
