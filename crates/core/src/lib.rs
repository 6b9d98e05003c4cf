//! Core of the screenflow document pipeline.
//!
//! Uploaded CVs move through a small state machine while a pool of workers
//! runs each one through download, extraction, AI parsing and optional
//! matching. Progress is published per owner and batch totals are derived
//! from the store on demand.

pub mod auth;
pub mod collaborators;
pub mod config;
pub mod dispatcher;
pub mod document;
pub mod events;
pub mod metrics;
pub mod queue;
pub mod status;
pub mod testing;

pub use auth::{
    create_authenticator, ApiKeyAuthenticator, AuthError, AuthRequest, Authenticator, Identity,
    NoneAuthenticator,
};
pub use collaborators::{
    CollaboratorError, DocumentParser, FsObjectStorage, HttpParsingClient, MatchOutcome, Matcher,
    ObjectStorage, ParsedDocument, ProfileAnalyzer, ProfileInsight, TokenUsage,
};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthMethod, Config, ConfigError,
    LogFormat, SanitizedConfig,
};
pub use dispatcher::{
    Collaborators, DispatchError, DispatcherConfig, DispatcherStatus, DocumentDispatcher,
    QueueBackend, Stage, TaskHandle,
};
pub use document::{
    Batch, BatchStatus, CreateBatchRequest, CreateDocumentRequest, Document, DocumentFilter,
    DocumentStatus, DocumentStore, SqliteDocumentStore, StoreError,
};
pub use events::{BroadcastEventBus, EventBus, EventKind, ProgressEvent, ProgressPublisher};
pub use queue::{MemoryWorkQueue, QueueError, SqliteWorkQueue, WorkQueue};
pub use status::{QueueStatus, QueueStatusAggregator, StatusConfig, StatusError};
