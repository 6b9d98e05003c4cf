//! Document dispatcher: worker pool, stage pipeline and task lifecycle.
//!
//! - **Submission**: `submit`, `submit_batch` and `retry` enqueue work items
//! - **Workers**: each claims one item at a time and runs its stages in order
//! - **Ack**: only after the document reaches a terminal state

mod config;
mod pipeline;
mod runner;
mod types;

pub use config::{DispatcherConfig, QueueBackend};
pub use pipeline::{sniff_mime_type, Collaborators};
pub use runner::DocumentDispatcher;
pub use types::{ActiveTask, DispatchError, DispatcherStatus, Stage, TaskHandle};
