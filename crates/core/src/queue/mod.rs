//! At-least-once work queue feeding the dispatcher.

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryWorkQueue;
pub use sqlite::SqliteWorkQueue;
pub use types::{Delivery, QueueError, WorkItem, WorkQueue};
