//! Queue status aggregation: counts, completion percentage and time estimates per batch.

mod aggregator;
mod config;
mod types;

pub use aggregator::{summarize, QueueStatusAggregator};
pub use config::StatusConfig;
pub use types::{QueuePreviewEntry, QueueStatus, StatusError};
