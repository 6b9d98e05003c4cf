//! Progress events and the per-owner event bus.

mod bus;
mod publisher;
mod types;

pub use bus::{BroadcastEventBus, EventBus, EventStream};
pub use publisher::ProgressPublisher;
pub use types::{EventKind, ProgressEvent};
