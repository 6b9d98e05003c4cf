//! HTTP and WebSocket surface of the screenflow document pipeline.

pub mod api;
pub mod gateway;
pub mod metrics;
pub mod state;
