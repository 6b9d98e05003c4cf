//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Dispatcher (tasks, stages, stale writes)
//! - Event bus (published and lagged events)
//! - External collaborators (parser, matcher, profile analyzer, storage)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Dispatcher Metrics
// =============================================================================

/// Tasks finished by outcome.
pub static TASKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("screenflow_tasks_total", "Total document tasks finished"),
        &["outcome"], // "completed", "failed", "stale", "skipped"
    )
    .unwrap()
});

/// Tasks currently running.
pub static TASKS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "screenflow_tasks_active",
        "Number of document tasks currently running",
    )
    .unwrap()
});

/// End-to-end task duration in seconds.
pub static TASK_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "screenflow_task_duration_seconds",
            "Duration of one document task",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        &["outcome"],
    )
    .unwrap()
});

/// Per-stage duration in seconds.
pub static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "screenflow_stage_duration_seconds",
            "Duration of individual pipeline stages",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["stage"],
    )
    .unwrap()
});

/// Stage failures by error kind.
pub static STAGE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("screenflow_stage_failures_total", "Pipeline stage failures"),
        &["stage", "kind"], // kind: "extraction", "upstream", "infrastructure"
    )
    .unwrap()
});

/// Redelivered work items (lease expired or consumer died).
pub static REDELIVERIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "screenflow_redeliveries_total",
        "Work items handed out more than once",
    )
    .unwrap()
});

/// Explicit retries requested.
pub static RETRIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("screenflow_retries_total", "Explicit document retries").unwrap()
});

// =============================================================================
// Event Bus Metrics
// =============================================================================

/// Progress events published by type.
pub static EVENTS_PUBLISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "screenflow_events_published_total",
            "Progress events published",
        ),
        &["type"],
    )
    .unwrap()
});

/// Events published with no subscriber listening.
pub static EVENTS_UNDELIVERED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "screenflow_events_undelivered_total",
        "Progress events dropped because nobody was subscribed",
    )
    .unwrap()
});

/// Events skipped by lagging subscribers.
pub static EVENTS_LAGGED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "screenflow_events_lagged_total",
        "Progress events skipped by slow subscribers",
    )
    .unwrap()
});

// =============================================================================
// External Collaborator Metrics
// =============================================================================

/// External service request duration.
pub static EXTERNAL_SERVICE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "screenflow_external_service_duration_seconds",
            "Duration of external service calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["service", "operation"],
    )
    .unwrap()
});

/// External service requests total.
pub static EXTERNAL_SERVICE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "screenflow_external_service_requests_total",
            "Total external service requests",
        ),
        &["service", "operation", "result"], // result: "success", "error"
    )
    .unwrap()
});

/// Parser tokens used.
pub static PARSER_TOKENS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("screenflow_parser_tokens_total", "Total parser tokens used"),
        &["direction"], // "input", "output"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Dispatcher
        Box::new(TASKS_TOTAL.clone()),
        Box::new(TASKS_ACTIVE.clone()),
        Box::new(TASK_DURATION.clone()),
        Box::new(STAGE_DURATION.clone()),
        Box::new(STAGE_FAILURES.clone()),
        Box::new(REDELIVERIES.clone()),
        Box::new(RETRIES_TOTAL.clone()),
        // Events
        Box::new(EVENTS_PUBLISHED.clone()),
        Box::new(EVENTS_UNDELIVERED.clone()),
        Box::new(EVENTS_LAGGED.clone()),
        // External services
        Box::new(EXTERNAL_SERVICE_DURATION.clone()),
        Box::new(EXTERNAL_SERVICE_REQUESTS.clone()),
        Box::new(PARSER_TOKENS.clone()),
    ]
}

/// Record an external call's duration and result.
pub fn observe_external_call(service: &str, operation: &str, seconds: f64, success: bool) {
    EXTERNAL_SERVICE_DURATION
        .with_label_values(&[service, operation])
        .observe(seconds);
    EXTERNAL_SERVICE_REQUESTS
        .with_label_values(&[service, operation, if success { "success" } else { "error" }])
        .inc();
}
