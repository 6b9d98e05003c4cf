//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the screenflow server:
//! - HTTP request metrics (latency, counts, errors)
//! - WebSocket connection metrics
//! - Dispatcher status (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    Opts, Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "screenflow_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("screenflow_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "screenflow_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Authentication failures.
pub static AUTH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "screenflow_auth_failures_total",
            "Total authentication failures",
        ),
        &["reason"],
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "screenflow_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .unwrap()
});

/// Total WebSocket connections (cumulative).
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "screenflow_ws_connections_total",
        "Total WebSocket connections since startup",
    )
    .unwrap()
});

/// WebSocket messages sent by type.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("screenflow_ws_messages_sent_total", "WebSocket messages sent"),
        &["type"],
    )
    .unwrap()
});

/// Connections dropped because their outbound buffer was full or their socket was gone.
pub static WS_CONNECTIONS_PRUNED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "screenflow_ws_connections_pruned_total",
        "WebSocket connections pruned on a failed send",
    )
    .unwrap()
});

/// Owners with at least one open connection (collected dynamically).
pub static WS_OWNERS_CONNECTED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "screenflow_ws_owners_connected",
        "Number of owners with an open WebSocket connection",
    )
    .unwrap()
});

// =============================================================================
// Dispatcher Metrics (collected dynamically)
// =============================================================================

/// Dispatcher running state (1 = running, 0 = stopped).
pub static DISPATCHER_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "screenflow_dispatcher_running",
        "Whether the dispatcher is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Work items not yet acked.
pub static QUEUE_PENDING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "screenflow_queue_pending",
        "Work items waiting or in flight",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();
    registry
        .register(Box::new(AUTH_FAILURES_TOTAL.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_PRUNED.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_OWNERS_CONNECTED.clone()))
        .unwrap();

    // Dispatcher
    registry
        .register(Box::new(DISPATCHER_RUNNING.clone()))
        .unwrap();
    registry.register(Box::new(QUEUE_PENDING.clone())).unwrap();

    // Core metrics (tasks, stages, events, external services)
    for metric in screenflow_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the dispatcher and gateway as
/// they are right now.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.dispatcher().status().await;
    DISPATCHER_RUNNING.set(if status.running { 1 } else { 0 });
    QUEUE_PENDING.set(status.pending as i64);

    WS_OWNERS_CONNECTED.set(state.registry().owner_count().await as i64);
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    // Replace UUIDs and numeric ids with placeholders
    let uuid_regex = regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap();
    let numeric_regex = regex_lite::Regex::new(r"/\d+(/|$)").unwrap();

    let result = uuid_regex.replace_all(path, "{id}");
    let result = numeric_regex.replace_all(&result, "/{id}$1");
    // Owner ids in socket paths are free-form.
    match result.split_once("/ws/") {
        Some((prefix, _)) => format!("{}/ws/{{owner}}", prefix),
        None => result.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/documents/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/v1/documents/{id}");
    }

    #[test]
    fn test_normalize_path_uuid_middle() {
        let path = "/api/v1/batches/550e8400-e29b-41d4-a716-446655440000/queue-status";
        assert_eq!(normalize_path(path), "/api/v1/batches/{id}/queue-status");
    }

    #[test]
    fn test_normalize_path_numeric() {
        let path = "/api/v1/documents/12345/retry";
        assert_eq!(normalize_path(path), "/api/v1/documents/{id}/retry");
    }

    #[test]
    fn test_normalize_path_ws_owner() {
        let path = "/api/v1/ws/alice";
        assert_eq!(normalize_path(path), "/api/v1/ws/{owner}");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        let path = "/api/v1/health";
        assert_eq!(normalize_path(path), "/api/v1/health");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("screenflow_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_server_and_core_metrics() {
        // Prometheus only outputs metrics that have been touched.
        HTTP_REQUEST_DURATION
            .with_label_values(&["GET", "/test", "200"])
            .observe(0.1);
        HTTP_REQUESTS_IN_FLIGHT.set(0);
        WS_CONNECTIONS_ACTIVE.set(0);
        WS_CONNECTIONS_TOTAL.inc();
        DISPATCHER_RUNNING.set(0);
        QUEUE_PENDING.set(0);
        screenflow_core::metrics::TASKS_ACTIVE.set(0);

        let output = encode_metrics();

        assert!(output.contains("screenflow_http_request_duration_seconds"));
        assert!(output.contains("screenflow_http_requests_in_flight"));
        assert!(output.contains("screenflow_ws_connections_active"));
        assert!(output.contains("screenflow_ws_connections_total"));
        assert!(output.contains("screenflow_dispatcher_running"));
        assert!(output.contains("screenflow_queue_pending"));
        assert!(output.contains("screenflow_tasks_active"));
    }
}
