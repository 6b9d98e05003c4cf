//! Common test utilities for API and gateway testing with mocks.
//!
//! This module provides a test fixture that builds the full application
//! state in-process with mock collaborators injected, so the pipeline runs
//! end to end without a parsing service.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use screenflow_core::config::{
    AuthConfig, CollaboratorsConfig, DatabaseConfig, GatewayConfig, LoggingConfig, ServerConfig,
    StorageConfig,
};
use screenflow_core::{
    create_authenticator, AuthMethod, BroadcastEventBus, Config, DispatcherConfig,
    DocumentDispatcher, DocumentStore, MemoryWorkQueue, ProgressPublisher, QueueBackend,
    QueueStatusAggregator, SqliteDocumentStore, StatusConfig,
};
use screenflow_server::gateway::ConnectionRegistry;
use screenflow_server::state::AppState;

/// Re-export fixtures for test convenience
pub use screenflow_core::testing::fixtures;
use screenflow_core::testing::fixtures::MockCollaborators;

/// Test fixture with the real router, store and dispatcher over mock collaborators.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_batch_creation() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/batches", json!({ "title": "Backend" })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub state: Arc<AppState>,
    /// Mock storage, parser, matcher and profile analyzer
    pub mocks: MockCollaborators,
    pub bus: Arc<BroadcastEventBus>,
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture: no auth, dispatcher running.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let auth = if test_config.api_keys.is_empty() {
            AuthConfig {
                method: AuthMethod::None,
                api_keys: HashMap::new(),
            }
        } else {
            AuthConfig {
                method: AuthMethod::ApiKey,
                api_keys: test_config.api_keys.clone(),
            }
        };

        let config = Config {
            auth,
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
            },
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            storage: StorageConfig {
                root: temp_dir.path().join("uploads"),
            },
            collaborators: CollaboratorsConfig::default(),
            dispatcher: DispatcherConfig {
                enabled: test_config.start_dispatcher,
                workers: 2,
                poll_interval_ms: 20,
                queue: QueueBackend::Memory,
                ..Default::default()
            },
            status: StatusConfig::default(),
            gateway: GatewayConfig {
                heartbeat_interval_secs: test_config.heartbeat_interval_secs,
                channel_capacity: 64,
            },
            logging: LoggingConfig::default(),
        };

        let authenticator =
            Arc::from(create_authenticator(&config.auth).expect("Failed to create authenticator"));
        let store: Arc<dyn DocumentStore> = Arc::new(
            SqliteDocumentStore::new(&db_path).expect("Failed to create document store"),
        );

        let mocks = MockCollaborators::new();
        let bus = Arc::new(BroadcastEventBus::new(256));
        let aggregator = Arc::new(QueueStatusAggregator::new(
            Arc::clone(&store),
            config.status.clone(),
        ));
        let dispatcher = Arc::new(DocumentDispatcher::new(
            config.dispatcher.clone(),
            Arc::clone(&store),
            Arc::new(MemoryWorkQueue::new(config.dispatcher.lease())),
            mocks.collaborators(),
            ProgressPublisher::new(bus.clone()),
            Arc::clone(&aggregator),
        ));
        if config.dispatcher.enabled {
            dispatcher.start().await.expect("Failed to start dispatcher");
        }

        let registry = Arc::new(ConnectionRegistry::new(
            bus.clone(),
            test_config.connection_buffer,
        ));

        let state = Arc::new(AppState::new(
            config,
            authenticator,
            store,
            Arc::new(mocks.storage.clone()),
            dispatcher,
            aggregator,
            registry,
        ));

        // Create router
        let router = screenflow_server::api::create_router(Arc::clone(&state));

        Self {
            router,
            state,
            mocks,
            bus,
            temp_dir,
        }
    }

    /// Serve the router on an ephemeral local port (for WebSocket tests).
    pub async fn serve(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().unwrap();
        let app = self
            .router
            .clone()
            .into_make_service_with_connect_info::<SocketAddr>();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        addr
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), None).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None, None).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None, None).await
    }

    /// Send a GET request with a bearer token.
    pub async fn get_as(&self, token: &str, path: &str) -> TestResponse {
        self.request("GET", path, None, Some(token)).await
    }

    /// Send a DELETE request with a bearer token.
    pub async fn delete_as(&self, token: &str, path: &str) -> TestResponse {
        self.request("DELETE", path, None, Some(token)).await
    }

    /// Send a POST request with JSON body and a bearer token.
    pub async fn post_as(&self, token: &str, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), Some(token)).await
    }

    /// Send a request to the test server.
    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        if let Some(token) = token {
            request_builder = request_builder.header("Authorization", format!("Bearer {}", token));
        }

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }

    /// Create a batch and return its id.
    pub async fn create_batch(&self, title: &str, requirement: Option<&str>) -> String {
        let response = self
            .post(
                "/api/v1/batches",
                serde_json::json!({ "title": title, "requirement": requirement }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["id"].as_str().unwrap().to_string()
    }

    /// Put `bytes` in mock storage and register it as a document of `batch_id`.
    pub async fn upload(&self, batch_id: &str, filename: &str, bytes: Vec<u8>) -> String {
        let storage_key = format!("{}/{}", batch_id, filename);
        self.mocks.storage.put(&storage_key, bytes).await;

        let response = self
            .post(
                &format!("/api/v1/batches/{}/documents", batch_id),
                serde_json::json!({
                    "storage_key": storage_key,
                    "filename": filename,
                    "mime_type": "text/plain",
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["id"].as_str().unwrap().to_string()
    }

    /// Poll a document until it reaches `status`.
    pub async fn wait_for_document(&self, document_id: &str, status: &str) -> Value {
        let path = format!("/api/v1/documents/{}", document_id);
        for _ in 0..200 {
            let response = self.get(&path).await;
            if response.body["status"] == status {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("document {} never reached {}", document_id, status);
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Owner → API key; empty means no authentication
    pub api_keys: HashMap<String, String>,
    /// Start the worker pool
    pub start_dispatcher: bool,
    pub heartbeat_interval_secs: u64,
    /// Frames buffered per WebSocket connection
    pub connection_buffer: usize,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            api_keys: HashMap::new(),
            start_dispatcher: true,
            heartbeat_interval_secs: 30,
            connection_buffer: 64,
        }
    }
}

impl TestConfig {
    /// API key auth with keys `alice-key` and `bob-key`.
    pub fn with_api_keys() -> Self {
        Self {
            api_keys: HashMap::from([
                ("alice".to_string(), "alice-key".to_string()),
                ("bob".to_string(), "bob-key".to_string()),
            ]),
            ..Default::default()
        }
    }

    /// Dispatcher not started; submitted documents stay queued.
    pub fn without_dispatcher() -> Self {
        Self {
            start_dispatcher: false,
            ..Default::default()
        }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
