use std::sync::Arc;
use std::time::Duration;

use screenflow_core::{
    Authenticator, Config, DocumentDispatcher, DocumentStore, ObjectStorage,
    QueueStatusAggregator, SanitizedConfig,
};

use crate::gateway::ConnectionRegistry;

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    store: Arc<dyn DocumentStore>,
    storage: Arc<dyn ObjectStorage>,
    dispatcher: Arc<DocumentDispatcher>,
    aggregator: Arc<QueueStatusAggregator>,
    registry: Arc<ConnectionRegistry>,
}

impl AppState {
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        store: Arc<dyn DocumentStore>,
        storage: Arc<dyn ObjectStorage>,
        dispatcher: Arc<DocumentDispatcher>,
        aggregator: Arc<QueueStatusAggregator>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            config,
            authenticator,
            store,
            storage,
            dispatcher,
            aggregator,
            registry,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
        &self.storage
    }

    pub fn dispatcher(&self) -> &Arc<DocumentDispatcher> {
        &self.dispatcher
    }

    pub fn aggregator(&self) -> &QueueStatusAggregator {
        &self.aggregator
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Idle time before a socket gets a heartbeat frame.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.config.gateway.heartbeat_interval_secs)
    }
}
