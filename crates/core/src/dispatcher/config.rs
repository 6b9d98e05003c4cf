//! Dispatcher configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which [`WorkQueue`](crate::queue::WorkQueue) implementation backs the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackend {
    /// In-process queue; rebuilt from document status on start.
    Memory,
    /// Table in the SQLite database.
    #[default]
    Sqlite,
}

/// Configuration for the document dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Enable/disable the worker pool.
    /// When disabled, documents stay queued until it is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Number of concurrent workers. Bounds load on the parsing service.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How often an idle worker polls the queue (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// How long a claimed item stays invisible before it is redelivered (seconds).
    /// Running tasks renew their lease every third of this period, so expiry
    /// only hands out items whose worker is gone.
    #[serde(default = "default_lease")]
    pub lease_seconds: u64,

    /// Upper bound on each collaborator call (seconds).
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_seconds: u64,

    /// How long `stop` waits for in-flight tasks before abandoning them (milliseconds).
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,

    /// Pause before releasing a delivery whose outcome could not be stored (milliseconds).
    #[serde(default = "default_failure_backoff")]
    pub failure_backoff_ms: u64,

    #[serde(default)]
    pub queue: QueueBackend,
}

fn default_enabled() -> bool {
    true
}

fn default_workers() -> usize {
    4
}

fn default_poll_interval() -> u64 {
    500
}

fn default_lease() -> u64 {
    900 // 15 minutes
}

fn default_stage_timeout() -> u64 {
    120
}

fn default_shutdown_grace() -> u64 {
    5000
}

fn default_failure_backoff() -> u64 {
    2000
}

impl DispatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_seconds)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_ms)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            workers: default_workers(),
            poll_interval_ms: default_poll_interval(),
            lease_seconds: default_lease(),
            stage_timeout_seconds: default_stage_timeout(),
            shutdown_grace_ms: default_shutdown_grace(),
            failure_backoff_ms: default_failure_backoff(),
            queue: QueueBackend::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DispatcherConfig::default();
        assert!(config.enabled);
        assert_eq!(config.workers, 4);
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.stage_timeout(), Duration::from_secs(120));
        assert_eq!(config.queue, QueueBackend::Sqlite);
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            enabled = false
            workers = 8
            poll_interval_ms = 250
            lease_seconds = 60
            stage_timeout_seconds = 30
            shutdown_grace_ms = 1000
            queue = "memory"
        "#;
        let config: DispatcherConfig = toml::from_str(toml).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.workers, 8);
        assert_eq!(config.lease(), Duration::from_secs(60));
        assert_eq!(config.queue, QueueBackend::Memory);
    }
}
