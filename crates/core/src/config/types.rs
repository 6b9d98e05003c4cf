use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;

use crate::dispatcher::DispatcherConfig;
use crate::status::StatusConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub collaborators: CollaboratorsConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// Owner id → API key. Required when `method = "api_key"`.
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    ApiKey,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::ApiKey => "api_key",
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("screenflow.db")
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding uploaded documents.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("uploads")
}

/// Parsing/matching service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollaboratorsConfig {
    /// Base URL of the parsing service (e.g., "http://localhost:9000")
    #[serde(default = "default_collaborators_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Request timeout in seconds (default: 60)
    #[serde(default = "default_collaborators_timeout")]
    pub timeout_secs: u64,
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self {
            base_url: default_collaborators_url(),
            api_key: None,
            timeout_secs: default_collaborators_timeout(),
        }
    }
}

fn default_collaborators_url() -> String {
    "http://localhost:9000".to_string()
}

fn default_collaborators_timeout() -> u64 {
    60
}

/// WebSocket gateway configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Idle time after which the server sends a heartbeat frame.
    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval_secs: u64,
    /// Per-owner event buffer before slow subscribers start skipping.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_heartbeat() -> u64 {
    30
}

fn default_channel_capacity() -> usize {
    256
}

/// Log output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Filter used when RUST_LOG is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info,tower_http=debug".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub collaborators: SanitizedCollaboratorsConfig,
    pub dispatcher: DispatcherConfig,
    pub status: StatusConfig,
    pub gateway: GatewayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
    /// Owners with a key configured; the keys themselves are hidden.
    pub api_key_owners: Vec<String>,
}

/// Sanitized collaborators config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedCollaboratorsConfig {
    pub base_url: String,
    pub api_key_configured: bool,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let mut api_key_owners: Vec<String> = config.auth.api_keys.keys().cloned().collect();
        api_key_owners.sort();

        Self {
            auth: SanitizedAuthConfig {
                method: config.auth.method.as_str().to_string(),
                api_key_owners,
            },
            server: config.server.clone(),
            database: config.database.clone(),
            storage: config.storage.clone(),
            collaborators: SanitizedCollaboratorsConfig {
                base_url: config.collaborators.base_url.clone(),
                api_key_configured: config
                    .collaborators
                    .api_key
                    .as_ref()
                    .is_some_and(|k| !k.is_empty()),
                timeout_secs: config.collaborators.timeout_secs,
            },
            dispatcher: config.dispatcher.clone(),
            status: config.status.clone(),
            gateway: config.gateway.clone(),
            logging: config.logging.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_valid_config_with_none_auth() {
        let toml = r#"
[auth]
method = "none"

[server]
host = "127.0.0.1"
port = 9000
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.auth.method, AuthMethod::None);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
    }

    #[test]
    fn test_deserialize_defaults() {
        let toml = r#"
[auth]
method = "none"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "screenflow.db");
        assert_eq!(config.storage.root.to_str().unwrap(), "uploads");
        assert_eq!(config.collaborators.timeout_secs, 60);
        assert_eq!(config.dispatcher.workers, 4);
        assert_eq!(config.gateway.heartbeat_interval_secs, 30);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_deserialize_missing_auth_fails() {
        let toml = r#"
[server]
port = 8080
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_api_keys() {
        let toml = r#"
[auth]
method = "api_key"

[auth.api_keys]
alice = "key-a"
bob = "key-b"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.auth.method, AuthMethod::ApiKey);
        assert_eq!(config.auth.api_keys.get("alice").unwrap(), "key-a");
    }

    #[test]
    fn test_deserialize_sections() {
        let toml = r#"
[auth]
method = "none"

[collaborators]
base_url = "http://parser:9000"
api_key = "secret"
timeout_secs = 10

[dispatcher]
workers = 2
queue = "memory"

[status]
default_seconds_per_document = 45.0

[gateway]
heartbeat_interval_secs = 5

[logging]
level = "debug"
format = "json"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.collaborators.base_url, "http://parser:9000");
        assert_eq!(config.dispatcher.workers, 2);
        assert_eq!(config.status.default_seconds_per_document, 45.0);
        assert_eq!(config.gateway.heartbeat_interval_secs, 5);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_sanitized_config_hides_secrets() {
        let toml = r#"
[auth]
method = "api_key"

[auth.api_keys]
bob = "key-b"
alice = "key-a"

[collaborators]
api_key = "secret"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let sanitized = SanitizedConfig::from(&config);

        assert_eq!(sanitized.auth.method, "api_key");
        assert_eq!(sanitized.auth.api_key_owners, vec!["alice", "bob"]);
        assert!(sanitized.collaborators.api_key_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains("key-a"));
    }
}
