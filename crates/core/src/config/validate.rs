use super::{
    types::{AuthMethod, Config},
    ConfigError,
};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - API keys exist for `api_key` auth and are non-empty
/// - Dispatcher has at least one worker and a lease longer than the stage timeout
/// - Gateway heartbeat interval is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

    if config.server.port == 0 {
        return invalid("server.port cannot be 0");
    }

    if config.auth.method == AuthMethod::ApiKey {
        if config.auth.api_keys.is_empty() {
            return invalid("auth.api_keys must be set when using api_key auth method");
        }
        if config.auth.api_keys.values().any(|k| k.trim().is_empty()) {
            return invalid("auth.api_keys cannot contain empty keys");
        }
    }

    if config.dispatcher.workers == 0 {
        return invalid("dispatcher.workers must be at least 1");
    }
    if config.dispatcher.lease_seconds <= config.dispatcher.stage_timeout_seconds {
        return invalid("dispatcher.lease_seconds must exceed dispatcher.stage_timeout_seconds");
    }

    if config.collaborators.base_url.trim().is_empty() {
        return invalid("collaborators.base_url cannot be empty");
    }

    if config.gateway.heartbeat_interval_secs == 0 {
        return invalid("gateway.heartbeat_interval_secs cannot be 0");
    }
    if config.gateway.channel_capacity == 0 {
        return invalid("gateway.channel_capacity cannot be 0");
    }

    if config.status.default_seconds_per_document <= 0.0 {
        return invalid("status.default_seconds_per_document must be positive");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn base_config() -> Config {
        load_config_from_str(
            r#"
[auth]
method = "none"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = base_config();
        config.server.port = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_api_key_requires_keys() {
        let mut config = base_config();
        config.auth.method = AuthMethod::ApiKey;
        assert!(validate_config(&config).is_err());

        config
            .auth
            .api_keys
            .insert("alice".to_string(), "key".to_string());
        assert!(validate_config(&config).is_ok());

        config
            .auth
            .api_keys
            .insert("bob".to_string(), " ".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_dispatcher_bounds() {
        let mut config = base_config();
        config.dispatcher.workers = 0;
        assert!(validate_config(&config).is_err());

        let mut config = base_config();
        config.dispatcher.lease_seconds = 60;
        config.dispatcher.stage_timeout_seconds = 60;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_gateway_heartbeat() {
        let mut config = base_config();
        config.gateway.heartbeat_interval_secs = 0;
        assert!(validate_config(&config).is_err());
    }
}
