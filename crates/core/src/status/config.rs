//! Queue status aggregator configuration.

use serde::{Deserialize, Serialize};

/// Tuning for batch time estimates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Seconds per document assumed until enough real samples exist.
    #[serde(default = "default_seconds_per_document")]
    pub default_seconds_per_document: f64,

    /// Completed documents needed before the observed average replaces the default.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// How many queued documents to list in the preview.
    #[serde(default = "default_preview_limit")]
    pub preview_limit: usize,
}

fn default_seconds_per_document() -> f64 {
    30.0
}

fn default_min_samples() -> usize {
    2
}

fn default_preview_limit() -> usize {
    10
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            default_seconds_per_document: default_seconds_per_document(),
            min_samples: default_min_samples(),
            preview_limit: default_preview_limit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StatusConfig::default();
        assert_eq!(config.default_seconds_per_document, 30.0);
        assert_eq!(config.min_samples, 2);
        assert_eq!(config.preview_limit, 10);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: StatusConfig = toml::from_str("preview_limit = 3").unwrap();
        assert_eq!(config.preview_limit, 3);
        assert_eq!(config.default_seconds_per_document, 30.0);
    }
}
