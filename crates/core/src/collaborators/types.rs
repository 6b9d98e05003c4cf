//! Types shared by the external collaborator traits.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Error type for collaborator calls.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    /// Object or remote resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Local I/O failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Remote service answered with an error status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Remote service answered with something we cannot use.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The document bytes cannot be interpreted.
    #[error("unreadable document: {0}")]
    Unreadable(String),

    #[error("timeout after {0:?}")]
    Timeout(Duration),
}

impl From<std::io::Error> for CollaboratorError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            CollaboratorError::NotFound(e.to_string())
        } else {
            CollaboratorError::Io(e.to_string())
        }
    }
}

/// Token and cost accounting reported by the parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub cost_usd: f64,
}

/// Structured output of the parsing service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedDocument {
    /// Structured candidate record (personal info, experience, skills, ...).
    pub record: serde_json::Value,
    #[serde(default)]
    pub usage: TokenUsage,
}

/// Result of scoring a record against a requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    /// 0-100.
    pub score: u8,
    #[serde(default)]
    pub rationale: Option<String>,
}

/// Summary of a candidate's public code-hosting profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileInsight {
    pub handle: String,
    #[serde(default)]
    pub public_repos: Option<u32>,
    #[serde(default)]
    pub top_languages: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
}
