//! Mock document parser for testing.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::collaborators::{CollaboratorError, DocumentParser, ParsedDocument, TokenUsage};

/// A recorded parse call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedParse {
    pub mime_type: String,
    pub len: usize,
}

/// Mock implementation of the DocumentParser trait.
///
/// Plain-text documents are parsed as `key: value` lines. The first line
/// without a colon becomes the candidate name. Recognized keys are `email`,
/// `github` and `skills` (comma separated).
///
/// Markers let a test target individual documents in a batch:
/// - `fail_when_contains` answers with an API error
/// - `panic_when_contains` panics inside the worker task
#[derive(Debug, Clone, Default)]
pub struct MockParser {
    calls: Arc<RwLock<Vec<RecordedParse>>>,
    next_error: Arc<RwLock<Option<CollaboratorError>>>,
    fail_marker: Arc<RwLock<Option<String>>>,
    panic_marker: Arc<RwLock<Option<String>>>,
    fixed_record: Arc<RwLock<Option<Value>>>,
    delay: Arc<RwLock<Option<Duration>>>,
}

impl MockParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded parse calls.
    pub async fn recorded_calls(&self) -> Vec<RecordedParse> {
        self.calls.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Configure the next call to fail with the given error.
    pub async fn set_next_error(&self, error: CollaboratorError) {
        *self.next_error.write().await = Some(error);
    }

    /// Fail every document whose text contains `marker`.
    pub async fn fail_when_contains(&self, marker: &str) {
        *self.fail_marker.write().await = Some(marker.to_string());
    }

    /// Panic on every document whose text contains `marker`.
    pub async fn panic_when_contains(&self, marker: &str) {
        *self.panic_marker.write().await = Some(marker.to_string());
    }

    /// Return this record for every document instead of parsing the text.
    pub async fn set_record(&self, record: Value) {
        *self.fixed_record.write().await = Some(record);
    }

    /// Sleep before answering.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }
}

/// Parse `key: value` lines into a candidate record.
fn parse_text(text: &str) -> Value {
    let mut name = None;
    let mut email = None;
    let mut github = None;
    let mut skills: Vec<String> = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match line.split_once(':') {
            Some((key, value)) if !value.starts_with("//") => {
                let value = value.trim().to_string();
                match key.trim().to_ascii_lowercase().as_str() {
                    "email" => email = Some(value),
                    "github" => github = Some(value),
                    "skills" => {
                        skills = value
                            .split(',')
                            .map(|s| s.trim().to_string())
                            .filter(|s| !s.is_empty())
                            .collect()
                    }
                    _ => {}
                }
            }
            _ if name.is_none() => name = Some(line.to_string()),
            _ => {}
        }
    }

    json!({
        "personal_info": {
            "name": name,
            "email": email,
            "github": github,
        },
        "skills": skills,
        "cv_quality_score": 80,
    })
}

#[async_trait]
impl DocumentParser for MockParser {
    async fn parse(
        &self,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<ParsedDocument, CollaboratorError> {
        self.calls.write().await.push(RecordedParse {
            mime_type: mime_type.to_string(),
            len: bytes.len(),
        });

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        let text = String::from_utf8_lossy(bytes);
        if let Some(marker) = self.panic_marker.read().await.as_deref() {
            if text.contains(marker) {
                panic!("mock parser panicked on marker {}", marker);
            }
        }
        if let Some(marker) = self.fail_marker.read().await.as_deref() {
            if text.contains(marker) {
                return Err(CollaboratorError::Api {
                    status: 502,
                    message: format!("parser rejected document containing {}", marker),
                });
            }
        }

        let record = match self.fixed_record.read().await.clone() {
            Some(record) => record,
            None => parse_text(&text),
        };

        Ok(ParsedDocument {
            record,
            usage: TokenUsage {
                input_tokens: (bytes.len() / 4) as u32,
                output_tokens: 200,
                cost_usd: 0.001,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parses_key_value_text() {
        let parser = MockParser::new();
        let text = "Ada Lovelace\nemail: ada@example.com\ngithub: https://github.com/ada\nskills: math, engines";
        let parsed = parser.parse(text.as_bytes(), "text/plain").await.unwrap();

        assert_eq!(parsed.record["personal_info"]["name"], "Ada Lovelace");
        assert_eq!(parsed.record["personal_info"]["email"], "ada@example.com");
        assert_eq!(parsed.record["personal_info"]["github"], "https://github.com/ada");
        assert_eq!(parsed.record["skills"], json!(["math", "engines"]));
        assert_eq!(parser.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_fail_marker() {
        let parser = MockParser::new();
        parser.fail_when_contains("BROKEN").await;

        let err = parser.parse(b"Someone BROKEN", "text/plain").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Api { status: 502, .. }));
        assert!(parser.parse(b"Someone fine", "text/plain").await.is_ok());
    }

    #[tokio::test]
    async fn test_next_error_is_one_shot() {
        let parser = MockParser::new();
        parser
            .set_next_error(CollaboratorError::Malformed("bad json".to_string()))
            .await;

        assert!(parser.parse(b"A", "text/plain").await.is_err());
        assert!(parser.parse(b"A", "text/plain").await.is_ok());
    }
}
