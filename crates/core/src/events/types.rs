//! Progress event envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event discriminator, serialized as the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    DocumentProgress,
    BatchProgress,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::DocumentProgress => "document_progress",
            EventKind::BatchProgress => "batch_progress",
        }
    }
}

/// Advisory progress notification for one document or one batch.
///
/// Serialized as a flat JSON record; `extra` fields sit beside the fixed ones.
/// Events are never persisted and consuming one never changes stored state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub owner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    pub batch_id: String,
    /// 0-100.
    pub progress: u8,
    pub status: String,
    pub stage: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProgressEvent {
    pub fn document(
        owner_id: impl Into<String>,
        batch_id: impl Into<String>,
        document_id: impl Into<String>,
        progress: u8,
        status: impl Into<String>,
        stage: impl Into<String>,
    ) -> Self {
        Self {
            kind: EventKind::DocumentProgress,
            owner_id: owner_id.into(),
            document_id: Some(document_id.into()),
            batch_id: batch_id.into(),
            progress: progress.min(100),
            status: status.into(),
            stage: stage.into(),
            extra: Map::new(),
        }
    }

    pub fn batch(
        owner_id: impl Into<String>,
        batch_id: impl Into<String>,
        progress: u8,
        status: impl Into<String>,
    ) -> Self {
        Self {
            kind: EventKind::BatchProgress,
            owner_id: owner_id.into(),
            document_id: None,
            batch_id: batch_id.into(),
            progress: progress.min(100),
            status: status.into(),
            stage: "batch".to_string(),
            extra: Map::new(),
        }
    }

    /// Attach an extra field. Fixed field names are not overridable.
    pub fn with_extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        if !matches!(
            key,
            "type" | "owner_id" | "document_id" | "batch_id" | "progress" | "status" | "stage"
        ) {
            self.extra.insert(key.to_string(), value.into());
        }
        self
    }

    /// Attach every field of a JSON object as extras.
    pub fn with_fields(mut self, fields: Value) -> Self {
        if let Value::Object(map) = fields {
            for (key, value) in map {
                self = self.with_extra(&key, value);
            }
        }
        self
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
