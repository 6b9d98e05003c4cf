//! Document and batch data types, including the document lifecycle state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Document Status
// ============================================================================

/// Lifecycle status of a single document.
///
/// ```text
/// Queued -> Processing -> Completed | Failed
/// Completed -> Shortlisted | Rejected
/// Failed -> Queued (explicit retry only)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Waiting for a worker.
    Queued,
    /// Claimed by a worker, stages running.
    Processing,
    /// Pipeline finished successfully.
    Completed,
    /// Pipeline aborted with an error.
    Failed,
    /// Accepted by the reviewer (terminal).
    Shortlisted,
    /// Declined by the reviewer (terminal).
    Rejected,
}

impl DocumentStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [DocumentStatus; 6] = [
        DocumentStatus::Queued,
        DocumentStatus::Processing,
        DocumentStatus::Completed,
        DocumentStatus::Failed,
        DocumentStatus::Shortlisted,
        DocumentStatus::Rejected,
    ];

    /// Returns the status as its wire/storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Queued => "queued",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
            DocumentStatus::Shortlisted => "shortlisted",
            DocumentStatus::Rejected => "rejected",
        }
    }

    /// Returns true if `next` is reachable from this status in one step.
    pub fn can_transition_to(self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        matches!(
            (self, next),
            (Queued, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Shortlisted)
                | (Completed, Rejected)
                | (Failed, Queued)
        )
    }

    /// Returns true for the reviewer-driven end states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Shortlisted | DocumentStatus::Rejected)
    }

    /// Returns true once the pipeline has resolved the document, successfully or not.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, DocumentStatus::Queued | DocumentStatus::Processing)
    }

    /// Returns true if an explicit retry may re-enqueue the document.
    pub fn can_retry(&self) -> bool {
        matches!(self, DocumentStatus::Failed)
    }

    /// Returns true for the outcomes a reviewer may pick.
    pub fn is_review_outcome(&self) -> bool {
        self.is_terminal()
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown document status: {}", s))
    }
}

/// A status change that the lifecycle table does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition for document {document_id}: {from} -> {to}")]
pub struct TransitionError {
    pub document_id: String,
    pub from: DocumentStatus,
    pub to: DocumentStatus,
}

// ============================================================================
// Document
// ============================================================================

/// One uploaded candidate file tracked through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub batch_id: String,
    pub owner_id: String,
    /// Opaque object storage key.
    pub storage_key: String,
    pub filename: String,
    pub mime_type: String,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    /// Match score against the batch requirement (0-100).
    pub match_score: Option<u8>,
    pub match_rationale: Option<String>,
    /// Parser output. Derived candidate fields are read from here.
    pub structured_record: Option<serde_json::Value>,
    /// Processing generation. Bumped by every retry; stale workers compare against it.
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Moves the document to `next`, enforcing the lifecycle table.
    ///
    /// `reason` becomes the error message when failing. Entering `Queued` clears
    /// the previous error and result; resolving stamps `processed_at`.
    pub fn apply(
        &mut self,
        next: DocumentStatus,
        reason: Option<String>,
    ) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                document_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        match next {
            DocumentStatus::Queued => {
                self.error_message = None;
                self.processed_at = None;
                self.match_score = None;
                self.match_rationale = None;
            }
            DocumentStatus::Failed => {
                self.error_message =
                    Some(reason.unwrap_or_else(|| "unknown error".to_string()));
                self.processed_at = Some(now);
            }
            DocumentStatus::Completed => {
                self.error_message = None;
                self.processed_at = Some(now);
            }
            DocumentStatus::Processing
            | DocumentStatus::Shortlisted
            | DocumentStatus::Rejected => {}
        }

        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Seconds between upload and resolution, if resolved.
    pub fn processing_seconds(&self) -> Option<f64> {
        self.processed_at
            .map(|done| (done - self.created_at).num_milliseconds() as f64 / 1000.0)
    }

    /// Candidate name from the structured record.
    pub fn candidate_name(&self) -> Option<&str> {
        self.record_str("/personal_info/name")
    }

    /// Candidate email from the structured record.
    pub fn candidate_email(&self) -> Option<&str> {
        self.record_str("/personal_info/email")
    }

    /// Document quality score reported by the parser.
    pub fn quality_score(&self) -> Option<u8> {
        self.structured_record
            .as_ref()
            .and_then(|r| r.pointer("/cv_quality_score"))
            .and_then(|v| v.as_u64())
            .map(|v| v.min(100) as u8)
    }

    /// External code-hosting profile handle, normalized from whatever the parser extracted.
    pub fn profile_handle(&self) -> Option<String> {
        self.structured_record.as_ref().and_then(record_profile_handle)
    }

    fn record_str(&self, pointer: &str) -> Option<&str> {
        self.structured_record
            .as_ref()
            .and_then(|r| r.pointer(pointer))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

static PROFILE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:https?://)?(?:www\.)?github\.com/([A-Za-z0-9-]{1,39})/?").unwrap()
});

static PROFILE_HANDLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^@?([A-Za-z0-9](?:[A-Za-z0-9-]{0,38}))$").unwrap());

/// Profile handle found in a parser record, if any.
pub fn record_profile_handle(record: &serde_json::Value) -> Option<String> {
    record
        .pointer("/personal_info/github")
        .and_then(|v| v.as_str())
        .and_then(normalize_profile_handle)
}

/// Extracts a bare profile handle from a URL, `@handle` or plain handle.
pub fn normalize_profile_handle(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
        return None;
    }
    PROFILE_URL
        .captures(raw)
        .or_else(|| PROFILE_HANDLE.captures(raw))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

// ============================================================================
// Batch
// ============================================================================

/// Coarse batch state derived from the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Nothing resolved yet.
    Open,
    /// Some documents resolved, others outstanding.
    Processing,
    /// Every document resolved.
    Completed,
}

/// Owner-scoped collection of documents, optionally tied to one requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    /// Linked job requirement text; enables the matching stage.
    pub requirement: Option<String>,
    pub total: u32,
    pub processed: u32,
    pub failed: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    pub fn status(&self) -> BatchStatus {
        let resolved = self.processed + self.failed;
        if self.total > 0 && resolved >= self.total {
            BatchStatus::Completed
        } else if resolved > 0 {
            BatchStatus::Processing
        } else {
            BatchStatus::Open
        }
    }

    pub fn has_requirement(&self) -> bool {
        self.requirement
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(status: DocumentStatus) -> Document {
        let now = Utc::now();
        Document {
            id: "doc-1".to_string(),
            batch_id: "batch-1".to_string(),
            owner_id: "user-1".to_string(),
            storage_key: "uploads/doc-1.pdf".to_string(),
            filename: "doc-1.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            status,
            error_message: None,
            match_score: None,
            match_rationale: None,
            structured_record: None,
            attempt: 0,
            created_at: now,
            processed_at: None,
            updated_at: now,
        }
    }

    #[test]
    fn test_transition_table_is_exact() {
        use DocumentStatus::*;
        let allowed = [
            (Queued, Processing),
            (Processing, Completed),
            (Processing, Failed),
            (Completed, Shortlisted),
            (Completed, Rejected),
            (Failed, Queued),
        ];

        for from in DocumentStatus::ALL {
            for to in DocumentStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_cannot_reenter_pipeline() {
        for terminal in [DocumentStatus::Shortlisted, DocumentStatus::Rejected] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_retry());
            for next in DocumentStatus::ALL {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_apply_failed_records_reason_and_timestamp() {
        let mut doc = document(DocumentStatus::Processing);
        doc.apply(DocumentStatus::Failed, Some("corrupt pdf".to_string()))
            .unwrap();

        assert_eq!(doc.status, DocumentStatus::Failed);
        assert_eq!(doc.error_message.as_deref(), Some("corrupt pdf"));
        assert!(doc.processed_at.is_some());
    }

    #[test]
    fn test_apply_requeue_clears_previous_result() {
        let mut doc = document(DocumentStatus::Processing);
        doc.apply(DocumentStatus::Failed, None).unwrap();
        assert_eq!(doc.error_message.as_deref(), Some("unknown error"));

        doc.apply(DocumentStatus::Queued, None).unwrap();
        assert_eq!(doc.status, DocumentStatus::Queued);
        assert!(doc.error_message.is_none());
        assert!(doc.processed_at.is_none());
    }

    #[test]
    fn test_apply_rejects_invalid_transition_without_mutating() {
        let mut doc = document(DocumentStatus::Queued);
        let err = doc.apply(DocumentStatus::Completed, None).unwrap_err();

        assert_eq!(err.from, DocumentStatus::Queued);
        assert_eq!(err.to, DocumentStatus::Completed);
        assert_eq!(doc.status, DocumentStatus::Queued);
        assert_eq!(
            err.to_string(),
            "invalid transition for document doc-1: queued -> completed"
        );
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in DocumentStatus::ALL {
            assert_eq!(status.as_str().parse::<DocumentStatus>().unwrap(), status);
        }
        assert!("archived".parse::<DocumentStatus>().is_err());
    }

    #[test]
    fn test_record_accessors() {
        let mut doc = document(DocumentStatus::Completed);
        assert!(doc.candidate_name().is_none());

        doc.structured_record = Some(json!({
            "personal_info": {
                "name": "Ada Lovelace",
                "email": "ada@example.com",
                "github": "https://github.com/ada-l/"
            },
            "cv_quality_score": 87
        }));

        assert_eq!(doc.candidate_name(), Some("Ada Lovelace"));
        assert_eq!(doc.candidate_email(), Some("ada@example.com"));
        assert_eq!(doc.profile_handle().as_deref(), Some("ada-l"));
        assert_eq!(doc.quality_score(), Some(87));
    }

    #[test]
    fn test_normalize_profile_handle() {
        assert_eq!(normalize_profile_handle("octocat").as_deref(), Some("octocat"));
        assert_eq!(normalize_profile_handle("@octocat").as_deref(), Some("octocat"));
        assert_eq!(
            normalize_profile_handle("github.com/octocat/repo").as_deref(),
            Some("octocat")
        );
        assert_eq!(normalize_profile_handle(""), None);
        assert_eq!(normalize_profile_handle("null"), None);
        assert_eq!(normalize_profile_handle("not a handle"), None);
    }

    #[test]
    fn test_batch_status_from_counters() {
        let now = Utc::now();
        let mut batch = Batch {
            id: "b".to_string(),
            owner_id: "u".to_string(),
            title: "Backend engineers".to_string(),
            requirement: Some("  ".to_string()),
            total: 0,
            processed: 0,
            failed: 0,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(batch.status(), BatchStatus::Open);
        assert!(!batch.has_requirement());

        batch.total = 3;
        batch.failed = 1;
        assert_eq!(batch.status(), BatchStatus::Processing);

        batch.processed = 2;
        assert_eq!(batch.status(), BatchStatus::Completed);
    }
}
