//! Types for the document dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collaborators::CollaboratorError;
use crate::document::{StoreError, TransitionError};
use crate::queue::QueueError;

// ============================================================================
// Stages
// ============================================================================

/// Ordered steps of one document task, each with a fixed progress checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Downloading,
    Extracting,
    AnalyzingStructure,
    ParsingWithAi,
    /// Only when the batch links a requirement.
    MatchingJd,
    /// Only when the record names a profile handle.
    AnalyzingGithub,
    Finalizing,
    Completed,
}

impl Stage {
    /// Every stage in execution order.
    pub const ORDER: [Stage; 8] = [
        Stage::Downloading,
        Stage::Extracting,
        Stage::AnalyzingStructure,
        Stage::ParsingWithAi,
        Stage::MatchingJd,
        Stage::AnalyzingGithub,
        Stage::Finalizing,
        Stage::Completed,
    ];

    pub fn percent(&self) -> u8 {
        match self {
            Stage::Downloading => 10,
            Stage::Extracting => 20,
            Stage::AnalyzingStructure => 30,
            Stage::ParsingWithAi => 50,
            Stage::MatchingJd => 70,
            Stage::AnalyzingGithub => 80,
            Stage::Finalizing => 90,
            Stage::Completed => 100,
        }
    }

    /// Machine-readable tag used in events and metric labels.
    pub fn tag(&self) -> &'static str {
        match self {
            Stage::Downloading => "downloading",
            Stage::Extracting => "extracting",
            Stage::AnalyzingStructure => "analyzing_structure",
            Stage::ParsingWithAi => "parsing_with_ai",
            Stage::MatchingJd => "matching_jd",
            Stage::AnalyzingGithub => "analyzing_github",
            Stage::Finalizing => "finalizing",
            Stage::Completed => "completed",
        }
    }

    /// Human status line shown to the user.
    pub fn description(&self) -> &'static str {
        match self {
            Stage::Downloading => "Downloading document...",
            Stage::Extracting => "Extracting text...",
            Stage::AnalyzingStructure => "Analyzing document structure...",
            Stage::ParsingWithAi => "Parsing with AI...",
            Stage::MatchingJd => "Matching against job description...",
            Stage::AnalyzingGithub => "Analyzing GitHub profile...",
            Stage::Finalizing => "Finalizing...",
            Stage::Completed => "Completed successfully",
        }
    }

    /// Maps a collaborator error raised during this stage onto the failure taxonomy.
    pub fn classify(&self, error: CollaboratorError) -> DispatchError {
        match (self, error) {
            (_, CollaboratorError::Unreadable(msg)) => DispatchError::Extraction(msg),
            (Stage::Downloading | Stage::Finalizing, e) => {
                DispatchError::Infrastructure(e.to_string())
            }
            (Stage::Extracting | Stage::AnalyzingStructure, e) => {
                DispatchError::Extraction(e.to_string())
            }
            (_, e) => DispatchError::Upstream(e.to_string()),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur while dispatching or running a document task.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Document bytes are empty, corrupt or in an unsupported format.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Parser, matcher or profile service failed, timed out or returned garbage.
    #[error("upstream service failed: {0}")]
    Upstream(String),

    /// Object storage, store or queue I/O failed.
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),

    /// A newer attempt superseded this task.
    #[error("stale attempt for document {document_id}: task {task_attempt}, current {current}")]
    StaleAttempt {
        document_id: String,
        task_attempt: u32,
        current: u32,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
}

impl DispatchError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Extraction(_) => "extraction",
            DispatchError::Upstream(_) => "upstream",
            DispatchError::Infrastructure(_) => "infrastructure",
            DispatchError::StaleAttempt { .. } => "stale",
            DispatchError::NotFound { .. } => "not_found",
            DispatchError::InvalidTransition(_) => "invalid_transition",
        }
    }

    /// True for failures of the pipeline itself, which end the document as failed.
    pub fn is_stage_failure(&self) -> bool {
        matches!(
            self,
            DispatchError::Extraction(_)
                | DispatchError::Upstream(_)
                | DispatchError::Infrastructure(_)
        )
    }
}

impl From<StoreError> for DispatchError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { kind, id } => DispatchError::NotFound { kind, id },
            StoreError::InvalidTransition(t) => DispatchError::InvalidTransition(t),
            StoreError::StaleAttempt {
                document_id,
                expected,
                current,
            } => DispatchError::StaleAttempt {
                document_id,
                task_attempt: expected,
                current,
            },
            other => DispatchError::Infrastructure(other.to_string()),
        }
    }
}

impl From<QueueError> for DispatchError {
    fn from(e: QueueError) -> Self {
        DispatchError::Infrastructure(e.to_string())
    }
}

// ============================================================================
// Handles and status
// ============================================================================

/// Returned by submission: identifies the enqueued work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    pub task_id: String,
    pub document_id: String,
    pub attempt: u32,
    /// False when an identical item was already waiting.
    pub enqueued: bool,
}

/// A task currently held by a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveTask {
    pub document_id: String,
    pub batch_id: String,
    pub attempt: u32,
    pub stage: Stage,
    pub progress: u8,
    pub started_at: DateTime<Utc>,
}

/// Current status of the dispatcher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatcherStatus {
    pub running: bool,
    pub workers: usize,
    /// Items not yet acked, including those being worked on.
    pub pending: usize,
    pub active_tasks: Vec<ActiveTask>,
    /// Tasks completed since start.
    pub completed: u64,
    /// Tasks failed since start.
    pub failed: u64,
}
