//! Trait definitions for external collaborators used by the pipeline.

use async_trait::async_trait;

use super::types::{CollaboratorError, MatchOutcome, ParsedDocument, ProfileInsight};

/// Blob storage holding uploaded document bytes.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Returns the name of this storage backend.
    fn name(&self) -> &str;

    /// Fetch the full object stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, CollaboratorError>;

    /// Delete objects. Missing keys are not an error.
    async fn delete(&self, keys: &[String]) -> Result<(), CollaboratorError>;
}

/// Text extraction plus AI parsing into a structured record.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(&self, bytes: &[u8], mime_type: &str)
        -> Result<ParsedDocument, CollaboratorError>;
}

/// Scores a structured record against a free-text requirement.
#[async_trait]
pub trait Matcher: Send + Sync {
    async fn score(
        &self,
        record: &serde_json::Value,
        requirement: &str,
    ) -> Result<MatchOutcome, CollaboratorError>;
}

/// Looks up a candidate's public code-hosting profile.
#[async_trait]
pub trait ProfileAnalyzer: Send + Sync {
    async fn analyze(&self, handle: &str) -> Result<ProfileInsight, CollaboratorError>;
}
