//! Mock matcher and profile analyzer for testing.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::collaborators::{
    CollaboratorError, MatchOutcome, Matcher, ProfileAnalyzer, ProfileInsight,
};

/// Mock implementation of the Matcher trait.
///
/// Scores every record with a fixed score (75 unless configured).
#[derive(Debug, Clone)]
pub struct MockMatcher {
    score: Arc<RwLock<u8>>,
    requirements: Arc<RwLock<Vec<String>>>,
    next_error: Arc<RwLock<Option<CollaboratorError>>>,
}

impl Default for MockMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMatcher {
    pub fn new() -> Self {
        Self {
            score: Arc::new(RwLock::new(75)),
            requirements: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn set_score(&self, score: u8) {
        *self.score.write().await = score;
    }

    /// Configure the next call to fail with the given error.
    pub async fn set_next_error(&self, error: CollaboratorError) {
        *self.next_error.write().await = Some(error);
    }

    /// Requirements scored so far, in call order.
    pub async fn recorded_requirements(&self) -> Vec<String> {
        self.requirements.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requirements.read().await.len()
    }
}

#[async_trait]
impl Matcher for MockMatcher {
    async fn score(
        &self,
        _record: &Value,
        requirement: &str,
    ) -> Result<MatchOutcome, CollaboratorError> {
        self.requirements
            .write()
            .await
            .push(requirement.to_string());

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        Ok(MatchOutcome {
            score: *self.score.read().await,
            rationale: Some("mock match".to_string()),
        })
    }
}

/// Mock implementation of the ProfileAnalyzer trait.
#[derive(Debug, Clone, Default)]
pub struct MockProfileAnalyzer {
    handles: Arc<RwLock<Vec<String>>>,
    next_error: Arc<RwLock<Option<CollaboratorError>>>,
}

impl MockProfileAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the next call to fail with the given error.
    pub async fn set_next_error(&self, error: CollaboratorError) {
        *self.next_error.write().await = Some(error);
    }

    /// Handles analyzed so far, in call order.
    pub async fn recorded_handles(&self) -> Vec<String> {
        self.handles.read().await.clone()
    }
}

#[async_trait]
impl ProfileAnalyzer for MockProfileAnalyzer {
    async fn analyze(&self, handle: &str) -> Result<ProfileInsight, CollaboratorError> {
        self.handles.write().await.push(handle.to_string());

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        Ok(ProfileInsight {
            handle: handle.to_string(),
            public_repos: Some(12),
            top_languages: vec!["Rust".to_string(), "Python".to_string()],
            summary: Some(format!("{} maintains a handful of active projects", handle)),
        })
    }
}
