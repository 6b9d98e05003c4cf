//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of all collaborator traits,
//! allowing end-to-end pipeline tests without real infrastructure.
//!
//! # Example
//!
//! ```rust,ignore
//! use screenflow_core::testing::{fixtures, MockObjectStorage, MockParser};
//!
//! let storage = MockObjectStorage::new();
//! storage.put("cv/1.txt", fixtures::cv_text("Ada Lovelace", None)).await;
//!
//! let parser = MockParser::new();
//! parser.fail_when_contains("CORRUPT").await;
//! ```

mod mock_matcher;
mod mock_parser;
mod mock_storage;

pub use mock_matcher::{MockMatcher, MockProfileAnalyzer};
pub use mock_parser::{MockParser, RecordedParse};
pub use mock_storage::MockObjectStorage;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::sync::Arc;

    use crate::collaborators::ObjectStorage;
    use crate::dispatcher::Collaborators;
    use crate::document::{CreateBatchRequest, CreateDocumentRequest};

    use super::{MockMatcher, MockObjectStorage, MockParser, MockProfileAnalyzer};

    /// Plain-text CV understood by [`MockParser`](super::MockParser).
    pub fn cv_text(name: &str, github: Option<&str>) -> Vec<u8> {
        let email = name.to_lowercase().replace(' ', ".");
        let mut text = format!("{}\nemail: {}@example.com\nskills: Rust, SQL\n", name, email);
        if let Some(github) = github {
            text.push_str(&format!("github: {}\n", github));
        }
        text.into_bytes()
    }

    /// Minimal bytes carrying a PDF signature.
    pub fn pdf_bytes() -> Vec<u8> {
        b"%PDF-1.7\n%mock\n".to_vec()
    }

    pub fn batch_request(owner_id: &str, requirement: Option<&str>) -> CreateBatchRequest {
        CreateBatchRequest {
            owner_id: owner_id.to_string(),
            title: "Test batch".to_string(),
            requirement: requirement.map(str::to_string),
        }
    }

    pub fn document_request(batch_id: &str, storage_key: &str) -> CreateDocumentRequest {
        let filename = storage_key
            .rsplit('/')
            .next()
            .unwrap_or(storage_key)
            .to_string();
        CreateDocumentRequest {
            batch_id: batch_id.to_string(),
            storage_key: storage_key.to_string(),
            filename,
            mime_type: "text/plain".to_string(),
        }
    }

    /// A full set of mocks plus the [`Collaborators`] bundle built from them.
    #[derive(Clone, Default)]
    pub struct MockCollaborators {
        pub storage: MockObjectStorage,
        pub parser: MockParser,
        pub matcher: MockMatcher,
        pub profiles: MockProfileAnalyzer,
    }

    impl MockCollaborators {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn collaborators(&self) -> Collaborators {
            Collaborators {
                storage: Arc::new(self.storage.clone()) as Arc<dyn ObjectStorage>,
                parser: Arc::new(self.parser.clone()),
                matcher: Arc::new(self.matcher.clone()),
                profiles: Arc::new(self.profiles.clone()),
            }
        }
    }
}
