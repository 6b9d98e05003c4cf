//! External collaborators consumed by the pipeline: object storage, the
//! parsing service, the matcher and the profile analyzer.

mod fs_storage;
mod http_client;
mod traits;
mod types;

pub use fs_storage::FsObjectStorage;
pub use http_client::HttpParsingClient;
pub use traits::{DocumentParser, Matcher, ObjectStorage, ProfileAnalyzer};
pub use types::{CollaboratorError, MatchOutcome, ParsedDocument, ProfileInsight, TokenUsage};
