//! Document API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use screenflow_core::{Document, DocumentStatus, TaskHandle};

use super::error::{api_error, dispatch_error, not_found, store_error, ApiResult};
use super::middleware::AuthUser;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for recording a review decision
#[derive(Debug, Deserialize)]
pub struct ReviewBody {
    /// `shortlisted` or `rejected`
    pub status: DocumentStatus,
}

/// Document as returned by the API, with candidate fields lifted out of the
/// structured record.
#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub id: String,
    pub batch_id: String,
    pub owner_id: String,
    pub storage_key: String,
    pub filename: String,
    pub mime_type: String,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    pub attempt: u32,
    pub match_score: Option<u8>,
    pub match_rationale: Option<String>,
    pub candidate_name: Option<String>,
    pub candidate_email: Option<String>,
    pub quality_score: Option<u8>,
    pub profile_handle: Option<String>,
    pub structured_record: Option<serde_json::Value>,
    pub processing_seconds: Option<f64>,
    pub created_at: String,
    pub processed_at: Option<String>,
    pub updated_at: String,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        let candidate_name = doc.candidate_name().map(str::to_string);
        let candidate_email = doc.candidate_email().map(str::to_string);
        let quality_score = doc.quality_score();
        let profile_handle = doc.profile_handle();
        let processing_seconds = doc.processing_seconds();

        Self {
            id: doc.id,
            batch_id: doc.batch_id,
            owner_id: doc.owner_id,
            storage_key: doc.storage_key,
            filename: doc.filename,
            mime_type: doc.mime_type,
            status: doc.status,
            error_message: doc.error_message,
            attempt: doc.attempt,
            match_score: doc.match_score,
            match_rationale: doc.match_rationale,
            candidate_name,
            candidate_email,
            quality_score,
            profile_handle,
            structured_record: doc.structured_record,
            processing_seconds,
            created_at: doc.created_at.to_rfc3339(),
            processed_at: doc.processed_at.map(|t| t.to_rfc3339()),
            updated_at: doc.updated_at.to_rfc3339(),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Loads a document the caller may see. Other owners' documents read as missing.
pub(super) fn owned_document(state: &AppState, user: &AuthUser, id: &str) -> ApiResult<Document> {
    state
        .store()
        .get_document(id)
        .map_err(store_error)?
        .filter(|doc| user.owns(&doc.owner_id))
        .ok_or_else(|| not_found("document", id))
}

/// Get a document by ID
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<DocumentResponse>> {
    let document = owned_document(&state, &user, &id)?;
    Ok(Json(document.into()))
}

/// Put a failed document back in the queue under a new attempt
pub async fn retry_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<TaskHandle>)> {
    let document = owned_document(&state, &user, &id)?;

    let handle = state
        .dispatcher()
        .retry(&document.id, &document.owner_id)
        .await
        .map_err(dispatch_error)?;

    Ok((StatusCode::ACCEPTED, Json(handle)))
}

/// Record the reviewer's decision on a completed document
pub async fn review_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<ReviewBody>,
) -> ApiResult<Json<DocumentResponse>> {
    if !body.status.is_review_outcome() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!(
                "review status must be shortlisted or rejected, got {}",
                body.status
            ),
        ));
    }

    let document = owned_document(&state, &user, &id)?;
    let document = state
        .store()
        .review_document(&document.id, body.status)
        .map_err(store_error)?;

    info!(document_id = %document.id, status = %document.status, "Document reviewed");
    Ok(Json(document.into()))
}

/// Delete a document and its stored upload
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let document = owned_document(&state, &user, &id)?;
    let document = state
        .store()
        .delete_document(&document.id)
        .map_err(store_error)?;

    // Best effort: the row is already gone.
    let keys = [document.storage_key.clone()];
    if let Err(e) = state.storage().delete(&keys).await {
        warn!(
            document_id = %document.id,
            storage_key = %document.storage_key,
            error = %e,
            "Failed to delete stored upload"
        );
    }

    info!(document_id = %document.id, batch_id = %document.batch_id, "Document deleted");
    Ok(StatusCode::NO_CONTENT)
}
