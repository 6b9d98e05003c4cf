//! Batch API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use screenflow_core::{
    Batch, BatchStatus, CreateBatchRequest, CreateDocumentRequest, DocumentFilter,
    DocumentStatus, QueueStatus, TaskHandle,
};

use super::documents::DocumentResponse;
use super::error::{api_error, dispatch_error, not_found, status_error, store_error, ApiResult};
use super::middleware::AuthUser;
use crate::state::AppState;

/// Maximum allowed limit for document listings
const MAX_LIMIT: i64 = 1000;

/// Default limit for document listings
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for creating a batch
#[derive(Debug, Deserialize)]
pub struct CreateBatchBody {
    pub title: String,
    /// Job requirement text; enables matching when present
    pub requirement: Option<String>,
    /// Owner to create the batch for. Only honoured without authentication.
    pub owner_id: Option<String>,
}

/// Request body for registering a confirmed upload
#[derive(Debug, Deserialize)]
pub struct AddDocumentBody {
    pub storage_key: String,
    pub filename: String,
    /// Defaults to a guess from the filename extension
    pub mime_type: Option<String>,
}

/// Query parameters for listing batches
#[derive(Debug, Deserialize)]
pub struct ListBatchesParams {
    /// Owner whose batches to list. Only honoured without authentication.
    pub owner_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Query parameters for listing documents
#[derive(Debug, Deserialize)]
pub struct ListDocumentsParams {
    /// Filter by status
    pub status: Option<DocumentStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Response for batch operations
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub requirement: Option<String>,
    pub status: BatchStatus,
    pub total: u32,
    pub processed: u32,
    pub failed: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Batch> for BatchResponse {
    fn from(batch: Batch) -> Self {
        Self {
            status: batch.status(),
            id: batch.id,
            owner_id: batch.owner_id,
            title: batch.title,
            requirement: batch.requirement,
            total: batch.total,
            processed: batch.processed,
            failed: batch.failed,
            created_at: batch.created_at.to_rfc3339(),
            updated_at: batch.updated_at.to_rfc3339(),
        }
    }
}

/// Response for listing batches
#[derive(Debug, Serialize)]
pub struct ListBatchesResponse {
    pub batches: Vec<BatchResponse>,
    pub limit: i64,
    pub offset: i64,
}

/// Response for listing documents
#[derive(Debug, Serialize)]
pub struct ListDocumentsResponse {
    pub documents: Vec<DocumentResponse>,
    pub limit: i64,
    pub offset: i64,
}

/// Response for submitting a batch
#[derive(Debug, Serialize)]
pub struct ProcessBatchResponse {
    pub batch_id: String,
    pub submitted: usize,
    pub tasks: Vec<TaskHandle>,
}

// ============================================================================
// Handlers
// ============================================================================

fn owned_batch(state: &AppState, user: &AuthUser, id: &str) -> ApiResult<Batch> {
    state
        .store()
        .get_batch(id)
        .map_err(store_error)?
        .filter(|batch| user.owns(&batch.owner_id))
        .ok_or_else(|| not_found("batch", id))
}

/// Create a new batch
pub async fn create_batch(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(body): Json<CreateBatchBody>,
) -> ApiResult<(StatusCode, Json<BatchResponse>)> {
    let title = body.title.trim();
    if title.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "title must not be empty"));
    }

    let owner_id = user.owner_for(body.owner_id.as_deref()).map_err(|status| {
        api_error(status, "cannot create a batch for another owner")
    })?;

    let batch = state
        .store()
        .create_batch(CreateBatchRequest {
            owner_id,
            title: title.to_string(),
            requirement: body.requirement.filter(|r| !r.trim().is_empty()),
        })
        .map_err(store_error)?;

    info!(batch_id = %batch.id, owner_id = %batch.owner_id, "Batch created");
    Ok((StatusCode::CREATED, Json(batch.into())))
}

/// Get a batch by ID
pub async fn get_batch(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<BatchResponse>> {
    let batch = owned_batch(&state, &user, &id)?;
    Ok(Json(batch.into()))
}

/// List the caller's batches, newest first
pub async fn list_batches(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(params): Query<ListBatchesParams>,
) -> ApiResult<Json<ListBatchesResponse>> {
    let owner_id = user.owner_for(params.owner_id.as_deref()).map_err(|status| {
        api_error(status, "cannot list batches of another owner")
    })?;

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let batches = state
        .store()
        .list_batches(&owner_id, limit, offset)
        .map_err(store_error)?;

    Ok(Json(ListBatchesResponse {
        batches: batches.into_iter().map(BatchResponse::from).collect(),
        limit,
        offset,
    }))
}

/// Delete a batch, its documents and their uploads
pub async fn delete_batch(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let batch = owned_batch(&state, &user, &id)?;
    let documents = state.store().delete_batch(&batch.id).map_err(store_error)?;

    // Best effort: the rows are already gone.
    let keys: Vec<String> = documents.into_iter().map(|d| d.storage_key).collect();
    if !keys.is_empty() {
        if let Err(e) = state.storage().delete(&keys).await {
            warn!(batch_id = %batch.id, objects = keys.len(), error = %e, "Failed to delete stored uploads");
        }
    }

    info!(batch_id = %batch.id, documents = keys.len(), "Batch deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Register an uploaded file as a queued document of the batch
pub async fn add_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<AddDocumentBody>,
) -> ApiResult<(StatusCode, Json<DocumentResponse>)> {
    if body.storage_key.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "storage_key must not be empty"));
    }

    let batch = owned_batch(&state, &user, &id)?;
    let mime_type = body
        .mime_type
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| mime_from_filename(&body.filename));

    let document = state
        .store()
        .add_document(CreateDocumentRequest {
            batch_id: batch.id,
            storage_key: body.storage_key,
            filename: body.filename,
            mime_type,
        })
        .map_err(store_error)?;

    info!(
        document_id = %document.id,
        batch_id = %document.batch_id,
        filename = %document.filename,
        "Document registered"
    );
    Ok((StatusCode::CREATED, Json(document.into())))
}

/// List documents of a batch, oldest first
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(params): Query<ListDocumentsParams>,
) -> ApiResult<Json<ListDocumentsResponse>> {
    let batch = owned_batch(&state, &user, &id)?;

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = DocumentFilter::new()
        .with_batch(&batch.id)
        .with_limit(limit)
        .with_offset(offset);
    if let Some(status) = params.status {
        filter = filter.with_status(status);
    }

    let documents = state.store().list_documents(&filter).map_err(store_error)?;

    Ok(Json(ListDocumentsResponse {
        documents: documents.into_iter().map(DocumentResponse::from).collect(),
        limit,
        offset,
    }))
}

/// Submit every queued document of the batch to the dispatcher
pub async fn process_batch(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<ProcessBatchResponse>)> {
    let batch = owned_batch(&state, &user, &id)?;

    let tasks = state
        .dispatcher()
        .submit_batch(&batch.id, &batch.owner_id)
        .await
        .map_err(dispatch_error)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ProcessBatchResponse {
            batch_id: batch.id,
            submitted: tasks.iter().filter(|t| t.enqueued).count(),
            tasks,
        }),
    ))
}

/// Point-in-time queue status of a batch
pub async fn queue_status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<QueueStatus>> {
    let batch = owned_batch(&state, &user, &id)?;
    let status = state.aggregator().compute(&batch.id).map_err(status_error)?;
    Ok(Json(status))
}

fn mime_from_filename(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .to_string()
}
