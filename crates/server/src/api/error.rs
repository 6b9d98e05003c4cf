//! Error responses shared by the API handlers.

use axum::{http::StatusCode, Json};
use serde::Serialize;
use tracing::error;

use screenflow_core::{DispatchError, StatusError, StoreError};

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub type ApiResult<T> = Result<T, ApiError>;

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn not_found(kind: &str, id: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, format!("{} not found: {}", kind, id))
}

pub fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound { kind, id } => not_found(kind, &id),
        StoreError::InvalidTransition(_) | StoreError::Conflict(_) | StoreError::StaleAttempt { .. } => {
            api_error(StatusCode::CONFLICT, e.to_string())
        }
        StoreError::Database(_) | StoreError::Serialization(_) => internal(e),
    }
}

pub fn dispatch_error(e: DispatchError) -> ApiError {
    match e {
        DispatchError::NotFound { kind, id } => not_found(kind, &id),
        DispatchError::InvalidTransition(_) | DispatchError::StaleAttempt { .. } => {
            api_error(StatusCode::CONFLICT, e.to_string())
        }
        DispatchError::Extraction(_) | DispatchError::Upstream(_) | DispatchError::Infrastructure(_) => {
            internal(e)
        }
    }
}

pub fn status_error(e: StatusError) -> ApiError {
    match e {
        StatusError::BatchNotFound(id) => not_found("batch", &id),
        StatusError::Store(e) => store_error(e),
    }
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    error!(error = %e, "Request failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
