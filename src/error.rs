//! Error types for the document cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::backend::StoreError;
use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key absent, or logically expired at lookup time
    #[error("The document with key [{0}] has not been found in this cache")]
    NotFound(String),

    /// Stored payload could not be turned back into a value
    #[error("Failed to decode value for key [{key}]: {reason}")]
    Decode { key: String, reason: String },

    /// Value handed to `put` could not be serialized
    #[error("Failed to encode value for key [{key}]: {reason}")]
    Encode { key: String, reason: String },

    /// The backing store failed, timed out or refused the call
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// A stored record does not follow the cache document layout
    #[error("Malformed cache record: {0}")]
    MalformedRecord(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CacheError {
    /// Returns true for the recoverable "no such entry" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::Decode { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            CacheError::Encode { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::MalformedRecord(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
