use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::payments::PaymentError;

/// Failures raised by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error reported by the MongoDB driver
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    /// A path identifier that is not a valid ObjectId
    #[error("invalid id: {0}")]
    InvalidId(String),

    /// A record rejected before it reached the database
    #[error("{0}")]
    Validation(String),

    /// Storage could not serve the request
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// ApiError
///
/// The error taxonomy exposed over HTTP. Every handler returns `Result<_, ApiError>`
/// so storage and processor failures propagate with `?`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, malformed, expired or forged bearer credential (401)
    #[error("Unauthorized Access")]
    Unauthorized,

    /// Valid credential without the required role, or a self-access mismatch (403)
    #[error("Forbidden Access")]
    Forbidden,

    /// Malformed input rejected before storage (400)
    #[error("{0}")]
    Validation(String),

    /// Storage or payment processor failure (500)
    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidId(id) => ApiError::Validation(format!("invalid id: {id}")),
            StoreError::Validation(msg) => ApiError::Validation(msg),
            StoreError::Database(e) => ApiError::Internal(e.to_string()),
            StoreError::Unavailable(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, json!({ "message": self.to_string() })),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, json!({ "message": self.to_string() })),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, json!({ "message": msg })),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg }))
            }
        };
        (status, Json(body)).into_response()
    }
}
