//! Error types for the Inksign API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use inksign_core::StampError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Signer has already signed this document")]
    AlreadySigned,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Stamp(#[from] StampError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("Not found: {}", what)),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Authentication required".to_string(),
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            // Distinct conflict so clients can render "already completed"
            // instead of a generic validation failure.
            ApiError::AlreadySigned => (
                StatusCode::CONFLICT,
                "Signer has already signed this document".to_string(),
            ),
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Stamp(e) => match e {
                StampError::DecodeError(_) | StampError::FormatError(_) => {
                    (StatusCode::BAD_REQUEST, e.to_string())
                }
                StampError::SourceUnavailable(msg) => {
                    tracing::error!("Stored document unreadable: {}", msg);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Stored document unavailable".to_string(),
                    )
                }
                StampError::OperationError(msg) => {
                    tracing::error!("Document processing failed: {}", msg);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Document processing failed".to_string(),
                    )
                }
            },
            ApiError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
