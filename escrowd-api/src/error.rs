//! HTTP error mapping
//!
//! Engine errors carry no transport knowledge; this module pins each kind
//! to a status code and the JSON envelope clients see.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use escrowd_engine::error::EscrowError;

/// Error envelope returned to clients
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    code: u16,
    message: String,
}

/// Errors surfaced by the HTTP layer
#[derive(Debug)]
pub enum ApiError {
    Engine(EscrowError),
    UnsupportedMediaType(&'static str),
}

impl From<EscrowError> for ApiError {
    fn from(err: EscrowError) -> Self {
        Self::Engine(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            Self::Engine(err) => (engine_status(&err), engine_kind(&err), err.to_string()),
            Self::UnsupportedMediaType(expected) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_media_type",
                format!("invalid Content-Type, expected {}", expected),
            ),
        };

        let body = ErrorBody {
            error,
            code: status.as_u16(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

fn engine_status(err: &EscrowError) -> StatusCode {
    match err {
        EscrowError::Validation(_)
        | EscrowError::InvalidStatus { .. }
        | EscrowError::DuplicateSignature(_)
        | EscrowError::AlreadyFunded { .. }
        | EscrowError::Serialization(_)
        | EscrowError::Uuid(_) => StatusCode::BAD_REQUEST,
        EscrowError::NotFound(_) | EscrowError::TransactionNotRecognized(_) => {
            StatusCode::NOT_FOUND
        }
        EscrowError::Collaborator(_) | EscrowError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn engine_kind(err: &EscrowError) -> &'static str {
    match err {
        EscrowError::Validation(_) => "validation_error",
        EscrowError::NotFound(_) => "escrow_not_found",
        EscrowError::InvalidStatus { .. } => "invalid_status",
        EscrowError::DuplicateSignature(_) => "duplicate_signature",
        EscrowError::AlreadyFunded { .. } => "already_funded",
        EscrowError::Collaborator(_) => "collaborator_error",
        EscrowError::TransactionNotRecognized(_) => "transaction_not_recognized",
        EscrowError::Serialization(_) => "serialization_error",
        EscrowError::Uuid(_) => "invalid_id",
        EscrowError::Internal(_) => "internal_error",
    }
}
