//! Error types for the ledger core and the HTTP boundary.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::ledger::ChainViolation;

/// Malformed request fields, detected before the ledger is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("certificateType must be either \"company\" or \"product\", got {0:?}")]
    InvalidCertificateType(String),
    #[error("pdfHash must be a valid SHA-256 hash (64 hexadecimal characters)")]
    InvalidPdfHash,
    #[error("pdfBase64 is not valid base64: {0}")]
    InvalidDocumentEncoding(String),
    #[error("invalid request body: {0}")]
    MalformedBody(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("certificate {certificate_id} is already registered at block {block_index}")]
    DuplicateCertificate {
        certificate_id: String,
        block_index: u64,
    },
    #[error("block rejected: {0}")]
    Rejected(ChainViolation),
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(ValidationError::MalformedBody(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Validation(e) => (
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "message": e.to_string() }),
            ),
            ApiError::Ledger(LedgerError::DuplicateCertificate { block_index, .. }) => (
                StatusCode::CONFLICT,
                json!({
                    "success": false,
                    "message": self.to_string(),
                    "blockIndex": block_index,
                }),
            ),
            ApiError::Ledger(LedgerError::Rejected(_)) | ApiError::Internal(_) => {
                tracing::error!(error = %self, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "success": false, "message": "internal error" }),
                )
            }
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                json!({ "success": false, "message": msg }),
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "message": msg }),
            ),
        };

        (status, Json(body)).into_response()
    }
}
