//! API error handling module
//!
//! Provides a unified error type for all API endpoints with structured error variants.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use postproof_core::ProofError;
use thiserror::Error;

/// API error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request - client provided invalid input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unauthorized - missing or invalid shared secret
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Not found - requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server error - unexpected server-side failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Service unavailable - required service is not configured or available
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Error from the timestamping engine
    #[error("Proof error: {0}")]
    Proof(#[from] ProofError),
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Create an unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create an internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a service unavailable error
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Proof(ref e) => match e {
                // Client-provided invalid input → 400
                ProofError::Serialization(_)
                | ProofError::InvalidInput(_)
                | ProofError::UnsupportedBackend(_) => StatusCode::BAD_REQUEST,

                ProofError::NotFound(_) => StatusCode::NOT_FOUND,

                // Integrity failures → 422 Unprocessable Entity
                ProofError::CorruptProof(_) | ProofError::Mismatch { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }

                // Upstream refused or misbehaved → 502
                ProofError::Rejected(_) | ProofError::Fetch(_) => StatusCode::BAD_GATEWAY,

                // Backends unreachable → 503
                ProofError::Submission(_) | ProofError::Network(_) | ProofError::HttpError(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }

                ProofError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,

                ProofError::Store(_) | ProofError::InvariantViolation(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    /// Get the error code for programmatic error handling
    fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "INVALID_INPUT",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Proof(ref e) => match e {
                ProofError::Serialization(_) => "SERIALIZATION_ERROR",
                ProofError::InvalidInput(_) => "INVALID_INPUT",
                ProofError::UnsupportedBackend(_) => "UNSUPPORTED_BACKEND",
                ProofError::NotFound(_) => "NOT_FOUND",
                ProofError::CorruptProof(_) => "CORRUPT_PROOF",
                ProofError::Mismatch { .. } => "PROOF_MISMATCH",
                ProofError::Rejected(_) => "BACKEND_REJECTED",
                ProofError::Fetch(_) => "FETCH_FAILED",
                ProofError::Submission(_) => "SUBMISSION_FAILED",
                ProofError::Network(_) | ProofError::HttpError(_) => "UPSTREAM_ERROR",
                ProofError::Timeout(_) => "DEADLINE_EXCEEDED",
                ProofError::Store(_) => "STORE_ERROR",
                ProofError::InvariantViolation(_) => "RECORD_INVARIANT",
            },
        }
    }

    /// Get sanitized error message for client response
    fn client_message(&self) -> String {
        match self {
            Self::Proof(ref e) => match e {
                ProofError::Serialization(msg) | ProofError::InvalidInput(msg) => msg.clone(),
                ProofError::UnsupportedBackend(backend) => {
                    format!("Backend {backend} is not available")
                }
                ProofError::NotFound(what) => format!("Not found: {what}"),
                ProofError::CorruptProof(_) => "Stored proof is corrupt".to_string(),
                ProofError::Mismatch { .. } => {
                    "Proof does not commit to the content fingerprint".to_string()
                }
                ProofError::Rejected(_) => "Timestamp backend rejected the request".to_string(),
                ProofError::Fetch(_) => "Post fetch service failed".to_string(),
                ProofError::Submission(_) => "No timestamp backend accepted the request".to_string(),
                ProofError::Network(_) | ProofError::HttpError(_) => {
                    "Upstream service error".to_string()
                }
                ProofError::Timeout(d) => format!("Operation exceeded its {}s deadline", d.as_secs()),
                ProofError::Store(_) | ProofError::InvariantViolation(_) => {
                    "Storage error".to_string()
                }
            },
            // For other errors, use the Display message
            _ => self.to_string(),
        }
    }

    /// Get the error category for logging
    fn error_category(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Proof(_) => "proof",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let category = self.error_category();
        let code = self.error_code();
        let internal_message = self.to_string();
        let client_message = self.client_message();

        // Log based on severity, always including internal details
        if status.is_server_error() {
            tracing::error!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Server error"
            );
        } else if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Authentication error"
            );
        } else {
            tracing::warn!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Client error"
            );
        }

        // All error responses include a `code` field for programmatic error handling
        let body = serde_json::json!({
            "error": client_message,
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}
