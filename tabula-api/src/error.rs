//! Error Types for Tabula API
//!
//! `ApiError` is the single error shape every response carries:
//! `{"error": <message>, "code": <CODE>}` plus optional details. Engine
//! errors convert through `From<TabulaError>`, which picks the code and so
//! the HTTP status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tabula_core::{AccessError, ConfigError, TabulaError, ValidationError};

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Access
    // ========================================================================
    /// No role for the presented API key
    Unauthorized,

    /// Role lacks the permission the action needs
    Forbidden,

    // ========================================================================
    // Validation
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Request body or parameters could not be decoded
    InvalidInput,

    /// Required field is missing from the request
    MissingField,

    /// Action name is not recognized
    UnknownAction,

    // ========================================================================
    // Not found
    // ========================================================================
    TableNotFound,

    RecordNotFound,

    // ========================================================================
    // Retryable
    // ========================================================================
    /// Optimistic concurrency check failed
    Conflict,

    /// Table lock not acquired in time
    Busy,

    // ========================================================================
    // Server
    // ========================================================================
    /// Backing store failure
    StorageError,

    InternalError,
}

impl ErrorCode {
    /// HTTP status for this code. Client errors other than not-found all map
    /// to 400, including authorization failures.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized
            | ErrorCode::Forbidden
            | ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::MissingField
            | ErrorCode::UnknownAction
            | ErrorCode::Conflict
            | ErrorCode::Busy => StatusCode::BAD_REQUEST,

            ErrorCode::TableNotFound | ErrorCode::RecordNotFound => StatusCode::NOT_FOUND,

            ErrorCode::StorageError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Unauthorized",
            ErrorCode::Forbidden => "Forbidden",
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::UnknownAction => "Unknown action",
            ErrorCode::TableNotFound => "Table not found",
            ErrorCode::RecordNotFound => "Record not found",
            ErrorCode::Conflict => "Record was modified by another request",
            ErrorCode::Busy => "Table is busy, retry later",
            ErrorCode::StorageError => "Storage operation failed",
            ErrorCode::InternalError => "Internal server error",
        }
    }

    /// True for codes a caller may retry after re-reading.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::Conflict | ErrorCode::Busy)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable error message
    #[serde(rename = "error")]
    pub message: String,

    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors
    // ========================================================================

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let code = match &err {
            ValidationError::RequiredFieldMissing { .. } => ErrorCode::MissingField,
            ValidationError::UnknownAction { .. } => ErrorCode::UnknownAction,
            _ => ErrorCode::ValidationFailed,
        };
        ApiError::new(code, err.to_string())
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Unauthorized => ApiError::unauthorized(err.to_string()),
            AccessError::Forbidden { .. } => ApiError::forbidden(err.to_string()),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::internal_error(format!("Configuration error: {}", err))
    }
}

impl From<TabulaError> for ApiError {
    fn from(err: TabulaError) -> Self {
        match err {
            TabulaError::Validation(e) => e.into(),
            TabulaError::Access(e) => e.into(),
            TabulaError::TableNotFound { .. } => {
                ApiError::new(ErrorCode::TableNotFound, err.to_string())
            }
            TabulaError::RecordNotFound { .. } => {
                ApiError::new(ErrorCode::RecordNotFound, err.to_string())
            }
            TabulaError::Conflict {
                ref expected,
                ref actual,
                ..
            } => {
                let details = serde_json::json!({
                    "expectedUpdatedAt": expected,
                    "currentUpdatedAt": actual,
                    "retryable": true,
                });
                ApiError::new(ErrorCode::Conflict, err.to_string()).with_details(details)
            }
            TabulaError::Busy { timeout_ms, .. } => {
                let details = serde_json::json!({ "timeoutMs": timeout_ms, "retryable": true });
                ApiError::new(ErrorCode::Busy, err.to_string()).with_details(details)
            }
            TabulaError::Storage(e) => {
                // Keep backend detail out of responses.
                tracing::error!(error = %e, "storage failure");
                ApiError::from_code(ErrorCode::StorageError)
            }
            TabulaError::Config(e) => e.into(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::invalid_input(format!("Invalid JSON: {}", err))
    }
}

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
