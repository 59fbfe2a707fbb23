use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::payments::PaymentError;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Not Found",
    "message": "Item not found: paneer-butter-masala",
    "details": null,
    "request_id": "req-abc123xyz",
    "timestamp": "2025-03-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    #[schema(example = "Not Found")]
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Machine-readable error code, when one applies
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "item_not_found")]
    pub details: Option<String>,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Payment service unavailable: {0}")]
    PaymentServiceUnavailable(String),

    #[error("Payment rejected: {0}")]
    PaymentRejected(String),

    #[error("Persisted cart is corrupt: {0}")]
    PersistedStateCorrupt(String),

    #[error("Order mismatch: {0}")]
    OrderMismatch(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Submission already in progress for this cart")]
    SubmissionInProgress,

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<PaymentError> for ServiceError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Unavailable(msg) => ServiceError::PaymentServiceUnavailable(msg),
            PaymentError::CircuitOpen => {
                ServiceError::PaymentServiceUnavailable("payment provider circuit open".into())
            }
            PaymentError::Rejected(msg) => ServiceError::PaymentRejected(msg),
            PaymentError::InvalidResponse(msg) => ServiceError::PaymentServiceUnavailable(msg),
        }
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) | Self::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            Self::ItemNotFound(_) | Self::InvalidAmount(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::SubmissionInProgress => StatusCode::CONFLICT,
            Self::OrderMismatch(_) => StatusCode::CONFLICT,
            Self::PaymentRejected(_) => StatusCode::PAYMENT_REQUIRED,
            Self::PaymentServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::PersistedStateCorrupt(_)
            | Self::StorageError(_)
            | Self::Configuration(_)
            | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code, surfaced in `ErrorResponse::details`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationError(_) => "validation_error",
            Self::ItemNotFound(_) => "item_not_found",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::PaymentServiceUnavailable(_) => "payment_service_unavailable",
            Self::PaymentRejected(_) => "payment_rejected",
            Self::PersistedStateCorrupt(_) => "persisted_state_corrupt",
            Self::OrderMismatch(_) => "order_mismatch",
            Self::NotFound(_) => "not_found",
            Self::InvalidOperation(_) => "invalid_operation",
            Self::SubmissionInProgress => "submission_in_progress",
            Self::StorageError(_) => "storage_error",
            Self::Configuration(_) => "configuration_error",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PaymentServiceUnavailable(_) | Self::SubmissionInProgress
        )
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::StorageError(_)
            | Self::Configuration(_)
            | Self::InternalError(_)
            | Self::PersistedStateCorrupt(_) => "Internal server error".to_string(),
            Self::PaymentServiceUnavailable(_) => {
                "Payment service is temporarily unavailable, please try again".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: Some(self.code().to_string()),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

/// API Error type for HTTP responses
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Service error: {0}")]
    ServiceError(#[from] ServiceError),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {message}")]
    BadRequest {
        message: String,
        error_code: Option<String>,
    },

    #[error("Internal server error")]
    InternalServerError,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, code) = match self {
            ApiError::ServiceError(service_error) => return service_error.into_response(),
            ApiError::ValidationError(msg) => {
                (StatusCode::BAD_REQUEST, msg, Some("validation_error".to_string()))
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, Some("not_found".to_string())),
            ApiError::BadRequest {
                message,
                error_code,
            } => (StatusCode::BAD_REQUEST, message, error_code),
            ApiError::InternalServerError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                None,
            ),
        };

        let error_response = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            message: error_message,
            details: code,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(error_response)).into_response()
    }
}
