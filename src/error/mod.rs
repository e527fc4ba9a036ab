//! Centralized API error handling for the Banadama marketplace core
//!
//! This module provides a unified error type for API responses with proper
//! HTTP status code mapping and JSON error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// API error type with HTTP status code mapping
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Already resolved: {0}")]
    AlreadyResolved(String),

    #[error("Already released: {0}")]
    AlreadyReleased(String),

    #[error("Amount exceeds locked escrow: requested {requested}, available {available}")]
    AmountExceedsLocked { requested: i64, available: i64 },

    #[error("Below minimum payout: requested {requested}, minimum {minimum}")]
    BelowMinimum { requested: i64, minimum: i64 },

    #[error("Insufficient unlocked balance: requested {requested}, available {available}")]
    InsufficientUnlocked { requested: i64, available: i64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// JSON error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

/// Error details in the response
#[derive(Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::InvalidTransition(_) => "INVALID_TRANSITION",
            ApiError::AlreadyResolved(_) => "ALREADY_RESOLVED",
            ApiError::AlreadyReleased(_) => "ALREADY_RELEASED",
            ApiError::AmountExceedsLocked { .. } => "AMOUNT_EXCEEDS_LOCKED",
            ApiError::BelowMinimum { .. } => "BELOW_MINIMUM",
            ApiError::InsufficientUnlocked { .. } => "INSUFFICIENT_UNLOCKED",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
            ApiError::DatabaseError(_) => "DATABASE_ERROR",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::InvalidTransition(_) => StatusCode::BAD_REQUEST,
            ApiError::AlreadyResolved(_) => StatusCode::CONFLICT,
            ApiError::AlreadyReleased(_) => StatusCode::CONFLICT,
            ApiError::AmountExceedsLocked { .. } => StatusCode::BAD_REQUEST,
            ApiError::BelowMinimum { .. } => StatusCode::BAD_REQUEST,
            ApiError::InsufficientUnlocked { .. } => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        // Log server errors
        match &self {
            ApiError::InternalError(_) | ApiError::DatabaseError(_) => {
                tracing::error!(error = %message, code = %error_code, "Server error occurred");
            }
            _ => {
                tracing::debug!(error = %message, code = %error_code, "Client error occurred");
            }
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code: error_code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

// Convenience conversions from common error types

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            _ => ApiError::DatabaseError(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("Invalid JSON: {}", err))
    }
}

/// Result type alias using ApiError
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ApiError::InvalidTransition("test".to_string()).error_code(),
            "INVALID_TRANSITION"
        );
        assert_eq!(
            ApiError::AlreadyReleased("test".to_string()).error_code(),
            "ALREADY_RELEASED"
        );
        assert_eq!(
            ApiError::BelowMinimum {
                requested: 400_000,
                minimum: 500_000
            }
            .error_code(),
            "BELOW_MINIMUM"
        );
        assert_eq!(
            ApiError::Unauthorized("test".to_string()).error_code(),
            "UNAUTHORIZED"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::NotFound("test".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::InvalidTransition("test".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::AlreadyResolved("test".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Forbidden("test".to_string()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::InsufficientUnlocked {
                requested: 10,
                available: 5
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_amount_messages() {
        let err = ApiError::AmountExceedsLocked {
            requested: 3_000_000,
            available: 2_500_000,
        };
        let msg = err.to_string();
        assert!(msg.contains("3000000"));
        assert!(msg.contains("2500000"));
    }
}
