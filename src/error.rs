//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from database operations
/// - **Authentication Errors**: Missing, malformed or expired bearer tokens
/// - **Resource Errors**: Requested resources not found (or not owned by the caller)
/// - **Validation Errors**: Invalid request data
/// - **Business Rule Errors**: Operations that violate a state machine or ledger rule
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Bearer token is missing, invalid, or expired.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid or missing bearer token")]
    Unauthorized,

    /// Requested resource does not exist or belongs to another manager.
    ///
    /// Returns HTTP 404 Not Found. The payload names the resource kind.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("{0}")]
    Validation(String),

    /// The operation is well-formed but not allowed in the current state,
    /// e.g. waiving a late fee that is already waived.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("{0}")]
    BusinessRule(String),

    /// A withdrawal, fee or transfer would drive a trust account below zero.
    ///
    /// Returns HTTP 422 Unprocessable Entity.
    #[error("Insufficient funds")]
    InsufficientFunds,

    /// Report serialization failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// An external collaborator (OCR service) failed or returned garbage.
    ///
    /// Returns HTTP 502 Bad Gateway.
    #[error("Upstream service error: {0}")]
    Upstream(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::BusinessRule(_) => (StatusCode::CONFLICT, "business_rule_violation"),
            AppError::InsufficientFunds => {
                (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_funds")
            }
            AppError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            AppError::Database(_) | AppError::Csv(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "status": "error",
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// Internal errors are logged and replaced by a generic message so database
/// details never reach the client.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed with internal error");
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "status": "error",
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
