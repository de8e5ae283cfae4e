//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// API errors. Display strings are the wire-visible messages.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Authorization header missing or not Bearer-shaped.
    #[error("Missing or invalid token")]
    MissingToken,

    /// Bearer token present but wrong.
    #[error("Invalid token")]
    InvalidToken,

    /// Router rejected the admin login.
    #[error("Failed to login to router")]
    LoginFailed,

    /// No rule matches the requested selector.
    #[error("Rule not found")]
    RuleNotFound,

    /// No route matches the requested path.
    #[error("Endpoint not found")]
    EndpointNotFound,

    /// Request body failed validation.
    #[error("{0}")]
    BadRequest(String),

    /// Router dropped or refused the operation.
    #[error("{0}")]
    OperationFailed(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MissingToken | ApiError::InvalidToken => StatusCode::UNAUTHORIZED,
            ApiError::RuleNotFound | ApiError::EndpointNotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::LoginFailed | ApiError::OperationFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ErrorResponse {
            status: "error",
            message: self.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;
