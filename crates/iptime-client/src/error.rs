//! Client error types.

use thiserror::Error;

/// Errors raised inside the router client.
///
/// Public session operations swallow these and log them; the error type
/// travels between the internal request helpers and the logging boundary.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure: connect, TLS, timeout, or body read.
    #[error("request error: {0}")]
    Http(#[from] reqwest::Error),

    /// The router answered with a status outside the accepted set.
    #[error("unexpected status: {0}")]
    UnexpectedStatus(reqwest::StatusCode),

    /// The configured base URL does not parse.
    #[error("invalid router url: {0}")]
    InvalidUrl(String),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
