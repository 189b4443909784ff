//! Error types for Withings API operations

use serde::Serialize;
use serde_json::Value;

/// Errors from credential handling and API calls.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The API answered with a non-zero envelope status.
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("not authenticated: {0}")]
    Unauthenticated(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("invalid response: {0}")]
    Decode(String),
}

/// A call the API rejected.
///
/// `data` carries the request parameters and the full decoded envelope so the
/// failure can be diagnosed without re-issuing the call.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
    /// Envelope `status` value (never 0).
    pub status: i64,
    pub data: ApiErrorData,
}

/// Diagnostic payload attached to an [`ApiError`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiErrorData {
    pub parameters: Value,
    pub response: Value,
}

/// Result alias for Withings operations.
pub type Result<T> = std::result::Result<T, Error>;
