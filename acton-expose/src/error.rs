//! Crate error type and HTTP response conversion
//!
//! These are failures of the exposure layer itself (bad configuration, an
//! unreachable cache store, a value that refuses to serialize). Application
//! failures travel as [`ApiError`](crate::taxonomy::ApiError) values instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the crate
///
/// Foreign error payloads are boxed to keep `Result` small
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or parsed
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// A kind was registered under a parent that is not itself a registered kind
    #[error("Invalid parent `{parent}` for error kind `{name}`")]
    InvalidParent {
        /// Name of the kind being registered
        name: String,
        /// The rejected parent name
        parent: String,
    },

    /// Lookup of an error kind that was never registered
    #[error("Unknown error kind: {0}")]
    UnknownKind(String),

    /// A value could not be reduced to plain JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Cache store failure
    #[error("Cache error: {0}")]
    Cache(String),

    /// Redis command or connection failure
    #[cfg(feature = "cache")]
    #[error("Redis error: {0}")]
    Redis(Box<redis::RedisError>),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    Client(Box<reqwest::Error>),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body used when the exposure layer itself fails
///
/// Shaped like every other error envelope so clients only ever parse one
/// format.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error kind name
    pub error: String,

    /// Human readable description
    pub error_description: String,
}

impl ErrorResponse {
    /// Build a response body
    pub fn new(error: impl Into<String>, error_description: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_description: error_description.into(),
        }
    }
}

impl Error {
    /// Status and client-facing description for this failure
    ///
    /// The description never includes the underlying error text.
    fn public_parts(&self) -> (StatusCode, &'static str) {
        match self {
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Service misconfigured"),
            Error::InvalidParent { .. } | Error::UnknownKind(_) | Error::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal error occurred",
            ),
            Error::Serialization(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Response could not be serialized",
            ),
            Error::Cache(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Cache operation failed"),
            #[cfg(feature = "cache")]
            Error::Redis(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Cache operation failed"),
            Error::Client(_) => (StatusCode::BAD_GATEWAY, "Upstream request failed"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, description) = self.public_parts();
        tracing::error!(status = status.as_u16(), error = %self, "Exposure layer failure");
        (status, Json(ErrorResponse::new("system", description))).into_response()
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

#[cfg(feature = "cache")]
impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Redis(Box::new(err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Client(Box::new(err))
    }
}
