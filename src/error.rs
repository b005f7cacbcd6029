//! Error types for classpulse
//!
//! Structured error definitions with thiserror; anyhow errors from the outer
//! layers convert into [`PulseError::Other`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Main error type for classpulse operations
#[derive(Error, Debug)]
pub enum PulseError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Schema migration failed
    #[error("Migration error: {0}")]
    Migration(String),

    /// Feedback entry not found
    #[error("Feedback entry not found: {0}")]
    EntryNotFound(String),

    /// Class not present in the directory
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    /// Caller lacks the access the operation requires
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Reaction outside the fixed set
    #[error("Invalid reaction: {0}")]
    InvalidReaction(String),

    /// Missing or malformed caller identity
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Live subscription failed or closed
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for classpulse operations
pub type Result<T> = std::result::Result<T, PulseError>;

impl From<anyhow::Error> for PulseError {
    fn from(err: anyhow::Error) -> Self {
        PulseError::Other(err.to_string())
    }
}

impl From<libsql::Error> for PulseError {
    fn from(err: libsql::Error) -> Self {
        PulseError::Database(err.to_string())
    }
}

impl PulseError {
    /// HTTP status this error maps to at the API boundary
    pub fn status_code(&self) -> StatusCode {
        match self {
            PulseError::Forbidden(_) => StatusCode::FORBIDDEN,
            PulseError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            PulseError::EntryNotFound(_) | PulseError::ClassNotFound(_) => StatusCode::NOT_FOUND,
            PulseError::InvalidReaction(_) => StatusCode::BAD_REQUEST,
            PulseError::Database(_) | PulseError::Subscription(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PulseError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}
