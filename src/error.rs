//! Error types for the bookstore client

use std::collections::BTreeMap;
use thiserror::Error;

/// Client error types
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Registration (or any form submission) rejected with per-field messages
    #[error("Validation failed: {message}")]
    ValidationFailed {
        message: String,
        fields: BTreeMap<String, String>,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The session ended because its token is no longer honored
    #[error("Session expired")]
    AuthorizationExpired,

    /// The server rejected the request credential
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("API error with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Failures of the persisted credential storage
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt storage contents: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
