//! Error types for the authorization gateway

use std::io;

use thiserror::Error;

/// Result type alias for the authorization gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway errors
///
/// Only startup and tooling paths surface these. The request path recovers
/// every failure locally (see [`crate::policy::PolicyError`]).
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (missing setting, unreadable trust root, bad key pair)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
