//! Error types for the dealwatch client

use std::io;

use thiserror::Error;

use crate::client::Failure;

/// Result type alias for the dealwatch client
pub type Result<T> = std::result::Result<T, Error>;

/// Dealwatch client errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The API rejected the request or could not be reached
    #[error(transparent)]
    Api(#[from] Failure),

    /// Transport setup error
    #[error("Transport error: {0}")]
    Transport(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status carried by an API failure, if the server answered at all
    #[must_use]
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Self::Api(failure) => failure.status(),
            _ => None,
        }
    }
}
