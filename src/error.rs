//! Error types for Codebox

use thiserror::Error;

/// Result type alias using Codebox's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Codebox
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or out-of-range request
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Requested language has no profile
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Admission rejected by the rate limiter
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Could not prepare code on disk
    #[error("Staging error: {0}")]
    Staging(String),

    /// Docker/container-layer fault (create, start, API)
    #[error("Container error: {0}")]
    Container(String),

    /// The run mechanism reported a fault while the code was executing
    #[error("Execution error: {0}")]
    Execution(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if error is a client error (the request was at fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::UnsupportedLanguage(_) | Error::RateLimited(_)
        )
    }

    /// Check if error means the sandbox itself failed to run the code
    /// (as opposed to the code failing) — callers should retry later
    pub fn is_sandbox_fault(&self) -> bool {
        matches!(
            self,
            Error::Staging(_) | Error::Container(_) | Error::Execution(_) | Error::Io(_)
        )
    }
}

impl From<bollard::errors::Error> for Error {
    fn from(err: bollard::errors::Error) -> Self {
        Error::Container(err.to_string())
    }
}
