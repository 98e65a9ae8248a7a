//! Common error types for the landmark pipeline

use thiserror::Error;

/// Common result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared across pipeline entry points.
///
/// `NotFound` and `Validation` are reportable conditions, not crashes: every
/// entry point converts them into a structured failure payload for the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A name could not be resolved, or a referenced landmark does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transient network failure (timeout, connectivity) on an external call
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Dataset insufficient or target class absent at training time
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Downloaded bytes did not decode as a usable image
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// External trainer reported or raised a failure
    #[error("Trainer error: {0}")]
    Trainer(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
