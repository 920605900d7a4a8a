//! Common error types for chorus

use thiserror::Error;

/// Common result type for chorus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the chorus daemons
#[derive(Error, Debug)]
pub enum Error {
    /// I/O or transport error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or out-of-bounds wire data
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
