//! Core error types.

use thiserror::Error;

/// Errors raised while parsing core vocabulary.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Unknown mode name.
    #[error("unknown mode '{0}' (expected strict, normal or light)")]
    UnknownMode(String),

    /// Malformed version string.
    #[error("invalid version '{0}'")]
    InvalidVersion(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
