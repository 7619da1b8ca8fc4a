//! Error types for recording sessions.

use thiserror::Error;

/// Errors that can occur while running or sealing a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session cannot run as configured. Raised before any work is done.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The audit chain refused an append.
    #[error("audit error: {0}")]
    Audit(#[from] tessera_audit::AuditError),

    /// An artifact could not be captured or tracked.
    #[error("artifact error: {0}")]
    Artifact(#[from] tessera_package::ArtifactError),

    /// The package could not be assembled.
    #[error("package error: {0}")]
    Package(#[from] tessera_package::PackageError),

    /// The timestamp authority failed and the mode requires a token.
    #[error("timestamp error: {0}")]
    Timestamp(#[from] tessera_timestamp::TimestampError),

    /// Key material could not be loaded.
    #[error("crypto error: {0}")]
    Crypto(#[from] tessera_crypto::CryptoError),

    /// The sealed package failed its own verification and was removed.
    #[error("sealed package failed verification: {0}")]
    SelfCheckFailed(String),

    /// The degradation list lock was poisoned.
    #[error("session lock poisoned")]
    LockPoisoned,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
