//! Error types for the audit chain.

use thiserror::Error;

/// Errors that can occur while recording or reading the audit log.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The storage backend failed to persist a record.
    #[error("storage error: {0}")]
    Storage(String),

    /// An entry could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A previous write failed; the chain refuses further appends.
    #[error("audit chain is poisoned after a failed write: {0}")]
    Poisoned(String),

    /// The chain has been closed.
    #[error("audit chain is closed")]
    Closed,

    /// The internal lock was poisoned by a panicking writer.
    #[error("audit chain lock poisoned")]
    LockPoisoned,

    /// A field could not be hashed and the mode makes that fatal.
    #[error("failed to hash {field}: {reason}")]
    HashingFailed {
        /// Field name (`args`, `kwargs` or `result`).
        field: &'static str,
        /// Why hashing failed.
        reason: String,
    },

    /// A log line could not be parsed as an entry.
    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord {
        /// One-based line number.
        line: u64,
        /// Parse error.
        reason: String,
    },

    /// An existing log failed replay and cannot be resumed.
    #[error("cannot resume audit log: {0}")]
    ResumeRefused(String),

    /// Sequence numbers ran out.
    #[error("sequence number overflow")]
    SequenceOverflow,

    /// Hashing or signing error.
    #[error("crypto error: {0}")]
    Crypto(#[from] tessera_crypto::CryptoError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
