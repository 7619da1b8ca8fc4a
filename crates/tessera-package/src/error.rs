//! Error types for artifact capture and package I/O.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while capturing or tracking a file.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The archive name is unusable.
    #[error("invalid artifact name {name:?}: {reason}")]
    InvalidName {
        /// Offending name.
        name: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The source path is a symbolic link.
    #[error("refusing to follow symlink: {}", .0.display())]
    SymlinkRejected(PathBuf),

    /// The source is a directory, device, FIFO or socket.
    #[error("not a regular file: {}", .0.display())]
    NotRegularFile(PathBuf),

    /// The source does not exist.
    #[error("file not found: {}", .0.display())]
    Missing(PathBuf),

    /// The source is larger than the configured maximum.
    #[error("{} exceeds the maximum artifact size of {limit} bytes", .path.display())]
    SizeExceeded {
        /// Source path.
        path: PathBuf,
        /// Configured limit.
        limit: u64,
    },

    /// An artifact with this name was already registered.
    #[error("duplicate artifact name: {0}")]
    DuplicateName(String),

    /// The guard lock was poisoned.
    #[error("artifact registry lock poisoned")]
    LockPoisoned,

    /// Reading the source or writing the staged copy failed.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl ArtifactError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for artifact operations.
pub type ArtifactResult<T> = Result<T, ArtifactError>;

/// Errors raised while writing or opening a package.
#[derive(Debug, Error)]
pub enum PackageError {
    /// The container itself is unreadable or not a ZIP archive.
    #[error("archive error: {0}")]
    Archive(String),

    /// A member name or type is unsafe to extract.
    #[error("unsafe archive entry {name:?}: {reason}")]
    UnsafeEntry {
        /// Entry name as stored.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The archive exceeds an extraction limit.
    #[error("archive exceeds limit: {0}")]
    LimitExceeded(String),

    /// A required member is absent.
    #[error("missing package member: {0}")]
    MissingMember(String),

    /// A JSON member does not parse.
    #[error("invalid {member}: {reason}")]
    InvalidMember {
        /// Member name.
        member: String,
        /// Parse error.
        reason: String,
    },

    /// The package was written by an incompatible format version.
    #[error("unsupported package format version {found} (expected {expected})")]
    UnsupportedFormat {
        /// Version in `package.json`.
        found: u32,
        /// Version this build reads.
        expected: u32,
    },

    /// Artifact capture error.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// Signing error.
    #[error("crypto error: {0}")]
    Crypto(#[from] tessera_crypto::CryptoError),

    /// Audit log error.
    #[error("audit error: {0}")]
    Audit(#[from] tessera_audit::AuditError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<zip::result::ZipError> for PackageError {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(e) => Self::Io(e),
            other => Self::Archive(other.to_string()),
        }
    }
}

impl From<tempfile::PersistError> for PackageError {
    fn from(e: tempfile::PersistError) -> Self {
        Self::Io(e.error)
    }
}

/// Result type for package operations.
pub type PackageResult<T> = Result<T, PackageError>;
