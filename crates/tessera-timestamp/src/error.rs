//! Error types for timestamp operations.

use tessera_crypto::CryptoError;
use thiserror::Error;

/// Errors from requesting or verifying RFC 3161 timestamps.
#[derive(Debug, Error)]
pub enum TimestampError {
    /// The TSA URL could not be parsed or uses an unsupported scheme.
    #[error("invalid TSA URL: {0}")]
    InvalidUrl(String),

    /// The HTTP client could not be constructed.
    #[error("HTTP client setup failed: {0}")]
    ClientSetup(String),

    /// The TSA could not be reached after every retry.
    #[error("TSA unreachable after {attempts} attempt(s): {message}")]
    Unreachable {
        /// Attempts made.
        attempts: u32,
        /// Last transport error.
        message: String,
    },

    /// The TSA answered with a non-success HTTP status.
    #[error("TSA returned HTTP {0}")]
    HttpStatus(u16),

    /// The TSA response exceeded the size cap.
    #[error("TSA response exceeds {limit} bytes")]
    ResponseTooLarge {
        /// Maximum accepted size.
        limit: u64,
    },

    /// The TSA refused to issue a token.
    #[error("TSA rejected the request: {status} {text}")]
    Rejected {
        /// Reported PKI status.
        status: String,
        /// Free text from the TSA, empty if none.
        text: String,
    },

    /// The response or token is structurally invalid.
    #[error("malformed timestamp token: {0}")]
    Malformed(String),

    /// Low-level DER decoding or encoding failed.
    #[error("malformed timestamp token: {0}")]
    Der(#[from] der::Error),

    /// The token covers a different digest than expected.
    #[error("message imprint mismatch: token covers {token}, expected {expected}")]
    ImprintMismatch {
        /// Hex digest in the token.
        token: String,
        /// Hex digest expected.
        expected: String,
    },

    /// The imprint uses a hash other than SHA-256.
    #[error("unsupported imprint hash algorithm {0}")]
    UnsupportedImprintAlgorithm(String),

    /// The response nonce differs from the request nonce.
    #[error("nonce mismatch in TSA response")]
    NonceMismatch,

    /// Signed attributes do not bind the encapsulated content.
    #[error("signature grafting detected: {0}")]
    GraftingDetected(String),

    /// The CMS signature does not verify.
    #[error("timestamp signature invalid: {0}")]
    SignatureInvalid(String),

    /// No certificate matching the signer identifier is available.
    #[error("TSA certificate not found in token and none supplied")]
    CertificateNotFound,

    /// The TSA certificate cannot be used.
    #[error("TSA certificate rejected: {0}")]
    CertificateRejected(String),

    /// Crypto primitive failure.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Result type for timestamp operations.
pub type TimestampResult<T> = Result<T, TimestampError>;

impl TimestampError {
    /// Whether the error comes from the network and may be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable { .. } => true,
            Self::HttpStatus(code) => *code >= 500,
            _ => false,
        }
    }
}
