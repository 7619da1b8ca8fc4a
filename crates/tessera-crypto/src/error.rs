//! Cryptographic error types.

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// RSA modulus below the accepted minimum.
    #[error("RSA key too small: {bits} bits (minimum {minimum})")]
    KeyTooSmall {
        /// Modulus size of the offending key.
        bits: usize,
        /// Minimum accepted modulus size.
        minimum: usize,
    },

    /// Invalid public key.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Invalid or undecryptable private key.
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// The private key is encrypted and no password was supplied.
    #[error("private key is encrypted but no password was provided")]
    PasswordRequired,

    /// The password does not decrypt the private key.
    #[error("wrong password for encrypted private key")]
    WrongPassword,

    /// No file at the given key path.
    #[error("key file not found: {0}")]
    KeyNotFound(String),

    /// Key generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Signing failed.
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// Signature verification failed.
    #[error("signature verification failed")]
    SignatureVerificationFailed,

    /// A detached signature names an algorithm this crate does not implement.
    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A detached signature was made over a different digest.
    #[error("digest mismatch: signature covers {signed}, content hashes to {actual}")]
    DigestMismatch {
        /// Digest recorded in the signature.
        signed: String,
        /// Digest of the content actually presented.
        actual: String,
    },

    /// Invalid hex encoding.
    #[error("invalid hex encoding")]
    InvalidHexEncoding,

    /// Invalid base64 encoding.
    #[error("invalid base64 encoding")]
    InvalidBase64Encoding,

    /// Malformed or unusable certificate.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// DER or PEM decoding error.
    #[error("DER error: {0}")]
    Der(#[from] der::Error),

    /// I/O error (e.g. reading/writing key files).
    #[error("I/O error: {0}")]
    IoError(String),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
