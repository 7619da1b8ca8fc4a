//! RSA signatures and detached signature files.
//!
//! Every signable package member travels with a [`DetachedSignature`]: the
//! algorithm, the signer's key ID, the digest that was signed and the
//! signature bytes. Verification recomputes the member digest and checks both.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CryptoError, CryptoResult};
use crate::hash::ContentHash;
use crate::keypair::{KeyPair, PublicKey};

/// Algorithm identifier written into detached signatures.
pub const SIGNATURE_ALGORITHM: &str = "rsa-pss-sha256";

/// Raw RSA signature bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    /// Create from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encode as base64 string.
    #[must_use]
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(&self.0)
    }

    /// Decode from base64 string.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidBase64Encoding`] for invalid input.
    pub fn from_base64(s: &str) -> CryptoResult<Self> {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .map(Self)
            .map_err(|_| CryptoError::InvalidBase64Encoding)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(&self.0);
        write!(f, "Signature({}...)", hex.get(..16).unwrap_or(&hex))
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_base64(&s).map_err(serde::de::Error::custom)
    }
}

/// A signature stored next to the member it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachedSignature {
    /// Signature scheme, always [`SIGNATURE_ALGORITHM`] when written here.
    pub algorithm: String,
    /// Hex key ID of the signer.
    pub key_id: String,
    /// SHA-256 of the signed member.
    pub digest: ContentHash,
    /// Signature over `digest`.
    pub signature: Signature,
}

impl DetachedSignature {
    /// Sign a member digest.
    ///
    /// # Errors
    ///
    /// Returns a signing error from the key pair.
    pub fn create(keypair: &KeyPair, digest: ContentHash) -> CryptoResult<Self> {
        Ok(Self {
            algorithm: SIGNATURE_ALGORITHM.to_string(),
            key_id: keypair.key_id_hex(),
            signature: keypair.sign(&digest)?,
            digest,
        })
    }

    /// Check this signature against the digest of the member as found.
    ///
    /// # Errors
    ///
    /// - [`CryptoError::UnsupportedAlgorithm`] for unknown algorithms
    /// - [`CryptoError::DigestMismatch`] if the member changed after signing
    /// - [`CryptoError::SignatureVerificationFailed`] if the RSA check fails
    pub fn verify(&self, public_key: &PublicKey, actual_digest: &ContentHash) -> CryptoResult<()> {
        if self.algorithm != SIGNATURE_ALGORITHM {
            return Err(CryptoError::UnsupportedAlgorithm(self.algorithm.clone()));
        }
        if &self.digest != actual_digest {
            return Err(CryptoError::DigestMismatch {
                signed: self.digest.to_hex(),
                actual: actual_digest.to_hex(),
            });
        }
        if public_key.verify(&self.digest, &self.signature) {
            Ok(())
        } else {
            Err(CryptoError::SignatureVerificationFailed)
        }
    }

    /// Serialize to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::IoError`] if serialization fails.
    pub fn to_json(&self) -> CryptoResult<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| CryptoError::IoError(e.to_string()))
    }

    /// Parse from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::IoError`] for malformed documents.
    pub fn from_json(bytes: &[u8]) -> CryptoResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| CryptoError::IoError(e.to_string()))
    }
}
