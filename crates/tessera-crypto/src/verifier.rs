//! Signature verification with trusted key management.
//!
//! A package signature proves integrity on its own. It proves identity only
//! when the signing key is one the verifier already trusts.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{CryptoError, CryptoResult};
use crate::hash::ContentHash;
use crate::keypair::{KeyId, PublicKey};
use crate::signature::Signature;
use crate::x509::Certificate;

/// A registry of trusted public keys for signature verification.
///
/// # Example
///
/// ```no_run
/// use tessera_crypto::{ContentHash, KeyPair, SignatureVerifier};
///
/// let keypair = KeyPair::generate().unwrap();
/// let mut verifier = SignatureVerifier::new();
/// let key_id = verifier.add_trusted_key(keypair.public_key().clone());
///
/// let digest = ContentHash::hash(b"important data");
/// let signature = keypair.sign(&digest).unwrap();
/// assert!(verifier.verify(&key_id, &digest, &signature).is_ok());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SignatureVerifier {
    /// Map of key IDs to trusted public keys.
    trusted_keys: HashMap<KeyId, PublicKey>,
}

impl SignatureVerifier {
    /// Create a new empty signature verifier.
    #[must_use]
    pub fn new() -> Self {
        Self {
            trusted_keys: HashMap::new(),
        }
    }

    /// Add a public key to the trusted key set.
    ///
    /// Returns the key ID that can be used to reference this key later.
    pub fn add_trusted_key(&mut self, key: PublicKey) -> KeyId {
        let key_id = key.key_id();
        self.trusted_keys.insert(key_id, key);
        key_id
    }

    /// Trust the key in a PEM file holding a public key or a certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or holds no usable key.
    pub fn add_trusted_pem_file(&mut self, path: impl AsRef<Path>) -> CryptoResult<KeyId> {
        let pem = std::fs::read_to_string(path.as_ref())
            .map_err(|e| CryptoError::IoError(format!("{}: {e}", path.as_ref().display())))?;
        let key = if pem.contains("-----BEGIN CERTIFICATE-----") {
            Certificate::from_pem(&pem)?.public_key()?
        } else {
            PublicKey::from_pem(&pem)?
        };
        Ok(self.add_trusted_key(key))
    }

    /// Remove a public key from the trusted key set.
    ///
    /// Returns `true` if the key was present and removed, `false` otherwise.
    pub fn remove_trusted_key(&mut self, key_id: &KeyId) -> bool {
        self.trusted_keys.remove(key_id).is_some()
    }

    /// Check if a key ID is in the trusted key set.
    #[must_use]
    pub fn is_trusted(&self, key_id: &KeyId) -> bool {
        self.trusted_keys.contains_key(key_id)
    }

    /// Check whether exactly this key is trusted (not just its ID prefix).
    #[must_use]
    pub fn trusts(&self, key: &PublicKey) -> bool {
        self.trusted_keys.get(&key.key_id()) == Some(key)
    }

    /// Get a trusted public key by its ID.
    #[must_use]
    pub fn get_key(&self, key_id: &KeyId) -> Option<&PublicKey> {
        self.trusted_keys.get(key_id)
    }

    /// Get the number of trusted keys.
    #[must_use]
    pub fn trusted_key_count(&self) -> usize {
        self.trusted_keys.len()
    }

    /// True when no keys are trusted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trusted_keys.is_empty()
    }

    /// Verify a signature using a trusted key.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The key ID is not in the trusted key set
    /// - The signature verification fails
    pub fn verify(
        &self,
        key_id: &KeyId,
        digest: &ContentHash,
        signature: &Signature,
    ) -> CryptoResult<()> {
        let key = self.trusted_keys.get(key_id).ok_or_else(|| {
            CryptoError::InvalidPublicKey(format!("key {} not trusted", hex::encode(key_id)))
        })?;

        if key.verify(digest, signature) {
            Ok(())
        } else {
            Err(CryptoError::SignatureVerificationFailed)
        }
    }

    /// Verify a signature using any trusted key that matches.
    ///
    /// # Errors
    ///
    /// Returns an error if no trusted key can verify the signature.
    pub fn verify_any(&self, digest: &ContentHash, signature: &Signature) -> CryptoResult<KeyId> {
        self.trusted_keys
            .iter()
            .find(|(_, key)| key.verify(digest, signature))
            .map(|(key_id, _)| *key_id)
            .ok_or(CryptoError::SignatureVerificationFailed)
    }
}
