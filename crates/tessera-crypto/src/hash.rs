//! Content hashing using SHA-256.
//!
//! SHA-256 is part of the package wire contract: audit chain links, detached
//! signatures, artifact manifests and timestamp imprints all use it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read};
use std::path::Path;

/// Fixed read size for streaming digests.
///
/// Every streamed hash (capture, signing, verification) reads through a
/// buffer of exactly this size, so memory use does not depend on input size.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// A SHA-256 content hash (32 bytes).
///
/// Used for:
/// - Audit chain linking (each entry hashes the previous)
/// - Digests covered by detached signatures
/// - Artifact manifests and timestamp imprints
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash arbitrary data.
    #[must_use]
    pub fn hash(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Hash multiple data chunks (concatenated).
    #[must_use]
    pub fn hash_multi(parts: &[&[u8]]) -> Self {
        let mut hasher = ContentHasher::new();
        for part in parts {
            hasher.update(part);
        }
        hasher.finalize()
    }

    /// Hash everything a reader yields, in [`CHUNK_SIZE`] pieces.
    ///
    /// Returns the digest and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised by the reader other than `Interrupted`.
    pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<(Self, u64)> {
        let mut hasher = ContentHasher::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut total: u64 = 0;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buf[..n]);
            total = total.saturating_add(u64::try_from(n).unwrap_or(u64::MAX));
        }
        Ok((hasher.finalize(), total))
    }

    /// Hash a file through the streaming path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    pub fn hash_file(path: impl AsRef<Path>) -> io::Result<(Self, u64)> {
        let file = std::fs::File::open(path)?;
        Self::hash_reader(file)
    }

    /// Create a zero hash (used as the chain genesis).
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Check if this is the zero hash.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Get the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Try to create from a slice.
    ///
    /// Returns `None` if the slice is not exactly 32 bytes.
    #[must_use]
    pub fn try_from_slice(slice: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(slice).ok().map(Self)
    }

    /// Encode as hex string.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decode from hex string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid hex or not 32 bytes.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        Self::try_from_slice(&bytes).ok_or(hex::FromHexError::InvalidStringLength)
    }

    /// Encode as base64 string.
    #[must_use]
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    /// Create a hash with a prefix (for domain separation).
    ///
    /// # Example
    ///
    /// ```
    /// use tessera_crypto::ContentHash;
    ///
    /// let hash = ContentHash::hash_with_domain("audit-entry", b"data");
    /// assert_ne!(hash, ContentHash::hash(b"data"));
    /// ```
    #[must_use]
    pub fn hash_with_domain(domain: &str, data: &[u8]) -> Self {
        let mut hasher = ContentHasher::with_domain(domain);
        hasher.update(data);
        hasher.finalize()
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl Default for ContentHash {
    fn default() -> Self {
        Self::zero()
    }
}

impl AsRef<[u8]> for ContentHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for ContentHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<ContentHash> for [u8; 32] {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

/// Incremental SHA-256 hasher producing a [`ContentHash`].
#[derive(Clone, Default)]
pub struct ContentHasher(Sha256);

impl ContentHasher {
    /// Start an empty digest.
    #[must_use]
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    /// Start a digest bound to a domain label.
    ///
    /// The label is length-prefixed so no two domains can collide.
    #[must_use]
    pub fn with_domain(domain: &str) -> Self {
        let mut hasher = Self::new();
        hasher.update_len_prefixed(domain.as_bytes());
        hasher
    }

    /// Feed raw bytes.
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Feed bytes preceded by their little-endian `u64` length.
    pub fn update_len_prefixed(&mut self, data: &[u8]) {
        self.update_u64(u64::try_from(data.len()).unwrap_or(u64::MAX));
        self.0.update(data);
    }

    /// Feed a little-endian `u64`.
    pub fn update_u64(&mut self, value: u64) {
        self.0.update(value.to_le_bytes());
    }

    /// Finish and return the digest.
    #[must_use]
    pub fn finalize(self) -> ContentHash {
        ContentHash(self.0.finalize().into())
    }
}

impl fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentHasher").finish_non_exhaustive()
    }
}
