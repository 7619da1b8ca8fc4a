//! Artifact manifest (`artifacts.json`).

use serde::{Deserialize, Serialize};
use tessera_core::Timestamp;
use tessera_crypto::ContentHash;

use crate::error::{PackageError, PackageResult};
use crate::layout::ARTIFACTS;

/// A file captured into the package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Artifact {
    /// Name under `data/`.
    pub name: String,
    /// Bytes copied.
    pub size: u64,
    /// SHA-256 of the copied bytes.
    pub sha256: ContentHash,
    /// When the copy completed.
    pub captured_at: Timestamp,
}

/// Every captured artifact, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactManifest {
    /// Captured artifacts.
    pub artifacts: Vec<Artifact>,
}

impl ArtifactManifest {
    /// Build a manifest, sorting by name.
    #[must_use]
    pub fn new(mut artifacts: Vec<Artifact>) -> Self {
        artifacts.sort_by(|a, b| a.name.cmp(&b.name));
        Self { artifacts }
    }

    /// Look up an artifact by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.name == name)
    }

    /// Number of artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Whether no artifacts were captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Sum of artifact sizes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.artifacts
            .iter()
            .fold(0u64, |total, a| total.saturating_add(a.size))
    }

    /// Serialize to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::InvalidMember`] if serialization fails.
    pub fn to_json(&self) -> PackageResult<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| PackageError::InvalidMember {
            member: ARTIFACTS.to_string(),
            reason: e.to_string(),
        })
    }

    /// Parse from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::InvalidMember`] for malformed documents.
    pub fn from_json(bytes: &[u8]) -> PackageResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| PackageError::InvalidMember {
            member: ARTIFACTS.to_string(),
            reason: e.to_string(),
        })
    }
}

/// A file hashed in place and recorded in the log, but not bundled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    /// Path as given.
    pub path: std::path::PathBuf,
    /// Bytes hashed.
    pub size: u64,
    /// SHA-256 of the file.
    pub sha256: ContentHash,
}
