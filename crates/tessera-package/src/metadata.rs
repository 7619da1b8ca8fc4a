//! Package metadata (`package.json`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_core::{FORMAT_VERSION, Mode, SessionId, Timestamp, Version};
use tessera_crypto::ContentHash;

use crate::error::{PackageError, PackageResult};
use crate::layout::METADATA;

/// Who signed the package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerInfo {
    /// Hex key ID of the signing key.
    pub key_id: String,
    /// Whether the key was generated for this session only.
    pub ephemeral: bool,
    /// Whether `certificate.pem` is included.
    pub has_certificate: bool,
}

/// Outcome of timestamping the log digest at seal time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TimestampStatus {
    /// No timestamp authority was configured.
    NotRequested,
    /// A token is stored in `audit_log.tsr`.
    Granted {
        /// Time asserted by the authority.
        gen_time: DateTime<Utc>,
        /// Authority endpoint.
        tsa_url: String,
        /// Token serial number, hex.
        serial: String,
    },
    /// The authority could not be used; the package carries no trusted time.
    Unavailable {
        /// What went wrong.
        reason: String,
    },
}

impl TimestampStatus {
    /// Short label for reports.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotRequested => "not_requested",
            Self::Granted { .. } => "granted",
            Self::Unavailable { .. } => "unavailable",
        }
    }
}

/// What kind of guarantee a session went without.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationKind {
    /// The timestamp authority failed.
    TimestampUnavailable,
    /// A field could not be hashed.
    HashFailed,
    /// An artifact could not be captured.
    ArtifactMissing,
    /// Git metadata could not be captured.
    GitUnavailable,
}

impl DegradationKind {
    /// Serialized name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TimestampUnavailable => "timestamp_unavailable",
            Self::HashFailed => "hash_failed",
            Self::ArtifactMissing => "artifact_missing",
            Self::GitUnavailable => "git_unavailable",
        }
    }
}

/// A recorded loss of integrity coverage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Degradation {
    /// What was lost.
    pub kind: DegradationKind,
    /// Details.
    pub detail: String,
    /// When it happened.
    pub at: Timestamp,
}

impl Degradation {
    /// A degradation happening now.
    #[must_use]
    pub fn now(kind: DegradationKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            at: Timestamp::now(),
        }
    }
}

/// Signed description of the whole package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Package layout version.
    pub format_version: u32,
    /// Producing tool version.
    pub tool_version: Version,
    /// Session that produced the package.
    pub session_id: SessionId,
    /// Integrity mode the session ran under.
    pub mode: Mode,
    /// When the session started.
    pub started_at: Timestamp,
    /// When the package was sealed.
    pub sealed_at: Timestamp,
    /// Entries in the audit log.
    pub entry_count: u64,
    /// `entry_hash` of the last entry.
    pub chain_head: ContentHash,
    /// SHA-256 of `audit_log.ndjson`.
    pub log_digest: ContentHash,
    /// Signing identity.
    pub signer: SignerInfo,
    /// Timestamp outcome.
    pub timestamp: TimestampStatus,
    /// Captured artifact count.
    pub artifact_count: usize,
    /// Whether `git_metadata.json` was captured and signed.
    #[serde(default)]
    pub has_git_metadata: bool,
    /// Recorded losses of integrity coverage.
    #[serde(default)]
    pub degradations: Vec<Degradation>,
}

impl PackageMetadata {
    /// Whether the session ran with every guarantee intact.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    /// Serialize to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::InvalidMember`] if serialization fails.
    pub fn to_json(&self) -> PackageResult<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| PackageError::InvalidMember {
            member: METADATA.to_string(),
            reason: e.to_string(),
        })
    }

    /// Parse from JSON and check the format version.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::InvalidMember`] for malformed documents and
    /// [`PackageError::UnsupportedFormat`] for other layout versions.
    pub fn from_json(bytes: &[u8]) -> PackageResult<Self> {
        let metadata: Self =
            serde_json::from_slice(bytes).map_err(|e| PackageError::InvalidMember {
                member: METADATA.to_string(),
                reason: e.to_string(),
            })?;
        if metadata.format_version != FORMAT_VERSION {
            return Err(PackageError::UnsupportedFormat {
                found: metadata.format_version,
                expected: FORMAT_VERSION,
            });
        }
        Ok(metadata)
    }
}
