//! Audit entry types.
//!
//! One [`AuditEntry`] is one line of `audit_log.ndjson`. Each entry embeds the
//! hash of its predecessor, and its own `entry_hash` covers every other field
//! in a fixed, length-prefixed order, so editing any byte of any entry breaks
//! either that entry's hash or the link from its successor.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tessera_core::Timestamp;
use tessera_crypto::{ContentHash, ContentHasher};

use crate::error::{AuditError, AuditResult};

/// Previous-entry hash of the first entry in every chain.
pub const GENESIS_HASH: ContentHash = ContentHash::zero();

/// Domain tag mixed into every entry hash.
pub const ENTRY_HASH_DOMAIN: &str = "tessera.audit-entry.v1";

/// What kind of event an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A wrapped function call.
    Call,
    /// A free-form key/value annotation.
    Annotate,
    /// An external file whose hash was recorded but whose bytes were not captured.
    TrackFile,
    /// A file copied into the package.
    ArtifactCaptured,
    /// The session opened.
    SessionStarted,
    /// The session continued without some integrity guarantee.
    SessionDegraded,
    /// The session sealed its log.
    SessionClosed,
}

impl AuditAction {
    /// Stable name, identical to the serialized form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Annotate => "annotate",
            Self::TrackFile => "track_file",
            Self::ArtifactCaptured => "artifact_captured",
            Self::SessionStarted => "session_started",
            Self::SessionDegraded => "session_degraded",
            Self::SessionClosed => "session_closed",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single hash-chained audit log entry.
///
/// Field hashes are `None` when hashing was skipped (light mode) or failed in
/// normal mode; the failure reason is then kept in `extra_hashes` under
/// `<field>_hash_error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditEntry {
    /// Zero-based position in the chain.
    pub sequence_number: u64,
    /// When the entry was appended.
    pub timestamp: Timestamp,
    /// Kind of event.
    pub action: AuditAction,
    /// Function name, annotation marker or file path.
    pub target: String,
    /// Truncated representations of positional arguments.
    #[serde(default)]
    pub args_repr: Vec<String>,
    /// Truncated representations of keyword arguments.
    #[serde(default)]
    pub kwargs_repr: BTreeMap<String, String>,
    /// Truncated representation of the result, if any.
    pub result_repr: Option<String>,
    /// Digest of the full positional arguments.
    pub args_hash: Option<ContentHash>,
    /// Digest of the full keyword arguments.
    pub kwargs_hash: Option<ContentHash>,
    /// Digest of the full result.
    pub result_hash: Option<ContentHash>,
    /// Additional named digests and hashing diagnostics.
    #[serde(default)]
    pub extra_hashes: BTreeMap<String, String>,
    /// `entry_hash` of the preceding entry, or [`GENESIS_HASH`].
    pub previous_entry_hash: ContentHash,
    /// Hash over every field above.
    pub entry_hash: ContentHash,
}

impl AuditEntry {
    /// Recompute the entry hash from the entry's contents.
    ///
    /// The stored `entry_hash` is not an input.
    #[must_use]
    pub fn compute_hash(&self) -> ContentHash {
        let mut hasher = ContentHasher::with_domain(ENTRY_HASH_DOMAIN);
        hasher.update_u64(self.sequence_number);
        hasher.update_len_prefixed(self.timestamp.to_canonical().as_bytes());
        hasher.update_len_prefixed(self.action.as_str().as_bytes());
        hasher.update_len_prefixed(self.target.as_bytes());

        hasher.update_u64(self.args_repr.len() as u64);
        for arg in &self.args_repr {
            hasher.update_len_prefixed(arg.as_bytes());
        }

        hasher.update_u64(self.kwargs_repr.len() as u64);
        for (key, value) in &self.kwargs_repr {
            hasher.update_len_prefixed(key.as_bytes());
            hasher.update_len_prefixed(value.as_bytes());
        }

        match &self.result_repr {
            Some(result) => {
                hasher.update(&[1]);
                hasher.update_len_prefixed(result.as_bytes());
            },
            None => hasher.update(&[0]),
        }

        for digest in [&self.args_hash, &self.kwargs_hash, &self.result_hash] {
            match digest {
                Some(digest) => {
                    hasher.update(&[1]);
                    hasher.update(digest.as_bytes());
                },
                None => hasher.update(&[0]),
            }
        }

        hasher.update_u64(self.extra_hashes.len() as u64);
        for (key, value) in &self.extra_hashes {
            hasher.update_len_prefixed(key.as_bytes());
            hasher.update_len_prefixed(value.as_bytes());
        }

        hasher.update(self.previous_entry_hash.as_bytes());
        hasher.finalize()
    }

    /// Whether the stored hash matches the contents.
    #[must_use]
    pub fn verify_hash(&self) -> bool {
        self.compute_hash() == self.entry_hash
    }

    /// Whether this entry directly follows `previous`.
    #[must_use]
    pub fn follows(&self, previous: &AuditEntry) -> bool {
        self.previous_entry_hash == previous.entry_hash
            && previous.sequence_number.checked_add(1) == Some(self.sequence_number)
    }

    /// Whether this is the first entry of a chain.
    #[must_use]
    pub fn is_genesis(&self) -> bool {
        self.sequence_number == 0 && self.previous_entry_hash == GENESIS_HASH
    }

    /// Serialize as one NDJSON line, newline included.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Serialization`] if the entry cannot be encoded.
    pub fn to_ndjson_line(&self) -> AuditResult<Vec<u8>> {
        let mut line =
            serde_json::to_vec(self).map_err(|e| AuditError::Serialization(e.to_string()))?;
        line.push(b'\n');
        Ok(line)
    }

    /// Parse one NDJSON line (trailing newline optional).
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::MalformedRecord`] with the given line number.
    pub fn from_ndjson_line(bytes: &[u8], line: u64) -> AuditResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| AuditError::MalformedRecord {
            line,
            reason: e.to_string(),
        })
    }
}
