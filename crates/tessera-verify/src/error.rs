//! Verification failure taxonomy.

use serde::Serialize;
use thiserror::Error;

/// A reason a package failed verification.
///
/// Failures are collected into a report, not returned early; a single run
/// may produce several of them.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityError {
    /// The container is unsafe, incomplete or unparseable.
    #[error("structural error: {0}")]
    Structural(String),

    /// The audit log does not replay.
    #[error("chain integrity error{}: {reason}", fmt_sequence(.sequence))]
    ChainIntegrity {
        /// First entry affected, when the failure is tied to one.
        sequence: Option<u64>,
        /// What went wrong.
        reason: String,
    },

    /// A signature or the signer does not check out.
    #[error("signature error on {component}: {reason}")]
    Signature {
        /// Member or signer aspect that failed.
        component: String,
        /// What went wrong.
        reason: String,
    },

    /// The timestamp token is malformed, grafted, mismatched or missing.
    #[error("timestamp error: {0}")]
    Timestamp(String),

    /// An artifact is missing, unlisted or altered.
    #[error("artifact error on {path}: {reason}")]
    Artifact {
        /// Archive name or external path.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// The verifier was asked to do something it cannot.
    #[error("configuration error: {0}")]
    Configuration(String),
}

#[allow(clippy::ref_option)]
fn fmt_sequence(sequence: &Option<u64>) -> String {
    sequence.map_or_else(String::new, |s| format!(" at sequence {s}"))
}

impl IntegrityError {
    pub(crate) fn chain(sequence: Option<u64>, reason: impl Into<String>) -> Self {
        Self::ChainIntegrity {
            sequence,
            reason: reason.into(),
        }
    }

    pub(crate) fn signature(component: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Signature {
            component: component.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn artifact(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Artifact {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Sequence number for chain failures.
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        match self {
            Self::ChainIntegrity { sequence, .. } => *sequence,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            IntegrityError::chain(Some(1), "hash mismatch").to_string(),
            "chain integrity error at sequence 1: hash mismatch"
        );
        assert_eq!(
            IntegrityError::chain(None, "log digest differs").to_string(),
            "chain integrity error: log digest differs"
        );
    }

    #[test]
    fn test_serializes_with_kind_tag() {
        let json = serde_json::to_value(IntegrityError::artifact("model.bin", "hash mismatch"))
            .unwrap();
        assert_eq!(json["kind"], "artifact");
        assert_eq!(json["path"], "model.bin");
    }
}
