//! The integrity mode switch.
//!
//! A single [`Mode`] value replaces scattered strictness booleans. It is
//! consulted only at a few decision points: how field hashing failures are
//! handled, whether timestamping is mandatory, whether ephemeral keys are
//! acceptable, and how the verifier grades soft gaps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Integrity mode for recording and verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Every integrity gap is a hard failure.
    #[default]
    Strict,
    /// Gaps such as an unreachable timestamp authority are downgraded to
    /// warnings, and the degradation is recorded inside the package.
    Normal,
    /// Like `Normal`, but argument and result hashing is skipped entirely.
    Light,
}

impl Mode {
    /// Whether a failure to hash a field aborts the append.
    #[must_use]
    pub fn hash_failure_is_fatal(self) -> bool {
        matches!(self, Self::Strict)
    }

    /// Whether field hashes are computed from representations at all.
    #[must_use]
    pub fn hashes_fields(self) -> bool {
        !matches!(self, Self::Light)
    }

    /// Whether a configured timestamp authority must succeed.
    #[must_use]
    pub fn timestamp_required(self) -> bool {
        matches!(self, Self::Strict)
    }

    /// Whether soft gaps fail verification instead of warning.
    #[must_use]
    pub fn is_strict(self) -> bool {
        matches!(self, Self::Strict)
    }

    /// Lowercase name, as used in configuration and package metadata.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Normal => "normal",
            Self::Light => "light",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "normal" => Ok(Self::Normal),
            "light" => Ok(Self::Light),
            other => Err(CoreError::UnknownMode(other.to_string())),
        }
    }
}
