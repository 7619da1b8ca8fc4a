//! Git metadata (`git_metadata.json`).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

use crate::error::{PackageError, PackageResult};
use crate::layout::GIT_METADATA;

/// Longest diff kept in the snapshot, in bytes.
pub const MAX_DIFF_BYTES: usize = 1024 * 1024;

/// State of the repository a session ran in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitMetadata {
    /// `HEAD` commit.
    pub commit_sha: String,
    /// Current branch (`HEAD` when detached).
    pub branch: String,
    /// Whether the work tree had uncommitted changes.
    pub is_dirty: bool,
    /// Uncommitted diff, empty when clean.
    #[serde(default)]
    pub diff: String,
    /// Whether `diff` was cut at [`MAX_DIFF_BYTES`].
    #[serde(default)]
    pub diff_truncated: bool,
}

fn git(dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

impl GitMetadata {
    /// Capture metadata for the repository containing `dir`.
    ///
    /// Returns `None` when `git` is unavailable or `dir` is not inside a work tree.
    #[must_use]
    pub fn capture(dir: &Path) -> Option<Self> {
        let inside = git(dir, &["rev-parse", "--is-inside-work-tree"])?;
        if inside.trim() != "true" {
            return None;
        }

        let Some(commit_sha) = git(dir, &["rev-parse", "HEAD"]) else {
            warn!(dir = %dir.display(), "Repository has no commits, skipping git metadata");
            return None;
        };
        let branch = git(dir, &["rev-parse", "--abbrev-ref", "HEAD"]).unwrap_or_default();
        let status = git(dir, &["status", "--porcelain"]).unwrap_or_default();
        let is_dirty = !status.trim().is_empty();

        let mut diff = if is_dirty {
            git(dir, &["diff", "HEAD"]).unwrap_or_default()
        } else {
            String::new()
        };
        let diff_truncated = diff.len() > MAX_DIFF_BYTES;
        if diff_truncated {
            let mut cut = MAX_DIFF_BYTES;
            while !diff.is_char_boundary(cut) {
                cut = cut.saturating_sub(1);
            }
            diff.truncate(cut);
        }

        let metadata = Self {
            commit_sha: commit_sha.trim().to_string(),
            branch: branch.trim().to_string(),
            is_dirty,
            diff,
            diff_truncated,
        };
        debug!(
            commit = %metadata.commit_sha,
            branch = %metadata.branch,
            dirty = metadata.is_dirty,
            "Captured git metadata"
        );
        Some(metadata)
    }

    /// Serialize to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::InvalidMember`] if serialization fails.
    pub fn to_json(&self) -> PackageResult<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| PackageError::InvalidMember {
            member: GIT_METADATA.to_string(),
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
            member: GIT_METADATA.to_string(),
            reason: e.to_string(),
        })
    }
}
