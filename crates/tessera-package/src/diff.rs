//! Comparing two packages.
//!
//! The comparison covers environment keys, the sequence of logged operations
//! and artifact hashes. Both logs are streamed side by side, so memory use
//! does not grow with log length.

use std::collections::{BTreeMap, BTreeSet};
use tessera_audit::{AuditAction, LogRecord};
use tessera_crypto::ContentHash;

use crate::error::PackageResult;
use crate::reader::OpenedPackage;

/// Operation mismatches kept in a [`LogDiff`]; the rest are only counted.
pub const MAX_REPORTED_MISMATCHES: usize = 5;

/// An environment key whose value differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentChange {
    /// Flattened key.
    pub key: String,
    /// Value in the first package, if present.
    pub left: Option<String>,
    /// Value in the second package, if present.
    pub right: Option<String>,
}

/// One position where the logged operations differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationMismatch {
    /// Zero-based position in the log.
    pub index: u64,
    /// `action target` in the first package, if it has that many entries.
    pub left: Option<String>,
    /// `action target` in the second package, if it has that many entries.
    pub right: Option<String>,
}

/// Differences between two audit logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogDiff {
    /// Entries in the first log.
    pub left_count: u64,
    /// Entries in the second log.
    pub right_count: u64,
    /// Total positions that differ.
    pub mismatch_count: u64,
    /// The first few differing positions.
    pub mismatches: Vec<OperationMismatch>,
}

/// How an artifact differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactChange {
    /// Only in the second package.
    Added {
        /// Artifact name.
        name: String,
    },
    /// Only in the first package.
    Removed {
        /// Artifact name.
        name: String,
    },
    /// In both, with different contents.
    Modified {
        /// Artifact name.
        name: String,
        /// Hash in the first package.
        left: ContentHash,
        /// Hash in the second package.
        right: ContentHash,
    },
}

/// Everything that differs between two packages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageDiff {
    /// Environment differences.
    pub environment: Vec<EnvironmentChange>,
    /// Log differences.
    pub log: LogDiff,
    /// Artifact differences.
    pub artifacts: Vec<ArtifactChange>,
}

impl PackageDiff {
    /// Whether the packages record the same environment, operations and artifacts.
    #[must_use]
    pub fn is_identical(&self) -> bool {
        self.environment.is_empty() && self.log.mismatch_count == 0 && self.artifacts.is_empty()
    }
}

/// Environment keys that always differ between two runs.
const VOLATILE_KEYS: &[&str] = &["captured_at"];

/// Compare two opened packages.
///
/// # Errors
///
/// Returns an error if either package is missing a member or a member does
/// not parse.
pub fn diff_packages(left: &OpenedPackage, right: &OpenedPackage) -> PackageResult<PackageDiff> {
    Ok(PackageDiff {
        environment: diff_environment(left, right)?,
        log: diff_logs(left, right)?,
        artifacts: diff_artifacts(left, right)?,
    })
}

fn diff_environment(
    left: &OpenedPackage,
    right: &OpenedPackage,
) -> PackageResult<Vec<EnvironmentChange>> {
    let left = left.environment()?.to_flat_map();
    let right = right.environment()?.to_flat_map();
    let keys: BTreeSet<&String> = left.keys().chain(right.keys()).collect();

    Ok(keys
        .into_iter()
        .filter(|key| !VOLATILE_KEYS.contains(&key.as_str()))
        .filter(|key| left.get(*key) != right.get(*key))
        .map(|key| EnvironmentChange {
            key: key.clone(),
            left: left.get(key).cloned(),
            right: right.get(key).cloned(),
        })
        .collect())
}

fn operation(record: Option<std::io::Result<LogRecord>>) -> PackageResult<Option<String>> {
    Ok(match record.transpose()? {
        // Session bookkeeping targets are the session id.
        Some(LogRecord::Entry(entry))
            if matches!(
                entry.action,
                AuditAction::SessionStarted | AuditAction::SessionClosed
            ) =>
        {
            Some(entry.action.to_string())
        },
        Some(LogRecord::Entry(entry)) => Some(format!("{} {}", entry.action, entry.target)),
        Some(LogRecord::Malformed { line, .. }) => Some(format!("<malformed line {line}>")),
        Some(LogRecord::TruncatedTail { line, .. }) => Some(format!("<truncated line {line}>")),
        None => None,
    })
}

fn diff_logs(left: &OpenedPackage, right: &OpenedPackage) -> PackageResult<LogDiff> {
    let mut left_entries = left.entries()?;
    let mut right_entries = right.entries()?;
    let mut diff = LogDiff::default();
    let mut index: u64 = 0;

    loop {
        let a = operation(left_entries.next())?;
        let b = operation(right_entries.next())?;
        if a.is_none() && b.is_none() {
            break;
        }
        if a.is_some() {
            diff.left_count = diff.left_count.saturating_add(1);
        }
        if b.is_some() {
            diff.right_count = diff.right_count.saturating_add(1);
        }
        if a != b {
            diff.mismatch_count = diff.mismatch_count.saturating_add(1);
            if diff.mismatches.len() < MAX_REPORTED_MISMATCHES {
                diff.mismatches.push(OperationMismatch {
                    index,
                    left: a,
                    right: b,
                });
            }
        }
        index = index.saturating_add(1);
    }

    Ok(diff)
}

fn diff_artifacts(
    left: &OpenedPackage,
    right: &OpenedPackage,
) -> PackageResult<Vec<ArtifactChange>> {
    let hashes = |package: &OpenedPackage| -> PackageResult<BTreeMap<String, ContentHash>> {
        Ok(package
            .artifacts()?
            .artifacts
            .into_iter()
            .map(|a| (a.name, a.sha256))
            .collect())
    };
    let left = hashes(left)?;
    let right = hashes(right)?;

    let mut changes = Vec::new();
    for (name, left_hash) in &left {
        match right.get(name) {
            None => changes.push(ArtifactChange::Removed { name: name.clone() }),
            Some(right_hash) if right_hash != left_hash => {
                changes.push(ArtifactChange::Modified {
                    name: name.clone(),
                    left: *left_hash,
                    right: *right_hash,
                });
            },
            Some(_) => {},
        }
    }
    for name in right.keys().filter(|name| !left.contains_key(*name)) {
        changes.push(ArtifactChange::Added { name: name.clone() });
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::PackageReader;
    use crate::testing::{try_build_package, write_artifact};
    use tessera_test::test_dir;

    #[test]
    fn test_same_inputs_are_identical() {
        let dir = test_dir();
        let artifact = write_artifact(dir.path(), "model.bin", b"weights");
        let a = try_build_package(dir.path(), &[artifact.as_path()], &dir.path().join("a.zip"))
            .unwrap();
        let b = try_build_package(dir.path(), &[artifact.as_path()], &dir.path().join("b.zip"))
            .unwrap();

        let diff = diff_packages(
            &PackageReader::open(&a.path).unwrap(),
            &PackageReader::open(&b.path).unwrap(),
        )
        .unwrap();
        assert!(diff.is_identical(), "{diff:?}");
        assert_eq!(diff.log.left_count, 2);
    }

    #[test]
    fn test_artifact_changes() {
        let dir = test_dir();
        let first = write_artifact(dir.path(), "model.bin", b"weights v1");
        let kept = write_artifact(dir.path(), "config.toml", b"lr = 0.1");
        let a = try_build_package(
            dir.path(),
            &[first.as_path(), kept.as_path()],
            &dir.path().join("a.zip"),
        )
        .unwrap();

        std::fs::write(&first, b"weights v2").unwrap();
        let added = write_artifact(dir.path(), "report.txt", b"done");
        let b = try_build_package(
            dir.path(),
            &[first.as_path(), added.as_path()],
            &dir.path().join("b.zip"),
        )
        .unwrap();

        let diff = diff_packages(
            &PackageReader::open(&a.path).unwrap(),
            &PackageReader::open(&b.path).unwrap(),
        )
        .unwrap();
        assert!(!diff.is_identical());
        assert_eq!(
            diff.artifacts,
            vec![
                ArtifactChange::Removed {
                    name: "config.toml".into()
                },
                ArtifactChange::Modified {
                    name: "model.bin".into(),
                    left: ContentHash::hash(b"weights v1"),
                    right: ContentHash::hash(b"weights v2"),
                },
                ArtifactChange::Added {
                    name: "report.txt".into()
                },
            ]
        );
        assert_eq!(diff.log.mismatch_count, 0);
    }
}
