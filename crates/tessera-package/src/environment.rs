//! Environment snapshot (`environment.json`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tessera_core::{FORMAT_VERSION, Timestamp, Version};

use crate::error::{PackageError, PackageResult};
use crate::layout::ENVIRONMENT;

/// Name of the producing tool, as recorded in snapshots.
pub const TOOL_NAME: &str = "tessera";

/// Where a session ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    /// Producing tool.
    pub tool_name: String,
    /// Producing tool version.
    pub tool_version: Version,
    /// Package format version.
    pub format_version: u32,
    /// Operating system (`linux`, `macos`, ...).
    pub os: String,
    /// OS family (`unix`, `windows`).
    pub os_family: String,
    /// CPU architecture.
    pub arch: String,
    /// Logical CPUs available to the process.
    pub cpu_count: usize,
    /// When the snapshot was taken.
    pub captured_at: Timestamp,
    /// Caller-supplied facts (dependency lock digests, dataset versions).
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// A field that differs between a snapshot and the running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentMismatch {
    /// Field name.
    pub field: &'static str,
    /// Value in the snapshot.
    pub recorded: String,
    /// Value now.
    pub current: String,
}

impl std::fmt::Display for EnvironmentMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: recorded {}, running {}",
            self.field, self.recorded, self.current
        )
    }
}

impl EnvironmentSnapshot {
    /// Snapshot the running process.
    #[must_use]
    pub fn capture() -> Self {
        Self {
            tool_name: TOOL_NAME.to_string(),
            tool_version: Version::current(),
            format_version: FORMAT_VERSION,
            os: std::env::consts::OS.to_string(),
            os_family: std::env::consts::FAMILY.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpu_count: std::thread::available_parallelism().map_or(1, std::num::NonZero::get),
            captured_at: Timestamp::now(),
            extra: BTreeMap::new(),
        }
    }

    /// Add caller-supplied facts.
    #[must_use]
    pub fn with_extra(mut self, extra: BTreeMap<String, String>) -> Self {
        self.extra.extend(extra);
        self
    }

    /// Compare tool version, OS and architecture with the running process.
    #[must_use]
    pub fn compare_with_current(&self) -> Vec<EnvironmentMismatch> {
        let current = Self::capture();
        let mut mismatches = Vec::new();
        let mut check = |field, recorded: String, now: String| {
            if recorded != now {
                mismatches.push(EnvironmentMismatch {
                    field,
                    recorded,
                    current: now,
                });
            }
        };
        check(
            "tool_version",
            self.tool_version.to_string(),
            current.tool_version.to_string(),
        );
        check("os", self.os.clone(), current.os);
        check("arch", self.arch.clone(), current.arch);
        mismatches
    }

    /// Flatten into `key -> value` strings for comparison.
    #[must_use]
    pub fn to_flat_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::from([
            ("tool_name".to_string(), self.tool_name.clone()),
            ("tool_version".to_string(), self.tool_version.to_string()),
            ("format_version".to_string(), self.format_version.to_string()),
            ("os".to_string(), self.os.clone()),
            ("os_family".to_string(), self.os_family.clone()),
            ("arch".to_string(), self.arch.clone()),
            ("cpu_count".to_string(), self.cpu_count.to_string()),
        ]);
        for (key, value) in &self.extra {
            map.insert(format!("extra.{key}"), value.clone());
        }
        map
    }

    /// Serialize to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::InvalidMember`] if serialization fails.
    pub fn to_json(&self) -> PackageResult<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| PackageError::InvalidMember {
            member: ENVIRONMENT.to_string(),
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
            member: ENVIRONMENT.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_capture_matches_current() {
        let snapshot = EnvironmentSnapshot::capture();
        assert_eq!(snapshot.tool_name, TOOL_NAME);
        assert!(snapshot.cpu_count >= 1);
        assert!(snapshot.compare_with_current().is_empty());
    }

    #[test]
    fn test_mismatches_are_reported() {
        let mut snapshot = EnvironmentSnapshot::capture();
        snapshot.os = "plan9".into();
        snapshot.tool_version = Version::new(99, 0, 0);

        let mismatches = snapshot.compare_with_current();
        let fields: Vec<_> = mismatches.iter().map(|m| m.field).collect();
        assert_eq!(fields, ["tool_version", "os"]);
        assert!(mismatches[1].to_string().starts_with("os: recorded plan9"));
    }

    #[test]
    fn test_flat_map_includes_extra() {
        let snapshot = EnvironmentSnapshot::capture()
            .with_extra(BTreeMap::from([("dataset".to_string(), "v3".to_string())]));
        let map = snapshot.to_flat_map();
        assert_eq!(map.get("extra.dataset").map(String::as_str), Some("v3"));

        let parsed = EnvironmentSnapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(parsed, snapshot);
    }
}
