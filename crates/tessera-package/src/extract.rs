//! Safe ZIP extraction with path traversal protection.
//!
//! Extraction runs in two passes. The first pass reads only the central
//! directory and rejects the whole archive before a single byte is written if
//! any entry is unsafe:
//! - Path traversal (`../` components), absolute paths, drive prefixes
//! - Symlinks and other non-regular entry types
//! - Excessive entry counts or total size (zip bomb protection)
//!
//! The second pass creates each file with `create_new` and `O_NOFOLLOW`, and
//! never writes more bytes than the entry declared.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

use crate::error::{PackageError, PackageResult};
use crate::fsutil::create_new_nofollow;
use crate::name::{check_archive_name, join_checked};

/// Maximum number of entries allowed in a package.
pub const MAX_ENTRY_COUNT: usize = 10_000;

/// Maximum total extracted size (16 GiB).
pub const MAX_EXTRACTED_SIZE: u64 = 16 * 1024 * 1024 * 1024;

const S_IFMT: u32 = 0o170_000;
const S_IFREG: u32 = 0o100_000;
const S_IFDIR: u32 = 0o040_000;
const S_IFLNK: u32 = 0o120_000;

/// Extraction limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractLimits {
    /// Maximum number of entries.
    pub max_entries: usize,
    /// Maximum sum of uncompressed sizes.
    pub max_total_size: u64,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_entries: MAX_ENTRY_COUNT,
            max_total_size: MAX_EXTRACTED_SIZE,
        }
    }
}

/// A file written by [`extract_archive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMember {
    /// Name inside the archive.
    pub name: String,
    /// Where it was written.
    pub path: PathBuf,
    /// Bytes written.
    pub size: u64,
}

struct PlannedEntry {
    index: usize,
    name: String,
    size: u64,
}

fn unsafe_entry(name: &str, reason: impl Into<String>) -> PackageError {
    PackageError::UnsafeEntry {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Extract `archive` into the empty directory `dest`.
///
/// # Errors
///
/// - [`PackageError::UnsafeEntry`] for traversal, symlink, special or
///   duplicate entries; nothing has been written in that case
/// - [`PackageError::LimitExceeded`] for too many or too large entries
/// - [`PackageError::Archive`] for a corrupt container or CRC failure
pub fn extract_archive(
    archive: &Path,
    dest: &Path,
    limits: &ExtractLimits,
) -> PackageResult<Vec<ExtractedMember>> {
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    let plan = plan_extraction(&mut zip, limits)?;

    let mut extracted = Vec::with_capacity(plan.len());
    let mut total: u64 = 0;
    for entry in plan {
        let target = join_checked(dest, &entry.name).map_err(|r| unsafe_entry(&entry.name, r))?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let out = create_new_nofollow(&target).map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                unsafe_entry(&entry.name, "collides with an existing path")
            } else {
                PackageError::Io(e)
            }
        })?;
        let mut writer = BufWriter::new(out);
        let mut file = zip.by_index(entry.index)?;
        let mut limited = (&mut file).take(entry.size.saturating_add(1));
        let written = io::copy(&mut limited, &mut writer)?;
        if written != entry.size {
            return Err(unsafe_entry(
                &entry.name,
                format!("declared {} bytes, contains {written}", entry.size),
            ));
        }
        writer.flush()?;

        total = total.saturating_add(written);
        if total > limits.max_total_size {
            return Err(PackageError::LimitExceeded(format!(
                "extracted size exceeds {} bytes",
                limits.max_total_size
            )));
        }
        extracted.push(ExtractedMember {
            name: entry.name,
            path: target,
            size: written,
        });
    }

    debug!(
        archive = %archive.display(),
        members = extracted.len(),
        bytes = total,
        "Extracted package"
    );
    Ok(extracted)
}

fn plan_extraction<R: Read + io::Seek>(
    zip: &mut ZipArchive<R>,
    limits: &ExtractLimits,
) -> PackageResult<Vec<PlannedEntry>> {
    if zip.len() > limits.max_entries {
        return Err(PackageError::LimitExceeded(format!(
            "archive has {} entries (maximum {})",
            zip.len(),
            limits.max_entries
        )));
    }

    let mut seen = BTreeSet::new();
    let mut plan = Vec::new();
    let mut total: u64 = 0;

    for index in 0..zip.len() {
        let entry = zip.by_index_raw(index)?;
        let raw_name = entry.name().to_string();
        let is_dir = raw_name.ends_with('/');
        let name = raw_name.trim_end_matches('/');

        check_archive_name(name).map_err(|r| unsafe_entry(&raw_name, r))?;
        if entry.enclosed_name().is_none() {
            return Err(unsafe_entry(&raw_name, "path escapes the archive root"));
        }

        match entry.unix_mode().map(|mode| mode & S_IFMT) {
            Some(S_IFLNK) => return Err(unsafe_entry(&raw_name, "symbolic link")),
            Some(S_IFDIR) if is_dir => {},
            Some(S_IFREG) if !is_dir => {},
            Some(0) | None => {},
            Some(other) => {
                return Err(unsafe_entry(
                    &raw_name,
                    format!("unsupported entry type {other:o}"),
                ));
            },
        }

        if !seen.insert(name.to_string()) {
            return Err(unsafe_entry(&raw_name, "duplicate entry"));
        }
        if is_dir {
            continue;
        }

        total = total.saturating_add(entry.size());
        if total > limits.max_total_size {
            return Err(PackageError::LimitExceeded(format!(
                "declared size exceeds {} bytes",
                limits.max_total_size
            )));
        }
        plan.push(PlannedEntry {
            index,
            name: name.to_string(),
            size: entry.size(),
        });
    }

    Ok(plan)
}
