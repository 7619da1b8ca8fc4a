//! Archive name validation.
//!
//! The same rules apply when naming a captured artifact and when accepting
//! a member during extraction: names are relative, `/`-separated, and have
//! no empty, `.` or `..` components.

use std::path::{Component, Path, PathBuf};

/// Longest accepted archive name, in bytes.
pub const MAX_NAME_LEN: usize = 1024;

/// Check an archive name, returning why it is unsafe.
///
/// # Errors
///
/// Returns a short reason when the name is rejected.
pub fn check_archive_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("empty name");
    }
    if name.len() > MAX_NAME_LEN {
        return Err("name too long");
    }
    if name.contains('\0') {
        return Err("NUL byte in name");
    }
    if name.contains('\\') {
        return Err("backslash in name");
    }
    if name.starts_with('/') {
        return Err("absolute path");
    }
    if name.len() >= 2 && name.as_bytes()[1] == b':' {
        return Err("drive prefix");
    }
    for part in name.split('/') {
        match part {
            "" => return Err("empty path component"),
            "." => return Err("'.' path component"),
            ".." => return Err("parent directory component"),
            _ => {},
        }
    }
    for component in Path::new(name).components() {
        if !matches!(component, Component::Normal(_)) {
            return Err("non-normal path component");
        }
    }
    Ok(())
}

/// Resolve a validated name under `root`.
pub(crate) fn join_checked(root: &Path, name: &str) -> Result<PathBuf, &'static str> {
    check_archive_name(name)?;
    Ok(name.split('/').fold(root.to_path_buf(), |path, part| path.join(part)))
}
