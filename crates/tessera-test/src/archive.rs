//! Package tampering helpers.
//!
//! Each helper rewrites a ZIP in place, copying every other member
//! unchanged, so a test can simulate exactly one kind of interference.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

enum Extra<'a> {
    File(&'a str, &'a [u8]),
    Symlink(&'a str, &'a str),
}

fn rewrite<F>(path: &Path, mut edit: F, extra: Option<Extra<'_>>)
where
    F: FnMut(&str, Vec<u8>) -> Option<Vec<u8>>,
{
    let mut members = Vec::new();
    {
        let mut archive =
            ZipArchive::new(File::open(path).expect("open package")).expect("read package");
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).expect("read member");
            let name = file.name().to_string();
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes).expect("read member bytes");
            if let Some(bytes) = edit(&name, bytes) {
                members.push((name, bytes));
            }
        }
    }

    let mut writer = ZipWriter::new(File::create(path).expect("recreate package"));
    let options = SimpleFileOptions::default();
    for (name, bytes) in members {
        writer.start_file(name, options).expect("start member");
        writer.write_all(&bytes).expect("write member");
    }
    match extra {
        Some(Extra::File(name, bytes)) => {
            writer.start_file(name, options).expect("start extra member");
            writer.write_all(bytes).expect("write extra member");
        },
        Some(Extra::Symlink(name, target)) => {
            writer
                .add_symlink(name, target, options)
                .expect("add symlink member");
        },
        None => {},
    }
    writer.finish().expect("finish package");
}

/// Replace the bytes of member `name`.
///
/// # Panics
///
/// Panics on any I/O or archive error.
pub fn replace_member(path: &Path, name: &str, bytes: &[u8]) {
    rewrite(
        path,
        |member, old| Some(if member == name { bytes.to_vec() } else { old }),
        None,
    );
}

/// Apply `edit` to the bytes of member `name`.
///
/// # Panics
///
/// Panics on any I/O or archive error.
pub fn edit_member<F>(path: &Path, name: &str, mut edit: F)
where
    F: FnMut(&mut Vec<u8>),
{
    rewrite(
        path,
        |member, mut bytes| {
            if member == name {
                edit(&mut bytes);
            }
            Some(bytes)
        },
        None,
    );
}

/// Drop member `name`.
///
/// # Panics
///
/// Panics on any I/O or archive error.
pub fn remove_member(path: &Path, name: &str) {
    rewrite(path, |member, bytes| (member != name).then_some(bytes), None);
}

/// Append a member with an arbitrary (possibly hostile) name.
///
/// # Panics
///
/// Panics on any I/O or archive error.
pub fn add_member(path: &Path, name: &str, bytes: &[u8]) {
    rewrite(path, |_, bytes| Some(bytes), Some(Extra::File(name, bytes)));
}

/// Append a symlink member.
///
/// # Panics
///
/// Panics on any I/O or archive error.
pub fn add_symlink_member(path: &Path, name: &str, target: &str) {
    rewrite(path, |_, bytes| Some(bytes), Some(Extra::Symlink(name, target)));
}

/// Read member `name`.
///
/// # Panics
///
/// Panics if the member is missing.
#[must_use]
pub fn read_member(path: &Path, name: &str) -> Vec<u8> {
    let mut archive =
        ZipArchive::new(File::open(path).expect("open package")).expect("read package");
    let mut file = archive.by_name(name).expect("member present");
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).expect("read member bytes");
    bytes
}

/// Names of every member, in archive order.
///
/// # Panics
///
/// Panics on any I/O or archive error.
#[must_use]
pub fn member_names(path: &Path) -> Vec<String> {
    let archive = ZipArchive::new(File::open(path).expect("open package")).expect("read package");
    archive.file_names().map(str::to_string).collect()
}

/// Flip one bit in `bytes`.
///
/// # Panics
///
/// Panics if `index` is out of range or `bit` is not below 8.
pub fn flip_bit(bytes: &mut [u8], index: usize, bit: u8) {
    assert!(bit < 8, "bit index out of range");
    bytes[index] ^= 1 << bit;
}
