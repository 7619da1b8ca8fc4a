//! File opening primitives that never follow a symlink at the final component.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

#[cfg(unix)]
fn nofollow_flags() -> i32 {
    use nix::fcntl::OFlag;
    // O_NONBLOCK keeps a FIFO from blocking the open; fstat rejects it after.
    (OFlag::O_NOFOLLOW | OFlag::O_NONBLOCK).bits()
}

/// Whether an open failed because the final component is a symlink.
#[cfg(unix)]
pub(crate) fn is_symlink_error(e: &io::Error) -> bool {
    e.raw_os_error() == Some(nix::errno::Errno::ELOOP as i32)
}

#[cfg(not(unix))]
pub(crate) fn is_symlink_error(_e: &io::Error) -> bool {
    false
}

/// Open an existing file for reading without following a final symlink.
pub(crate) fn open_read_nofollow(path: &Path) -> io::Result<File> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        OpenOptions::new()
            .read(true)
            .custom_flags(nofollow_flags())
            .open(path)
    }
    #[cfg(not(unix))]
    {
        if std::fs::symlink_metadata(path)?.file_type().is_symlink() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "refusing to follow symlink",
            ));
        }
        OpenOptions::new().read(true).open(path)
    }
}

/// Create a new file for writing; fails if anything exists at `path`.
pub(crate) fn create_new_nofollow(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use nix::fcntl::OFlag;
        use std::os::unix::fs::OpenOptionsExt;
        options.custom_flags(OFlag::O_NOFOLLOW.bits()).mode(0o600);
    }
    options.open(path)
}
