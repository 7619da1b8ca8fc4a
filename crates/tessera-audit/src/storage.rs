//! Storage backends for audit log lines.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{AuditError, AuditResult};

/// How hard each append pushes bytes towards the disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    /// Flush to the OS after every append.
    #[default]
    Flush,
    /// `fsync` after every append.
    Sync,
}

/// Trait for audit log storage backends.
///
/// The chain calls `append_line` with one complete, newline-terminated
/// record and only ever from under its own lock.
pub trait AuditStorage: Send {
    /// Persist one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes could not be written and flushed.
    fn append_line(&mut self, line: &[u8]) -> AuditResult<()>;

    /// Force everything written so far onto stable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> AuditResult<()>;

    /// Total bytes accepted so far.
    fn bytes_written(&self) -> u64;
}

/// Append-only file storage.
#[derive(Debug)]
pub struct FileAuditStorage {
    file: File,
    path: PathBuf,
    durability: Durability,
    written: u64,
}

impl FileAuditStorage {
    /// Create a new log file. Fails if the file already exists.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file exists or cannot be created.
    pub fn create(path: impl AsRef<Path>, durability: Durability) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        Ok(Self {
            file,
            path,
            durability,
            written: 0,
        })
    }

    /// Reopen an existing log for appending, discarding everything after
    /// `valid_len` bytes.
    ///
    /// A final entry that was written without its line terminator is kept
    /// and terminated, so the next append starts on a fresh line.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened or truncated.
    pub fn reopen(
        path: impl AsRef<Path>,
        durability: Durability,
        valid_len: u64,
    ) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        file.set_len(valid_len)?;
        let mut written = valid_len;
        if valid_len > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::Start(valid_len.saturating_sub(1)))?;
            file.read_exact(&mut last)?;
            if last != *b"\n" {
                file.seek(SeekFrom::End(0))?;
                file.write_all(b"\n")?;
                written = written.saturating_add(1);
            }
        }
        file.sync_all()?;
        let file = OpenOptions::new().append(true).open(&path)?;
        Ok(Self {
            file,
            path,
            durability,
            written,
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditStorage for FileAuditStorage {
    fn append_line(&mut self, line: &[u8]) -> AuditResult<()> {
        self.file
            .write_all(line)
            .and_then(|()| self.file.flush())
            .map_err(|e| AuditError::Storage(format!("{}: {e}", self.path.display())))?;
        if self.durability == Durability::Sync {
            self.sync()?;
        }
        self.written = self.written.saturating_add(line.len() as u64);
        Ok(())
    }

    fn sync(&mut self) -> AuditResult<()> {
        self.file
            .sync_data()
            .map_err(|e| AuditError::Storage(format!("{}: {e}", self.path.display())))
    }

    fn bytes_written(&self) -> u64 {
        self.written
    }
}

/// In-memory storage. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditStorage {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemoryAuditStorage {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.buffer
            .lock()
            .map(|buffer| buffer.clone())
            .unwrap_or_default()
    }
}

impl AuditStorage for MemoryAuditStorage {
    fn append_line(&mut self, line: &[u8]) -> AuditResult<()> {
        self.buffer
            .lock()
            .map_err(|_| AuditError::LockPoisoned)?
            .extend_from_slice(line);
        Ok(())
    }

    fn sync(&mut self) -> AuditResult<()> {
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.buffer
            .lock()
            .map(|buffer| buffer.len() as u64)
            .unwrap_or(0)
    }
}
