//! The append-only audit chain.
//!
//! All appends go through one mutex that guards the sequence counter, the
//! previous-entry hash and the storage handle together, so two concurrent
//! appends can never observe the same predecessor. Field hashing happens in
//! [`CallRecord::prepare`] before the lock is taken.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tessera_core::{Mode, Timestamp};
use tessera_crypto::ContentHash;
use tracing::{debug, error, info, warn};

use crate::entry::{AuditEntry, GENESIS_HASH};
use crate::error::{AuditError, AuditResult};
use crate::reader::AuditLogReader;
use crate::record::CallRecord;
use crate::replay::{ChainIssue, replay_chain};
use crate::storage::{AuditStorage, Durability, FileAuditStorage};

/// Count and hash of the most recent entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainHead {
    /// Entries appended so far.
    pub entry_count: u64,
    /// `entry_hash` of the last entry, or [`GENESIS_HASH`] when empty.
    pub head_hash: ContentHash,
}

/// What [`AuditChain::resume`] found in the existing log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeReport {
    /// Entries kept.
    pub entries: u64,
    /// Bytes of partial record dropped from the end, if any.
    pub discarded_bytes: u64,
}

struct ChainState {
    next_sequence: u64,
    previous_hash: ContentHash,
    storage: Box<dyn AuditStorage>,
    poisoned: Option<String>,
    closed: bool,
}

/// A hash-chained, append-only audit log.
pub struct AuditChain {
    mode: Mode,
    path: Option<PathBuf>,
    state: Mutex<ChainState>,
}

impl AuditChain {
    /// Create a chain over a custom storage backend.
    #[must_use]
    pub fn with_storage(storage: Box<dyn AuditStorage>, mode: Mode) -> Self {
        Self {
            mode,
            path: None,
            state: Mutex::new(ChainState {
                next_sequence: 0,
                previous_hash: GENESIS_HASH,
                storage,
                poisoned: None,
                closed: false,
            }),
        }
    }

    /// Create a new log file. Fails if the file already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create(path: impl AsRef<Path>, mode: Mode, durability: Durability) -> AuditResult<Self> {
        let path = path.as_ref();
        let storage = FileAuditStorage::create(path, durability)?;
        debug!(path = %path.display(), %mode, "Created audit log");
        let mut chain = Self::with_storage(Box::new(storage), mode);
        chain.path = Some(path.to_path_buf());
        Ok(chain)
    }

    /// Reopen an existing log and continue its numbering.
    ///
    /// The log is replayed first. A partial final record left by a crash is
    /// dropped; any other integrity issue refuses the resume.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::ResumeRefused`] if the existing log does not
    /// verify, or an I/O error.
    pub fn resume(
        path: impl AsRef<Path>,
        mode: Mode,
        durability: Durability,
    ) -> AuditResult<(Self, ResumeReport)> {
        let path = path.as_ref();
        let file_len = std::fs::metadata(path)?.len();

        let mut reader = AuditLogReader::new(BufReader::new(File::open(path)?));
        let replay = replay_chain(&mut reader)?;
        let fatal = replay
            .issues
            .iter()
            .find(|issue| !matches!(issue, ChainIssue::TruncatedTail { .. }));
        if let Some(issue) = fatal {
            return Err(AuditError::ResumeRefused(issue.to_string()));
        }
        if replay.omitted_issues() > 0 {
            return Err(AuditError::ResumeRefused(replay.to_string()));
        }

        let valid_len = reader.valid_len();
        let discarded_bytes = file_len.saturating_sub(valid_len);
        if discarded_bytes > 0 {
            warn!(
                path = %path.display(),
                discarded_bytes,
                "Discarding partial record at end of audit log"
            );
        }

        let storage = FileAuditStorage::reopen(path, durability, valid_len)?;
        let chain = Self {
            mode,
            path: Some(path.to_path_buf()),
            state: Mutex::new(ChainState {
                next_sequence: replay.entry_count,
                previous_hash: replay.head_hash,
                storage: Box::new(storage),
                poisoned: None,
                closed: false,
            }),
        };

        info!(
            path = %path.display(),
            entries = replay.entry_count,
            "Resumed audit log"
        );
        Ok((
            chain,
            ResumeReport {
                entries: replay.entry_count,
                discarded_bytes,
            },
        ))
    }

    fn lock(&self) -> AuditResult<MutexGuard<'_, ChainState>> {
        self.state.lock().map_err(|_| AuditError::LockPoisoned)
    }

    /// Append a record and return the entry as written.
    ///
    /// # Errors
    ///
    /// - [`AuditError::HashingFailed`] in strict mode if a digest failed
    /// - [`AuditError::Closed`] after [`close`](Self::close)
    /// - [`AuditError::Poisoned`] after an earlier write failure
    /// - [`AuditError::Storage`] if this write fails; the chain is then poisoned
    pub fn append(&self, record: CallRecord) -> AuditResult<AuditEntry> {
        let prepared = record.prepare(self.mode)?;

        let mut state = self.lock()?;
        if state.closed {
            return Err(AuditError::Closed);
        }
        if let Some(reason) = &state.poisoned {
            return Err(AuditError::Poisoned(reason.clone()));
        }

        let sequence_number = state.next_sequence;
        let next_sequence = sequence_number
            .checked_add(1)
            .ok_or(AuditError::SequenceOverflow)?;

        let mut entry = AuditEntry {
            sequence_number,
            timestamp: prepared.timestamp.unwrap_or_else(Timestamp::now),
            action: prepared.action,
            target: prepared.target,
            args_repr: prepared.args_repr,
            kwargs_repr: prepared.kwargs_repr,
            result_repr: prepared.result_repr,
            args_hash: prepared.args_hash,
            kwargs_hash: prepared.kwargs_hash,
            result_hash: prepared.result_hash,
            extra_hashes: prepared.extra_hashes,
            previous_entry_hash: state.previous_hash,
            entry_hash: ContentHash::zero(),
        };
        entry.entry_hash = entry.compute_hash();

        let line = entry.to_ndjson_line()?;
        if let Err(e) = state.storage.append_line(&line) {
            error!(sequence = sequence_number, error = %e, "Audit write failed, chain poisoned");
            state.poisoned = Some(e.to_string());
            return Err(e);
        }

        state.next_sequence = next_sequence;
        state.previous_hash = entry.entry_hash;

        debug!(
            sequence = sequence_number,
            action = %entry.action,
            target = %entry.target,
            "Appended audit entry"
        );
        Ok(entry)
    }

    /// Sync the log and refuse further appends.
    ///
    /// Closing twice is harmless and returns the same head.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails or the chain is poisoned.
    pub fn close(&self) -> AuditResult<ChainHead> {
        let mut state = self.lock()?;
        if let Some(reason) = &state.poisoned {
            return Err(AuditError::Poisoned(reason.clone()));
        }
        if !state.closed {
            state.storage.sync()?;
            state.closed = true;
            debug!(entries = state.next_sequence, "Closed audit log");
        }
        Ok(ChainHead {
            entry_count: state.next_sequence,
            head_hash: state.previous_hash,
        })
    }

    /// Current head of the chain.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::LockPoisoned`] if a writer panicked.
    pub fn head(&self) -> AuditResult<ChainHead> {
        let state = self.lock()?;
        Ok(ChainHead {
            entry_count: state.next_sequence,
            head_hash: state.previous_hash,
        })
    }

    /// Number of entries appended.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::LockPoisoned`] if a writer panicked.
    pub fn entry_count(&self) -> AuditResult<u64> {
        Ok(self.head()?.entry_count)
    }

    /// Integrity mode this chain records under.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Path of the backing file, if file-backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether a failed write has stopped the chain.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.state
            .lock()
            .map_or(true, |state| state.poisoned.is_some())
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().is_ok_and(|state| state.closed)
    }
}

impl std::fmt::Debug for AuditChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditChain")
            .field("mode", &self.mode)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
