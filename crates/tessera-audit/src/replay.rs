//! Chain replay: recompute every hash and check every link.
//!
//! Links are checked against the *stored* `entry_hash` of the predecessor,
//! not the recomputed one. Editing entry N therefore flags only N (its stored
//! hash no longer matches its contents) while N+1 still links cleanly, which
//! pinpoints the tampered entry.

use std::fmt;
use std::io;
use tessera_crypto::ContentHash;
use tracing::warn;

use crate::entry::{AuditEntry, GENESIS_HASH};
use crate::error::AuditResult;
use crate::reader::LogRecord;

/// Most issues kept in a [`ChainVerificationResult`]; later ones are counted.
pub const MAX_REPORTED_ISSUES: usize = 100;

/// Result of chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerificationResult {
    /// Whether the chain is valid.
    pub valid: bool,
    /// Number of entries whose hash and link both checked out.
    pub entries_verified: u64,
    /// Number of well-formed entries read.
    pub entry_count: u64,
    /// Stored hash of the last well-formed entry.
    pub head_hash: ContentHash,
    /// The first [`MAX_REPORTED_ISSUES`] issues found (empty if valid).
    pub issues: Vec<ChainIssue>,
    /// Total issues found, including those not kept in `issues`.
    pub issue_count: u64,
    first_divergence: Option<u64>,
}

impl ChainVerificationResult {
    /// Lowest sequence number at which the chain stops being trustworthy.
    ///
    /// Tracked over every issue, not only the ones kept.
    #[must_use]
    pub fn first_divergence(&self) -> Option<u64> {
        self.first_divergence
    }

    /// Issues found but not kept in `issues`.
    #[must_use]
    pub fn omitted_issues(&self) -> u64 {
        self.issue_count.saturating_sub(self.issues.len() as u64)
    }
}

impl fmt::Display for ChainVerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.valid {
            write!(f, "chain valid ({} entries)", self.entries_verified)
        } else {
            write!(
                f,
                "chain invalid ({} of {} entries verified)",
                self.entries_verified, self.entry_count
            )?;
            for issue in &self.issues {
                write!(f, "; {issue}")?;
            }
            match self.omitted_issues() {
                0 => Ok(()),
                omitted => write!(f, "; {omitted} more issues"),
            }
        }
    }
}

/// An issue found during chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainIssue {
    /// First entry doesn't have the zero previous hash.
    InvalidGenesis {
        /// Sequence number of the first entry.
        sequence: u64,
    },
    /// Sequence numbers skip or repeat.
    SequenceGap {
        /// Sequence number that should have come next.
        expected: u64,
        /// Sequence number found.
        found: u64,
    },
    /// Chain link is broken.
    BrokenLink {
        /// The entry with broken link.
        sequence: u64,
        /// Stored hash of the preceding entry.
        expected_previous: ContentHash,
        /// Previous hash recorded in this entry.
        actual_previous: ContentHash,
    },
    /// Entry contents do not hash to the stored `entry_hash`.
    HashMismatch {
        /// The tampered entry.
        sequence: u64,
        /// Hash stored in the entry.
        stored: ContentHash,
        /// Hash recomputed from the contents.
        computed: ContentHash,
    },
    /// A line is not a valid entry.
    MalformedRecord {
        /// One-based line number.
        line: u64,
        /// Sequence number the line should have carried.
        expected_sequence: u64,
        /// Parse error.
        reason: String,
    },
    /// The log ends in an unterminated partial record.
    TruncatedTail {
        /// One-based line number.
        line: u64,
        /// Sequence number the partial record would have carried.
        expected_sequence: u64,
    },
}

impl ChainIssue {
    /// Sequence number the issue is attributed to.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        match self {
            Self::InvalidGenesis { sequence }
            | Self::BrokenLink { sequence, .. }
            | Self::HashMismatch { sequence, .. } => *sequence,
            Self::SequenceGap { expected, found } => (*expected).min(*found),
            Self::MalformedRecord {
                expected_sequence, ..
            }
            | Self::TruncatedTail {
                expected_sequence, ..
            } => *expected_sequence,
        }
    }
}

impl fmt::Display for ChainIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidGenesis { sequence } => {
                write!(f, "Invalid genesis at entry {sequence}")
            },
            Self::SequenceGap { expected, found } => {
                write!(f, "Sequence gap: expected {expected}, found {found}")
            },
            Self::BrokenLink { sequence, .. } => {
                write!(f, "Broken chain link at entry {sequence}")
            },
            Self::HashMismatch { sequence, .. } => {
                write!(f, "Entry hash mismatch at entry {sequence}")
            },
            Self::MalformedRecord { line, reason, .. } => {
                write!(f, "Malformed record at line {line}: {reason}")
            },
            Self::TruncatedTail { line, .. } => {
                write!(f, "Truncated record at line {line}")
            },
        }
    }
}

/// Bounded issue collection.
#[derive(Debug, Default)]
struct Issues {
    kept: Vec<ChainIssue>,
    total: u64,
    first_divergence: Option<u64>,
}

impl Issues {
    /// Record an issue; returns whether it was kept.
    fn push(&mut self, issue: ChainIssue) -> bool {
        self.total = self.total.saturating_add(1);
        let sequence = issue.sequence();
        self.first_divergence = Some(self.first_divergence.map_or(sequence, |s| s.min(sequence)));
        if self.kept.len() < MAX_REPORTED_ISSUES {
            self.kept.push(issue);
            true
        } else {
            false
        }
    }
}

/// Replay a log and verify every entry.
///
/// # Errors
///
/// Returns an I/O error from the underlying reader. Integrity problems are
/// reported in the result, not as errors.
pub fn replay_chain<I>(records: I) -> AuditResult<ChainVerificationResult>
where
    I: IntoIterator<Item = io::Result<LogRecord>>,
{
    replay_chain_with(records, |_| {})
}

/// Replay a log, handing every well-formed entry to `visit`.
///
/// Memory use is independent of log length unless `visit` retains entries:
/// at most [`MAX_REPORTED_ISSUES`] issues are kept, the rest are counted.
///
/// # Errors
///
/// Returns an I/O error from the underlying reader.
pub fn replay_chain_with<I, F>(records: I, mut visit: F) -> AuditResult<ChainVerificationResult>
where
    I: IntoIterator<Item = io::Result<LogRecord>>,
    F: FnMut(&AuditEntry),
{
    let mut issues = Issues::default();
    let mut expected_sequence: u64 = 0;
    let mut previous_hash = GENESIS_HASH;
    let mut entry_count: u64 = 0;
    let mut entries_verified: u64 = 0;

    for record in records {
        let entry = match record? {
            LogRecord::Entry(entry) => entry,
            LogRecord::Malformed { line, reason } => {
                let kept = issues.push(ChainIssue::MalformedRecord {
                    line,
                    expected_sequence,
                    reason,
                });
                if kept {
                    warn!(line, "Malformed audit record");
                }
                continue;
            },
            LogRecord::TruncatedTail { line, .. } => {
                warn!(line, "Truncated audit record at end of log");
                issues.push(ChainIssue::TruncatedTail {
                    line,
                    expected_sequence,
                });
                continue;
            },
        };

        let sequence = entry.sequence_number;
        let mut sound = true;

        if sequence != expected_sequence {
            issues.push(ChainIssue::SequenceGap {
                expected: expected_sequence,
                found: sequence,
            });
            sound = false;
        }

        if entry_count == 0 {
            if entry.previous_entry_hash != GENESIS_HASH {
                issues.push(ChainIssue::InvalidGenesis { sequence });
                sound = false;
            }
        } else if entry.previous_entry_hash != previous_hash {
            if issues.push(ChainIssue::BrokenLink {
                sequence,
                expected_previous: previous_hash,
                actual_previous: entry.previous_entry_hash,
            }) {
                warn!(sequence, "Chain link broken");
            }
            sound = false;
        }

        let computed = entry.compute_hash();
        if computed != entry.entry_hash {
            if issues.push(ChainIssue::HashMismatch {
                sequence,
                stored: entry.entry_hash,
                computed,
            }) {
                warn!(sequence, "Entry hash mismatch");
            }
            sound = false;
        }

        if sound {
            entries_verified = entries_verified.saturating_add(1);
        }
        entry_count = entry_count.saturating_add(1);
        previous_hash = entry.entry_hash;
        expected_sequence = sequence.saturating_add(1);
        visit(&entry);
    }

    Ok(ChainVerificationResult {
        valid: issues.total == 0,
        entries_verified,
        entry_count,
        head_hash: previous_hash,
        issues: issues.kept,
        issue_count: issues.total,
        first_divergence: issues.first_divergence,
    })
}
