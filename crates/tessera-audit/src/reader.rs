//! Streaming reader for `audit_log.ndjson`.
//!
//! Lines are read one at a time with a hard length bound, so memory use is
//! independent of log length and a hostile log cannot force an unbounded
//! allocation.

use std::io::{self, BufRead, Read};

use crate::entry::AuditEntry;

/// Longest accepted record, newline excluded.
pub const MAX_RECORD_LEN: usize = 16 * 1024 * 1024;

/// One item produced by [`AuditLogReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// A well-formed entry.
    Entry(Box<AuditEntry>),
    /// A complete line that is not a valid entry.
    Malformed {
        /// One-based line number.
        line: u64,
        /// Why it was rejected.
        reason: String,
    },
    /// An unterminated final line that does not parse, typically left by a
    /// crash mid-write.
    TruncatedTail {
        /// One-based line number.
        line: u64,
        /// Bytes in the partial record.
        bytes: usize,
    },
}

/// Iterates over the records of an NDJSON audit log.
#[derive(Debug)]
pub struct AuditLogReader<R> {
    inner: R,
    line: u64,
    offset: u64,
    valid_len: u64,
    buf: Vec<u8>,
    done: bool,
}

impl<R: BufRead> AuditLogReader<R> {
    /// Wrap a buffered reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: 0,
            offset: 0,
            valid_len: 0,
            buf: Vec::new(),
            done: false,
        }
    }

    /// Byte offset just past the last well-formed entry.
    #[must_use]
    pub fn valid_len(&self) -> u64 {
        self.valid_len
    }

    /// Number of lines consumed so far.
    #[must_use]
    pub fn lines_read(&self) -> u64 {
        self.line
    }

    fn discard_rest_of_line(&mut self) -> io::Result<()> {
        loop {
            let available = self.inner.fill_buf()?;
            if available.is_empty() {
                return Ok(());
            }
            let (consumed, found) = match available.iter().position(|b| *b == b'\n') {
                Some(pos) => (pos.saturating_add(1), true),
                None => (available.len(), false),
            };
            self.inner.consume(consumed);
            self.offset = self.offset.saturating_add(consumed as u64);
            if found {
                return Ok(());
            }
        }
    }

    fn next_record(&mut self) -> io::Result<Option<LogRecord>> {
        loop {
            self.buf.clear();
            let limit = (MAX_RECORD_LEN as u64).saturating_add(1);
            let read = (&mut self.inner)
                .take(limit)
                .read_until(b'\n', &mut self.buf)?;
            if read == 0 {
                return Ok(None);
            }
            self.line = self.line.saturating_add(1);
            self.offset = self.offset.saturating_add(read as u64);

            let terminated = self.buf.last() == Some(&b'\n');
            if !terminated && self.buf.len() > MAX_RECORD_LEN {
                self.discard_rest_of_line()?;
                return Ok(Some(LogRecord::Malformed {
                    line: self.line,
                    reason: format!("record exceeds {MAX_RECORD_LEN} bytes"),
                }));
            }

            let body = if terminated {
                &self.buf[..self.buf.len().saturating_sub(1)]
            } else {
                &self.buf[..]
            };
            if body.iter().all(u8::is_ascii_whitespace) {
                if terminated {
                    continue;
                }
                return Ok(None);
            }

            return Ok(Some(match AuditEntry::from_ndjson_line(body, self.line) {
                Ok(entry) => {
                    self.valid_len = self.offset;
                    LogRecord::Entry(Box::new(entry))
                },
                Err(_) if !terminated => LogRecord::TruncatedTail {
                    line: self.line,
                    bytes: body.len(),
                },
                Err(e) => LogRecord::Malformed {
                    line: self.line,
                    reason: e.to_string(),
                },
            }));
        }
    }
}

impl<R: BufRead> Iterator for AuditLogReader<R> {
    type Item = io::Result<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            },
            Err(e) => {
                self.done = true;
                Some(Err(e))
            },
        }
    }
}
