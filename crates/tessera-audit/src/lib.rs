//! Tessera Audit - hash-chained NDJSON audit logging.
//!
//! This crate provides:
//! - [`AuditEntry`], one line of `audit_log.ndjson`
//! - [`AuditChain`], the serialized append path with crash-safe resume
//! - [`CallRecord`] for describing an event before it is sequenced
//! - [`AuditLogReader`] and [`replay_chain`] for bounded-memory verification
//!
//! # Security Model
//!
//! Every entry carries the hash of its predecessor, and its own hash covers
//! all of its fields. Modifying, deleting, inserting or reordering any entry
//! is detectable on replay, and replay names the first entry that diverges.
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//! use tessera_audit::{AuditChain, AuditLogReader, CallRecord, MemoryAuditStorage, replay_chain};
//! use tessera_core::Mode;
//!
//! let storage = MemoryAuditStorage::new();
//! let chain = AuditChain::with_storage(Box::new(storage.clone()), Mode::Strict);
//!
//! chain.append(CallRecord::call("load_data").arg("'train.csv'")).unwrap();
//! chain.append(CallRecord::call("fit").kwarg("epochs", "10").result("0.93")).unwrap();
//!
//! let result = replay_chain(AuditLogReader::new(Cursor::new(storage.contents()))).unwrap();
//! assert!(result.valid);
//! assert_eq!(result.entries_verified, 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod chain;
mod entry;
mod error;
mod reader;
mod record;
mod recorder;
mod replay;
mod storage;

pub use chain::{AuditChain, ChainHead, ResumeReport};
pub use entry::{AuditAction, AuditEntry, ENTRY_HASH_DOMAIN, GENESIS_HASH};
pub use error::{AuditError, AuditResult};
pub use reader::{AuditLogReader, LogRecord, MAX_RECORD_LEN};
pub use record::{
    CallRecord, FieldDigest, MAX_REPR_CHARS, hash_args, hash_kwargs, hash_result, truncate_repr,
};
pub use recorder::{ANNOTATE_TARGET, Recorder};
pub use replay::{
    ChainIssue, ChainVerificationResult, MAX_REPORTED_ISSUES, replay_chain, replay_chain_with,
};
pub use storage::{AuditStorage, Durability, FileAuditStorage, MemoryAuditStorage};
