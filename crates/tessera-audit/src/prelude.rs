//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tessera_audit::prelude::*;` to import all essential types.

// Errors
pub use crate::{AuditError, AuditResult};

// Entries and records
pub use crate::{AuditAction, AuditEntry, CallRecord, FieldDigest, GENESIS_HASH};

// Chain and recording
pub use crate::{AuditChain, ChainHead, Recorder};

// Reading and verification
pub use crate::{
    AuditLogReader, ChainIssue, ChainVerificationResult, LogRecord, replay_chain, replay_chain_with,
};

// Storage
pub use crate::{AuditStorage, Durability, FileAuditStorage, MemoryAuditStorage};
