//! Cloneable recording handle.

use std::sync::Arc;

use crate::chain::AuditChain;
use crate::entry::{AuditAction, AuditEntry};
use crate::error::AuditResult;
use crate::record::CallRecord;

/// Target recorded for annotation entries.
pub const ANNOTATE_TARGET: &str = "annotate";

/// A shareable handle for appending to one chain.
///
/// Every clone appends to the same chain, from any thread.
#[derive(Debug, Clone)]
pub struct Recorder {
    chain: Arc<AuditChain>,
}

impl Recorder {
    /// Wrap a chain.
    #[must_use]
    pub fn new(chain: Arc<AuditChain>) -> Self {
        Self { chain }
    }

    /// Append a call record.
    ///
    /// # Errors
    ///
    /// Returns any error from [`AuditChain::append`].
    pub fn record(&self, record: CallRecord) -> AuditResult<AuditEntry> {
        self.chain.append(record)
    }

    /// Record a key/value annotation.
    ///
    /// # Errors
    ///
    /// Returns any error from [`AuditChain::append`].
    pub fn annotate(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> AuditResult<AuditEntry> {
        self.chain.append(
            CallRecord::new(AuditAction::Annotate, ANNOTATE_TARGET)
                .arg(key)
                .arg(value),
        )
    }

    /// The underlying chain.
    #[must_use]
    pub fn chain(&self) -> &AuditChain {
        &self.chain
    }
}
