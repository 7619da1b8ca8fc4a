//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tessera_verify::prelude::*;` to import all essential types.

// Errors
pub use crate::IntegrityError;

// Verification
pub use crate::{CancelToken, Verifier, VerifyOptions};

// Reports
pub use crate::{CheckKind, CheckResult, CheckStatus, ProofLevel, VerificationReport};
