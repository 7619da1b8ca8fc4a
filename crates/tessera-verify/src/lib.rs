//! Tessera Verify - full verification of sealed audit packages.
//!
//! A package goes through a fixed pipeline of independent checks:
//!
//! STRUCTURE → CHAIN → SIGNATURES → TIMESTAMP → ARTIFACTS → ENVIRONMENT
//! (→ EXTERNAL DATA when files are supplied)
//!
//! Every check reports its own status and failures, and by default all of
//! them run so that a single report lists every problem. With
//! [`VerifyOptions::fail_fast`] the pipeline stops at the first failed check.
//!
//! # Grading
//!
//! Hard failures (broken chain, bad signature, invalid timestamp token,
//! altered artifact) always fail the report. Soft gaps (ephemeral signer,
//! timestamp authority unavailable at seal time, expired signer certificate)
//! fail under [`Mode::Strict`](tessera_core::Mode::Strict) and are warnings
//! otherwise. Environment differences are always warnings.
//!
//! # Example
//!
//! ```no_run
//! use tessera_verify::{CheckKind, Verifier, VerifyOptions};
//!
//! let report = Verifier::new(VerifyOptions::new().fail_fast(false)).verify("run.zip");
//! if !report.passed {
//!     for failure in report.failures() {
//!         eprintln!("{failure}");
//!     }
//! }
//! let chain = report.check(CheckKind::Chain).unwrap();
//! println!("{}", chain.detail);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod checks;
mod error;
mod options;
mod report;
mod verifier;

#[cfg(test)]
mod testing;

pub use error::IntegrityError;
pub use options::{CancelToken, VerifyOptions};
pub use report::{CheckKind, CheckResult, CheckStatus, ProofLevel, VerificationReport};
pub use verifier::Verifier;
