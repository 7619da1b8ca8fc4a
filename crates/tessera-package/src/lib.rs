//! Tessera Package - artifact capture and the sealed package format.
//!
//! This crate provides:
//! - [`ArtifactGuard`], which copies artifacts into staging without
//!   following symlinks and enforces a size limit
//! - [`PackageWriter`], which signs every component and writes the ZIP
//!   atomically
//! - [`PackageReader`], which extracts a package into a private scratch
//!   directory after rejecting traversal, symlink and oversized entries
//! - [`diff_packages`] for comparing two runs
//!
//! # Layout
//!
//! | Member | Contents |
//! |--------|----------|
//! | `audit_log.ndjson` (+ `.sig`) | hash-chained audit log |
//! | `audit_log.tsr` | optional RFC 3161 response over the log digest |
//! | `environment.json` (+ `.sig`) | environment snapshot |
//! | `git_metadata.json` (+ `.sig`) | optional git state |
//! | `artifacts.json` (+ `.sig`) | artifact manifest |
//! | `data/<name>` | captured artifacts |
//! | `public_key.pem`, `certificate.pem` | signer key and optional certificate |
//! | `package.json` (+ `.sig`) | package metadata |

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod layout;
pub mod prelude;

mod diff;
mod environment;
mod error;
mod extract;
mod fsutil;
mod git;
mod guard;
mod manifest;
mod metadata;
mod name;
mod reader;
mod writer;

#[cfg(test)]
mod testing;

pub use diff::{
    ArtifactChange, EnvironmentChange, LogDiff, MAX_REPORTED_MISMATCHES, OperationMismatch,
    PackageDiff, diff_packages,
};
pub use environment::{EnvironmentMismatch, EnvironmentSnapshot, TOOL_NAME};
pub use error::{ArtifactError, ArtifactResult, PackageError, PackageResult};
pub use extract::{
    ExtractLimits, ExtractedMember, MAX_ENTRY_COUNT, MAX_EXTRACTED_SIZE, extract_archive,
};
pub use git::{GitMetadata, MAX_DIFF_BYTES};
pub use guard::{ArtifactGuard, DEFAULT_MAX_ARTIFACT_SIZE};
pub use layout::SignedComponent;
pub use manifest::{Artifact, ArtifactManifest, TrackedFile};
pub use metadata::{Degradation, DegradationKind, PackageMetadata, SignerInfo, TimestampStatus};
pub use name::{MAX_NAME_LEN, check_archive_name};
pub use reader::{MAX_SMALL_MEMBER, OpenedPackage, PackageReader};
pub use writer::{PackageContents, PackageWriter, WrittenPackage};
