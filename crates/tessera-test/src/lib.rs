//! Tessera Test - shared test utilities for the Tessera crates.
//!
//! This crate provides fixtures that are expensive or fiddly to build in
//! every test:
//!
//! - [`keys`]: RSA key pairs generated once per test binary
//! - [`tsa`]: an in-process RFC 3161 authority that can also forge bad tokens
//! - [`http`]: a scripted HTTP responder on a loopback socket
//! - [`archive`]: helpers that rewrite package ZIPs to simulate tampering
//! - [`harness`]: temp directories and test logging
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! tessera-test.workspace = true
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod archive;
pub mod harness;
pub mod http;
pub mod keys;
pub mod tsa;

pub use harness::*;
