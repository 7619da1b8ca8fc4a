//! Tessera Timestamp - RFC 3161 trusted timestamps.
//!
//! This crate provides:
//! - [`TimestampRequest`] construction (SHA-256 imprint, nonce, `certReq`)
//! - A blocking [`TimestampClient`] with bounded retry
//! - Strict parsing of `TimeStampResp` and the CMS token with the `der` reader
//! - Four-gate [`verify`]: structure, imprint, grafting, signature
//!
//! # Example
//!
//! ```no_run
//! use tessera_crypto::ContentHash;
//! use tessera_timestamp::{TimestampClient, TimestampClientConfig, VerifyOptions, verify};
//!
//! let client = TimestampClient::new(TimestampClientConfig::new("https://freetsa.org/tsr")).unwrap();
//! let digest = ContentHash::hash(b"audit log");
//! let response = client.request(&digest).unwrap();
//!
//! let result = verify(response.to_der(), &digest, &VerifyOptions::default());
//! assert!(result.verified);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod asn1;
mod client;
mod error;
mod request;
mod response;
mod retry;
mod verify;

pub use client::{
    DEFAULT_TIMEOUT, MAX_RESPONSE_SIZE, QUERY_CONTENT_TYPE, REPLY_CONTENT_TYPE, TimestampClient,
    TimestampClientConfig, parse_tsa_url,
};
pub use error::{TimestampError, TimestampResult};
pub use request::TimestampRequest;
pub use response::{
    PkiStatus, SignerIdentifier, SignerInfo, TimestampResponse, TimestampToken, TstInfo,
};
pub use retry::RetryPolicy;
pub use verify::{Gate, GateOutcome, TimestampVerification, VerifyOptions, verify};
