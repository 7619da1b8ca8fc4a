//! Common imports for timestamp handling.

pub use crate::{
    RetryPolicy, TimestampClient, TimestampClientConfig, TimestampError, TimestampResult,
    TimestampResponse, TimestampVerification, VerifyOptions, verify,
};
