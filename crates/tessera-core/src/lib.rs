//! Tessera Core - vocabulary shared by every Tessera crate.
//!
//! This crate provides:
//! - [`SessionId`] and [`Timestamp`] wrappers
//! - The [`Mode`] switch consulted at the integrity decision points
//! - [`Version`] for the package format and the producing tool
//!
//! It has no dependencies on other internal crates.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod mode;
mod types;
mod version;

pub use error::{CoreError, CoreResult};
pub use mode::Mode;
pub use types::{SessionId, Timestamp};
pub use version::{FORMAT_VERSION, Version};
