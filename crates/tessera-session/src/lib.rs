//! Tessera Session - record a run and seal it into a signed package.
//!
//! A [`Session`] owns one audit chain, one artifact staging area and one
//! signing identity. Producers append events through [`Session::record`] or a
//! cloned [`Recorder`](tessera_audit::Recorder), capture files with
//! [`Session::add_artifact`] and [`Session::track_file`], and finally call
//! [`Session::seal`], which writes the package atomically.
//!
//! # Example
//!
//! ```no_run
//! use tessera_audit::CallRecord;
//! use tessera_core::Mode;
//! use tessera_crypto::Identity;
//! use tessera_session::{Session, SessionConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::new("run.zip")
//!     .with_mode(Mode::Normal)
//!     .with_tsa("https://tsa.example/tsr");
//! let session = Session::start(config, Identity::ephemeral()?)?;
//!
//! session.record(CallRecord::call("fit").kwarg("epochs", "10").result("0.93"))?;
//! session.add_artifact("model.bin", None)?;
//!
//! let sealed = session.seal()?;
//! println!("sealed {} entries", sealed.metadata.entry_count);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config_bridge;
pub mod prelude;

mod config;
mod error;
mod session;

pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use session::{SealedPackage, Session};
