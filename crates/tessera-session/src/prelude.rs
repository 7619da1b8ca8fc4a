//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tessera_session::prelude::*;` to import all essential types.

// Errors
pub use crate::{SessionError, SessionResult};

// Sessions
pub use crate::{SealedPackage, Session, SessionConfig};

// Config conversion
pub use crate::config_bridge::{load_identity, to_session_config, to_verify_options};
