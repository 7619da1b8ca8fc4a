//! Prelude module - commonly used test helpers.
//!
//! Use `use tessera_test::prelude::*;` in test modules.

pub use crate::archive::{
    add_member, add_symlink_member, edit_member, flip_bit, member_names, read_member,
    remove_member, replace_member,
};
pub use crate::harness::*;
pub use crate::http::{HttpReply, RecordedRequest, ScriptedServer};
pub use crate::keys;
pub use crate::tsa::{TestTsa, TokenVariant};
