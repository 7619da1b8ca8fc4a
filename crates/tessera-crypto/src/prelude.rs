//! Common imports for working with Tessera crypto types.
//!
//! ```
//! use tessera_crypto::prelude::*;
//! ```

pub use crate::{
    ContentHash, ContentHasher, CryptoError, CryptoResult, DetachedSignature, Identity, KeyPair,
    PublicKey, Signature, SignatureVerifier,
};
