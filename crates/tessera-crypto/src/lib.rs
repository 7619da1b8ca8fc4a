//! Tessera Crypto - cryptographic primitives for audit packages.
//!
//! This crate provides:
//! - SHA-256 content hashing with bounded-memory streaming ([`ContentHash`])
//! - RSA key pairs and RSASSA-PSS signatures ([`KeyPair`], [`PublicKey`])
//! - Detached signature documents for package members ([`DetachedSignature`])
//! - Persistent and ephemeral signing identities ([`Identity`])
//! - Trusted key registries ([`SignatureVerifier`])
//! - X.509 certificates for signers and timestamp authorities ([`Certificate`])
//!
//! # Example
//!
//! ```no_run
//! use tessera_crypto::{ContentHash, Identity};
//!
//! let identity = Identity::ephemeral().unwrap();
//! let digest = ContentHash::hash(b"audit log bytes");
//! let signature = identity.sign(&digest).unwrap();
//! assert!(identity.public_key().verify(&digest, &signature));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod oid;
pub mod prelude;

mod error;
mod hash;
mod identity;
mod keypair;
mod signature;
mod verifier;
mod x509;

pub use error::{CryptoError, CryptoResult};
pub use hash::{CHUNK_SIZE, ContentHash, ContentHasher};
pub use identity::{CERTIFICATE_FILE, GenerateOptions, Identity, PRIVATE_KEY_FILE, PUBLIC_KEY_FILE};
pub use keypair::{
    DEFAULT_KEY_BITS, DigestAlgorithm, KeyId, KeyPair, MIN_KEY_BITS, PublicKey, RsaScheme, verify,
};
pub use signature::{DetachedSignature, SIGNATURE_ALGORITHM, Signature};
pub use verifier::SignatureVerifier;
pub use x509::{Certificate, CertificateParams};
