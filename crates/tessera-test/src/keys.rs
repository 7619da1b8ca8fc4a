//! Cached RSA key pairs.
//!
//! 2048-bit generation takes long enough to dominate a test run, so each
//! key is generated at most once per test binary.

use std::sync::OnceLock;

use tessera_crypto::{Identity, KeyPair};

static PRIMARY: OnceLock<KeyPair> = OnceLock::new();
static SECONDARY: OnceLock<KeyPair> = OnceLock::new();
static TSA: OnceLock<KeyPair> = OnceLock::new();

fn cached(cell: &'static OnceLock<KeyPair>) -> KeyPair {
    cell.get_or_init(|| KeyPair::generate().expect("RSA key generation failed"))
        .clone()
}

/// The default signing key.
#[must_use]
pub fn primary() -> KeyPair {
    cached(&PRIMARY)
}

/// A second, unrelated signing key.
#[must_use]
pub fn secondary() -> KeyPair {
    cached(&SECONDARY)
}

/// The key of the test timestamp authority.
#[must_use]
pub fn tsa() -> KeyPair {
    cached(&TSA)
}

/// A persistent identity over [`primary`] with no certificate.
///
/// # Panics
///
/// Never in practice; a certificate is not attached.
#[must_use]
pub fn persistent_identity() -> Identity {
    Identity::persistent(primary(), None).expect("identity without certificate")
}
