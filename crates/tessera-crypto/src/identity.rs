//! Signing identities.
//!
//! An identity is either persistent (a key pair loaded from disk, optionally
//! with a certificate) or ephemeral (generated in memory for one session).
//! Packages record which kind signed them, so verification can tell
//! integrity-only proof from identity-bound proof.

use std::path::{Path, PathBuf};

use chrono::Duration;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::hash::ContentHash;
use crate::keypair::{KeyPair, PublicKey, read_secret_file};
use crate::signature::Signature;
use crate::x509::{Certificate, CertificateParams};

/// File name of the private key inside an identity directory.
pub const PRIVATE_KEY_FILE: &str = "private_key.pem";
/// File name of the public key inside an identity directory.
pub const PUBLIC_KEY_FILE: &str = "public_key.pem";
/// File name of the certificate inside an identity directory.
pub const CERTIFICATE_FILE: &str = "certificate.pem";

/// Options for [`Identity::generate`].
#[derive(Default)]
pub struct GenerateOptions {
    /// Common name for the certificate.
    pub name: String,
    /// Encrypt the private key at rest with this password.
    pub password: Option<Zeroizing<Vec<u8>>>,
    /// Issue a self-signed certificate valid for this long.
    pub certificate_validity: Option<Duration>,
}

impl std::fmt::Debug for GenerateOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerateOptions")
            .field("name", &self.name)
            .field("encrypted", &self.password.is_some())
            .field("certificate_validity", &self.certificate_validity)
            .finish()
    }
}

/// A key pair plus what is known about who holds it.
#[derive(Clone)]
pub struct Identity {
    keypair: KeyPair,
    certificate: Option<Certificate>,
    ephemeral: bool,
}

impl Identity {
    /// Generate an in-memory identity for a single session.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn ephemeral() -> CryptoResult<Self> {
        let keypair = KeyPair::generate()?;
        info!(key_id = %keypair.key_id_hex(), "Generated ephemeral signing identity");
        Ok(Self {
            keypair,
            certificate: None,
            ephemeral: true,
        })
    }

    /// Wrap an existing key pair as a persistent identity.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidCertificate`] if the certificate was
    /// issued for a different key.
    pub fn persistent(keypair: KeyPair, certificate: Option<Certificate>) -> CryptoResult<Self> {
        if let Some(cert) = &certificate {
            if cert.spki() != keypair.public_key().to_der() {
                return Err(CryptoError::InvalidCertificate(
                    "certificate does not match the private key".into(),
                ));
            }
        }
        Ok(Self {
            keypair,
            certificate,
            ephemeral: false,
        })
    }

    /// Generate a persistent identity into `dir`.
    ///
    /// Writes [`PRIVATE_KEY_FILE`] (mode 0600, never overwritten),
    /// [`PUBLIC_KEY_FILE`] and, when requested, [`CERTIFICATE_FILE`].
    ///
    /// # Errors
    ///
    /// Returns an error if a key file already exists or cannot be written.
    pub fn generate(dir: impl AsRef<Path>, options: &GenerateOptions) -> CryptoResult<Self> {
        let dir = dir.as_ref();
        let keypair = KeyPair::generate()?;
        keypair.save(
            dir.join(PRIVATE_KEY_FILE),
            options.password.as_ref().map(|p| p.as_slice()),
        )?;
        std::fs::write(dir.join(PUBLIC_KEY_FILE), keypair.public_key().to_pem()?)
            .map_err(|e| CryptoError::IoError(e.to_string()))?;

        let certificate = match options.certificate_validity {
            Some(validity) => {
                let name = if options.name.is_empty() {
                    "Tessera signer"
                } else {
                    options.name.as_str()
                };
                let cert =
                    Certificate::self_signed(&keypair, &CertificateParams::new(name, validity))?;
                std::fs::write(dir.join(CERTIFICATE_FILE), cert.to_pem()?)
                    .map_err(|e| CryptoError::IoError(e.to_string()))?;
                Some(cert)
            },
            None => None,
        };

        info!(
            key_id = %keypair.key_id_hex(),
            dir = %dir.display(),
            encrypted = options.password.is_some(),
            "Generated signing identity"
        );
        Self::persistent(keypair, certificate)
    }

    /// Load a persistent identity from a key file and optional certificate.
    ///
    /// # Errors
    ///
    /// Returns key loading errors, or a certificate error if the certificate
    /// is malformed or does not match the key.
    pub fn load(
        key_path: impl AsRef<Path>,
        password: Option<&[u8]>,
        certificate_path: Option<&Path>,
    ) -> CryptoResult<Self> {
        let keypair = KeyPair::load(key_path.as_ref(), password)?;
        let certificate = match certificate_path {
            Some(path) => {
                let pem = read_secret_file(path)?;
                let pem = std::str::from_utf8(&pem).map_err(|_| {
                    CryptoError::InvalidCertificate("certificate is not UTF-8 PEM".into())
                })?;
                Some(Certificate::from_pem(pem)?)
            },
            None => None,
        };
        debug!(
            key_id = %keypair.key_id_hex(),
            path = %key_path.as_ref().display(),
            "Loaded signing identity"
        );
        Self::persistent(keypair, certificate)
    }

    /// Load the identity stored in a directory written by [`Identity::generate`].
    ///
    /// # Errors
    ///
    /// Same as [`Identity::load`].
    pub fn load_dir(dir: impl AsRef<Path>, password: Option<&[u8]>) -> CryptoResult<Self> {
        let dir = dir.as_ref();
        let cert_path = dir.join(CERTIFICATE_FILE);
        let cert_path = cert_path.is_file().then_some(cert_path);
        Self::load(dir.join(PRIVATE_KEY_FILE), password, cert_path.as_deref())
    }

    /// Load the first identity directory in `candidates` that holds a key.
    ///
    /// Returns `Ok(None)` when no candidate has a private key.
    ///
    /// # Errors
    ///
    /// Returns the load error of the first candidate that has a key but
    /// cannot be loaded.
    pub fn discover(candidates: &[PathBuf], password: Option<&[u8]>) -> CryptoResult<Option<Self>> {
        for dir in candidates {
            if dir.join(PRIVATE_KEY_FILE).exists() {
                debug!(dir = %dir.display(), "Discovered signing identity");
                return Self::load_dir(dir, password).map(Some);
            }
        }
        Ok(None)
    }

    /// The key pair.
    #[must_use]
    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    /// The public key.
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        self.keypair.public_key()
    }

    /// The certificate, if any.
    #[must_use]
    pub fn certificate(&self) -> Option<&Certificate> {
        self.certificate.as_ref()
    }

    /// True for identities generated in memory with no persistent key.
    #[must_use]
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    /// Sign a digest.
    ///
    /// # Errors
    ///
    /// Returns a signing error from the key pair.
    pub fn sign(&self, digest: &ContentHash) -> CryptoResult<Signature> {
        self.keypair.sign(digest)
    }

    /// Hash and sign a stream.
    ///
    /// # Errors
    ///
    /// Returns I/O or signing errors.
    pub fn sign_stream<R: std::io::Read>(&self, reader: R) -> CryptoResult<(ContentHash, Signature)> {
        self.keypair.sign_stream(reader)
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("key_id", &self.keypair.key_id_hex())
            .field("ephemeral", &self.ephemeral)
            .field("certificate", &self.certificate.is_some())
            .finish()
    }
}
