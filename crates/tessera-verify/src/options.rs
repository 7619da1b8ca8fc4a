//! Verifier options and cancellation.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tessera_core::Mode;
use tessera_crypto::{Certificate, SignatureVerifier};
use tessera_package::ExtractLimits;

/// Cooperative cancellation flag, checked between checks.
///
/// Clones share the flag, so one handle can be given to another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a package is verified.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Grading of soft gaps. `None` uses the mode recorded in the package.
    pub mode: Option<Mode>,
    /// Stop after the first failed check.
    pub fail_fast: bool,
    /// Signers to accept. An empty registry accepts any valid signer.
    pub trusted_keys: SignatureVerifier,
    /// TSA certificate to check tokens against instead of the bundled one.
    pub tsa_certificate: Option<Certificate>,
    /// Files whose hashes must appear among the log's tracked hashes.
    pub external_files: Vec<PathBuf>,
    /// Base directory for re-hashing every file the log references.
    pub auto_data_dir: Option<PathBuf>,
    /// Extraction limits.
    pub limits: ExtractLimits,
    /// Cancellation flag.
    pub cancel: CancelToken,
}

impl VerifyOptions {
    /// Default options: every check runs, mode taken from the package.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grade soft gaps under `mode`.
    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Stop after the first failed check.
    #[must_use]
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Require the signer to be in `verifier`.
    #[must_use]
    pub fn with_trusted_keys(mut self, verifier: SignatureVerifier) -> Self {
        self.trusted_keys = verifier;
        self
    }

    /// Check timestamp tokens against `certificate`.
    #[must_use]
    pub fn with_tsa_certificate(mut self, certificate: Certificate) -> Self {
        self.tsa_certificate = Some(certificate);
        self
    }

    /// Require `path` to be recorded as a tracked file.
    #[must_use]
    pub fn with_external_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.external_files.push(path.into());
        self
    }

    /// Re-hash every `*_path`/`*_file_hash` pair in the log, resolving
    /// relative paths (and, failing that, bare file names) against `dir`.
    #[must_use]
    pub fn with_auto_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.auto_data_dir = Some(dir.into());
        self
    }

    /// Use `token` for cancellation.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let handle = token.clone();
        assert!(!token.is_cancelled());
        std::thread::spawn(move || handle.cancel()).join().unwrap();
        assert!(token.is_cancelled());
    }
}
