//! Configuration types.
//!
//! These types mirror the domain types of the other Tessera crates without
//! depending on them. Every struct implements [`Default`] with the same values
//! as the embedded `defaults.toml`, so a bare `[section]` header produces a
//! working configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Recording sessions.
    pub session: SessionSection,
    /// Signing key material.
    pub identity: IdentitySection,
    /// RFC 3161 timestamp authority.
    pub timestamp: TimestampSection,
    /// Package verification.
    pub verify: VerifySection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// SessionSection
// ---------------------------------------------------------------------------

/// How sessions record and seal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Integrity mode: `"strict"`, `"normal"` or `"light"`.
    pub mode: String,
    /// Largest artifact, in bytes, a session will capture.
    pub max_artifact_size: u64,
    /// Whether to record git metadata for the working directory.
    pub capture_git: bool,
    /// Allow a strict session to sign with a throwaway key.
    pub allow_ephemeral: bool,
    /// When appended log lines reach the disk: `"flush"` or `"sync"`.
    pub durability: String,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            mode: "strict".to_owned(),
            max_artifact_size: 10 * 1024 * 1024 * 1024,
            capture_git: true,
            allow_ephemeral: false,
            durability: "flush".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// IdentitySection
// ---------------------------------------------------------------------------

/// Where the signing key lives. With no key configured, sessions sign with an
/// ephemeral key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySection {
    /// PKCS#8 PEM private key.
    pub private_key: Option<PathBuf>,
    /// X.509 certificate for the key, PEM or DER.
    pub certificate: Option<PathBuf>,
    /// Name of the environment variable holding the key password, if the key
    /// is encrypted.
    pub password_env: Option<String>,
}

// ---------------------------------------------------------------------------
// TimestampSection
// ---------------------------------------------------------------------------

/// Timestamp authority settings. No URL means no timestamping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimestampSection {
    /// TSA endpoint.
    pub url: Option<String>,
    /// Dotted policy OID sent as `reqPolicy`.
    pub policy_oid: Option<String>,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Attempts before giving up.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles after each.
    pub initial_backoff_ms: u64,
}

impl Default for TimestampSection {
    fn default() -> Self {
        Self {
            url: None,
            policy_oid: None,
            timeout_secs: 30,
            max_attempts: 3,
            initial_backoff_ms: 500,
        }
    }
}

// ---------------------------------------------------------------------------
// VerifySection
// ---------------------------------------------------------------------------

/// Verifier defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifySection {
    /// Stop at the first failed check.
    pub fail_fast: bool,
    /// Grade every package as strict, whatever mode it was sealed in.
    pub strict: bool,
    /// Pin timestamp tokens to this TSA certificate.
    pub tsa_certificate: Option<PathBuf>,
    /// PEM public keys of accepted signers. Empty accepts any signer.
    pub trusted_keys: Vec<PathBuf>,
    /// Re-hash files the log references, looking for them here.
    pub auto_data_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"` or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["tessera_verify=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}
