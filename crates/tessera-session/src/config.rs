//! Session settings.

use std::path::PathBuf;
use std::time::Duration;

use tessera_audit::Durability;
use tessera_core::Mode;
use tessera_package::DEFAULT_MAX_ARTIFACT_SIZE;
use tessera_timestamp::{RetryPolicy, TimestampClientConfig};

/// How a session records and where it seals.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Where the sealed package is written. Must not exist yet.
    pub output: PathBuf,
    /// Integrity mode.
    pub mode: Mode,
    /// Largest artifact accepted by [`Session::add_artifact`](crate::Session::add_artifact).
    pub max_artifact_size: u64,
    /// When appended log lines reach the disk.
    pub durability: Durability,
    /// Record git metadata for this directory, if set.
    pub git_dir: Option<PathBuf>,
    /// Accept an ephemeral identity in strict mode.
    pub allow_ephemeral: bool,
    /// Timestamp authority. `None` seals without a token.
    pub timestamp: Option<TimestampClientConfig>,
    /// Verify the package after writing it, and delete it if verification fails.
    pub verify_after_seal: bool,
}

impl SessionConfig {
    /// Strict defaults writing to `output`, with no TSA and no git capture.
    #[must_use]
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            mode: Mode::Strict,
            max_artifact_size: DEFAULT_MAX_ARTIFACT_SIZE,
            durability: Durability::Flush,
            git_dir: None,
            allow_ephemeral: false,
            timestamp: None,
            verify_after_seal: false,
        }
    }

    /// Set the integrity mode.
    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the artifact size limit.
    #[must_use]
    pub fn with_max_artifact_size(mut self, bytes: u64) -> Self {
        self.max_artifact_size = bytes;
        self
    }

    /// Set log durability.
    #[must_use]
    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    /// Capture git metadata for the repository containing `dir`.
    #[must_use]
    pub fn with_git_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.git_dir = Some(dir.into());
        self
    }

    /// Allow strict sessions to sign with an ephemeral key.
    #[must_use]
    pub fn allow_ephemeral(mut self, allow: bool) -> Self {
        self.allow_ephemeral = allow;
        self
    }

    /// Timestamp the log with the TSA at `url`.
    #[must_use]
    pub fn with_tsa(mut self, url: impl Into<String>) -> Self {
        self.timestamp = Some(TimestampClientConfig::new(url));
        self
    }

    /// Timestamp the log with a fully specified client.
    #[must_use]
    pub fn with_timestamp_client(mut self, config: TimestampClientConfig) -> Self {
        self.timestamp = Some(config);
        self
    }

    /// Verify the package once it is written.
    #[must_use]
    pub fn verify_after_seal(mut self, verify: bool) -> Self {
        self.verify_after_seal = verify;
        self
    }
}

/// Client settings from the `[timestamp]` fields.
pub(crate) fn timestamp_client_config(
    url: &str,
    policy_oid: Option<&str>,
    timeout_secs: u64,
    max_attempts: u32,
    initial_backoff_ms: u64,
) -> TimestampClientConfig {
    TimestampClientConfig {
        url: url.to_owned(),
        policy_oid: policy_oid.map(str::to_owned),
        timeout: Duration::from_secs(timeout_secs),
        retry: RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            ..RetryPolicy::default()
        },
    }
}
