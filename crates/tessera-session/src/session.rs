//! The recording session handle.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tessera_audit::{AuditAction, AuditChain, AuditEntry, CallRecord, Recorder};
use tessera_core::{FORMAT_VERSION, Mode, SessionId, Timestamp, Version};
use tessera_crypto::{ContentHash, Identity};
use tessera_package::layout::{AUDIT_LOG, DATA_DIR};
use tessera_package::{
    Artifact, ArtifactError, ArtifactGuard, Degradation, DegradationKind, EnvironmentSnapshot,
    GitMetadata, PackageContents, PackageMetadata, PackageWriter, SignerInfo, TimestampStatus,
    TrackedFile,
};
use tessera_timestamp::{TimestampClient, parse_tsa_url};
use tessera_verify::{VerifyOptions, Verifier};
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};

/// A package that has been sealed.
#[derive(Debug, Clone)]
pub struct SealedPackage {
    /// Where the package was written.
    pub path: PathBuf,
    /// The signed `package.json`.
    pub metadata: PackageMetadata,
    /// Number of ZIP members.
    pub member_count: usize,
}

/// An open recording session.
///
/// Sessions are independent: several can run at once, each with its own
/// staging directory, chain and identity. Recording methods take `&self` and
/// may be called from any thread. [`seal`](Self::seal) consumes the session.
pub struct Session {
    id: SessionId,
    config: SessionConfig,
    identity: Identity,
    started_at: Timestamp,
    staging: TempDir,
    recorder: Recorder,
    guard: ArtifactGuard,
    tsa: Option<TimestampClient>,
    degradations: Mutex<Vec<Degradation>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("mode", &self.config.mode)
            .field("output", &self.config.output)
            .field("staging", &self.staging.path())
            .finish_non_exhaustive()
    }
}

/// Check everything that would otherwise fail at seal time.
///
/// Returns the directory the package will be written to.
fn preflight(config: &SessionConfig, identity: &Identity) -> SessionResult<PathBuf> {
    let output = &config.output;
    if output.is_dir() {
        return Err(SessionError::config(format!(
            "output {} is a directory",
            output.display()
        )));
    }
    if output.symlink_metadata().is_ok() {
        return Err(SessionError::config(format!(
            "output {} already exists",
            output.display()
        )));
    }

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !dir.is_dir() {
        return Err(SessionError::config(format!(
            "output directory {} does not exist",
            dir.display()
        )));
    }
    tempfile::Builder::new()
        .prefix(".tessera-writable-")
        .tempfile_in(&dir)
        .map_err(|e| {
            SessionError::config(format!(
                "output directory {} is not writable: {e}",
                dir.display()
            ))
        })?;

    if let Some(timestamp) = &config.timestamp {
        parse_tsa_url(&timestamp.url).map_err(|e| SessionError::config(e.to_string()))?;
    }
    if config.max_artifact_size == 0 {
        return Err(SessionError::config("artifact size limit must be non-zero"));
    }
    if config.mode.is_strict() && identity.is_ephemeral() && !config.allow_ephemeral {
        return Err(SessionError::config(
            "strict mode requires a persistent identity (or allow_ephemeral)",
        ));
    }
    if let Some(git_dir) = &config.git_dir {
        if !git_dir.is_dir() {
            return Err(SessionError::config(format!(
                "git directory {} does not exist",
                git_dir.display()
            )));
        }
    }
    Ok(dir)
}

impl Session {
    /// Validate `config` and open a session.
    ///
    /// All configuration checks run before anything is created. The session
    /// then stages into a temporary directory next to the output and writes
    /// its `session_started` entry.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Configuration`] if the output is unusable, the TSA
    ///   URL or policy is invalid, the artifact limit is zero, or strict mode
    ///   is given an ephemeral identity without `allow_ephemeral`
    /// - I/O or audit errors while creating the staging area
    pub fn start(config: SessionConfig, identity: Identity) -> SessionResult<Self> {
        let dir = preflight(&config, &identity)?;
        let tsa = config
            .timestamp
            .clone()
            .map(TimestampClient::new)
            .transpose()
            .map_err(|e| SessionError::config(e.to_string()))?;

        let staging = tempfile::Builder::new()
            .prefix(".tessera-session-")
            .tempdir_in(&dir)?;
        let chain = AuditChain::create(
            staging.path().join(AUDIT_LOG),
            config.mode,
            config.durability,
        )?;
        let recorder = Recorder::new(Arc::new(chain));
        let guard = ArtifactGuard::new(staging.path().join(DATA_DIR), config.max_artifact_size)?;

        let id = SessionId::new();
        recorder.record(
            CallRecord::new(AuditAction::SessionStarted, id.to_string())
                .kwarg("mode", config.mode.to_string())
                .kwarg("tool_version", Version::current().to_string())
                .kwarg("signer", identity.keypair().key_id_hex()),
        )?;

        info!(
            session_id = %id,
            mode = %config.mode,
            ephemeral = identity.is_ephemeral(),
            timestamped = tsa.is_some(),
            output = %config.output.display(),
            "Session started"
        );

        Ok(Self {
            id,
            config,
            identity,
            started_at: Timestamp::now(),
            staging,
            recorder,
            guard,
            tsa,
            degradations: Mutex::new(Vec::new()),
        })
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Integrity mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    /// A handle producers can clone and append through.
    #[must_use]
    pub fn recorder(&self) -> Recorder {
        self.recorder.clone()
    }

    /// Append an event.
    ///
    /// # Errors
    ///
    /// Returns any append error. A failed write poisons the chain, and every
    /// later call fails as well.
    pub fn record(&self, record: CallRecord) -> SessionResult<AuditEntry> {
        Ok(self.recorder.record(record)?)
    }

    /// Record a key/value annotation.
    ///
    /// # Errors
    ///
    /// Same as [`record`](Self::record).
    pub fn annotate(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> SessionResult<AuditEntry> {
        Ok(self.recorder.annotate(key, value)?)
    }

    fn degrade(&self, kind: DegradationKind, detail: String) -> SessionResult<()> {
        warn!(session_id = %self.id, kind = kind.as_str(), %detail, "Session degraded");
        self.recorder.record(
            CallRecord::new(AuditAction::SessionDegraded, kind.as_str()).arg(detail.clone()),
        )?;
        self.degradations
            .lock()
            .map_err(|_| SessionError::LockPoisoned)?
            .push(Degradation::now(kind, detail));
        Ok(())
    }

    /// Copy `path` into the package now, under `name` or its file name.
    ///
    /// Outside strict mode a missing file is recorded as a degradation and
    /// `Ok(None)` is returned. Every other capture error is returned as is.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Artifact`] for invalid or duplicate names,
    /// symlinks, non-regular files and oversized files, and for missing files
    /// in strict mode.
    pub fn add_artifact(
        &self,
        path: impl AsRef<Path>,
        name: Option<&str>,
    ) -> SessionResult<Option<Artifact>> {
        let path = path.as_ref();
        match self.guard.register(path, name) {
            Ok(artifact) => {
                self.recorder.record(
                    CallRecord::new(AuditAction::ArtifactCaptured, artifact.name.clone())
                        .arg(path.display().to_string())
                        .extra("artifact_sha256", artifact.sha256.to_hex()),
                )?;
                Ok(Some(artifact))
            },
            Err(ArtifactError::Missing(missing)) if !self.config.mode.is_strict() => {
                self.degrade(
                    DegradationKind::ArtifactMissing,
                    format!("artifact {} does not exist", missing.display()),
                )?;
                Ok(None)
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Record the hash of a file that stays outside the package.
    ///
    /// Outside strict mode an unreadable file is recorded as a degradation
    /// and `Ok(None)` is returned.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Artifact`] if the file cannot be hashed in
    /// strict mode, or is a symlink or not a regular file.
    pub fn track_file(&self, path: impl AsRef<Path>) -> SessionResult<Option<TrackedFile>> {
        let path = path.as_ref();
        match self.guard.track(path) {
            Ok(tracked) => {
                let shown = tracked.path.display().to_string();
                self.recorder.record(
                    CallRecord::new(AuditAction::TrackFile, shown.clone())
                        .extra("tracked_path", shown)
                        .extra("tracked_file_hash", tracked.sha256.to_hex()),
                )?;
                Ok(Some(tracked))
            },
            Err(e @ (ArtifactError::Missing(_) | ArtifactError::Io { .. }))
                if !self.config.mode.is_strict() =>
            {
                self.degrade(
                    DegradationKind::HashFailed,
                    format!("could not hash {}: {e}", path.display()),
                )?;
                Ok(None)
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Names of the artifacts captured so far.
    ///
    /// # Errors
    ///
    /// Returns an error if a capture panicked while holding the registry.
    pub fn artifact_names(&self) -> SessionResult<Vec<String>> {
        Ok(self.guard.names()?)
    }

    /// Degradations recorded so far.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockPoisoned`] if a recording thread panicked.
    pub fn degradations(&self) -> SessionResult<Vec<Degradation>> {
        Ok(self
            .degradations
            .lock()
            .map_err(|_| SessionError::LockPoisoned)?
            .clone())
    }

    /// Close the log and write the signed package.
    ///
    /// Steps, in order: append `session_closed` and close the chain; capture
    /// the environment and git metadata; snapshot the manifest; timestamp the
    /// log digest; sign and write every component into a temporary archive
    /// that is renamed onto the output.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Timestamp`] if the TSA fails in strict mode
    /// - [`SessionError::SelfCheckFailed`] if `verify_after_seal` is set and
    ///   the written package does not verify; the file is removed
    /// - audit, package and I/O errors; the output is never left partial
    pub fn seal(self) -> SessionResult<SealedPackage> {
        let Self {
            id,
            config,
            identity,
            started_at,
            staging,
            recorder,
            guard,
            tsa,
            degradations,
        } = self;
        let mut degradations = degradations
            .into_inner()
            .map_err(|_| SessionError::LockPoisoned)?;

        recorder.record(CallRecord::new(AuditAction::SessionClosed, id.to_string()))?;
        let head = recorder.chain().close()?;
        let log_path = staging.path().join(AUDIT_LOG);

        let environment = EnvironmentSnapshot::capture();
        let git = match &config.git_dir {
            Some(dir) => {
                let git = GitMetadata::capture(dir);
                if git.is_none() {
                    degradations.push(Degradation::now(
                        DegradationKind::GitUnavailable,
                        format!("{} is not a readable git work tree", dir.display()),
                    ));
                }
                git
            },
            None => None,
        };

        let manifest = guard.manifest()?;

        let (log_digest, _) = ContentHash::hash_file(&log_path)?;
        let (timestamp, response) = match &tsa {
            Some(client) => stamp(client, &log_digest, config.mode, &mut degradations)?,
            None => (TimestampStatus::NotRequested, None),
        };

        let metadata = PackageMetadata {
            format_version: FORMAT_VERSION,
            tool_version: Version::current(),
            session_id: id.clone(),
            mode: config.mode,
            started_at,
            sealed_at: Timestamp::now(),
            entry_count: head.entry_count,
            chain_head: head.head_hash,
            log_digest,
            signer: SignerInfo {
                key_id: identity.keypair().key_id_hex(),
                ephemeral: identity.is_ephemeral(),
                has_certificate: identity.certificate().is_some(),
            },
            timestamp,
            artifact_count: manifest.len(),
            has_git_metadata: git.is_some(),
            degradations,
        };

        let written = PackageWriter::new(&identity).write(
            &config.output,
            &PackageContents {
                log_path: &log_path,
                data_dir: guard.staging_dir(),
                manifest: &manifest,
                environment: &environment,
                git: git.as_ref(),
                timestamp_response: response.as_deref(),
                metadata: &metadata,
            },
        )?;

        if config.verify_after_seal {
            self_check(&written.path)?;
        }

        info!(
            session_id = %id,
            path = %written.path.display(),
            entries = head.entry_count,
            artifacts = manifest.len(),
            degraded = metadata.is_degraded(),
            "Session sealed"
        );
        Ok(SealedPackage {
            path: written.path,
            metadata,
            member_count: written.member_count,
        })
    }
}

/// Request a token over the log digest.
fn stamp(
    client: &TimestampClient,
    digest: &ContentHash,
    mode: Mode,
    degradations: &mut Vec<Degradation>,
) -> SessionResult<(TimestampStatus, Option<Vec<u8>>)> {
    let outcome = client.request(digest).and_then(|response| {
        let info = response.granted_token()?.tst_info();
        Ok((info.gen_time, info.serial_hex(), response.to_der().to_vec()))
    });

    match outcome {
        Ok((gen_time, serial, der)) => {
            debug!(tsa = %client.url(), %serial, "Log digest timestamped");
            Ok((
                TimestampStatus::Granted {
                    gen_time,
                    tsa_url: client.url().to_string(),
                    serial,
                },
                Some(der),
            ))
        },
        Err(e) if mode.timestamp_required() => {
            error!(tsa = %client.url(), error = %e, "Timestamp failed in strict mode");
            Err(e.into())
        },
        Err(e) => {
            let reason = e.to_string();
            warn!(tsa = %client.url(), %reason, "Timestamp unavailable, sealing without a token");
            degradations.push(Degradation::now(
                DegradationKind::TimestampUnavailable,
                reason.clone(),
            ));
            Ok((TimestampStatus::Unavailable { reason }, None))
        },
    }
}

/// Verify a freshly written package. Soft gaps the mode already accepted are
/// not re-graded, so this runs in normal mode.
fn self_check(path: &Path) -> SessionResult<()> {
    let report = Verifier::new(VerifyOptions::new().with_mode(Mode::Normal)).verify(path);
    if report.passed {
        debug!(path = %path.display(), "Sealed package verified");
        return Ok(());
    }
    let reason = report
        .failures()
        .next()
        .map_or_else(|| "verification did not pass".to_owned(), ToString::to_string);
    error!(path = %path.display(), %reason, "Sealed package failed verification");
    if let Err(e) = std::fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "Could not remove unverifiable package");
    }
    Err(SessionError::SelfCheckFailed(reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_audit::LogRecord;
    use tessera_package::PackageReader;
    use tessera_package::layout::TIMESTAMP_RESPONSE;
    use tessera_test::http::{HttpReply, ScriptedServer};
    use tessera_test::tsa::{TestTsa, TokenVariant};
    use tessera_timestamp::{REPLY_CONTENT_TYPE, RetryPolicy, TimestampClientConfig};

    fn identity() -> Identity {
        tessera_test::keys::persistent_identity()
    }

    fn fast_tsa(url: &str) -> TimestampClientConfig {
        TimestampClientConfig {
            retry: RetryPolicy::none(),
            ..TimestampClientConfig::new(url)
        }
    }

    fn logged_actions(package: &Path) -> Vec<AuditAction> {
        PackageReader::open(package)
            .unwrap()
            .entries()
            .unwrap()
            .map(|record| match record.unwrap() {
                LogRecord::Entry(entry) => entry.action,
                other => panic!("unexpected log record {other:?}"),
            })
            .collect()
    }

    fn config_error(result: SessionResult<Session>) -> String {
        match result {
            Err(SessionError::Configuration(message)) => message,
            other => panic!("expected a configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_start_rejects_directory_output() {
        let dir = tessera_test::test_dir();
        let message = config_error(Session::start(SessionConfig::new(dir.path()), identity()));
        assert!(message.contains("is a directory"));
    }

    #[test]
    fn test_start_rejects_existing_output() {
        let dir = tessera_test::test_dir();
        let output = tessera_test::test_file_in_dir(dir.path(), "run.zip", b"old");
        let message = config_error(Session::start(SessionConfig::new(output), identity()));
        assert!(message.contains("already exists"));
    }

    #[test]
    fn test_start_rejects_missing_output_directory() {
        let dir = tessera_test::test_dir();
        let output = dir.path().join("missing").join("run.zip");
        let message = config_error(Session::start(SessionConfig::new(output), identity()));
        assert!(message.contains("does not exist"));
    }

    #[test]
    fn test_start_rejects_bad_tsa_url() {
        let dir = tessera_test::test_dir();
        let config = SessionConfig::new(dir.path().join("run.zip")).with_tsa("ftp://tsa");
        config_error(Session::start(config, identity()));
    }

    #[test]
    fn test_start_rejects_zero_artifact_limit() {
        let dir = tessera_test::test_dir();
        let config = SessionConfig::new(dir.path().join("run.zip")).with_max_artifact_size(0);
        let message = config_error(Session::start(config, identity()));
        assert!(message.contains("non-zero"));
    }

    #[test]
    fn test_strict_mode_refuses_ephemeral_identity() {
        let dir = tessera_test::test_dir();
        let output = dir.path().join("run.zip");
        let ephemeral = Identity::ephemeral().unwrap();
        config_error(Session::start(SessionConfig::new(&output), ephemeral));

        let allowed = SessionConfig::new(&output).allow_ephemeral(true);
        assert!(Session::start(allowed, Identity::ephemeral().unwrap()).is_ok());
    }

    #[test]
    fn test_failed_start_leaves_nothing_behind() {
        let dir = tessera_test::test_dir();
        let config = SessionConfig::new(dir.path().join("run.zip")).with_max_artifact_size(0);
        assert!(Session::start(config, identity()).is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_seal_writes_verifiable_package() {
        let dir = tessera_test::test_dir();
        let source = tessera_test::test_file_in_dir(dir.path(), "model.bin", b"weights");
        let tracked = tessera_test::test_file_in_dir(dir.path(), "train.csv", b"a,b\n1,2\n");
        let output = dir.path().join("run.zip");

        let session = Session::start(
            SessionConfig::new(&output).verify_after_seal(true),
            identity(),
        )
        .unwrap();
        session
            .record(CallRecord::call("fit").kwarg("epochs", "3").result("0.91"))
            .unwrap();
        session.annotate("dataset", "train.csv").unwrap();
        let artifact = session.add_artifact(&source, None).unwrap().unwrap();
        assert_eq!(artifact.name, "model.bin");
        session.track_file(&tracked).unwrap().unwrap();
        let sealed = session.seal().unwrap();

        // started, call, annotate, artifact, track, closed
        assert_eq!(sealed.metadata.entry_count, 6);
        assert_eq!(sealed.metadata.artifact_count, 1);
        assert_eq!(sealed.metadata.timestamp, TimestampStatus::NotRequested);
        assert!(!sealed.metadata.is_degraded());

        assert_eq!(
            logged_actions(&output),
            [
                AuditAction::SessionStarted,
                AuditAction::Call,
                AuditAction::Annotate,
                AuditAction::ArtifactCaptured,
                AuditAction::TrackFile,
                AuditAction::SessionClosed,
            ]
        );
    }

    #[test]
    fn test_missing_artifact_is_fatal_in_strict_mode() {
        let dir = tessera_test::test_dir();
        let session =
            Session::start(SessionConfig::new(dir.path().join("run.zip")), identity()).unwrap();
        let result = session.add_artifact(dir.path().join("absent.bin"), None);
        assert!(matches!(
            result,
            Err(SessionError::Artifact(ArtifactError::Missing(_)))
        ));
    }

    #[test]
    fn test_missing_artifact_degrades_in_normal_mode() {
        let dir = tessera_test::test_dir();
        let output = dir.path().join("run.zip");
        let session =
            Session::start(SessionConfig::new(&output).with_mode(Mode::Normal), identity())
                .unwrap();
        assert!(
            session
                .add_artifact(dir.path().join("absent.bin"), None)
                .unwrap()
                .is_none()
        );
        let sealed = session.seal().unwrap();

        assert_eq!(sealed.metadata.degradations.len(), 1);
        assert_eq!(
            sealed.metadata.degradations[0].kind,
            DegradationKind::ArtifactMissing
        );
        let degraded = logged_actions(&output)
            .into_iter()
            .filter(|action| *action == AuditAction::SessionDegraded)
            .count();
        assert_eq!(degraded, 1);
    }

    #[test]
    fn test_oversized_artifact_is_always_an_error() {
        let dir = tessera_test::test_dir();
        let source = tessera_test::test_file_in_dir(dir.path(), "big.bin", &[7u8; 64]);
        let config = SessionConfig::new(dir.path().join("run.zip"))
            .with_mode(Mode::Light)
            .with_max_artifact_size(16);
        let session = Session::start(config, identity()).unwrap();
        assert!(matches!(
            session.add_artifact(&source, None),
            Err(SessionError::Artifact(ArtifactError::SizeExceeded { .. }))
        ));
    }

    #[test]
    fn test_seal_with_timestamp() {
        let dir = tessera_test::test_dir();
        let output = dir.path().join("run.zip");
        let tsa = TestTsa::new();
        let server = ScriptedServer::start(1, move |body| {
            HttpReply::ok(
                REPLY_CONTENT_TYPE,
                tsa.respond_to_request(body, TokenVariant::Valid),
            )
        });

        let config = SessionConfig::new(&output)
            .with_timestamp_client(fast_tsa(server.url()))
            .verify_after_seal(true);
        let session = Session::start(config, identity()).unwrap();
        session.record(CallRecord::call("load")).unwrap();
        let sealed = session.seal().unwrap();
        assert_eq!(server.finish().len(), 1);

        assert!(matches!(
            sealed.metadata.timestamp,
            TimestampStatus::Granted { .. }
        ));
        let opened = PackageReader::open(&output).unwrap();
        assert!(opened.has_member(TIMESTAMP_RESPONSE));
    }

    #[test]
    fn test_tsa_failure_is_fatal_in_strict_mode() {
        let dir = tessera_test::test_dir();
        let output = dir.path().join("run.zip");
        let server = ScriptedServer::start(1, |_| HttpReply::status(503));

        let config = SessionConfig::new(&output).with_timestamp_client(fast_tsa(server.url()));
        let session = Session::start(config, identity()).unwrap();
        assert!(matches!(session.seal(), Err(SessionError::Timestamp(_))));
        assert!(!output.exists());
        assert_eq!(server.finish().len(), 1);
    }

    #[test]
    fn test_tsa_failure_is_recorded_in_normal_mode() {
        let dir = tessera_test::test_dir();
        let output = dir.path().join("run.zip");
        let server = ScriptedServer::start(1, |_| HttpReply::status(503));

        let config = SessionConfig::new(&output)
            .with_mode(Mode::Normal)
            .with_timestamp_client(fast_tsa(server.url()));
        let session = Session::start(config, identity()).unwrap();
        let sealed = session.seal().unwrap();
        assert_eq!(server.finish().len(), 1);

        assert!(matches!(
            sealed.metadata.timestamp,
            TimestampStatus::Unavailable { .. }
        ));
        assert_eq!(
            sealed.metadata.degradations[0].kind,
            DegradationKind::TimestampUnavailable
        );

        let report = Verifier::new(VerifyOptions::new()).verify(&output);
        assert!(report.passed, "{report}");
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn test_concurrent_producers_share_one_chain() {
        let dir = tessera_test::test_dir();
        let session =
            Session::start(SessionConfig::new(dir.path().join("run.zip")), identity()).unwrap();

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let recorder = session.recorder();
                scope.spawn(move || {
                    for step in 0..10 {
                        recorder
                            .record(CallRecord::call(format!("step_{worker}_{step}")))
                            .unwrap();
                    }
                });
            }
        });

        let sealed = session.seal().unwrap();
        assert_eq!(sealed.metadata.entry_count, 42);
    }

    #[test]
    fn test_sessions_are_independent() {
        let dir = tessera_test::test_dir();
        let first =
            Session::start(SessionConfig::new(dir.path().join("a.zip")), identity()).unwrap();
        let second =
            Session::start(SessionConfig::new(dir.path().join("b.zip")), identity()).unwrap();
        assert_ne!(first.id(), second.id());

        first.record(CallRecord::call("only_in_a")).unwrap();
        let a = first.seal().unwrap();
        let b = second.seal().unwrap();
        assert_eq!(a.metadata.entry_count, 3);
        assert_eq!(b.metadata.entry_count, 2);
    }
}
