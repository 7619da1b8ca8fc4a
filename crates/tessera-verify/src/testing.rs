//! Builds sealed packages for verifier tests.

use std::path::PathBuf;
use tempfile::TempDir;
use tessera_audit::{AuditAction, AuditChain, CallRecord, Durability};
use tessera_core::{FORMAT_VERSION, Mode, SessionId, Timestamp, Version};
use tessera_crypto::{ContentHash, Identity};
use tessera_package::layout::{AUDIT_LOG, DATA_DIR};
use tessera_package::{
    ArtifactGuard, Degradation, DegradationKind, EnvironmentSnapshot, PackageContents,
    PackageMetadata, PackageWriter, SignerInfo, TimestampStatus,
};
use tessera_test::tsa::{TestTsa, TokenVariant};
use tessera_timestamp::TimestampResponse;

pub(crate) const TSA_URL: &str = "http://tsa.test/tsr";

/// How the log digest is timestamped.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Stamp {
    None,
    Token(TokenVariant),
    Unavailable,
    GrantedWithoutToken,
}

pub(crate) struct Sealed {
    pub(crate) dir: TempDir,
    pub(crate) path: PathBuf,
}

pub(crate) struct PackageSpec {
    mode: Mode,
    identity: Identity,
    stamp: Stamp,
    artifacts: Vec<(&'static str, Vec<u8>)>,
    tracked: Vec<Vec<u8>>,
}

impl PackageSpec {
    pub(crate) fn new() -> Self {
        Self {
            mode: Mode::Strict,
            identity: tessera_test::keys::persistent_identity(),
            stamp: Stamp::None,
            artifacts: Vec::new(),
            tracked: Vec::new(),
        }
    }

    pub(crate) fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub(crate) fn ephemeral(mut self) -> Self {
        self.identity = Identity::ephemeral().unwrap();
        self
    }

    pub(crate) fn stamp(mut self, stamp: Stamp) -> Self {
        self.stamp = stamp;
        self
    }

    pub(crate) fn artifact(mut self, name: &'static str, bytes: &[u8]) -> Self {
        self.artifacts.push((name, bytes.to_vec()));
        self
    }

    pub(crate) fn tracked(mut self, bytes: &[u8]) -> Self {
        self.tracked.push(bytes.to_vec());
        self
    }

    pub(crate) fn seal(self) -> Sealed {
        let dir = tessera_test::test_dir();
        let staging = dir.path().join("staging");
        std::fs::create_dir(&staging).unwrap();
        let log_path = staging.join(AUDIT_LOG);
        let started_at = Timestamp::now();

        let chain = AuditChain::create(&log_path, self.mode, Durability::Flush).unwrap();
        chain
            .append(CallRecord::new(AuditAction::SessionStarted, "session"))
            .unwrap();
        chain
            .append(CallRecord::call("load_data").arg("'train.csv'"))
            .unwrap();
        chain
            .append(
                CallRecord::call("fit")
                    .kwarg("epochs", "10")
                    .result("0.93"),
            )
            .unwrap();
        for (index, bytes) in self.tracked.iter().enumerate() {
            let path = dir.path().join(format!("tracked-{index}.csv"));
            std::fs::write(&path, bytes).unwrap();
            chain
                .append(
                    CallRecord::new(AuditAction::TrackFile, path.display().to_string())
                        .extra("tracked_path", path.display().to_string())
                        .extra("tracked_file_hash", ContentHash::hash(bytes).to_hex()),
                )
                .unwrap();
        }

        let sources = dir.path().join("sources");
        std::fs::create_dir(&sources).unwrap();
        let guard = ArtifactGuard::new(staging.join(DATA_DIR), 1 << 20).unwrap();
        for (name, bytes) in &self.artifacts {
            let source = sources.join(name);
            std::fs::write(&source, bytes).unwrap();
            guard.register(&source, None).unwrap();
        }
        let head = chain.close().unwrap();
        let (log_digest, _) = ContentHash::hash_file(&log_path).unwrap();

        let tsa = TestTsa::new();
        let mut degradations = Vec::new();
        let (timestamp, response) = match self.stamp {
            Stamp::None => (TimestampStatus::NotRequested, None),
            Stamp::Token(variant) => {
                let response = tsa.respond(log_digest.as_bytes(), None, variant);
                let parsed = TimestampResponse::from_der(&response).unwrap();
                let info = parsed.granted_token().unwrap().tst_info();
                (
                    TimestampStatus::Granted {
                        gen_time: info.gen_time,
                        tsa_url: TSA_URL.to_string(),
                        serial: info.serial_hex(),
                    },
                    Some(response),
                )
            },
            Stamp::Unavailable => {
                degradations.push(Degradation::now(
                    DegradationKind::TimestampUnavailable,
                    "connection refused",
                ));
                (
                    TimestampStatus::Unavailable {
                        reason: "connection refused".to_string(),
                    },
                    None,
                )
            },
            Stamp::GrantedWithoutToken => (
                TimestampStatus::Granted {
                    gen_time: chrono::Utc::now(),
                    tsa_url: TSA_URL.to_string(),
                    serial: "01".to_string(),
                },
                None,
            ),
        };

        let manifest = guard.manifest().unwrap();
        let environment = EnvironmentSnapshot::capture();
        let metadata = PackageMetadata {
            format_version: FORMAT_VERSION,
            tool_version: Version::current(),
            session_id: SessionId::new(),
            mode: self.mode,
            started_at,
            sealed_at: Timestamp::now(),
            entry_count: head.entry_count,
            chain_head: head.head_hash,
            log_digest,
            signer: SignerInfo {
                key_id: self.identity.keypair().key_id_hex(),
                ephemeral: self.identity.is_ephemeral(),
                has_certificate: self.identity.certificate().is_some(),
            },
            timestamp,
            artifact_count: manifest.len(),
            has_git_metadata: false,
            degradations,
        };

        let path = dir.path().join("package.zip");
        PackageWriter::new(&self.identity)
            .write(
                &path,
                &PackageContents {
                    log_path: &log_path,
                    data_dir: guard.staging_dir(),
                    manifest: &manifest,
                    environment: &environment,
                    git: None,
                    timestamp_response: response.as_deref(),
                    metadata: &metadata,
                },
            )
            .unwrap();
        Sealed { dir, path }
    }
}
