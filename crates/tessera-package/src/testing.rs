//! Package builders for unit tests.

use std::path::{Path, PathBuf};
use tessera_audit::{AuditAction, AuditChain, CallRecord, Durability};
use tessera_core::{FORMAT_VERSION, Mode, SessionId, Timestamp, Version};
use tessera_crypto::ContentHash;

use crate::environment::EnvironmentSnapshot;
use crate::error::PackageResult;
use crate::git::GitMetadata;
use crate::guard::ArtifactGuard;
use crate::layout::{AUDIT_LOG, DATA_DIR};
use crate::metadata::{PackageMetadata, SignerInfo, TimestampStatus};
use crate::writer::{PackageContents, PackageWriter, WrittenPackage};

pub(crate) fn write_artifact(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

pub(crate) fn try_build_package(
    dir: &Path,
    artifacts: &[&Path],
    output: &Path,
) -> PackageResult<WrittenPackage> {
    try_build_package_with_git(dir, artifacts, output, None, false)
}

pub(crate) fn try_build_package_with_git(
    dir: &Path,
    artifacts: &[&Path],
    output: &Path,
    git: Option<&GitMetadata>,
    has_git_metadata: bool,
) -> PackageResult<WrittenPackage> {
    let staging = tempfile::tempdir_in(dir)?;
    let log_path = staging.path().join(AUDIT_LOG);
    let started_at = Timestamp::now();

    let chain = AuditChain::create(&log_path, Mode::Strict, Durability::Flush)?;
    chain.append(CallRecord::new(AuditAction::SessionStarted, "session"))?;
    let guard = ArtifactGuard::new(staging.path().join(DATA_DIR), 1 << 20)?;
    for artifact in artifacts {
        guard.register(artifact, None)?;
    }
    chain.append(CallRecord::call("train").arg("'data.csv'").result("ok"))?;
    let head = chain.close()?;

    let (log_digest, _) = ContentHash::hash_file(&log_path)?;
    let identity = tessera_test::keys::persistent_identity();
    let manifest = guard.manifest()?;
    let environment = EnvironmentSnapshot::capture();
    let metadata = PackageMetadata {
        format_version: FORMAT_VERSION,
        tool_version: Version::current(),
        session_id: SessionId::new(),
        mode: Mode::Strict,
        started_at,
        sealed_at: Timestamp::now(),
        entry_count: head.entry_count,
        chain_head: head.head_hash,
        log_digest,
        signer: SignerInfo {
            key_id: identity.keypair().key_id_hex(),
            ephemeral: false,
            has_certificate: false,
        },
        timestamp: TimestampStatus::NotRequested,
        artifact_count: manifest.len(),
        has_git_metadata,
        degradations: Vec::new(),
    };

    PackageWriter::new(&identity).write(
        output,
        &PackageContents {
            log_path: &log_path,
            data_dir: guard.staging_dir(),
            manifest: &manifest,
            environment: &environment,
            git,
            timestamp_response: None,
            metadata: &metadata,
        },
    )
}

pub(crate) fn build_package(dir: &Path, artifacts: &[&Path]) -> WrittenPackage {
    try_build_package(dir, artifacts, &dir.join("package.zip")).unwrap()
}
