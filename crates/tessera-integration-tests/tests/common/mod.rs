//! Shared fixtures for integration tests.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tessera_audit::{AuditChain, AuditEntry, CallRecord, Durability};
use tessera_core::{FORMAT_VERSION, Mode, SessionId, Timestamp, Version};
use tessera_crypto::{ContentHash, Identity};
use tessera_package::layout::{AUDIT_LOG, DATA_DIR};
use tessera_package::{
    ArtifactManifest, EnvironmentSnapshot, PackageContents, PackageMetadata, PackageWriter,
    SignerInfo, TimestampStatus,
};

/// A package written from a hand-built chain, with its temp directory.
#[allow(dead_code)]
pub struct RawPackage {
    /// Holds the staging area and the package.
    pub dir: TempDir,
    /// The sealed package.
    pub path: PathBuf,
}

/// Append `records` to a fresh chain and seal them, with no session
/// bookkeeping entries, so entry `n` is the `n`th record.
#[allow(dead_code)]
pub fn seal_entries(records: Vec<CallRecord>, mode: Mode) -> RawPackage {
    let dir = tessera_test::test_dir();
    let staging = dir.path().join("staging");
    std::fs::create_dir_all(staging.join(DATA_DIR)).unwrap();
    let log_path = staging.join(AUDIT_LOG);
    let started_at = Timestamp::now();

    let chain = AuditChain::create(&log_path, mode, Durability::Flush).unwrap();
    for record in records {
        chain.append(record).unwrap();
    }
    let head = chain.close().unwrap();
    let (log_digest, _) = ContentHash::hash_file(&log_path).unwrap();

    let identity = tessera_test::keys::persistent_identity();
    let manifest = ArtifactManifest::new(Vec::new());
    let metadata = PackageMetadata {
        format_version: FORMAT_VERSION,
        tool_version: Version::current(),
        session_id: SessionId::new(),
        mode,
        started_at,
        sealed_at: Timestamp::now(),
        entry_count: head.entry_count,
        chain_head: head.head_hash,
        log_digest,
        signer: signer_info(&identity),
        timestamp: TimestampStatus::NotRequested,
        artifact_count: 0,
        has_git_metadata: false,
        degradations: Vec::new(),
    };

    let path = dir.path().join("package.zip");
    PackageWriter::new(&identity)
        .write(
            &path,
            &PackageContents {
                log_path: &log_path,
                data_dir: &staging.join(DATA_DIR),
                manifest: &manifest,
                environment: &EnvironmentSnapshot::capture(),
                git: None,
                timestamp_response: None,
                metadata: &metadata,
            },
        )
        .unwrap();
    RawPackage { dir, path }
}

fn signer_info(identity: &Identity) -> SignerInfo {
    SignerInfo {
        key_id: identity.keypair().key_id_hex(),
        ephemeral: identity.is_ephemeral(),
        has_certificate: identity.certificate().is_some(),
    }
}

/// Parsed entries of the packaged log.
#[allow(dead_code)]
pub fn packaged_entries(package: &Path) -> Vec<AuditEntry> {
    let log = tessera_test::archive::read_member(package, AUDIT_LOG);
    log.split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(line, bytes)| {
            AuditEntry::from_ndjson_line(bytes, u64::try_from(line).unwrap()).unwrap()
        })
        .collect()
}

/// Flip the lowest bit of the first byte of entry `sequence`'s result hash,
/// leaving every other byte of the log untouched.
#[allow(dead_code)]
pub fn flip_result_hash_bit(package: &Path, sequence: u64) {
    let entry = packaged_entries(package)
        .into_iter()
        .find(|e| e.sequence_number == sequence)
        .unwrap();
    let original = entry.result_hash.unwrap().to_hex();
    let mut bytes = hex::decode(&original).unwrap();
    tessera_test::archive::flip_bit(&mut bytes, 0, 0);
    let flipped = hex::encode(bytes);

    tessera_test::archive::edit_member(package, AUDIT_LOG, |log| {
        let text = String::from_utf8(log.clone()).unwrap();
        assert_eq!(text.matches(&original).count(), 1);
        *log = text.replacen(&original, &flipped, 1).into_bytes();
    });
}
