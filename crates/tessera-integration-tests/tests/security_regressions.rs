//! Hostile inputs: crafted archives, racing symlinks and grafted tokens.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tessera_audit::CallRecord;
use tessera_core::Mode;
use tessera_crypto::ContentHash;
use tessera_package::layout::{GIT_METADATA, GIT_METADATA_SIG, TIMESTAMP_RESPONSE};
use tessera_package::{
    ArtifactError, ArtifactGuard, ExtractLimits, PackageError, PackageReader, extract_archive,
};
use tessera_session::{Session, SessionConfig};
use tessera_test::archive;
use tessera_test::http::{HttpReply, ScriptedServer};
use tessera_test::tsa::{TestTsa, TokenVariant};
use tessera_timestamp::{REPLY_CONTENT_TYPE, RetryPolicy, TimestampClientConfig};
use tessera_verify::{CheckKind, IntegrityError, Verifier, VerifyOptions};

fn sealed_package() -> common::RawPackage {
    common::seal_entries(
        vec![CallRecord::call("fit").kwarg("epochs", "3").result("0.9")],
        Mode::Strict,
    )
}

// ---------------------------------------------------------------------------
// Archive extraction
// ---------------------------------------------------------------------------

#[test]
fn zip_slip_member_is_rejected_before_any_write() {
    let package = sealed_package();
    archive::add_member(&package.path, "../../escaped.txt", b"pwned");

    let dest = package.dir.path().join("extract");
    std::fs::create_dir(&dest).unwrap();
    let err = extract_archive(&package.path, &dest, &ExtractLimits::default()).unwrap_err();
    assert!(matches!(err, PackageError::UnsafeEntry { .. }), "{err}");
    assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 0);
    assert!(!package.dir.path().join("escaped.txt").exists());

    let report = Verifier::new(VerifyOptions::new()).verify(&package.path);
    assert!(!report.passed);
    assert!(
        report
            .failures()
            .any(|f| matches!(f, IntegrityError::Structural(_)))
    );
}

#[test]
fn symlink_member_is_rejected() {
    let package = sealed_package();
    archive::add_symlink_member(&package.path, "data/passwd", "/etc/passwd");

    assert!(matches!(
        PackageReader::open(&package.path),
        Err(PackageError::UnsafeEntry { .. })
    ));
    let report = Verifier::new(VerifyOptions::new()).verify(&package.path);
    assert!(!report.passed);
}

#[test]
fn absolute_member_is_rejected() {
    let package = sealed_package();
    archive::add_member(&package.path, "/tmp/tessera-absolute.txt", b"x");

    let report = Verifier::new(VerifyOptions::new()).verify(&package.path);
    assert!(!report.passed);
    assert!(!std::path::Path::new("/tmp/tessera-absolute.txt").exists());
}

// ---------------------------------------------------------------------------
// Artifact capture
// ---------------------------------------------------------------------------

/// A path that keeps flipping between a regular file and a symlink to a
/// secret must never yield a capture of the secret.
#[cfg(unix)]
#[test]
fn symlink_swap_race_fails_closed() {
    let dir = tessera_test::test_dir();
    let secret = tessera_test::test_file_in_dir(dir.path(), "secret.key", b"private key material");
    let benign = b"benign model weights";
    let target = dir.path().join("model.bin");
    std::fs::write(&target, benign).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let swapper = {
        let stop = Arc::clone(&stop);
        let dir = dir.path().to_path_buf();
        let target = target.clone();
        std::thread::spawn(move || {
            let link = dir.join("swap.link");
            let file = dir.join("swap.file");
            while !stop.load(Ordering::Relaxed) {
                let _ = std::fs::remove_file(&link);
                std::os::unix::fs::symlink(&secret, &link).unwrap();
                std::fs::rename(&link, &target).unwrap();

                std::fs::write(&file, benign).unwrap();
                std::fs::rename(&file, &target).unwrap();
            }
        })
    };

    let guard = ArtifactGuard::new(dir.path().join("staging"), 1 << 20).unwrap();
    let benign_hash = ContentHash::hash(benign);
    let mut captured = 0u32;
    let mut refused = 0u32;
    for attempt in 0..500u32 {
        let name = format!("capture-{attempt}.bin");
        match guard.register(&target, Some(&name)) {
            Ok(artifact) => {
                assert_eq!(artifact.sha256, benign_hash, "captured through a symlink");
                captured = captured.saturating_add(1);
            },
            Err(ArtifactError::SymlinkRejected(_) | ArtifactError::Missing(_)) => {
                refused = refused.saturating_add(1);
            },
            Err(other) => panic!("unexpected capture error: {other}"),
        }
    }
    stop.store(true, Ordering::Relaxed);
    swapper.join().unwrap();

    assert_eq!(captured.saturating_add(refused), 500);
    for artifact in &guard.manifest().unwrap().artifacts {
        assert_eq!(artifact.sha256, benign_hash);
    }
}

#[cfg(unix)]
#[test]
fn session_refuses_symlinked_artifact_in_every_mode() {
    for mode in [Mode::Strict, Mode::Normal, Mode::Light] {
        let dir = tessera_test::test_dir();
        let real = tessera_test::test_file_in_dir(dir.path(), "real.bin", b"real");
        let link = dir.path().join("link.bin");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let session = Session::start(
            SessionConfig::new(dir.path().join("run.zip")).with_mode(mode),
            tessera_test::keys::persistent_identity(),
        )
        .unwrap();
        assert!(matches!(
            session.add_artifact(&link, None),
            Err(tessera_session::SessionError::Artifact(
                ArtifactError::SymlinkRejected(_)
            ))
        ));
    }
}

// ---------------------------------------------------------------------------
// Timestamp tokens
// ---------------------------------------------------------------------------

fn timestamped_package(dir: &std::path::Path) -> std::path::PathBuf {
    let output = dir.join("run.zip");
    let tsa = TestTsa::new();
    let server = ScriptedServer::start(1, move |body| {
        HttpReply::ok(
            REPLY_CONTENT_TYPE,
            tsa.respond_to_request(body, TokenVariant::Valid),
        )
    });
    let config = SessionConfig::new(&output).with_timestamp_client(TimestampClientConfig {
        retry: RetryPolicy::none(),
        ..TimestampClientConfig::new(server.url())
    });
    let session = Session::start(config, tessera_test::keys::persistent_identity()).unwrap();
    session.record(CallRecord::call("fit").result("0.9")).unwrap();
    session.seal().unwrap();
    assert_eq!(server.finish().len(), 1);
    output
}

#[test]
fn grafted_token_is_rejected_in_every_mode() {
    let dir = tessera_test::test_dir();
    let output = timestamped_package(dir.path());
    assert!(Verifier::new(VerifyOptions::new()).verify(&output).passed);

    let log_digest = PackageReader::open(&output)
        .unwrap()
        .metadata()
        .unwrap()
        .log_digest;
    let grafted = TestTsa::new().respond(log_digest.as_bytes(), None, TokenVariant::Grafted);
    archive::replace_member(&output, TIMESTAMP_RESPONSE, &grafted);

    for mode in [Mode::Strict, Mode::Normal, Mode::Light] {
        let report = Verifier::new(VerifyOptions::new().with_mode(mode)).verify(&output);
        assert!(!report.passed, "{mode}: {report}");
        assert!(report.check(CheckKind::Timestamp).unwrap().failed());
    }
}

#[test]
fn token_for_another_log_is_rejected() {
    let dir = tessera_test::test_dir();
    let output = timestamped_package(dir.path());

    let other = ContentHash::hash(b"a different audit log");
    let token = TestTsa::new().respond(other.as_bytes(), None, TokenVariant::Valid);
    archive::replace_member(&output, TIMESTAMP_RESPONSE, &token);

    let report = Verifier::new(VerifyOptions::new().with_mode(Mode::Normal)).verify(&output);
    assert!(!report.passed);
    let failure = report
        .failures()
        .find(|f| matches!(f, IntegrityError::Timestamp(_)))
        .unwrap();
    assert!(failure.to_string().contains("imprint"), "{failure}");
}

#[test]
fn stripped_token_fails_because_metadata_records_a_grant() {
    let dir = tessera_test::test_dir();
    let output = timestamped_package(dir.path());
    archive::remove_member(&output, TIMESTAMP_RESPONSE);

    let report = Verifier::new(VerifyOptions::new().with_mode(Mode::Light)).verify(&output);
    assert!(!report.passed);
    assert!(report.check(CheckKind::Timestamp).unwrap().failed());
}

// ---------------------------------------------------------------------------
// Optional components
// ---------------------------------------------------------------------------

#[test]
fn stripped_git_metadata_fails() {
    let dir = tessera_test::test_dir();
    let repo = dir.path().join("repo");
    std::fs::create_dir(&repo).unwrap();
    if !tessera_test::init_git_repo(&repo, &[("train.py", &b"epochs = 3\n"[..])]) {
        return;
    }
    let output = dir.path().join("run.zip");

    let session = Session::start(
        SessionConfig::new(&output).with_git_dir(&repo),
        tessera_test::keys::persistent_identity(),
    )
    .unwrap();
    session.record(CallRecord::call("fit").result("0.9")).unwrap();
    let sealed = session.seal().unwrap();
    assert!(sealed.metadata.has_git_metadata);

    let intact = Verifier::new(VerifyOptions::new()).verify(&output);
    assert!(intact.passed, "{intact}");

    archive::remove_member(&output, GIT_METADATA);
    archive::remove_member(&output, GIT_METADATA_SIG);
    let report = Verifier::new(VerifyOptions::new()).verify(&output);
    assert!(!report.passed, "{report}");
    let signatures = report.check(CheckKind::Signatures).unwrap();
    assert!(signatures.failed());
    assert!(
        signatures
            .failures
            .iter()
            .any(|e| e.to_string().contains(GIT_METADATA)),
        "{report}"
    );
}
