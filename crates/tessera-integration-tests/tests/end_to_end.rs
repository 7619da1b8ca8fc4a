//! Record, seal and verify across every crate.

use std::path::Path;

use tessera_audit::CallRecord;
use tessera_config::Config;
use tessera_core::Mode;
use tessera_crypto::Identity;
use tessera_package::{PackageReader, TimestampStatus, diff_packages};
use tessera_session::config_bridge::{load_identity, to_session_config, to_verify_options};
use tessera_session::{Session, SessionConfig};
use tessera_test::TestContext;
use tessera_test::http::{HttpReply, ScriptedServer};
use tessera_timestamp::{RetryPolicy, TimestampClientConfig};
use tessera_verify::{CheckKind, CheckStatus, ProofLevel, Verifier, VerifyOptions};

fn record_training_run(session: &Session, input: &Path, model: &Path) {
    session.track_file(input).unwrap().unwrap();
    session
        .record(
            CallRecord::call("load_data")
                .arg(format!("'{}'", input.display()))
                .result("DataFrame(2 rows)"),
        )
        .unwrap();
    session
        .record(CallRecord::call("fit").kwarg("epochs", "10").result("0.93"))
        .unwrap();
    session.annotate("reviewer", "lab-7").unwrap();
    session.add_artifact(model, Some("models/final.bin")).unwrap().unwrap();
}

#[test]
fn recorded_run_verifies_with_identity_bound_proof() {
    tessera_test::setup_test_logging_default();
    let dir = tessera_test::test_dir();
    let input = tessera_test::test_file_in_dir(dir.path(), "train.csv", b"x,y\n1,2\n3,4\n");
    let model = tessera_test::test_file_in_dir(dir.path(), "model.bin", b"\x00weights\xff");
    let output = dir.path().join("run.zip");

    let session = Session::start(
        SessionConfig::new(&output).verify_after_seal(true),
        tessera_test::keys::persistent_identity(),
    )
    .unwrap();
    record_training_run(&session, &input, &model);
    let sealed = session.seal().unwrap();
    assert_eq!(sealed.metadata.artifact_count, 1);

    let report = Verifier::new(
        VerifyOptions::new()
            .with_external_file(&input)
            .with_auto_data_dir(dir.path()),
    )
    .verify(&output);
    assert!(report.passed, "{report}");
    assert_eq!(report.proof, ProofLevel::IdentityBound);
    assert_eq!(
        report.check(CheckKind::AutoData).unwrap().detail,
        "1 of 1 referenced files verified"
    );
    for kind in CheckKind::PIPELINE {
        assert_ne!(report.check(kind).unwrap().status, CheckStatus::Fail, "{kind}");
    }

    let opened = PackageReader::open(&output).unwrap();
    assert_eq!(
        std::fs::read(opened.artifact_path("models/final.bin").unwrap()).unwrap(),
        b"\x00weights\xff"
    );
}

#[test]
fn modified_external_data_is_reported() {
    let ctx = TestContext::new();
    let input = ctx.create_file("train.csv", b"x,y\n1,2\n");
    let model = ctx.create_file("model.bin", b"weights");
    let output = ctx.package_path();

    let session =
        Session::start(SessionConfig::new(&output), tessera_test::keys::persistent_identity())
            .unwrap();
    record_training_run(&session, &input, &model);
    session.seal().unwrap();

    std::fs::write(&input, b"x,y\n1,3\n").unwrap();
    let report = Verifier::new(VerifyOptions::new().with_external_file(&input)).verify(&output);
    assert!(!report.passed);
    assert_eq!(
        report.check(CheckKind::ExternalData).unwrap().status,
        CheckStatus::Fail
    );
}

#[test]
fn ephemeral_signer_proves_integrity_only() {
    let dir = tessera_test::test_dir();
    let output = dir.path().join("run.zip");

    let session = Session::start(
        SessionConfig::new(&output).with_mode(Mode::Normal),
        Identity::ephemeral().unwrap(),
    )
    .unwrap();
    session.record(CallRecord::call("predict").result("[1, 0]")).unwrap();
    let sealed = session.seal().unwrap();
    assert!(sealed.metadata.signer.ephemeral);

    let normal = Verifier::new(VerifyOptions::new()).verify(&output);
    assert!(normal.passed, "{normal}");
    assert_eq!(normal.proof, ProofLevel::IntegrityOnly);

    let strict = Verifier::new(VerifyOptions::new().with_mode(Mode::Strict)).verify(&output);
    assert!(!strict.passed);
    assert_eq!(strict.proof, ProofLevel::None);
}

#[test]
fn unreachable_tsa_degrades_normal_sessions_only() {
    let dir = tessera_test::test_dir();
    let output = dir.path().join("run.zip");
    let server = ScriptedServer::start(1, |_| HttpReply::status(502));

    let session = Session::start(
        SessionConfig::new(&output)
            .with_mode(Mode::Normal)
            .with_timestamp_client(TimestampClientConfig {
                retry: RetryPolicy::none(),
                ..TimestampClientConfig::new(server.url())
            }),
        tessera_test::keys::persistent_identity(),
    )
    .unwrap();
    session.record(CallRecord::call("fit")).unwrap();
    let sealed = session.seal().unwrap();
    assert_eq!(server.finish().len(), 1);
    assert_eq!(sealed.metadata.timestamp.label(), "unavailable");
    assert!(sealed.metadata.is_degraded());

    let relaxed = Verifier::new(VerifyOptions::new()).verify(&output);
    assert!(relaxed.passed, "{relaxed}");
    assert_eq!(
        relaxed.check(CheckKind::Timestamp).unwrap().status,
        CheckStatus::Warn
    );

    let strict = Verifier::new(VerifyOptions::new().with_mode(Mode::Strict)).verify(&output);
    assert!(!strict.passed);
    assert!(strict.check(CheckKind::Timestamp).unwrap().failed());
}

#[test]
fn layered_config_drives_session_and_verifier() {
    let home = tessera_test::test_dir();
    let workspace = tessera_test::test_dir();
    let keys = tessera_test::test_dir();

    let key_path = keys.path().join("signing.pem");
    tessera_test::keys::primary().save(&key_path, None).unwrap();
    let trusted = tessera_test::test_file_in_dir(
        keys.path(),
        "trusted.pub",
        tessera_test::keys::primary()
            .public_key()
            .to_pem()
            .unwrap()
            .as_bytes(),
    );
    let stranger = tessera_test::test_file_in_dir(
        keys.path(),
        "stranger.pub",
        tessera_test::keys::secondary()
            .public_key()
            .to_pem()
            .unwrap()
            .as_bytes(),
    );

    let _ = tessera_test::test_file_in_dir(
        home.path(),
        ".tessera/config.toml",
        format!(
            "[identity]\nprivate_key = {:?}\n\n[verify]\ntrusted_keys = [{:?}]\n",
            key_path.display().to_string(),
            trusted.display().to_string()
        )
        .as_bytes(),
    );
    let _ = tessera_test::test_file_in_dir(
        workspace.path(),
        ".tessera/config.toml",
        b"[session]\nmode = \"normal\"\ncapture_git = false\ndurability = \"sync\"\n",
    );

    let resolved = Config::load_with_home(Some(workspace.path()), home.path()).unwrap();
    let cfg = &resolved.config;
    assert_eq!(resolved.loaded_files.len(), 2);

    let output = workspace.path().join("run.zip");
    let session_config = to_session_config(cfg, &output, workspace.path()).unwrap();
    assert_eq!(session_config.mode, Mode::Normal);
    let identity = load_identity(&cfg.identity).unwrap();
    assert!(!identity.is_ephemeral());

    let session = Session::start(session_config, identity).unwrap();
    session.record(CallRecord::call("evaluate").result("0.88")).unwrap();
    let sealed = session.seal().unwrap();
    assert_eq!(sealed.metadata.mode, Mode::Normal);
    assert_eq!(sealed.metadata.timestamp, TimestampStatus::NotRequested);

    let report = Verifier::new(to_verify_options(&cfg.verify).unwrap()).verify(&output);
    assert!(report.passed, "{report}");
    assert_eq!(report.proof, ProofLevel::IdentityBound);

    let mut untrusting = cfg.verify.clone();
    untrusting.trusted_keys = vec![stranger];
    let report = Verifier::new(to_verify_options(&untrusting).unwrap()).verify(&output);
    assert!(!report.passed);
    assert_eq!(
        report.check(CheckKind::Signatures).unwrap().status,
        CheckStatus::Fail
    );
}

#[test]
fn repeated_runs_diff_by_operation_and_artifact() {
    let dir = tessera_test::test_dir();
    let run = |name: &str, steps: &[&str], weights: &[u8]| {
        let model = tessera_test::test_file_in_dir(dir.path(), &format!("{name}.bin"), weights);
        let output = dir.path().join(format!("{name}.zip"));
        let session =
            Session::start(SessionConfig::new(&output), tessera_test::keys::persistent_identity())
                .unwrap();
        for step in steps {
            session.record(CallRecord::call(*step)).unwrap();
        }
        session.add_artifact(&model, Some("model.bin")).unwrap();
        session.seal().unwrap();
        output
    };
    let first = run("first", &["load_data", "fit"], b"weights a");
    let second = run("second", &["load_data", "tune", "fit"], b"weights b");
    let again = run("again", &["load_data", "fit"], b"weights a");

    let open = |path: &Path| PackageReader::open(path).unwrap();
    let changed = diff_packages(&open(&first), &open(&second)).unwrap();
    assert!(!changed.is_identical());
    assert_eq!(changed.log.mismatches[0].index, 2);
    assert_eq!(changed.log.right_count, changed.log.left_count.saturating_add(1));
    assert_eq!(changed.artifacts.len(), 1);

    let same = diff_packages(&open(&first), &open(&again)).unwrap();
    assert!(same.is_identical(), "{same:?}");
}
