//! Tampering with a sealed package is detected and located.

mod common;

use tessera_audit::CallRecord;
use tessera_core::Mode;
use tessera_package::layout::{AUDIT_LOG, METADATA, data_member};
use tessera_session::{Session, SessionConfig};
use tessera_test::archive;
use tessera_verify::{CheckKind, CheckStatus, IntegrityError, Verifier, VerifyOptions};

fn three_entries() -> Vec<CallRecord> {
    vec![
        CallRecord::call("load_data")
            .arg("'train.csv'")
            .result("DataFrame(150 rows)"),
        CallRecord::call("fit").kwarg("epochs", "10").result("0.93"),
        CallRecord::call("save").arg("'model.bin'").result("None"),
    ]
}

#[test]
fn three_entry_package_passes() {
    let package = common::seal_entries(three_entries(), Mode::Strict);

    let report = Verifier::new(VerifyOptions::new()).verify(&package.path);
    assert!(report.passed, "{report}");
    assert_eq!(report.failures().count(), 0);
    assert_eq!(
        report.check(CheckKind::Chain).unwrap().status,
        CheckStatus::Pass
    );
}

#[test]
fn flipped_result_hash_bit_is_located_and_breaks_the_signature() {
    let package = common::seal_entries(three_entries(), Mode::Strict);
    common::flip_result_hash_bit(&package.path, 1);

    let report = Verifier::new(VerifyOptions::new()).verify(&package.path);
    assert!(!report.passed);
    assert_eq!(report.first_chain_divergence(), Some(1));

    let failures: Vec<&IntegrityError> = report.failures().collect();
    assert!(failures.iter().any(|f| matches!(
        f,
        IntegrityError::ChainIntegrity {
            sequence: Some(1),
            ..
        }
    )));
    assert!(
        failures
            .iter()
            .any(|f| matches!(f, IntegrityError::Signature { .. })),
        "{report}"
    );
}

#[test]
fn edited_repr_is_detected_even_though_hashes_are_untouched() {
    let package = common::seal_entries(three_entries(), Mode::Strict);
    archive::edit_member(&package.path, AUDIT_LOG, |log| {
        let text = String::from_utf8(log.clone()).unwrap();
        assert!(text.contains(r#""result_repr":"0.93""#));
        *log = text
            .replacen(r#""result_repr":"0.93""#, r#""result_repr":"0.99""#, 1)
            .into_bytes();
    });

    let report = Verifier::new(VerifyOptions::new()).verify(&package.path);
    assert!(!report.passed);
    assert_eq!(report.first_chain_divergence(), Some(1));
}

#[test]
fn truncated_log_fails() {
    let package = common::seal_entries(three_entries(), Mode::Normal);
    archive::edit_member(&package.path, AUDIT_LOG, |log| {
        let text = String::from_utf8(log.clone()).unwrap();
        let kept: Vec<&str> = text.lines().take(2).collect();
        *log = format!("{}\n", kept.join("\n")).into_bytes();
    });

    let report = Verifier::new(VerifyOptions::new()).verify(&package.path);
    assert!(!report.passed, "{report}");
    assert_eq!(
        report.check(CheckKind::Chain).unwrap().status,
        CheckStatus::Fail
    );
}

#[test]
fn swapped_artifact_is_reported_by_name() {
    let dir = tessera_test::test_dir();
    let source = tessera_test::test_file_in_dir(dir.path(), "model.bin", b"weights v1");
    let output = dir.path().join("run.zip");

    let session = Session::start(
        SessionConfig::new(&output),
        tessera_test::keys::persistent_identity(),
    )
    .unwrap();
    session.record(CallRecord::call("train").result("ok")).unwrap();
    session.add_artifact(&source, None).unwrap();
    session.seal().unwrap();

    archive::replace_member(&output, &data_member("model.bin"), b"weights v2");

    let report = Verifier::new(VerifyOptions::new()).verify(&output);
    assert!(!report.passed);
    assert_eq!(
        report.check(CheckKind::Chain).unwrap().status,
        CheckStatus::Pass
    );
    let artifact_failure = report
        .failures()
        .find(|f| matches!(f, IntegrityError::Artifact { .. }))
        .unwrap();
    assert!(artifact_failure.to_string().contains("model.bin"));
}

#[test]
fn rewritten_metadata_breaks_its_signature() {
    let package = common::seal_entries(three_entries(), Mode::Strict);
    archive::edit_member(&package.path, METADATA, |bytes| {
        let mut metadata: serde_json::Value = serde_json::from_slice(bytes).unwrap();
        metadata["mode"] = serde_json::Value::from("light");
        *bytes = serde_json::to_vec_pretty(&metadata).unwrap();
    });

    let report =
        Verifier::new(VerifyOptions::new().with_mode(Mode::Strict)).verify(&package.path);
    assert!(!report.passed);
    assert!(report.failures().any(|f| matches!(
        f,
        IntegrityError::Signature { component, .. } if component.contains("package.json")
    )));
}
