//! Bridge from `tessera_config::Config` to session and verifier types.
//!
//! The config crate has no dependencies on other internal crates. This module
//! turns its string-typed sections into [`SessionConfig`], an [`Identity`] and
//! [`VerifyOptions`].

use std::path::{Path, PathBuf};

use tessera_audit::Durability;
use tessera_config::{Config, IdentitySection, VerifySection};
use tessera_core::Mode;
use tessera_crypto::{Certificate, Identity, SignatureVerifier};
use tessera_verify::VerifyOptions;
use tracing::{debug, warn};

use crate::config::{SessionConfig, timestamp_client_config};
use crate::error::{SessionError, SessionResult};

fn parse_mode(field: &str, value: &str) -> SessionResult<Mode> {
    value
        .parse()
        .map_err(|e| SessionError::config(format!("{field}: {e}")))
}

fn parse_durability(value: &str) -> SessionResult<Durability> {
    match value {
        "flush" => Ok(Durability::Flush),
        "sync" => Ok(Durability::Sync),
        other => Err(SessionError::config(format!(
            "session.durability: unknown value '{other}'"
        ))),
    }
}

/// Convert config to a [`SessionConfig`] writing to `output`.
///
/// Git metadata is captured for `workspace_root` when `session.capture_git`
/// is set.
///
/// # Errors
///
/// Returns [`SessionError::Configuration`] for an unknown mode or durability.
pub fn to_session_config(
    cfg: &Config,
    output: impl Into<PathBuf>,
    workspace_root: &Path,
) -> SessionResult<SessionConfig> {
    let mut session = SessionConfig::new(output)
        .with_mode(parse_mode("session.mode", &cfg.session.mode)?)
        .with_max_artifact_size(cfg.session.max_artifact_size)
        .with_durability(parse_durability(&cfg.session.durability)?)
        .allow_ephemeral(cfg.session.allow_ephemeral);

    if cfg.session.capture_git {
        session = session.with_git_dir(workspace_root);
    }

    if let Some(url) = &cfg.timestamp.url {
        session = session.with_timestamp_client(timestamp_client_config(
            url,
            cfg.timestamp.policy_oid.as_deref(),
            cfg.timestamp.timeout_secs,
            cfg.timestamp.max_attempts,
            cfg.timestamp.initial_backoff_ms,
        ));
    }

    Ok(session)
}

/// Load the signing identity named by `[identity]`.
///
/// With no `private_key` an ephemeral identity is generated. The key password
/// is read from the environment variable named by `password_env`.
///
/// # Errors
///
/// Returns [`SessionError::Configuration`] if the password variable is unset,
/// and [`SessionError::Crypto`] if the key or certificate cannot be loaded.
pub fn load_identity(section: &IdentitySection) -> SessionResult<Identity> {
    let Some(key_path) = &section.private_key else {
        debug!("No private key configured, generating an ephemeral identity");
        return Ok(Identity::ephemeral()?);
    };

    let password = match &section.password_env {
        Some(var) => Some(std::env::var(var).map_err(|_| {
            SessionError::config(format!(
                "identity.password_env: environment variable {var} is not set"
            ))
        })?),
        None => None,
    };

    Ok(Identity::load(
        key_path,
        password.as_deref().map(str::as_bytes),
        section.certificate.as_deref(),
    )?)
}

fn read_certificate(path: &Path) -> SessionResult<Certificate> {
    let raw = std::fs::read(path)?;
    let certificate = match std::str::from_utf8(&raw) {
        Ok(pem) if pem.contains("-----BEGIN") => Certificate::from_pem(pem)?,
        _ => Certificate::from_der(&raw)?,
    };
    Ok(certificate)
}

/// Convert `[verify]` to [`VerifyOptions`].
///
/// `strict = true` forces strict mode; otherwise the package's own mode is
/// used.
///
/// # Errors
///
/// Returns I/O or crypto errors if the TSA certificate or a trusted key
/// cannot be read.
pub fn to_verify_options(section: &VerifySection) -> SessionResult<VerifyOptions> {
    let mut options = VerifyOptions::new().fail_fast(section.fail_fast);
    if section.strict {
        options = options.with_mode(Mode::Strict);
    }

    if let Some(path) = &section.tsa_certificate {
        options = options.with_tsa_certificate(read_certificate(path)?);
    }
    if let Some(dir) = &section.auto_data_dir {
        options = options.with_auto_data_dir(dir);
    }

    if !section.trusted_keys.is_empty() {
        let mut registry = SignatureVerifier::new();
        for path in &section.trusted_keys {
            let key_id = registry.add_trusted_pem_file(path)?;
            debug!(key_id = ?key_id, path = %path.display(), "Trusted signing key");
        }
        if registry.trusted_key_count() < section.trusted_keys.len() {
            warn!(
                configured = section.trusted_keys.len(),
                distinct = registry.trusted_key_count(),
                "Duplicate trusted keys in verify.trusted_keys"
            );
        }
        options = options.with_trusted_keys(registry);
    }

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_crypto::CertificateParams;

    #[test]
    fn test_default_config_converts() {
        let dir = tessera_test::test_dir();
        let cfg = Config::default();
        let session = to_session_config(&cfg, dir.path().join("run.zip"), dir.path()).unwrap();

        assert_eq!(session.mode, Mode::Strict);
        assert_eq!(session.durability, Durability::Flush);
        assert_eq!(session.git_dir.as_deref(), Some(dir.path()));
        assert!(session.timestamp.is_none());
        assert!(!session.allow_ephemeral);
    }

    #[test]
    fn test_timestamp_section_converts() {
        let mut cfg = Config::default();
        cfg.session.mode = "normal".into();
        cfg.session.durability = "sync".into();
        cfg.session.capture_git = false;
        cfg.timestamp.url = Some("https://tsa.example/tsr".into());
        cfg.timestamp.policy_oid = Some("1.2.3.4".into());
        cfg.timestamp.timeout_secs = 7;
        cfg.timestamp.max_attempts = 2;

        let session = to_session_config(&cfg, "run.zip", Path::new(".")).unwrap();
        assert_eq!(session.mode, Mode::Normal);
        assert_eq!(session.durability, Durability::Sync);
        assert!(session.git_dir.is_none());

        let tsa = session.timestamp.unwrap();
        assert_eq!(tsa.url, "https://tsa.example/tsr");
        assert_eq!(tsa.policy_oid.as_deref(), Some("1.2.3.4"));
        assert_eq!(tsa.timeout.as_secs(), 7);
        assert_eq!(tsa.retry.max_attempts, 2);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let mut cfg = Config::default();
        cfg.session.mode = "paranoid".into();
        assert!(matches!(
            to_session_config(&cfg, "run.zip", Path::new(".")),
            Err(SessionError::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_private_key_is_ephemeral() {
        let identity = load_identity(&IdentitySection::default()).unwrap();
        assert!(identity.is_ephemeral());
    }

    #[test]
    fn test_load_identity_from_files() {
        let dir = tessera_test::test_dir();
        let keypair = tessera_test::keys::primary();
        let key_path = dir.path().join("signing.pem");
        keypair.save(&key_path, None).unwrap();
        let cert = Certificate::self_signed(
            &keypair,
            &CertificateParams::new("Lab Signer", chrono::Duration::days(30)),
        )
        .unwrap();
        let cert_path =
            tessera_test::test_file_in_dir(dir.path(), "signing.crt", cert.to_pem().unwrap().as_bytes());

        let identity = load_identity(&IdentitySection {
            private_key: Some(key_path),
            certificate: Some(cert_path),
            password_env: None,
        })
        .unwrap();
        assert!(!identity.is_ephemeral());
        assert!(identity.certificate().is_some());
        assert_eq!(identity.keypair().key_id_hex(), keypair.key_id_hex());
    }

    #[test]
    fn test_unset_password_variable_rejected() {
        let dir = tessera_test::test_dir();
        let result = load_identity(&IdentitySection {
            private_key: Some(dir.path().join("signing.pem")),
            certificate: None,
            password_env: Some("TESSERA_TEST_PASSWORD_THAT_IS_NOT_SET".into()),
        });
        assert!(matches!(result, Err(SessionError::Configuration(_))));
    }

    #[test]
    fn test_verify_section_converts() {
        let dir = tessera_test::test_dir();
        let key_path = tessera_test::test_file_in_dir(
            dir.path(),
            "trusted.pub",
            tessera_test::keys::primary()
                .public_key()
                .to_pem()
                .unwrap()
                .as_bytes(),
        );

        let options = to_verify_options(&VerifySection {
            fail_fast: true,
            strict: true,
            tsa_certificate: None,
            trusted_keys: vec![key_path],
            auto_data_dir: Some(dir.path().to_path_buf()),
        })
        .unwrap();
        assert!(options.fail_fast);
        assert_eq!(options.auto_data_dir.as_deref(), Some(dir.path()));
        assert_eq!(options.mode, Some(Mode::Strict));
        assert!(
            options
                .trusted_keys
                .trusts(tessera_test::keys::primary().public_key())
        );
        assert!(
            !options
                .trusted_keys
                .trusts(tessera_test::keys::secondary().public_key())
        );
    }

    #[test]
    fn test_non_strict_verify_uses_package_mode() {
        let options = to_verify_options(&VerifySection::default()).unwrap();
        assert_eq!(options.mode, None);
        assert!(options.trusted_keys.is_empty());
        assert!(options.auto_data_dir.is_none());
    }
}
