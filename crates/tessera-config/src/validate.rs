//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Longest TSA timeout accepted.
const MAX_TIMEOUT_SECS: u64 = 600;

/// Most TSA attempts accepted.
const MAX_ATTEMPTS: u32 = 10;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_session(config)?;
    validate_identity(config)?;
    validate_timestamp(config)?;
    validate_logging(config)?;
    Ok(())
}

fn one_of(field: &str, value: &str, allowed: &[&str]) -> ConfigResult<()> {
    if allowed.contains(&value) {
        return Ok(());
    }
    Err(ConfigError::invalid(
        field,
        format!(
            "unsupported value '{value}'; expected one of: {}",
            allowed.join(", ")
        ),
    ))
}

fn validate_session(config: &Config) -> ConfigResult<()> {
    let s = &config.session;
    one_of("session.mode", &s.mode, &["strict", "normal", "light"])?;
    one_of("session.durability", &s.durability, &["flush", "sync"])?;
    if s.max_artifact_size == 0 {
        return Err(ConfigError::invalid(
            "session.max_artifact_size",
            "must be greater than zero",
        ));
    }
    Ok(())
}

fn validate_identity(config: &Config) -> ConfigResult<()> {
    let id = &config.identity;
    if id.certificate.is_some() && id.private_key.is_none() {
        return Err(ConfigError::invalid(
            "identity.certificate",
            "a certificate requires identity.private_key",
        ));
    }
    if id.password_env.as_deref().is_some_and(str::is_empty) {
        return Err(ConfigError::invalid(
            "identity.password_env",
            "must name an environment variable",
        ));
    }
    Ok(())
}

fn validate_timestamp(config: &Config) -> ConfigResult<()> {
    let t = &config.timestamp;
    if let Some(url) = &t.url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::invalid(
                "timestamp.url",
                format!("'{url}' is not an http(s) URL"),
            ));
        }
    }
    if let Some(oid) = &t.policy_oid {
        let well_formed = oid.split('.').count() >= 2
            && oid
                .split('.')
                .all(|arc| !arc.is_empty() && arc.bytes().all(|b| b.is_ascii_digit()));
        if !well_formed {
            return Err(ConfigError::invalid(
                "timestamp.policy_oid",
                format!("'{oid}' is not a dotted OID"),
            ));
        }
    }
    if t.timeout_secs == 0 || t.timeout_secs > MAX_TIMEOUT_SECS {
        return Err(ConfigError::invalid(
            "timestamp.timeout_secs",
            format!("must be between 1 and {MAX_TIMEOUT_SECS}"),
        ));
    }
    if t.max_attempts == 0 || t.max_attempts > MAX_ATTEMPTS {
        return Err(ConfigError::invalid(
            "timestamp.max_attempts",
            format!("must be between 1 and {MAX_ATTEMPTS}"),
        ));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    one_of(
        "logging.level",
        &config.logging.level,
        &["trace", "debug", "info", "warn", "error"],
    )?;
    one_of(
        "logging.format",
        &config.logging.format,
        &["pretty", "compact", "json", "full"],
    )
}
