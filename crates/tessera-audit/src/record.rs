//! Call records: what a caller hands to the chain before it is sequenced.
//!
//! A [`CallRecord`] carries full representations. Field digests are computed
//! from those full strings (or supplied precomputed) before the chain lock is
//! taken; only the stored representations are truncated.

use std::collections::BTreeMap;
use tessera_core::{Mode, Timestamp};
use tessera_crypto::{ContentHash, ContentHasher};
use tracing::warn;

use crate::entry::AuditAction;
use crate::error::{AuditError, AuditResult};

/// Maximum stored length of a representation, in characters.
pub const MAX_REPR_CHARS: usize = 1000;

const TRUNCATION_MARKER: &str = "...";

/// Truncate a representation to [`MAX_REPR_CHARS`] characters plus a marker.
#[must_use]
pub fn truncate_repr(repr: &str) -> String {
    match repr.char_indices().nth(MAX_REPR_CHARS) {
        Some((cut, _)) => {
            let mut truncated = String::with_capacity(cut.saturating_add(TRUNCATION_MARKER.len()));
            truncated.push_str(&repr[..cut]);
            truncated.push_str(TRUNCATION_MARKER);
            truncated
        },
        None => repr.to_string(),
    }
}

/// Where a field digest comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldDigest {
    /// Hash the full representation.
    #[default]
    FromRepr,
    /// The caller already hashed the underlying value.
    Precomputed(ContentHash),
    /// The caller could not hash the value.
    Failed(String),
}

/// Digest of positional argument representations.
#[must_use]
pub fn hash_args(args: &[String]) -> ContentHash {
    let mut hasher = ContentHasher::with_domain("tessera.args.v1");
    hasher.update_u64(args.len() as u64);
    for arg in args {
        hasher.update_len_prefixed(arg.as_bytes());
    }
    hasher.finalize()
}

/// Digest of keyword argument representations.
#[must_use]
pub fn hash_kwargs(kwargs: &BTreeMap<String, String>) -> ContentHash {
    let mut hasher = ContentHasher::with_domain("tessera.kwargs.v1");
    hasher.update_u64(kwargs.len() as u64);
    for (key, value) in kwargs {
        hasher.update_len_prefixed(key.as_bytes());
        hasher.update_len_prefixed(value.as_bytes());
    }
    hasher.finalize()
}

/// Digest of a result representation; `None` hashes distinctly from `""`.
#[must_use]
pub fn hash_result(result: Option<&str>) -> ContentHash {
    let mut hasher = ContentHasher::with_domain("tessera.result.v1");
    match result {
        Some(result) => {
            hasher.update(&[1]);
            hasher.update_len_prefixed(result.as_bytes());
        },
        None => hasher.update(&[0]),
    }
    hasher.finalize()
}

/// An event to append, before sequencing and chaining.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub(crate) action: AuditAction,
    pub(crate) target: String,
    args: Vec<String>,
    kwargs: BTreeMap<String, String>,
    result: Option<String>,
    args_digest: FieldDigest,
    kwargs_digest: FieldDigest,
    result_digest: FieldDigest,
    extra: BTreeMap<String, String>,
    pub(crate) timestamp: Option<Timestamp>,
}

impl CallRecord {
    /// A record of the given kind.
    #[must_use]
    pub fn new(action: AuditAction, target: impl Into<String>) -> Self {
        Self {
            action,
            target: target.into(),
            args: Vec::new(),
            kwargs: BTreeMap::new(),
            result: None,
            args_digest: FieldDigest::FromRepr,
            kwargs_digest: FieldDigest::FromRepr,
            result_digest: FieldDigest::FromRepr,
            extra: BTreeMap::new(),
            timestamp: None,
        }
    }

    /// A function call record.
    #[must_use]
    pub fn call(function: impl Into<String>) -> Self {
        Self::new(AuditAction::Call, function)
    }

    /// Add a positional argument representation.
    #[must_use]
    pub fn arg(mut self, repr: impl Into<String>) -> Self {
        self.args.push(repr.into());
        self
    }

    /// Add several positional argument representations.
    #[must_use]
    pub fn args<I, S>(mut self, reprs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(reprs.into_iter().map(Into::into));
        self
    }

    /// Add a keyword argument representation.
    #[must_use]
    pub fn kwarg(mut self, key: impl Into<String>, repr: impl Into<String>) -> Self {
        self.kwargs.insert(key.into(), repr.into());
        self
    }

    /// Set the result representation.
    #[must_use]
    pub fn result(mut self, repr: impl Into<String>) -> Self {
        self.result = Some(repr.into());
        self
    }

    /// Override how the argument digest is obtained.
    #[must_use]
    pub fn args_digest(mut self, digest: FieldDigest) -> Self {
        self.args_digest = digest;
        self
    }

    /// Override how the keyword argument digest is obtained.
    #[must_use]
    pub fn kwargs_digest(mut self, digest: FieldDigest) -> Self {
        self.kwargs_digest = digest;
        self
    }

    /// Override how the result digest is obtained.
    #[must_use]
    pub fn result_digest(mut self, digest: FieldDigest) -> Self {
        self.result_digest = digest;
        self
    }

    /// Attach a named value to `extra_hashes`.
    #[must_use]
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Pin the entry timestamp instead of taking it at append time.
    #[must_use]
    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Resolve digests and truncate representations according to `mode`.
    pub(crate) fn prepare(self, mode: Mode) -> AuditResult<PreparedRecord> {
        let mut extra = self.extra;

        let args_hash = resolve(
            "args",
            self.args_digest,
            mode,
            &mut extra,
            || hash_args(&self.args),
        )?;
        let kwargs_hash = resolve(
            "kwargs",
            self.kwargs_digest,
            mode,
            &mut extra,
            || hash_kwargs(&self.kwargs),
        )?;
        let result_hash = resolve(
            "result",
            self.result_digest,
            mode,
            &mut extra,
            || hash_result(self.result.as_deref()),
        )?;

        Ok(PreparedRecord {
            action: self.action,
            target: self.target,
            args_repr: self.args.iter().map(|a| truncate_repr(a)).collect(),
            kwargs_repr: self
                .kwargs
                .iter()
                .map(|(k, v)| (k.clone(), truncate_repr(v)))
                .collect(),
            result_repr: self.result.as_deref().map(truncate_repr),
            args_hash,
            kwargs_hash,
            result_hash,
            extra_hashes: extra,
            timestamp: self.timestamp,
        })
    }
}

fn resolve(
    field: &'static str,
    digest: FieldDigest,
    mode: Mode,
    extra: &mut BTreeMap<String, String>,
    compute: impl FnOnce() -> ContentHash,
) -> AuditResult<Option<ContentHash>> {
    match digest {
        FieldDigest::Precomputed(hash) => Ok(Some(hash)),
        FieldDigest::FromRepr if mode.hashes_fields() => Ok(Some(compute())),
        FieldDigest::FromRepr => Ok(None),
        FieldDigest::Failed(reason) if mode.hash_failure_is_fatal() => {
            Err(AuditError::HashingFailed { field, reason })
        },
        FieldDigest::Failed(reason) => {
            if mode.hashes_fields() {
                warn!(field, reason = %reason, "Field hashing failed, recording null digest");
                extra.insert(format!("{field}_hash_error"), reason);
            }
            Ok(None)
        },
    }
}

/// A record whose digests are resolved, waiting for a sequence number.
#[derive(Debug, Clone)]
pub(crate) struct PreparedRecord {
    pub(crate) action: AuditAction,
    pub(crate) target: String,
    pub(crate) args_repr: Vec<String>,
    pub(crate) kwargs_repr: BTreeMap<String, String>,
    pub(crate) result_repr: Option<String>,
    pub(crate) args_hash: Option<ContentHash>,
    pub(crate) kwargs_hash: Option<ContentHash>,
    pub(crate) result_hash: Option<ContentHash>,
    pub(crate) extra_hashes: BTreeMap<String, String>,
    pub(crate) timestamp: Option<Timestamp>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_repr() {
        assert_eq!(truncate_repr("short"), "short");

        let exact = "x".repeat(MAX_REPR_CHARS);
        assert_eq!(truncate_repr(&exact), exact);

        let long = "é".repeat(1005);
        let truncated = truncate_repr(&long);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 1003);
    }

    #[test]
    fn test_hashes_cover_full_representation() {
        let long = "a".repeat(2000);
        let other = format!("{}b", "a".repeat(1999));

        let a = CallRecord::call("f").arg(long).prepare(Mode::Strict).unwrap();
        let b = CallRecord::call("f").arg(other).prepare(Mode::Strict).unwrap();

        assert_eq!(a.args_repr, b.args_repr);
        assert_ne!(a.args_hash, b.args_hash);
    }

    #[test]
    fn test_absent_and_empty_results_differ() {
        assert_ne!(hash_result(None), hash_result(Some("")));
    }

    #[test]
    fn test_light_mode_skips_hashing() {
        let precomputed = ContentHash::hash(b"tensor bytes");
        let prepared = CallRecord::call("f")
            .arg("1")
            .result_digest(FieldDigest::Precomputed(precomputed))
            .prepare(Mode::Light)
            .unwrap();
        assert_eq!(prepared.args_hash, None);
        assert_eq!(prepared.kwargs_hash, None);
        assert_eq!(prepared.result_hash, Some(precomputed));
    }

    #[test]
    fn test_hash_failure_by_mode() {
        let failing = || {
            CallRecord::call("f")
                .arg("<unhashable>")
                .args_digest(FieldDigest::Failed("object has no stable encoding".into()))
        };

        let err = failing().prepare(Mode::Strict).unwrap_err();
        assert!(matches!(err, AuditError::HashingFailed { field: "args", .. }));

        let normal = failing().prepare(Mode::Normal).unwrap();
        assert_eq!(normal.args_hash, None);
        assert!(normal.kwargs_hash.is_some());
        assert_eq!(
            normal.extra_hashes.get("args_hash_error").map(String::as_str),
            Some("object has no stable encoding")
        );

        let light = failing().prepare(Mode::Light).unwrap();
        assert_eq!(light.args_hash, None);
        assert!(light.extra_hashes.is_empty());
    }
}
