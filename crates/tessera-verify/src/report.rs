//! Itemised verification reports.

use serde::Serialize;
use std::fmt;

use crate::error::IntegrityError;

/// The checks a package goes through, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// Safe extraction, required members, parseable metadata.
    Structure,
    /// Hash chain replay against the metadata.
    Chain,
    /// Detached signatures and signer policy.
    Signatures,
    /// RFC 3161 token over the log digest.
    Timestamp,
    /// Artifact files against the manifest.
    Artifacts,
    /// Recorded environment against the running one.
    Environment,
    /// Caller-supplied files against tracked hashes.
    ExternalData,
    /// Files the log references, re-hashed from a data directory.
    AutoData,
}

impl CheckKind {
    /// Pipeline order.
    pub const PIPELINE: [Self; 8] = [
        Self::Structure,
        Self::Chain,
        Self::Signatures,
        Self::Timestamp,
        Self::Artifacts,
        Self::Environment,
        Self::ExternalData,
        Self::AutoData,
    ];

    /// Short name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Structure => "structure",
            Self::Chain => "chain",
            Self::Signatures => "signatures",
            Self::Timestamp => "timestamp",
            Self::Artifacts => "artifacts",
            Self::Environment => "environment",
            Self::ExternalData => "external_data",
            Self::AutoData => "auto_data",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// Everything held.
    Pass,
    /// Held, with gaps the mode tolerates.
    Warn,
    /// Did not hold.
    Fail,
    /// Did not run.
    Skipped,
}

/// The result of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    /// Which check.
    pub check: CheckKind,
    /// Outcome.
    pub status: CheckStatus,
    /// One-line summary.
    pub detail: String,
    /// Every failure found by this check.
    pub failures: Vec<IntegrityError>,
    /// Gaps that were tolerated.
    pub warnings: Vec<String>,
}

impl CheckResult {
    pub(crate) fn new(check: CheckKind) -> Self {
        Self {
            check,
            status: CheckStatus::Pass,
            detail: String::new(),
            failures: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn skipped(check: CheckKind, reason: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Skipped,
            detail: reason.into(),
            ..Self::new(check)
        }
    }

    pub(crate) fn fail(&mut self, error: IntegrityError) {
        self.failures.push(error);
    }

    pub(crate) fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Record either a failure or a warning, depending on `strict`.
    pub(crate) fn gap(&mut self, strict: bool, error: IntegrityError) {
        if strict {
            self.fail(error);
        } else {
            self.warn(error.to_string());
        }
    }

    /// Set the status from the collected failures and warnings.
    pub(crate) fn finish(mut self, detail: impl Into<String>) -> Self {
        self.status = if !self.failures.is_empty() {
            CheckStatus::Fail
        } else if !self.warnings.is_empty() {
            CheckStatus::Warn
        } else {
            CheckStatus::Pass
        };
        self.detail = detail.into();
        self
    }

    /// Whether this check failed.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.status == CheckStatus::Fail
    }
}

/// What a passing package proves about who produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofLevel {
    /// Signed by a persistent key the verifier accepts.
    IdentityBound,
    /// Internally consistent, but signed by a key generated for the session.
    IntegrityOnly,
    /// Nothing is proven.
    None,
}

impl fmt::Display for ProofLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::IdentityBound => "identity-bound",
            Self::IntegrityOnly => "integrity-only",
            Self::None => "none",
        })
    }
}

/// Outcome of verifying a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    /// True only if no check failed and the run was not cancelled.
    pub passed: bool,
    /// Every check, in pipeline order.
    pub checks: Vec<CheckResult>,
    /// All tolerated gaps, prefixed with their check.
    pub warnings: Vec<String>,
    /// Provenance strength.
    pub proof: ProofLevel,
    /// Whether the run stopped early on request.
    pub cancelled: bool,
}

impl VerificationReport {
    pub(crate) fn assemble(checks: Vec<CheckResult>, proof: ProofLevel, cancelled: bool) -> Self {
        let passed = !cancelled && !checks.iter().any(CheckResult::failed);
        let warnings = checks
            .iter()
            .flat_map(|c| c.warnings.iter().map(move |w| format!("{}: {w}", c.check)))
            .collect();
        Self {
            passed,
            checks,
            warnings,
            proof: if passed { proof } else { ProofLevel::None },
            cancelled,
        }
    }

    /// Result of one check, if it is part of the report.
    #[must_use]
    pub fn check(&self, kind: CheckKind) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.check == kind)
    }

    /// Every failure, in pipeline order.
    pub fn failures(&self) -> impl Iterator<Item = &IntegrityError> {
        self.checks.iter().flat_map(|c| c.failures.iter())
    }

    /// The first chain failure tied to a sequence number.
    #[must_use]
    pub fn first_chain_divergence(&self) -> Option<u64> {
        self.failures().find_map(IntegrityError::sequence)
    }

    /// Serialize to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = match (self.cancelled, self.passed) {
            (true, _) => "CANCELLED",
            (false, true) => "PASSED",
            (false, false) => "FAILED",
        };
        writeln!(f, "{verdict} (proof: {})", self.proof)?;
        for check in &self.checks {
            let status = match check.status {
                CheckStatus::Pass => "pass",
                CheckStatus::Warn => "warn",
                CheckStatus::Fail => "FAIL",
                CheckStatus::Skipped => "skip",
            };
            writeln!(f, "  [{status}] {}: {}", check.check, check.detail)?;
            for failure in &check.failures {
                writeln!(f, "      - {failure}")?;
            }
            for warning in &check.warnings {
                writeln!(f, "      ! {warning}")?;
            }
        }
        Ok(())
    }
}
