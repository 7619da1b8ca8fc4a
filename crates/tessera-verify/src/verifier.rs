//! The verification pipeline.

use std::path::Path;
use std::thread;
use tessera_core::Mode;
use tracing::{info, warn};

use crate::checks::chain::ChainFacts;
use crate::checks::{self, Context};
use crate::error::IntegrityError;
use crate::options::{CancelToken, VerifyOptions};
use crate::report::{CheckKind, CheckResult, ProofLevel, VerificationReport};

const SKIPPED_AFTER_FAILURE: &str = "skipped after an earlier failure";
const SKIPPED_CANCELLED: &str = "cancelled";

/// Runs checks in order, honouring `fail_fast` and cancellation.
struct Pipeline<'a> {
    checks: Vec<CheckResult>,
    fail_fast: bool,
    cancel: &'a CancelToken,
    halted: Option<&'static str>,
    cancelled: bool,
}

impl<'a> Pipeline<'a> {
    fn new(options: &'a VerifyOptions) -> Self {
        Self {
            checks: Vec::with_capacity(CheckKind::PIPELINE.len()),
            fail_fast: options.fail_fast,
            cancel: &options.cancel,
            halted: None,
            cancelled: false,
        }
    }

    /// Whether `kind` should run now. Records it as skipped otherwise.
    fn begin(&mut self, kind: CheckKind) -> bool {
        if self.halted.is_none() && self.cancel.is_cancelled() {
            warn!(check = %kind, "Verification cancelled");
            self.cancelled = true;
            self.halted = Some(SKIPPED_CANCELLED);
        }
        match self.halted {
            Some(reason) => {
                self.checks.push(CheckResult::skipped(kind, reason));
                false
            },
            None => true,
        }
    }

    fn record(&mut self, result: CheckResult) {
        if result.failed() && self.fail_fast {
            self.halted = Some(SKIPPED_AFTER_FAILURE);
        }
        self.checks.push(result);
    }

    fn skip_rest(&mut self, kinds: &[CheckKind], reason: &'static str) {
        for kind in kinds {
            self.checks.push(CheckResult::skipped(*kind, reason));
        }
    }

    fn finish(self, proof: ProofLevel) -> VerificationReport {
        VerificationReport::assemble(self.checks, proof, self.cancelled)
    }
}

/// Verifies sealed packages.
///
/// # Example
///
/// ```no_run
/// use tessera_verify::{Verifier, VerifyOptions};
///
/// let report = Verifier::new(VerifyOptions::new()).verify("run.tessera.zip");
/// println!("{report}");
/// assert!(report.passed);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Verifier {
    options: VerifyOptions,
}

impl Verifier {
    /// Create a verifier.
    #[must_use]
    pub fn new(options: VerifyOptions) -> Self {
        Self { options }
    }

    /// The options in use.
    #[must_use]
    pub fn options(&self) -> &VerifyOptions {
        &self.options
    }

    /// Verify the package at `path`.
    ///
    /// Never fails: every problem, including an unreadable file, is reported
    /// as a failed check. The package is only read; extraction happens in a
    /// scratch directory that is removed before this returns.
    #[must_use]
    pub fn verify(&self, path: impl AsRef<Path>) -> VerificationReport {
        let path = path.as_ref();
        let options = &self.options;
        let mut pipeline = Pipeline::new(options);
        let with_external = !options.external_files.is_empty();
        let with_auto_data = options.auto_data_dir.is_some();
        let rest: Vec<CheckKind> = CheckKind::PIPELINE
            .into_iter()
            .skip(1)
            .filter(|kind| match kind {
                CheckKind::ExternalData => with_external,
                CheckKind::AutoData => with_auto_data,
                _ => true,
            })
            .collect();

        if !pipeline.begin(CheckKind::Structure) {
            pipeline.skip_rest(&rest, SKIPPED_CANCELLED);
            return pipeline.finish(ProofLevel::None);
        }
        let (structure, opened) = checks::structure::check(path, options);
        pipeline.record(structure);
        let Some(opened) = opened else {
            pipeline.skip_rest(&rest, "package could not be opened");
            return pipeline.finish(ProofLevel::None);
        };

        let mode = options
            .mode
            .or_else(|| opened.metadata.as_ref().map(|m| m.mode))
            .unwrap_or(Mode::Strict);
        let ctx = Context {
            package: &opened.package,
            metadata: opened.metadata.as_ref(),
            options,
            strict: mode.is_strict(),
        };

        let facts = if pipeline.begin(CheckKind::Chain) {
            let (chain, facts) = checks::chain::check(&ctx);
            pipeline.record(chain);
            facts
        } else {
            ChainFacts::default()
        };

        let mut proof = ProofLevel::None;
        thread::scope(|scope| {
            // Artifact hashing overlaps signature checking unless a failure
            // could make it unnecessary.
            let ctx = &ctx;
            let artifacts = (!options.fail_fast)
                .then(|| scope.spawn(move || checks::artifacts::check(ctx)));

            if pipeline.begin(CheckKind::Signatures) {
                let (signatures, level) = checks::signatures::check(ctx);
                proof = level;
                pipeline.record(signatures);
            }
            if pipeline.begin(CheckKind::Timestamp) {
                pipeline.record(checks::timestamp::check(ctx, &facts));
            }
            if pipeline.begin(CheckKind::Artifacts) {
                let result = match artifacts {
                    Some(handle) => handle.join().unwrap_or_else(|_| {
                        let mut failed = CheckResult::new(CheckKind::Artifacts);
                        failed.fail(IntegrityError::Structural(
                            "artifact check panicked".to_string(),
                        ));
                        failed.finish("not completed")
                    }),
                    None => checks::artifacts::check(ctx),
                };
                pipeline.record(result);
            }
        });

        if pipeline.begin(CheckKind::Environment) {
            pipeline.record(checks::environment::check(&ctx));
        }
        if with_external && pipeline.begin(CheckKind::ExternalData) {
            pipeline.record(checks::external::check(&ctx, &facts));
        }
        if with_auto_data && pipeline.begin(CheckKind::AutoData) {
            pipeline.record(checks::auto_data::check(&ctx, &facts));
        }

        let report = pipeline.finish(proof);
        info!(
            package = %path.display(),
            passed = report.passed,
            proof = %report.proof,
            failures = report.failures().count(),
            warnings = report.warnings.len(),
            mode = %mode,
            "Verified package"
        );
        report
    }
}
