//! Caller-supplied files against hashes tracked in the log.

use tessera_crypto::ContentHash;

use super::Context;
use super::chain::ChainFacts;
use crate::error::IntegrityError;
use crate::report::{CheckKind, CheckResult};

pub(crate) fn check(ctx: &Context<'_>, facts: &ChainFacts) -> CheckResult {
    let mut result = CheckResult::new(CheckKind::ExternalData);

    for path in &ctx.options.external_files {
        let shown = path.display().to_string();
        match ContentHash::hash_file(path) {
            Ok((hash, _)) if facts.tracked.contains(&hash.to_hex()) => {},
            Ok((hash, _)) => result.fail(IntegrityError::artifact(
                shown,
                format!("hash {hash} is not recorded in the audit log"),
            )),
            Err(e) => result.fail(IntegrityError::Configuration(format!(
                "cannot read {shown}: {e}"
            ))),
        }
    }

    let detail = format!("{} external files checked", ctx.options.external_files.len());
    result.finish(detail)
}
