//! Files referenced by the log, re-hashed from a data directory.

use std::path::{Path, PathBuf};
use tessera_crypto::ContentHash;
use tracing::debug;

use super::Context;
use super::chain::ChainFacts;
use crate::error::IntegrityError;
use crate::report::{CheckKind, CheckResult};

/// Where a referenced file is looked for: as recorded (absolute, or relative
/// to `base`), then by bare file name inside `base`.
fn resolve(base: &Path, recorded: &str) -> Option<PathBuf> {
    let recorded = Path::new(recorded);
    let direct = if recorded.is_absolute() {
        recorded.to_path_buf()
    } else {
        base.join(recorded)
    };
    if direct.is_file() {
        return Some(direct);
    }
    let fallback = base.join(recorded.file_name()?);
    fallback.is_file().then_some(fallback)
}

pub(crate) fn check(ctx: &Context<'_>, facts: &ChainFacts) -> CheckResult {
    let mut result = CheckResult::new(CheckKind::AutoData);
    let Some(base) = &ctx.options.auto_data_dir else {
        return result.finish("no data directory");
    };
    if facts.referenced.is_empty() {
        return result.finish("log references no files");
    }

    let mut verified: usize = 0;
    for (recorded, expected) in &facts.referenced {
        let Some(path) = resolve(base, recorded) else {
            result.warn(format!("{recorded}: not found under {}", base.display()));
            continue;
        };
        let shown = path.display().to_string();
        match ContentHash::hash_file(&path) {
            Ok((hash, _)) if hash.to_hex().eq_ignore_ascii_case(expected) => {
                debug!(file = %shown, "Referenced file verified");
                verified = verified.saturating_add(1);
            },
            Ok((hash, _)) => result.fail(IntegrityError::artifact(
                shown,
                format!("hashes to {hash}, log recorded {expected} for {recorded}"),
            )),
            Err(e) => result.fail(IntegrityError::Configuration(format!(
                "cannot read {shown}: {e}"
            ))),
        }
    }

    let detail = format!(
        "{verified} of {} referenced files verified",
        facts.referenced.len()
    );
    result.finish(detail)
}
