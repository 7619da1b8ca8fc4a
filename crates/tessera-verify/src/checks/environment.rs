//! Recorded environment against the running process.

use super::Context;
use crate::error::IntegrityError;
use crate::report::{CheckKind, CheckResult};

pub(crate) fn check(ctx: &Context<'_>) -> CheckResult {
    let mut result = CheckResult::new(CheckKind::Environment);

    let snapshot = match ctx.package.environment() {
        Ok(snapshot) => snapshot,
        Err(e) => {
            result.fail(IntegrityError::Structural(e.to_string()));
            return result.finish("environment unreadable");
        },
    };

    let mismatches = snapshot.compare_with_current();
    for mismatch in &mismatches {
        result.warn(format!(
            "{} recorded as {}, running {}",
            mismatch.field, mismatch.recorded, mismatch.current
        ));
    }

    match ctx.package.git_metadata() {
        Ok(Some(git)) if git.is_dirty => result.warn(format!(
            "git working tree at {} had uncommitted changes",
            git.commit_sha
        )),
        Ok(_) => {},
        Err(e) => result.fail(IntegrityError::Structural(e.to_string())),
    }

    let detail = if mismatches.is_empty() {
        format!("{} {} on {}", snapshot.tool_name, snapshot.tool_version, snapshot.os)
    } else {
        format!("{} differences from the running environment", mismatches.len())
    };
    result.finish(detail)
}
