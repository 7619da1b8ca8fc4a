//! RFC 3161 token over the log digest.

use tessera_package::TimestampStatus;
use tessera_package::layout::TIMESTAMP_RESPONSE;
use tessera_timestamp::{VerifyOptions, verify};

use super::Context;
use super::chain::ChainFacts;
use crate::error::IntegrityError;
use crate::report::{CheckKind, CheckResult};

pub(crate) fn check(ctx: &Context<'_>, facts: &ChainFacts) -> CheckResult {
    let mut result = CheckResult::new(CheckKind::Timestamp);
    let status = ctx.metadata.map(|m| &m.timestamp);

    let token = match ctx.package.timestamp_response() {
        Ok(token) => token,
        Err(e) => {
            result.fail(IntegrityError::Timestamp(e.to_string()));
            return result.finish("token unreadable");
        },
    };

    let Some(token) = token else {
        return match status {
            Some(TimestampStatus::Granted { .. }) => {
                result.fail(IntegrityError::Timestamp(format!(
                    "package.json records a granted timestamp but {TIMESTAMP_RESPONSE} is missing"
                )));
                result.finish("token missing")
            },
            Some(TimestampStatus::Unavailable { reason }) => {
                result.gap(
                    ctx.strict,
                    IntegrityError::Timestamp(format!(
                        "timestamp authority unavailable at seal time: {reason}"
                    )),
                );
                result.finish("no trusted time")
            },
            Some(TimestampStatus::NotRequested) | None => {
                CheckResult::skipped(CheckKind::Timestamp, "no timestamp requested")
            },
        };
    };

    let Some(digest) = facts
        .log_digest
        .or_else(|| ctx.metadata.map(|m| m.log_digest))
    else {
        result.fail(IntegrityError::Timestamp(
            "no log digest to check the token against".to_string(),
        ));
        return result.finish("token not checked");
    };

    let verification = verify(
        &token,
        &digest,
        &VerifyOptions {
            tsa_certificate: ctx.options.tsa_certificate.clone(),
            at: None,
        },
    );
    if !verification.verified {
        let gate = verification
            .failed_gate()
            .map_or_else(|| "verification".to_string(), |g| format!("{g:?}").to_lowercase());
        let reason = verification
            .error
            .as_ref()
            .map_or_else(|| "token not verified".to_string(), ToString::to_string);
        result.fail(IntegrityError::Timestamp(format!("{gate} gate failed: {reason}")));
        return result.finish("token rejected");
    }

    match status {
        Some(TimestampStatus::Granted {
            gen_time, serial, ..
        }) => {
            if verification.gen_time != Some(*gen_time)
                || verification.serial.as_deref() != Some(serial.as_str())
            {
                result.fail(IntegrityError::Timestamp(
                    "token does not match the timestamp recorded in package.json".to_string(),
                ));
            }
        },
        _ => result.warn(format!(
            "{TIMESTAMP_RESPONSE} is present but package.json does not record it"
        )),
    }

    let detail = match (&verification.gen_time, &verification.tsa_name) {
        (Some(at), Some(tsa)) => format!("granted at {at} by {tsa}"),
        (Some(at), None) => format!("granted at {at}"),
        _ => "token verified".to_string(),
    };
    result.finish(detail)
}
