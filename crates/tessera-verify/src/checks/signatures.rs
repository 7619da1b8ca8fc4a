//! Detached signatures and signer policy.
//!
//! Each component is verified on its own scoped thread. The log may be large,
//! and hashing it should not hold up the small members.

use chrono::Utc;
use std::thread;
use tessera_crypto::{ContentHash, PublicKey};
use tessera_package::SignedComponent;
use tessera_package::layout::{CERTIFICATE, PUBLIC_KEY};
use tracing::debug;

use super::Context;
use crate::error::IntegrityError;
use crate::report::{CheckKind, CheckResult, ProofLevel};

fn verify_component(
    ctx: &Context<'_>,
    key: &PublicKey,
    component: SignedComponent,
) -> Result<bool, IntegrityError> {
    let package = ctx.package;
    let fail = |reason: String| IntegrityError::signature(component.to_string(), reason);

    let signature = package
        .signature(component)
        .map_err(|e| fail(e.to_string()))?;
    let content = package.member_path(component.member());

    let claimed = match component {
        SignedComponent::GitMetadata => ctx.metadata.map(|m| m.has_git_metadata),
        _ => None,
    };
    match claimed {
        Some(true) if content.is_none() => {
            return Err(fail(
                "package.json records git metadata but the member is missing".to_string(),
            ));
        },
        Some(false) if content.is_some() => {
            return Err(fail(
                "member is present but package.json does not record it".to_string(),
            ));
        },
        _ => {},
    }

    let (signature, content) = match (signature, content) {
        (None, None) if component.is_optional() => return Ok(false),
        (None, _) => {
            return Err(fail(format!(
                "signature {} is missing",
                component.signature_member()
            )));
        },
        (Some(_), None) => return Err(fail("signed member is missing".to_string())),
        (Some(signature), Some(content)) => (signature, content),
    };

    if signature.key_id != key.key_id_hex() {
        return Err(fail(format!(
            "signed by key {}, package key is {}",
            signature.key_id,
            key.key_id_hex()
        )));
    }
    let (digest, _) = ContentHash::hash_file(content).map_err(|e| fail(e.to_string()))?;
    signature.verify(key, &digest).map_err(|e| fail(e.to_string()))?;
    debug!(%component, %digest, "Signature verified");
    Ok(true)
}

fn check_signer(ctx: &Context<'_>, key: &PublicKey, result: &mut CheckResult) -> bool {
    let package = ctx.package;

    match package.certificate() {
        Ok(Some(certificate)) => match certificate.public_key() {
            Ok(certified) if &certified == key => {
                let at = ctx.metadata.map_or_else(Utc::now, |m| m.sealed_at.0);
                if !certificate.is_valid_at(at) {
                    result.gap(
                        ctx.strict,
                        IntegrityError::signature(
                            CERTIFICATE,
                            format!("certificate was not valid at {at}"),
                        ),
                    );
                }
            },
            Ok(_) => result.fail(IntegrityError::signature(
                CERTIFICATE,
                "certificate does not certify the package key",
            )),
            Err(e) => result.fail(IntegrityError::signature(CERTIFICATE, e.to_string())),
        },
        Ok(None) => {},
        Err(e) => result.fail(IntegrityError::signature(CERTIFICATE, e.to_string())),
    }

    if !ctx.options.trusted_keys.is_empty() && !ctx.options.trusted_keys.trusts(key) {
        result.fail(IntegrityError::signature(
            "signer",
            format!("key {} is not trusted", key.key_id_hex()),
        ));
    }

    let Some(metadata) = ctx.metadata else {
        return true;
    };
    if metadata.signer.key_id != key.key_id_hex() {
        result.fail(IntegrityError::signature(
            "signer",
            format!(
                "package.json names signer {}, package key is {}",
                metadata.signer.key_id,
                key.key_id_hex()
            ),
        ));
    }
    if metadata.signer.has_certificate != package.has_member(CERTIFICATE) {
        result.fail(IntegrityError::signature(
            CERTIFICATE,
            "presence does not match package.json",
        ));
    }
    if metadata.signer.ephemeral {
        result.gap(
            ctx.strict,
            IntegrityError::signature(
                "signer",
                "ephemeral session key, integrity-only proof of origin",
            ),
        );
    }
    metadata.signer.ephemeral
}

pub(crate) fn check(ctx: &Context<'_>) -> (CheckResult, ProofLevel) {
    let mut result = CheckResult::new(CheckKind::Signatures);

    let key = match ctx.package.public_key() {
        Ok(key) => key,
        Err(e) => {
            result.fail(IntegrityError::signature(PUBLIC_KEY, e.to_string()));
            return (result.finish("no usable signer key"), ProofLevel::None);
        },
    };

    let outcomes: Vec<(SignedComponent, Result<bool, IntegrityError>)> = thread::scope(|scope| {
        let handles: Vec<_> = SignedComponent::ALL
            .into_iter()
            .map(|component| {
                let key = &key;
                (
                    component,
                    scope.spawn(move || verify_component(ctx, key, component)),
                )
            })
            .collect();
        handles
            .into_iter()
            .map(|(component, handle)| {
                let outcome = handle.join().unwrap_or_else(|_| {
                    Err(IntegrityError::signature(
                        component.to_string(),
                        "verification panicked",
                    ))
                });
                (component, outcome)
            })
            .collect()
    });

    let mut verified: usize = 0;
    for (_, outcome) in outcomes {
        match outcome {
            Ok(true) => verified = verified.saturating_add(1),
            Ok(false) => {},
            Err(e) => result.fail(e),
        }
    }

    let ephemeral = check_signer(ctx, &key, &mut result);
    let proof = if ephemeral {
        ProofLevel::IntegrityOnly
    } else {
        ProofLevel::IdentityBound
    };
    let detail = format!(
        "{verified} signatures verified with key {}",
        key.key_id_hex()
    );
    (result.finish(detail), proof)
}
