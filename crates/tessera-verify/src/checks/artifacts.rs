//! Artifact files against the signed manifest.
//!
//! Files are hashed by a small pool of scoped threads pulling from a shared
//! index. Each file is streamed in fixed-size chunks, so memory does not grow
//! with artifact size.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tessera_crypto::ContentHash;
use tessera_package::Artifact;
use tessera_package::layout::{ARTIFACTS, data_member};
use tracing::debug;

use super::Context;
use crate::error::IntegrityError;
use crate::report::{CheckKind, CheckResult};

const MAX_WORKERS: usize = 8;

fn verify_artifact(ctx: &Context<'_>, artifact: &Artifact) -> Result<(), IntegrityError> {
    let fail = |reason: String| IntegrityError::artifact(artifact.name.clone(), reason);

    let path = ctx.package.artifact_path(&artifact.name).ok_or_else(|| {
        fail(format!(
            "listed in {ARTIFACTS} but {} is missing",
            data_member(&artifact.name)
        ))
    })?;
    let (hash, size) = ContentHash::hash_file(path).map_err(|e| fail(e.to_string()))?;
    if size != artifact.size {
        return Err(fail(format!(
            "size mismatch: manifest records {} bytes, found {size}",
            artifact.size
        )));
    }
    if hash != artifact.sha256 {
        return Err(fail(format!(
            "hash mismatch: manifest records {}, found {hash}",
            artifact.sha256
        )));
    }
    debug!(artifact = %artifact.name, size, "Artifact verified");
    Ok(())
}

fn hash_all(ctx: &Context<'_>, artifacts: &[Artifact]) -> Vec<IntegrityError> {
    let workers = thread::available_parallelism()
        .map_or(1, NonZeroUsize::get)
        .min(MAX_WORKERS)
        .min(artifacts.len())
        .max(1);
    let next = AtomicUsize::new(0);
    let next = &next;

    thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(move || {
                    let mut failures = Vec::new();
                    while !ctx.options.cancel.is_cancelled() {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(artifact) = artifacts.get(index) else {
                            break;
                        };
                        if let Err(e) = verify_artifact(ctx, artifact) {
                            failures.push(e);
                        }
                    }
                    failures
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| {
                handle.join().unwrap_or_else(|_| {
                    vec![IntegrityError::artifact(ARTIFACTS, "hashing worker panicked")]
                })
            })
            .collect()
    })
}

pub(crate) fn check(ctx: &Context<'_>) -> CheckResult {
    let mut result = CheckResult::new(CheckKind::Artifacts);

    let manifest = match ctx.package.artifacts() {
        Ok(manifest) => manifest,
        Err(e) => {
            result.fail(IntegrityError::artifact(ARTIFACTS, e.to_string()));
            return result.finish("manifest unreadable");
        },
    };

    if let Some(metadata) = ctx.metadata {
        if metadata.artifact_count != manifest.len() {
            result.fail(IntegrityError::artifact(
                ARTIFACTS,
                format!(
                    "package.json records {} artifacts, manifest lists {}",
                    metadata.artifact_count,
                    manifest.len()
                ),
            ));
        }
    }

    let mut failures = hash_all(ctx, &manifest.artifacts);
    let listed: BTreeSet<&str> = manifest.artifacts.iter().map(|a| a.name.as_str()).collect();
    for name in ctx.package.data_files() {
        if !listed.contains(name) {
            failures.push(IntegrityError::artifact(
                name,
                format!("present in the package but not listed in {ARTIFACTS}"),
            ));
        }
    }
    failures.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
    for failure in failures {
        result.fail(failure);
    }

    let detail = format!(
        "{} artifacts, {} bytes",
        manifest.len(),
        manifest.total_size()
    );
    result.finish(detail)
}
