//! Hash chain replay.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{self, BufReader, Read};
use tessera_audit::{AuditLogReader, replay_chain_with};
use tessera_crypto::{ContentHash, ContentHasher};
use tessera_package::layout::AUDIT_LOG;

use super::Context;
use crate::error::IntegrityError;
use crate::report::{CheckKind, CheckResult};

/// What later checks learn from the replay.
#[derive(Debug, Default)]
pub(crate) struct ChainFacts {
    /// SHA-256 of the log as streamed.
    pub(crate) log_digest: Option<ContentHash>,
    /// Every value found in `extra_hashes`, if requested.
    pub(crate) tracked: HashSet<String>,
    /// Referenced path to expected hex digest, if requested.
    pub(crate) referenced: BTreeMap<String, String>,
}

/// Suffix of an `extra_hashes` key naming a file.
const PATH_SUFFIX: &str = "_path";
/// Suffix of the key carrying that file's digest.
const FILE_HASH_SUFFIX: &str = "_file_hash";

/// Collect `*_path` entries that have a matching `*_file_hash`.
fn collect_references(extra: &BTreeMap<String, String>, into: &mut BTreeMap<String, String>) {
    for (key, path) in extra {
        let Some(stem) = key.strip_suffix(PATH_SUFFIX) else {
            continue;
        };
        if let Some(hash) = extra.get(&format!("{stem}{FILE_HASH_SUFFIX}")) {
            into.insert(path.clone(), hash.clone());
        }
    }
}

/// Feeds every byte it reads into a hasher.
struct HashingReader<'h, R> {
    inner: R,
    hasher: &'h mut ContentHasher,
}

impl<R: Read> Read for HashingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if let Some(read) = buf.get(..n) {
            self.hasher.update(read);
        }
        Ok(n)
    }
}

pub(crate) fn check(ctx: &Context<'_>) -> (CheckResult, ChainFacts) {
    let mut result = CheckResult::new(CheckKind::Chain);
    let mut facts = ChainFacts::default();

    let Some(path) = ctx.package.member_path(AUDIT_LOG) else {
        result.fail(IntegrityError::chain(None, "audit log is missing"));
        return (result.finish("no log to replay"), facts);
    };
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            result.fail(IntegrityError::chain(None, format!("cannot open log: {e}")));
            return (result.finish("no log to replay"), facts);
        },
    };

    let collect_tracked = !ctx.options.external_files.is_empty();
    let collect_referenced = ctx.options.auto_data_dir.is_some();
    let mut hasher = ContentHasher::new();
    let replay = {
        let reader = HashingReader {
            inner: file,
            hasher: &mut hasher,
        };
        replay_chain_with(AuditLogReader::new(BufReader::new(reader)), |entry| {
            if collect_tracked {
                facts.tracked.extend(entry.extra_hashes.values().cloned());
            }
            if collect_referenced {
                collect_references(&entry.extra_hashes, &mut facts.referenced);
            }
        })
    };
    let replay = match replay {
        Ok(replay) => replay,
        Err(e) => {
            result.fail(IntegrityError::chain(None, format!("log unreadable: {e}")));
            return (result.finish("replay aborted"), facts);
        },
    };
    let log_digest = hasher.finalize();
    facts.log_digest = Some(log_digest);

    for issue in &replay.issues {
        result.fail(IntegrityError::chain(Some(issue.sequence()), issue.to_string()));
    }
    if replay.omitted_issues() > 0 {
        result.fail(IntegrityError::chain(
            replay.first_divergence(),
            format!("{} further issues not listed", replay.omitted_issues()),
        ));
    }

    if let Some(metadata) = ctx.metadata {
        if metadata.entry_count != replay.entry_count {
            result.fail(IntegrityError::chain(
                None,
                format!(
                    "package.json records {} entries, log has {}",
                    metadata.entry_count, replay.entry_count
                ),
            ));
        }
        if metadata.chain_head != replay.head_hash {
            result.fail(IntegrityError::chain(
                None,
                format!(
                    "package.json records chain head {}, log ends at {}",
                    metadata.chain_head, replay.head_hash
                ),
            ));
        }
        if metadata.log_digest != log_digest {
            result.fail(IntegrityError::chain(
                None,
                format!(
                    "package.json records log digest {}, log hashes to {log_digest}",
                    metadata.log_digest
                ),
            ));
        }
    }

    let detail = match replay.first_divergence() {
        Some(sequence) => format!(
            "{} of {} entries verified, first divergence at sequence {sequence}",
            replay.entries_verified, replay.entry_count
        ),
        None => format!("{} entries verified", replay.entries_verified),
    };
    (result.finish(detail), facts)
}
