//! Race-free artifact capture.
//!
//! The source is opened once, with `O_NOFOLLOW`, and every later decision
//! (file type, size, the bytes copied) is made through that same handle. A
//! symlink swapped in after a check therefore cannot redirect the copy, and
//! the recorded hash is over the staged bytes rather than the source path.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{self, BufWriter, Read};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tessera_core::Timestamp;
use tessera_crypto::ContentHash;
use tracing::{debug, warn};

use crate::error::{ArtifactError, ArtifactResult};
use crate::fsutil::{create_new_nofollow, is_symlink_error, open_read_nofollow};
use crate::manifest::{Artifact, ArtifactManifest, TrackedFile};
use crate::name::{check_archive_name, join_checked};

/// Default upper bound on a single artifact (10 GiB).
pub const DEFAULT_MAX_ARTIFACT_SIZE: u64 = 10 * 1024 * 1024 * 1024;

#[derive(Default)]
struct Registry {
    reserved: HashSet<String>,
    captured: BTreeMap<String, Artifact>,
}

/// Copies artifacts into a staging directory and keeps the manifest.
pub struct ArtifactGuard {
    staging: PathBuf,
    max_size: u64,
    registry: Mutex<Registry>,
}

impl ArtifactGuard {
    /// Create a guard staging into `staging` (usually `<staging>/data`).
    ///
    /// # Errors
    ///
    /// Returns an error if the staging directory cannot be created.
    pub fn new(staging: impl Into<PathBuf>, max_size: u64) -> ArtifactResult<Self> {
        let staging = staging.into();
        std::fs::create_dir_all(&staging).map_err(|e| ArtifactError::io(&staging, e))?;
        Ok(Self {
            staging,
            max_size,
            registry: Mutex::new(Registry::default()),
        })
    }

    /// Directory artifacts are copied into.
    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    /// Configured size limit.
    #[must_use]
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    fn registry(&self) -> ArtifactResult<MutexGuard<'_, Registry>> {
        self.registry.lock().map_err(|_| ArtifactError::LockPoisoned)
    }

    /// Capture `path` under `name` (defaults to the file name).
    ///
    /// # Errors
    ///
    /// - [`ArtifactError::InvalidName`] or [`ArtifactError::DuplicateName`]
    /// - [`ArtifactError::Missing`], [`ArtifactError::SymlinkRejected`] or
    ///   [`ArtifactError::NotRegularFile`] for unusable sources
    /// - [`ArtifactError::SizeExceeded`] if more than `max_size` bytes are
    ///   readable; nothing is left in staging
    pub fn register(&self, path: impl AsRef<Path>, name: Option<&str>) -> ArtifactResult<Artifact> {
        let path = path.as_ref();
        let name = match name {
            Some(name) => name.to_string(),
            None => default_name(path)?,
        };
        check_archive_name(&name).map_err(|reason| ArtifactError::InvalidName {
            name: name.clone(),
            reason,
        })?;

        {
            let mut registry = self.registry()?;
            if !registry.reserved.insert(name.clone()) {
                return Err(ArtifactError::DuplicateName(name));
            }
        }

        match self.capture(path, &name) {
            Ok(artifact) => {
                let mut registry = self.registry()?;
                registry.captured.insert(name, artifact.clone());
                Ok(artifact)
            },
            Err(e) => {
                if let Ok(mut registry) = self.registry() {
                    registry.reserved.remove(&name);
                }
                Err(e)
            },
        }
    }

    fn capture(&self, path: &Path, name: &str) -> ArtifactResult<Artifact> {
        let source = open_source(path)?;
        let metadata = source.metadata().map_err(|e| ArtifactError::io(path, e))?;
        if !metadata.is_file() {
            return Err(ArtifactError::NotRegularFile(path.to_path_buf()));
        }
        if metadata.len() > self.max_size {
            return Err(ArtifactError::SizeExceeded {
                path: path.to_path_buf(),
                limit: self.max_size,
            });
        }

        let dest = join_checked(&self.staging, name).map_err(|reason| {
            ArtifactError::InvalidName {
                name: name.to_string(),
                reason,
            }
        })?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArtifactError::io(parent, e))?;
        }

        let copied = match self.copy_bounded(&source, &dest) {
            Ok(copied) => copied,
            Err(e) => {
                let _ = std::fs::remove_file(&dest);
                return Err(match e {
                    CopyError::TooLarge => ArtifactError::SizeExceeded {
                        path: path.to_path_buf(),
                        limit: self.max_size,
                    },
                    CopyError::Io(e) => ArtifactError::io(&dest, e),
                });
            },
        };

        let (sha256, size) = ContentHash::hash_file(&dest).map_err(|e| ArtifactError::io(&dest, e))?;
        if size != copied {
            warn!(name, copied, hashed = size, "Staged artifact changed after copy");
        }

        debug!(name, size, sha256 = %sha256, "Captured artifact");
        Ok(Artifact {
            name: name.to_string(),
            size,
            sha256,
            captured_at: Timestamp::now(),
        })
    }

    fn copy_bounded(&self, source: &File, dest: &Path) -> Result<u64, CopyError> {
        let out = create_new_nofollow(dest).map_err(CopyError::Io)?;
        let mut writer = BufWriter::new(out);
        let mut limited = source.take(self.max_size.saturating_add(1));
        let copied = io::copy(&mut limited, &mut writer).map_err(CopyError::Io)?;
        if copied > self.max_size {
            return Err(CopyError::TooLarge);
        }
        let out = writer.into_inner().map_err(|e| CopyError::Io(e.into_error()))?;
        out.sync_all().map_err(CopyError::Io)?;
        Ok(copied)
    }

    /// Hash a file in place without bundling it.
    ///
    /// # Errors
    ///
    /// Returns the same source errors as [`register`](Self::register).
    pub fn track(&self, path: impl AsRef<Path>) -> ArtifactResult<TrackedFile> {
        let path = path.as_ref();
        let source = open_source(path)?;
        let metadata = source.metadata().map_err(|e| ArtifactError::io(path, e))?;
        if !metadata.is_file() {
            return Err(ArtifactError::NotRegularFile(path.to_path_buf()));
        }
        let (sha256, size) =
            ContentHash::hash_reader(source).map_err(|e| ArtifactError::io(path, e))?;
        debug!(path = %path.display(), size, "Tracked file");
        Ok(TrackedFile {
            path: path.to_path_buf(),
            size,
            sha256,
        })
    }

    /// Names captured so far.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::LockPoisoned`] if a capture panicked.
    pub fn names(&self) -> ArtifactResult<Vec<String>> {
        Ok(self.registry()?.captured.keys().cloned().collect())
    }

    /// Snapshot of the manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::LockPoisoned`] if a capture panicked.
    pub fn manifest(&self) -> ArtifactResult<ArtifactManifest> {
        Ok(ArtifactManifest::new(
            self.registry()?.captured.values().cloned().collect(),
        ))
    }
}

impl std::fmt::Debug for ArtifactGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactGuard")
            .field("staging", &self.staging)
            .field("max_size", &self.max_size)
            .finish_non_exhaustive()
    }
}

enum CopyError {
    TooLarge,
    Io(io::Error),
}

fn open_source(path: &Path) -> ArtifactResult<File> {
    open_read_nofollow(path).map_err(|e| {
        if is_symlink_error(&e) {
            ArtifactError::SymlinkRejected(path.to_path_buf())
        } else if e.kind() == io::ErrorKind::NotFound {
            ArtifactError::Missing(path.to_path_buf())
        } else {
            ArtifactError::io(path, e)
        }
    })
}

fn default_name(path: &Path) -> ArtifactResult<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| ArtifactError::InvalidName {
            name: path.display().to_string(),
            reason: "path has no UTF-8 file name",
        })
}
