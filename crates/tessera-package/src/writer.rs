//! Sealing: sign every component and write the ZIP atomically.

use std::fs::File;
use std::io::{self, BufReader, Seek, Write};
use std::path::{Path, PathBuf};
use tessera_crypto::{ContentHash, DetachedSignature, Identity};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::environment::EnvironmentSnapshot;
use crate::error::{PackageError, PackageResult};
use crate::git::GitMetadata;
use crate::layout::{
    ARTIFACTS, ARTIFACTS_SIG, AUDIT_LOG, AUDIT_LOG_SIG, CERTIFICATE, ENVIRONMENT, ENVIRONMENT_SIG,
    GIT_METADATA, GIT_METADATA_SIG, METADATA, METADATA_SIG, PUBLIC_KEY, TIMESTAMP_RESPONSE,
    data_member,
};
use crate::manifest::ArtifactManifest;
use crate::metadata::PackageMetadata;
use crate::name::join_checked;

/// Everything that goes into a package, already captured.
#[derive(Debug, Clone, Copy)]
pub struct PackageContents<'a> {
    /// Closed audit log on disk.
    pub log_path: &'a Path,
    /// Directory the artifacts were staged into.
    pub data_dir: &'a Path,
    /// Captured artifacts.
    pub manifest: &'a ArtifactManifest,
    /// Environment snapshot.
    pub environment: &'a EnvironmentSnapshot,
    /// Optional git metadata.
    pub git: Option<&'a GitMetadata>,
    /// Optional DER `TimeStampResp` over the log digest.
    pub timestamp_response: Option<&'a [u8]>,
    /// Metadata to write as `package.json`.
    pub metadata: &'a PackageMetadata,
}

/// A package that has been written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenPackage {
    /// Final location.
    pub path: PathBuf,
    /// SHA-256 of the audit log.
    pub log_digest: ContentHash,
    /// Number of ZIP members.
    pub member_count: usize,
}

/// Signs package components and writes the container.
pub struct PackageWriter<'a> {
    identity: &'a Identity,
}

impl<'a> PackageWriter<'a> {
    /// Create a writer signing with `identity`.
    #[must_use]
    pub fn new(identity: &'a Identity) -> Self {
        Self { identity }
    }

    fn sign(&self, digest: ContentHash) -> PackageResult<Vec<u8>> {
        Ok(DetachedSignature::create(self.identity.keypair(), digest)?.to_json()?)
    }

    /// Write the package to `output`.
    ///
    /// The archive is assembled in a temporary file next to `output` and
    /// renamed into place, so `output` either does not exist or is complete.
    ///
    /// # Errors
    ///
    /// - [`PackageError::InvalidMember`] if the log no longer matches
    ///   `metadata.log_digest`, or git metadata presence disagrees with
    ///   `metadata.has_git_metadata`
    /// - an I/O, archive or signing error; no file is left at `output`
    pub fn write(
        &self,
        output: impl AsRef<Path>,
        contents: &PackageContents<'_>,
    ) -> PackageResult<WrittenPackage> {
        let output = output.as_ref();
        let (log_digest, log_size) = ContentHash::hash_file(contents.log_path)?;
        if log_digest != contents.metadata.log_digest {
            return Err(PackageError::InvalidMember {
                member: AUDIT_LOG.to_string(),
                reason: "log changed after its digest was recorded".to_string(),
            });
        }
        if contents.metadata.has_git_metadata != contents.git.is_some() {
            return Err(PackageError::InvalidMember {
                member: GIT_METADATA.to_string(),
                reason: "presence does not match package.json".to_string(),
            });
        }

        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = tempfile::Builder::new()
            .prefix(".tessera-")
            .suffix(".zip.tmp")
            .tempfile_in(dir)?;

        let member_count = {
            let mut zip = ZipWriter::new(temp.as_file_mut());
            let mut members = Members::new(&mut zip);

            members.add_file(AUDIT_LOG, contents.log_path, log_size)?;
            members.add_bytes(AUDIT_LOG_SIG, &self.sign(log_digest)?)?;
            if let Some(response) = contents.timestamp_response {
                members.add_bytes(TIMESTAMP_RESPONSE, response)?;
            }

            let environment = contents.environment.to_json()?;
            members.add_bytes(ENVIRONMENT, &environment)?;
            members.add_bytes(ENVIRONMENT_SIG, &self.sign(ContentHash::hash(&environment))?)?;

            if let Some(git) = contents.git {
                let git = git.to_json()?;
                members.add_bytes(GIT_METADATA, &git)?;
                members.add_bytes(GIT_METADATA_SIG, &self.sign(ContentHash::hash(&git))?)?;
            }

            let manifest = contents.manifest.to_json()?;
            members.add_bytes(ARTIFACTS, &manifest)?;
            members.add_bytes(ARTIFACTS_SIG, &self.sign(ContentHash::hash(&manifest))?)?;
            for artifact in &contents.manifest.artifacts {
                let staged = join_checked(contents.data_dir, &artifact.name).map_err(|reason| {
                    PackageError::UnsafeEntry {
                        name: artifact.name.clone(),
                        reason: reason.to_string(),
                    }
                })?;
                members.add_file(&data_member(&artifact.name), &staged, artifact.size)?;
            }

            members.add_bytes(PUBLIC_KEY, self.identity.public_key().to_pem()?.as_bytes())?;
            if let Some(certificate) = self.identity.certificate() {
                members.add_bytes(CERTIFICATE, certificate.to_pem()?.as_bytes())?;
            }

            let metadata = contents.metadata.to_json()?;
            members.add_bytes(METADATA, &metadata)?;
            members.add_bytes(METADATA_SIG, &self.sign(ContentHash::hash(&metadata))?)?;

            let count = members.count;
            zip.finish()?;
            count
        };

        temp.as_file().sync_all()?;
        temp.persist_noclobber(output)?;

        info!(
            path = %output.display(),
            members = member_count,
            log_digest = %log_digest,
            "Wrote audit package"
        );
        Ok(WrittenPackage {
            path: output.to_path_buf(),
            log_digest,
            member_count,
        })
    }
}

impl std::fmt::Debug for PackageWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageWriter")
            .field("signer", &self.identity.keypair().key_id_hex())
            .finish_non_exhaustive()
    }
}

struct Members<'z, W: Write + Seek> {
    zip: &'z mut ZipWriter<W>,
    count: usize,
}

impl<'z, W: Write + Seek> Members<'z, W> {
    fn new(zip: &'z mut ZipWriter<W>) -> Self {
        Self { zip, count: 0 }
    }

    fn options(size: u64) -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644)
            .large_file(size >= u64::from(u32::MAX))
    }

    fn add_bytes(&mut self, name: &str, bytes: &[u8]) -> PackageResult<()> {
        self.zip
            .start_file(name, Self::options(bytes.len() as u64))?;
        self.zip.write_all(bytes)?;
        self.count = self.count.saturating_add(1);
        debug!(member = name, size = bytes.len(), "Added package member");
        Ok(())
    }

    fn add_file(&mut self, name: &str, path: &Path, size: u64) -> PackageResult<()> {
        self.zip.start_file(name, Self::options(size))?;
        let mut reader = BufReader::new(File::open(path)?);
        let copied = io::copy(&mut reader, &mut *self.zip)?;
        if copied != size {
            return Err(PackageError::InvalidMember {
                member: name.to_string(),
                reason: format!("expected {size} bytes, staged file has {copied}"),
            });
        }
        self.count = self.count.saturating_add(1);
        debug!(member = name, size, "Added package member");
        Ok(())
    }
}
