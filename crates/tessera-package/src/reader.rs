//! Opening sealed packages.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tessera_audit::AuditLogReader;
use tessera_crypto::{Certificate, DetachedSignature, PublicKey};
use tracing::debug;

use crate::environment::EnvironmentSnapshot;
use crate::error::{PackageError, PackageResult};
use crate::extract::{ExtractLimits, ExtractedMember, extract_archive};
use crate::git::GitMetadata;
use crate::layout::{
    ARTIFACTS, AUDIT_LOG, CERTIFICATE, DATA_DIR, ENVIRONMENT, GIT_METADATA, METADATA, PUBLIC_KEY,
    REQUIRED_MEMBERS, SignedComponent, TIMESTAMP_RESPONSE, data_member,
};
use crate::manifest::ArtifactManifest;
use crate::metadata::PackageMetadata;

/// Largest small member (JSON, PEM, signature, token) read into memory.
pub const MAX_SMALL_MEMBER: u64 = 64 * 1024 * 1024;

/// Opens packages into a private scratch directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageReader {
    limits: ExtractLimits,
}

impl PackageReader {
    /// A reader with custom extraction limits.
    #[must_use]
    pub fn with_limits(limits: ExtractLimits) -> Self {
        Self { limits }
    }

    /// Open a package with the default limits.
    ///
    /// # Errors
    ///
    /// Returns an error if the package cannot be safely extracted.
    pub fn open(path: impl AsRef<Path>) -> PackageResult<OpenedPackage> {
        Self::default().open_package(path)
    }

    /// Extract a package into a fresh scratch directory.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::UnsafeEntry`] or
    /// [`PackageError::LimitExceeded`] for hostile archives, and archive or
    /// I/O errors otherwise.
    pub fn open_package(&self, path: impl AsRef<Path>) -> PackageResult<OpenedPackage> {
        let path = path.as_ref();
        let scratch = tempfile::Builder::new().prefix("tessera-verify-").tempdir()?;
        let members = extract_archive(path, scratch.path(), &self.limits)?
            .into_iter()
            .map(|m| (m.name.clone(), m))
            .collect::<BTreeMap<_, _>>();
        debug!(
            package = %path.display(),
            members = members.len(),
            "Opened package"
        );
        Ok(OpenedPackage {
            source: path.to_path_buf(),
            scratch,
            members,
        })
    }
}

/// An extracted package. The scratch directory is removed on drop.
#[derive(Debug)]
pub struct OpenedPackage {
    source: PathBuf,
    scratch: TempDir,
    members: BTreeMap<String, ExtractedMember>,
}

impl OpenedPackage {
    /// The archive this was opened from.
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Scratch directory holding the extracted members.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.scratch.path()
    }

    /// Names of every extracted member.
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    /// Whether a member is present.
    #[must_use]
    pub fn has_member(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    /// Extracted location of a member.
    #[must_use]
    pub fn member_path(&self, name: &str) -> Option<&Path> {
        self.members.get(name).map(|m| m.path.as_path())
    }

    /// Required members that are absent.
    #[must_use]
    pub fn missing_required(&self) -> Vec<&'static str> {
        REQUIRED_MEMBERS
            .iter()
            .copied()
            .filter(|name| !self.has_member(name))
            .collect()
    }

    /// Artifact names found under `data/`.
    #[must_use]
    pub fn data_files(&self) -> Vec<&str> {
        self.members
            .keys()
            .filter_map(|name| name.strip_prefix(DATA_DIR)?.strip_prefix('/'))
            .collect()
    }

    /// Extracted location of an artifact.
    #[must_use]
    pub fn artifact_path(&self, name: &str) -> Option<&Path> {
        self.member_path(&data_member(name))
    }

    /// Read a small member into memory.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::MissingMember`] if absent and
    /// [`PackageError::LimitExceeded`] above [`MAX_SMALL_MEMBER`].
    pub fn read_member(&self, name: &str) -> PackageResult<Vec<u8>> {
        let member = self
            .members
            .get(name)
            .ok_or_else(|| PackageError::MissingMember(name.to_string()))?;
        if member.size > MAX_SMALL_MEMBER {
            return Err(PackageError::LimitExceeded(format!(
                "{name} is {} bytes (maximum {MAX_SMALL_MEMBER})",
                member.size
            )));
        }
        let mut bytes = Vec::new();
        File::open(&member.path)?
            .take(MAX_SMALL_MEMBER)
            .read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    fn read_optional(&self, name: &str) -> PackageResult<Option<Vec<u8>>> {
        if self.has_member(name) {
            self.read_member(name).map(Some)
        } else {
            Ok(None)
        }
    }

    fn read_text(&self, name: &str) -> PackageResult<String> {
        String::from_utf8(self.read_member(name)?).map_err(|_| PackageError::InvalidMember {
            member: name.to_string(),
            reason: "not UTF-8".to_string(),
        })
    }

    /// Parsed `package.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the member is missing or malformed.
    pub fn metadata(&self) -> PackageResult<PackageMetadata> {
        PackageMetadata::from_json(&self.read_member(METADATA)?)
    }

    /// Parsed `environment.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the member is missing or malformed.
    pub fn environment(&self) -> PackageResult<EnvironmentSnapshot> {
        EnvironmentSnapshot::from_json(&self.read_member(ENVIRONMENT)?)
    }

    /// Parsed `git_metadata.json`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the member is malformed.
    pub fn git_metadata(&self) -> PackageResult<Option<GitMetadata>> {
        self.read_optional(GIT_METADATA)?
            .map(|bytes| GitMetadata::from_json(&bytes))
            .transpose()
    }

    /// Parsed `artifacts.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the member is missing or malformed.
    pub fn artifacts(&self) -> PackageResult<ArtifactManifest> {
        ArtifactManifest::from_json(&self.read_member(ARTIFACTS)?)
    }

    /// Streaming reader over the audit log.
    ///
    /// # Errors
    ///
    /// Returns an error if the log is missing.
    pub fn entries(&self) -> PackageResult<AuditLogReader<BufReader<File>>> {
        let path = self
            .member_path(AUDIT_LOG)
            .ok_or_else(|| PackageError::MissingMember(AUDIT_LOG.to_string()))?;
        Ok(AuditLogReader::new(BufReader::new(File::open(path)?)))
    }

    /// Detached signature for a component, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature member is malformed.
    pub fn signature(&self, component: SignedComponent) -> PackageResult<Option<DetachedSignature>> {
        self.read_optional(component.signature_member())?
            .map(|bytes| DetachedSignature::from_json(&bytes).map_err(PackageError::from))
            .transpose()
    }

    /// Signer public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is missing or unparseable.
    pub fn public_key(&self) -> PackageResult<PublicKey> {
        Ok(PublicKey::from_pem(&self.read_text(PUBLIC_KEY)?)?)
    }

    /// Signer certificate, if bundled.
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate is unparseable.
    pub fn certificate(&self) -> PackageResult<Option<Certificate>> {
        if !self.has_member(CERTIFICATE) {
            return Ok(None);
        }
        Ok(Some(Certificate::from_pem(&self.read_text(CERTIFICATE)?)?))
    }

    /// Raw `TimeStampResp`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the member cannot be read.
    pub fn timestamp_response(&self) -> PackageResult<Option<Vec<u8>>> {
        self.read_optional(TIMESTAMP_RESPONSE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::METADATA_SIG;
    use crate::testing::{build_package, write_artifact};
    use tessera_crypto::ContentHash;
    use tessera_test::archive::{member_names, remove_member};
    use tessera_test::test_dir;

    #[test]
    fn test_written_package_reads_back() {
        let dir = test_dir();
        let source = write_artifact(dir.path(), "metrics.json", b"{\"auc\": 0.91}");
        let built = build_package(dir.path(), &[source.as_path()]);

        let names = member_names(&built.path);
        assert!(REQUIRED_MEMBERS.iter().all(|m| names.iter().any(|n| n == m)));
        assert!(names.iter().any(|n| n == "data/metrics.json"));

        let opened = PackageReader::open(&built.path).unwrap();
        assert!(opened.missing_required().is_empty());
        assert_eq!(opened.data_files(), ["metrics.json"]);

        let metadata = opened.metadata().unwrap();
        assert_eq!(metadata.entry_count, 2);
        assert_eq!(metadata.log_digest, built.log_digest);

        let manifest = opened.artifacts().unwrap();
        assert_eq!(
            manifest.get("metrics.json").unwrap().sha256,
            ContentHash::hash(b"{\"auc\": 0.91}")
        );
        assert_eq!(
            std::fs::read(opened.artifact_path("metrics.json").unwrap()).unwrap(),
            b"{\"auc\": 0.91}"
        );

        let entries: Vec<_> = opened.entries().unwrap().map(Result::unwrap).collect();
        assert_eq!(entries.len(), 2);

        let signature = opened.signature(SignedComponent::Metadata).unwrap().unwrap();
        let key = opened.public_key().unwrap();
        let digest = ContentHash::hash(&opened.read_member(METADATA).unwrap());
        assert!(signature.verify(&key, &digest).is_ok());

        assert!(opened.git_metadata().unwrap().is_none());
        assert!(opened.certificate().unwrap().is_none());
        assert!(opened.timestamp_response().unwrap().is_none());
    }

    #[test]
    fn test_missing_members_are_listed() {
        let dir = test_dir();
        let built = build_package(dir.path(), &[]);
        remove_member(&built.path, METADATA_SIG);

        let opened = PackageReader::open(&built.path).unwrap();
        assert_eq!(opened.missing_required(), [METADATA_SIG]);
        assert!(opened.signature(SignedComponent::Metadata).unwrap().is_none());
    }

    #[test]
    fn test_scratch_removed_on_drop() {
        let dir = test_dir();
        let built = build_package(dir.path(), &[]);
        let opened = PackageReader::open(&built.path).unwrap();
        let root = opened.root().to_path_buf();
        assert!(root.join(AUDIT_LOG).is_file());
        drop(opened);
        assert!(!root.exists());
    }

    #[test]
    fn test_writer_refuses_to_overwrite() {
        let dir = test_dir();
        let built = build_package(dir.path(), &[]);
        let before = std::fs::read(&built.path).unwrap();
        assert!(crate::testing::try_build_package(dir.path(), &[], &built.path).is_err());
        assert_eq!(std::fs::read(&built.path).unwrap(), before);
    }

    #[test]
    fn test_git_metadata_presence_follows_package_json() {
        let dir = test_dir();
        let git = GitMetadata {
            commit_sha: "9f1c2b7e".into(),
            branch: "main".into(),
            is_dirty: false,
            diff: String::new(),
            diff_truncated: false,
        };

        let unclaimed = dir.path().join("unclaimed.zip");
        let err =
            crate::testing::try_build_package_with_git(dir.path(), &[], &unclaimed, Some(&git), false)
                .unwrap_err();
        assert!(matches!(err, PackageError::InvalidMember { ref member, .. } if member == GIT_METADATA));
        assert!(!unclaimed.exists());

        let claimed = dir.path().join("claimed.zip");
        let built =
            crate::testing::try_build_package_with_git(dir.path(), &[], &claimed, Some(&git), true)
                .unwrap();
        let opened = PackageReader::open(&built.path).unwrap();
        assert!(opened.metadata().unwrap().has_git_metadata);
        assert_eq!(opened.git_metadata().unwrap(), Some(git));
        assert!(opened.signature(SignedComponent::GitMetadata).unwrap().is_some());
    }
}
