//! Fixed member names of a sealed package.

/// The streamed NDJSON audit log.
pub const AUDIT_LOG: &str = "audit_log.ndjson";
/// Detached signature over the audit log.
pub const AUDIT_LOG_SIG: &str = "audit_log.sig";
/// RFC 3161 response over the audit log digest.
pub const TIMESTAMP_RESPONSE: &str = "audit_log.tsr";
/// Environment snapshot.
pub const ENVIRONMENT: &str = "environment.json";
/// Signature over the environment snapshot.
pub const ENVIRONMENT_SIG: &str = "environment.json.sig";
/// Git metadata.
pub const GIT_METADATA: &str = "git_metadata.json";
/// Signature over the git metadata.
pub const GIT_METADATA_SIG: &str = "git_metadata.json.sig";
/// Artifact manifest.
pub const ARTIFACTS: &str = "artifacts.json";
/// Signature over the artifact manifest.
pub const ARTIFACTS_SIG: &str = "artifacts.json.sig";
/// Signer public key (SPKI PEM).
pub const PUBLIC_KEY: &str = "public_key.pem";
/// Optional signer certificate.
pub const CERTIFICATE: &str = "certificate.pem";
/// Package metadata.
pub const METADATA: &str = "package.json";
/// Signature over the package metadata.
pub const METADATA_SIG: &str = "package.json.sig";
/// Directory holding captured artifacts.
pub const DATA_DIR: &str = "data";

/// Members every package must contain.
pub const REQUIRED_MEMBERS: &[&str] = &[
    AUDIT_LOG,
    AUDIT_LOG_SIG,
    ENVIRONMENT,
    ENVIRONMENT_SIG,
    ARTIFACTS,
    ARTIFACTS_SIG,
    PUBLIC_KEY,
    METADATA,
    METADATA_SIG,
];

/// A signed member and where its signature lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignedComponent {
    /// `audit_log.ndjson`
    AuditLog,
    /// `environment.json`
    Environment,
    /// `git_metadata.json`
    GitMetadata,
    /// `artifacts.json`
    Artifacts,
    /// `package.json`
    Metadata,
}

impl SignedComponent {
    /// Every component, in verification order.
    pub const ALL: [Self; 5] = [
        Self::AuditLog,
        Self::Environment,
        Self::GitMetadata,
        Self::Artifacts,
        Self::Metadata,
    ];

    /// Member holding the content.
    #[must_use]
    pub fn member(self) -> &'static str {
        match self {
            Self::AuditLog => AUDIT_LOG,
            Self::Environment => ENVIRONMENT,
            Self::GitMetadata => GIT_METADATA,
            Self::Artifacts => ARTIFACTS,
            Self::Metadata => METADATA,
        }
    }

    /// Member holding the detached signature.
    #[must_use]
    pub fn signature_member(self) -> &'static str {
        match self {
            Self::AuditLog => AUDIT_LOG_SIG,
            Self::Environment => ENVIRONMENT_SIG,
            Self::GitMetadata => GIT_METADATA_SIG,
            Self::Artifacts => ARTIFACTS_SIG,
            Self::Metadata => METADATA_SIG,
        }
    }

    /// Whether a package may omit this component.
    #[must_use]
    pub fn is_optional(self) -> bool {
        matches!(self, Self::GitMetadata)
    }
}

impl std::fmt::Display for SignedComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.member())
    }
}

/// Archive path of an artifact.
#[must_use]
pub fn data_member(name: &str) -> String {
    format!("{DATA_DIR}/{name}")
}
