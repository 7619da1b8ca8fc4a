//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tessera_package::prelude::*;` to import all essential types.

// Errors
pub use crate::{ArtifactError, ArtifactResult, PackageError, PackageResult};

// Capture
pub use crate::{Artifact, ArtifactGuard, ArtifactManifest, EnvironmentSnapshot, GitMetadata};

// Writing
pub use crate::{
    Degradation, DegradationKind, PackageContents, PackageMetadata, PackageWriter, SignerInfo,
    TimestampStatus,
};

// Reading
pub use crate::{OpenedPackage, PackageReader, SignedComponent};
