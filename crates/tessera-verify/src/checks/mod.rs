//! The individual checks of the verification pipeline.

pub(crate) mod artifacts;
pub(crate) mod auto_data;
pub(crate) mod chain;
pub(crate) mod environment;
pub(crate) mod external;
pub(crate) mod signatures;
pub(crate) mod structure;
pub(crate) mod timestamp;

use tessera_package::{OpenedPackage, PackageMetadata};

use crate::options::VerifyOptions;

/// Everything a check may look at. Checks never mutate it.
pub(crate) struct Context<'a> {
    pub(crate) package: &'a OpenedPackage,
    pub(crate) metadata: Option<&'a PackageMetadata>,
    pub(crate) options: &'a VerifyOptions,
    /// Whether soft gaps are failures.
    pub(crate) strict: bool,
}
