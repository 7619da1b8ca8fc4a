//! Safe extraction and the shape of the package.

use std::path::Path;
use tessera_core::Version;
use tessera_package::{OpenedPackage, PackageMetadata, PackageReader};

use crate::error::IntegrityError;
use crate::options::VerifyOptions;
use crate::report::{CheckKind, CheckResult};

/// An extracted package and its metadata, if that parsed.
pub(crate) struct Opened {
    pub(crate) package: OpenedPackage,
    pub(crate) metadata: Option<PackageMetadata>,
}

pub(crate) fn check(path: &Path, options: &VerifyOptions) -> (CheckResult, Option<Opened>) {
    let mut result = CheckResult::new(CheckKind::Structure);

    if !path.is_file() {
        result.fail(IntegrityError::Structural(format!(
            "{} is not a file",
            path.display()
        )));
        return (result.finish("package not found"), None);
    }

    let package = match PackageReader::with_limits(options.limits).open_package(path) {
        Ok(package) => package,
        Err(e) => {
            result.fail(IntegrityError::Structural(e.to_string()));
            return (result.finish("package could not be extracted"), None);
        },
    };

    for member in package.missing_required() {
        result.fail(IntegrityError::Structural(format!(
            "missing required member {member}"
        )));
    }

    let metadata = match package.metadata() {
        Ok(metadata) => {
            if !metadata.tool_version.is_compatible_with(&Version::current()) {
                result.warn(format!(
                    "written by tool version {}, verifying with {}",
                    metadata.tool_version,
                    Version::current()
                ));
            }
            Some(metadata)
        },
        Err(e) => {
            // A missing member was already reported above.
            if package.has_member(tessera_package::layout::METADATA) {
                result.fail(IntegrityError::Structural(e.to_string()));
            }
            None
        },
    };

    let detail = format!("{} members extracted", package.member_names().count());
    (result.finish(detail), Some(Opened { package, metadata }))
}
