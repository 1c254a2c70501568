//! The registry client seam and the combined registry package address.

use semver::Version;

use crate::sourceaddr::{ComponentPackage, ModulePackage, RemoteSource};

use super::context::BuildContext;
use super::fetcher::BoxError;

/// The address of a package in either registry protocol. The builder and
/// bundle track module and component packages through the same indices and
/// manifest section, distinguished by this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegistryPackageAddr {
    Module(ModulePackage),
    Component(ComponentPackage),
}

impl std::fmt::Display for RegistryPackageAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryPackageAddr::Module(pkg) => pkg.fmt(f),
            RegistryPackageAddr::Component(pkg) => pkg.fmt(f),
        }
    }
}

impl From<ModulePackage> for RegistryPackageAddr {
    fn from(pkg: ModulePackage) -> Self {
        RegistryPackageAddr::Module(pkg)
    }
}

impl From<ComponentPackage> for RegistryPackageAddr {
    fn from(pkg: ComponentPackage) -> Self {
        RegistryPackageAddr::Component(pkg)
    }
}

/// A minimal client for the module and component registry protocols:
/// enough to list the versions available for a package and to find the real
/// remote source package for a selected version.
///
/// Implementations should not cache the direct results of these methods;
/// the builder coalesces and caches per build so that behavior is the same
/// across client implementations. Caching prerequisite information such as
/// service discovery results is fine. Implementations must honor
/// cancellation of the given context promptly by returning an error.
pub trait RegistryClient: Send + Sync {
    /// Fetches all known exact versions available for the given package in
    /// its registry. Order does not matter; the builder sorts.
    fn package_versions(
        &self,
        ctx: &BuildContext,
        pkg: &RegistryPackageAddr,
    ) -> Result<Vec<Version>, BoxError>;

    /// Fetches the real remote source address for the given version of the
    /// given registry package.
    fn package_source_addr(
        &self,
        ctx: &BuildContext,
        pkg: &RegistryPackageAddr,
        version: &Version,
    ) -> Result<RemoteSource, BoxError>;
}
