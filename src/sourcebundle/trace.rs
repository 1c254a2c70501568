//! Build progress tracing.

use semver::Version;

use crate::error::BundleError;
use crate::sourceaddr::{RemotePackage, RemoteSource};

use super::context::BuildContext;
use super::diagnostics::Diagnostics;
use super::registry::RegistryPackageAddr;

/// Callbacks delivered while a build runs, for debugging and UI progress.
///
/// Attach a tracer to a [`BuildContext`](super::BuildContext) with
/// [`BuildContext::with_tracer`](super::BuildContext::with_tracer). Every
/// method has an empty default body, so implementations override only what
/// they need.
///
/// The `*_start` methods frame a request and may return a replacement
/// context; the builder then uses it for the outgoing request and for the
/// paired `*_success`/`*_failure` event, which lets a tracer bracket the
/// operation with values like spans. Returning `None` keeps the current
/// context. The `*_already` methods fire instead of a start/end pair when
/// the builder answers from its own cache.
#[allow(unused_variables)]
pub trait BuildTracer: Send + Sync {
    // Frames requests for the list of available versions of a registry
    // package.
    fn registry_package_versions_start(
        &self,
        ctx: &BuildContext,
        pkg: &RegistryPackageAddr,
    ) -> Option<BuildContext> {
        None
    }
    fn registry_package_versions_success(
        &self,
        ctx: &BuildContext,
        pkg: &RegistryPackageAddr,
        versions: &[Version],
    ) {
    }
    fn registry_package_versions_failure(
        &self,
        ctx: &BuildContext,
        pkg: &RegistryPackageAddr,
        error: &BundleError,
    ) {
    }
    fn registry_package_versions_already(
        &self,
        ctx: &BuildContext,
        pkg: &RegistryPackageAddr,
        versions: &[Version],
    ) {
    }

    // Frames requests for the real underlying source address of a selected
    // registry package version.
    fn registry_package_source_start(
        &self,
        ctx: &BuildContext,
        pkg: &RegistryPackageAddr,
        version: &Version,
    ) -> Option<BuildContext> {
        None
    }
    fn registry_package_source_success(
        &self,
        ctx: &BuildContext,
        pkg: &RegistryPackageAddr,
        version: &Version,
        source_addr: &RemoteSource,
    ) {
    }
    fn registry_package_source_failure(
        &self,
        ctx: &BuildContext,
        pkg: &RegistryPackageAddr,
        version: &Version,
        error: &BundleError,
    ) {
    }
    fn registry_package_source_already(
        &self,
        ctx: &BuildContext,
        pkg: &RegistryPackageAddr,
        version: &Version,
        source_addr: &RemoteSource,
    ) {
    }

    // Frames remote package downloads.
    fn remote_package_download_start(
        &self,
        ctx: &BuildContext,
        pkg: &RemotePackage,
    ) -> Option<BuildContext> {
        None
    }
    fn remote_package_download_success(&self, ctx: &BuildContext, pkg: &RemotePackage) {}
    fn remote_package_download_failure(
        &self,
        ctx: &BuildContext,
        pkg: &RemotePackage,
        error: &BundleError,
    ) {
    }
    fn remote_package_download_already(&self, ctx: &BuildContext, pkg: &RemotePackage) {}

    /// Delivered for any non-fatal diagnostics as soon as they are
    /// produced, in addition to being returned from the builder call. May
    /// fire multiple times per operation; each call carries new
    /// diagnostics, never a replacement for earlier ones.
    fn diagnostics(&self, ctx: &BuildContext, diags: &Diagnostics) {}
}
