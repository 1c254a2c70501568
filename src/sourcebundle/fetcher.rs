//! The package fetcher seam.

use std::path::Path;

use url::Url;

use super::context::BuildContext;
use super::meta::PackageMeta;

/// The error type collaborators report with; the builder wraps these with
/// the package or version being processed.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Metadata about a completed fetch operation.
#[derive(Debug, Default)]
pub struct FetchSourcePackageResponse {
    /// Optional metadata about how the package content was derived, kept in
    /// the bundle manifest.
    pub package_meta: Option<PackageMeta>,
}

/// Knows how to fetch remote source packages into a local filesystem
/// directory: the seam where HTTP, Git, and other transports plug in.
pub trait PackageFetcher: Send + Sync {
    /// Retrieves the source package at `url` (of kind `source_type`) and
    /// extracts it into `target_dir`, which exists and is empty.
    ///
    /// The fetcher must not write anything outside `target_dir`; it may
    /// assume nothing else touches the directory concurrently. On success
    /// the directory holds a complete copy of the package, ready for
    /// analysis.
    ///
    /// Fetchers must honor cancellation of the given context to a
    /// reasonable extent, returning an error so the caller knows the target
    /// directory may be incomplete. They should not cache: the builder
    /// owns request coalescing, so each call must be independent of all
    /// others.
    fn fetch_source_package(
        &self,
        ctx: &BuildContext,
        source_type: &str,
        url: &Url,
        target_dir: &Path,
    ) -> Result<FetchSourcePackageResponse, BoxError>;
}
