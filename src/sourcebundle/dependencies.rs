//! The dependency finder seam and its one-shot callback sink.

use std::path::Path;
use std::sync::Arc;

use semver::VersionReq;

use crate::error::SourceError;
use crate::sourceaddr::{
    self, ComponentSource, LocalSource, RegistrySource, RemoteSource, Source,
};

use super::diagnostics::Diagnostics;

/// A shared handle to a dependency finder; finders are typically stateless
/// singletons.
pub type FinderRef = Arc<dyn DependencyFinder>;

/// Analyzes a file or directory inside a fetched source package and reports
/// the dependencies described there.
///
/// The builder tracks each `(source address, finder identity)` pair it has
/// already analyzed and visits it only once, so [`finder_id`] must be
/// stable and must differ between finders with different behavior.
/// Implementations are usually empty structs analyzing one artifact kind.
///
/// [`finder_id`]: DependencyFinder::finder_id
pub trait DependencyFinder: Send + Sync {
    /// A stable identity for this finder, used to key the builder's
    /// analyzed-set.
    fn finder_id(&self) -> &'static str;

    /// Analyzes the artifact at `sub_path` below `package_root` (a
    /// read-only local copy of the package) and reports each discovered
    /// dependency through `deps`, together with the finder appropriate for
    /// the kind of artifact expected at that address.
    ///
    /// Finders reporting local addresses should validate that the address
    /// does not traverse up more levels than `sub_path` has, because a
    /// finder can produce better diagnostics (with source locations) than
    /// the builder's fallback error.
    ///
    /// Diagnostics with source ranges must use filenames that are valid
    /// sub-paths from `package_root`; the builder rewrites them into full
    /// source addresses.
    fn find_dependencies(
        &self,
        package_root: &Path,
        sub_path: &str,
        deps: &mut Dependencies,
    ) -> Diagnostics;
}

/// The callback sink a [`DependencyFinder`] reports through.
///
/// The sink is live only for the duration of the `find_dependencies` call
/// that received it; the builder disables it afterwards, so a finder that
/// incorrectly retains state cannot extend the build asynchronously.
pub struct Dependencies {
    live: bool,
    base_addr: RemoteSource,
    pub(super) remote: Vec<(RemoteSource, FinderRef)>,
    pub(super) registry: Vec<(RegistrySource, VersionReq, FinderRef)>,
    pub(super) component: Vec<(ComponentSource, VersionReq, FinderRef)>,
    pub(super) local_resolve_errors: Vec<SourceError>,
}

impl Dependencies {
    pub(super) fn new(base_addr: RemoteSource) -> Dependencies {
        Dependencies {
            live: true,
            base_addr,
            remote: Vec::new(),
            registry: Vec::new(),
            component: Vec::new(),
            local_resolve_errors: Vec::new(),
        }
    }

    /// Reports a dependency on a remote source artifact.
    pub fn add_remote_source(&mut self, source: RemoteSource, finder: FinderRef) {
        if !self.check_live("add_remote_source") {
            return;
        }
        self.remote.push((source, finder));
    }

    /// Reports a dependency on a module registry artifact, constrained to
    /// the given allowed versions.
    pub fn add_registry_source(
        &mut self,
        source: RegistrySource,
        allowed_versions: VersionReq,
        finder: FinderRef,
    ) {
        if !self.check_live("add_registry_source") {
            return;
        }
        self.registry.push((source, allowed_versions, finder));
    }

    /// Reports a dependency on a component registry artifact.
    pub fn add_component_source(
        &mut self,
        source: ComponentSource,
        allowed_versions: VersionReq,
        finder: FinderRef,
    ) {
        if !self.check_live("add_component_source") {
            return;
        }
        self.component.push((source, allowed_versions, finder));
    }

    /// Reports a dependency on a path relative to the artifact being
    /// analyzed. The address resolves against the containing package; a
    /// path that traverses out of the package becomes an error diagnostic
    /// on the build.
    pub fn add_local_source(&mut self, source: LocalSource, finder: FinderRef) {
        if !self.check_live("add_local_source") {
            return;
        }
        let base = Source::Remote(self.base_addr.clone());
        match sourceaddr::resolve_relative(&base, &Source::Local(source)) {
            // The result is always remote because the base address is.
            Ok(Source::Remote(resolved)) => self.remote.push((resolved, finder)),
            Ok(other) => unreachable!("remote base resolved to non-remote source {other}"),
            Err(err) => self.local_resolve_errors.push(err),
        }
    }

    fn check_live(&self, method: &str) -> bool {
        if !self.live {
            tracing::debug!(method, "dependency sink called after analysis completed");
        }
        self.live
    }

    pub(super) fn disable(&mut self) {
        self.live = false;
    }
}
