//! The source bundle builder: dependency resolution, fetching, and the
//! content-addressed package store.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use semver::{Comparator, Op, Version, VersionReq};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::BundleError;
use crate::ignorefiles::Ruleset;
use crate::pathsafety::target_within_root;
use crate::sourceaddr::{
    ComponentSource, ComponentSourceFinal, RegistrySource, RegistrySourceFinal, RemotePackage,
    RemoteSource,
};

use super::bundle::Bundle;
use super::context::BuildContext;
use super::dependencies::{Dependencies, FinderRef};
use super::diagnostics::{Diagnostic, Diagnostics};
use super::fetcher::PackageFetcher;
use super::manifest::{
    ManifestPackageMeta, ManifestRegistryMeta, ManifestRegistryVersion, ManifestRemotePackage,
    ManifestRoot, MANIFEST_FILENAME, MANIFEST_FORMAT_VERSION,
};
use super::meta::PackageMeta;
use super::registry::{RegistryClient, RegistryPackageAddr};

/// Gathers remote source packages into a bundle directory, resolving
/// registry indirections and the dependencies reported by caller-supplied
/// [`DependencyFinder`](super::DependencyFinder)s along the way.
///
/// Create a builder over an existing empty directory, feed it source
/// addresses through the `add_*` methods, then call [`Builder::close`] to
/// finalize the manifest and reopen the result as a read-only [`Bundle`].
/// Nothing other than the builder may touch the target directory during
/// the build, and the directory is not a valid bundle until `close`
/// returns successfully.
///
/// # Panics
///
/// Any `add_*` call after `close`, or after an earlier call returned error
/// diagnostics, panics: the bundle directory is in an unknown state and a
/// caller continuing past that point is a bug.
pub struct Builder {
    /// The bundle directory being written. `None` once the builder has
    /// been poisoned by an error, which makes every later call panic.
    target_dir: Option<PathBuf>,

    fetcher: Arc<dyn PackageFetcher>,
    registry_client: Arc<dyn RegistryClient>,

    /// Remote artifacts discovered but not yet analyzed.
    pending_remote: Vec<RemoteArtifact>,
    /// Registry artifacts waiting to be translated into remote artifacts.
    pending_registry: Vec<RegistryArtifact>,

    /// Which (source, finder) pairs have been analyzed already. Once a pair
    /// is here it never leaves.
    analyzed: HashSet<(RemoteSource, &'static str)>,

    /// The local directory name for each fetched remote package. The keys
    /// also record which packages need no further fetching. Directory
    /// names are content checksums; the manifest relies on that, but
    /// external callers must treat them as opaque.
    remote_package_dirs: BTreeMap<RemotePackage, String>,
    remote_package_meta: BTreeMap<RemotePackage, PackageMeta>,

    /// The underlying remote source for each selected version of each
    /// registry package.
    resolved_registry: BTreeMap<(RegistryPackageAddr, Version), RemoteSource>,
    /// Cached version lists, sorted ascending. Registry contents could
    /// change while we run, but a builder's lifetime is short enough not
    /// to care.
    registry_package_versions: BTreeMap<RegistryPackageAddr, Vec<Version>>,
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("target_dir", &self.target_dir)
            .field("pending_remote_count", &self.pending_remote.len())
            .field("pending_registry_count", &self.pending_registry.len())
            .field("remote_package_dirs", &self.remote_package_dirs)
            .field("remote_package_meta", &self.remote_package_meta)
            .field("resolved_registry", &self.resolved_registry)
            .field("registry_package_versions", &self.registry_package_versions)
            .finish()
    }
}

struct RemoteArtifact {
    source_addr: RemoteSource,
    finder: FinderRef,
}

struct RegistryArtifact {
    source_addr: RegistryArtifactAddr,
    allowed: VersionReq,
    finder: FinderRef,
}

/// A queued registry reference of either protocol.
enum RegistryArtifactAddr {
    Module(RegistrySource),
    Component(ComponentSource),
}

impl RegistryArtifactAddr {
    fn package_addr(&self) -> RegistryPackageAddr {
        match self {
            RegistryArtifactAddr::Module(src) => {
                RegistryPackageAddr::Module(src.package().clone())
            }
            RegistryArtifactAddr::Component(src) => {
                RegistryPackageAddr::Component(src.package().clone())
            }
        }
    }

    fn final_source_addr(&self, real_source: &RemoteSource) -> RemoteSource {
        match self {
            RegistryArtifactAddr::Module(src) => src.final_source_addr(real_source),
            RegistryArtifactAddr::Component(src) => src.final_source_addr(real_source),
        }
    }

    fn kind_label(&self) -> &'static str {
        match self {
            RegistryArtifactAddr::Module(_) => "module registry",
            RegistryArtifactAddr::Component(_) => "component registry",
        }
    }
}

impl std::fmt::Display for RegistryArtifactAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryArtifactAddr::Module(src) => src.fmt(f),
            RegistryArtifactAddr::Component(src) => src.fmt(f),
        }
    }
}

impl Builder {
    /// Creates a builder that will construct a source bundle in
    /// `target_dir`, which must already exist and be empty.
    ///
    /// The directory is made absolute immediately so a later change of
    /// working directory cannot redirect the build.
    pub fn new(
        target_dir: impl AsRef<Path>,
        fetcher: Arc<dyn PackageFetcher>,
        registry_client: Arc<dyn RegistryClient>,
    ) -> Result<Builder, BundleError> {
        let target_dir = target_dir.as_ref();
        let abs_dir = std::path::absolute(target_dir).map_err(|e| BundleError::TargetDirInvalid {
            path: target_dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut entries = fs::read_dir(&abs_dir).map_err(|e| BundleError::TargetDirInvalid {
            path: abs_dir.clone(),
            reason: e.to_string(),
        })?;
        if entries.next().is_some() {
            return Err(BundleError::TargetDirInvalid {
                path: abs_dir,
                reason: "directory is not empty".to_string(),
            });
        }

        Ok(Builder {
            target_dir: Some(abs_dir),
            fetcher,
            registry_client,
            pending_remote: Vec::new(),
            pending_registry: Vec::new(),
            analyzed: HashSet::new(),
            remote_package_dirs: BTreeMap::new(),
            remote_package_meta: BTreeMap::new(),
            resolved_registry: BTreeMap::new(),
            registry_package_versions: BTreeMap::new(),
        })
    }

    /// Incorporates the package containing the given remote source into
    /// the bundle and analyzes the artifact for further dependencies with
    /// the given finder.
    ///
    /// If the returned diagnostics contain errors the bundle is in an
    /// inconsistent state and the builder must be discarded.
    pub fn add_remote_source(
        &mut self,
        ctx: &BuildContext,
        addr: RemoteSource,
        dep_finder: FinderRef,
    ) -> Diagnostics {
        self.assert_open("add_remote_source");

        // Re-queueing something already analyzed would be wasted motion;
        // the resolution loop re-checks anyway, this just avoids growing
        // the queue.
        if self
            .analyzed
            .contains(&(addr.clone(), dep_finder.finder_id()))
        {
            return Diagnostics::new();
        }

        self.pending_remote.push(RemoteArtifact {
            source_addr: addr,
            finder: dep_finder,
        });
        self.resolve_pending(ctx)
    }

    /// Incorporates the registry metadata for the given address and the
    /// package for the newest version matching `allowed_versions`, then
    /// analyzes the artifact like [`Builder::add_remote_source`].
    pub fn add_registry_source(
        &mut self,
        ctx: &BuildContext,
        addr: RegistrySource,
        allowed_versions: VersionReq,
        dep_finder: FinderRef,
    ) -> Diagnostics {
        self.assert_open("add_registry_source");
        self.pending_registry.push(RegistryArtifact {
            source_addr: RegistryArtifactAddr::Module(addr),
            allowed: allowed_versions,
            finder: dep_finder,
        });
        self.resolve_pending(ctx)
    }

    /// A variant of [`Builder::add_registry_source`] for an
    /// already-selected version.
    ///
    /// The registry is still asked for the package's version list first, so
    /// installing from a final source stays consistent with installing
    /// from the unresolved source it came from.
    pub fn add_final_registry_source(
        &mut self,
        ctx: &BuildContext,
        addr: &RegistrySourceFinal,
        dep_finder: FinderRef,
    ) -> Diagnostics {
        let allowed = only_version(addr.selected_version());
        self.add_registry_source(ctx, addr.unversioned().clone(), allowed, dep_finder)
    }

    /// The component analog of [`Builder::add_registry_source`].
    pub fn add_component_source(
        &mut self,
        ctx: &BuildContext,
        addr: ComponentSource,
        allowed_versions: VersionReq,
        dep_finder: FinderRef,
    ) -> Diagnostics {
        self.assert_open("add_component_source");
        self.pending_registry.push(RegistryArtifact {
            source_addr: RegistryArtifactAddr::Component(addr),
            allowed: allowed_versions,
            finder: dep_finder,
        });
        self.resolve_pending(ctx)
    }

    /// The component analog of [`Builder::add_final_registry_source`].
    pub fn add_final_component_source(
        &mut self,
        ctx: &BuildContext,
        addr: &ComponentSourceFinal,
        dep_finder: FinderRef,
    ) -> Diagnostics {
        let allowed = only_version(addr.selected_version());
        self.add_component_source(ctx, addr.unversioned().clone(), allowed, dep_finder)
    }

    /// Finalizes the manifest, consumes the builder, and reopens the
    /// target directory as a read-only [`Bundle`].
    pub fn close(mut self) -> Result<Bundle, BundleError> {
        let Some(base_dir) = self.target_dir.take() else {
            panic!("close on poisoned sourcebundle Builder");
        };
        self.write_manifest(&base_dir)?;
        Bundle::open_dir(&base_dir)
    }

    fn assert_open(&self, method: &str) {
        if self.target_dir.is_none() {
            // Always a caller bug: a builder must be discarded once an add
            // call has returned error diagnostics.
            panic!("{method} on closed or errored sourcebundle Builder");
        }
    }

    /// Depletes the pending queues until everything required is present in
    /// the bundle directory, directly or indirectly.
    fn resolve_pending(&mut self, ctx: &BuildContext) -> Diagnostics {
        let mut diags = Diagnostics::new();

        // Queue order is irrelevant to the result, so both queues are
        // consumed LIFO.
        while !self.pending_remote.is_empty() || !self.pending_registry.is_empty() {
            // Registry items first: each resolution feeds the remote queue.
            while let Some(artifact) = self.pending_registry.pop() {
                match self.find_registry_package_source(ctx, &artifact.source_addr, &artifact.allowed)
                {
                    Ok(real_source) => self.pending_remote.push(RemoteArtifact {
                        source_addr: real_source,
                        finder: artifact.finder,
                    }),
                    Err(err) => diags.push(Diagnostic::error(
                        format!("Cannot resolve {} package", artifact.source_addr.kind_label()),
                        format!(
                            "Error resolving {} source {}: {}.",
                            artifact.source_addr.kind_label(),
                            artifact.source_addr,
                            err
                        ),
                    )),
                }
            }

            // The remote queue may grow again while draining, both from the
            // registry resolutions above and from dependency analysis here.
            while let Some(artifact) = self.pending_remote.pop() {
                let pkg_addr = artifact.source_addr.package().clone();
                let local_dir = match self.ensure_remote_package(ctx, &pkg_addr) {
                    Ok(dir) => dir,
                    Err(err) => {
                        diags.push(Diagnostic::error(
                            "Cannot install source package",
                            format!("Error installing {pkg_addr}: {err}."),
                        ));
                        continue;
                    }
                };

                let key = (artifact.source_addr.clone(), artifact.finder.finder_id());
                if self.analyzed.contains(&key) {
                    continue;
                }

                let package_root = self
                    .target_dir
                    .as_ref()
                    .expect("builder is open while resolving")
                    .join(&local_dir);
                let mut deps = Dependencies::new(artifact.source_addr.clone());
                let finder_diags = artifact.finder.find_dependencies(
                    &package_root,
                    artifact.source_addr.sub_path(),
                    &mut deps,
                );
                deps.disable();
                self.analyzed.insert(key);

                for (source, finder) in deps.remote.drain(..) {
                    self.pending_remote.push(RemoteArtifact {
                        source_addr: source,
                        finder,
                    });
                }
                for (source, allowed, finder) in deps.registry.drain(..) {
                    self.pending_registry.push(RegistryArtifact {
                        source_addr: RegistryArtifactAddr::Module(source),
                        allowed,
                        finder,
                    });
                }
                for (source, allowed, finder) in deps.component.drain(..) {
                    self.pending_registry.push(RegistryArtifact {
                        source_addr: RegistryArtifactAddr::Component(source),
                        allowed,
                        finder,
                    });
                }
                for err in deps.local_resolve_errors.drain(..) {
                    diags.push(Diagnostic::error(
                        "Invalid relative source address",
                        format!(
                            "Invalid relative path from {}: {}.",
                            artifact.source_addr, err
                        ),
                    ));
                }

                if !finder_diags.is_empty() {
                    let finder_diags = finder_diags.in_remote_source_package(&pkg_addr);
                    if let Some(tracer) = ctx.tracer() {
                        tracer.diagnostics(ctx, &finder_diags);
                    }
                    diags.extend(finder_diags);
                }
            }
        }

        if diags.has_errors() {
            // The bundle directory may now be inconsistent; poison the
            // builder so any further use panics rather than producing a
            // corrupt bundle.
            self.target_dir = None;
        }
        diags
    }

    /// Resolves a registry artifact to the fully-qualified remote source
    /// for its newest allowed version, caching both registry lookups for
    /// the builder's lifetime.
    fn find_registry_package_source(
        &mut self,
        ctx: &BuildContext,
        source_addr: &RegistryArtifactAddr,
        allowed: &VersionReq,
    ) -> Result<RemoteSource, BundleError> {
        if ctx.is_cancelled() {
            return Err(BundleError::Cancelled);
        }

        let pkg_addr = source_addr.package_addr();

        let available = match self.registry_package_versions.get(&pkg_addr) {
            Some(versions) => {
                if let Some(tracer) = ctx.tracer() {
                    tracer.registry_package_versions_already(ctx, &pkg_addr, versions);
                }
                versions.clone()
            }
            None => {
                let req_ctx = ctx
                    .tracer()
                    .and_then(|t| t.registry_package_versions_start(ctx, &pkg_addr))
                    .unwrap_or_else(|| ctx.clone());
                match self.registry_client.package_versions(&req_ctx, &pkg_addr) {
                    Ok(mut versions) => {
                        versions.sort();
                        self.registry_package_versions
                            .insert(pkg_addr.clone(), versions.clone());
                        if let Some(tracer) = ctx.tracer() {
                            tracer.registry_package_versions_success(&req_ctx, &pkg_addr, &versions);
                        }
                        versions
                    }
                    Err(err) => {
                        let err = BundleError::RegistryVersions {
                            package: pkg_addr.to_string(),
                            reason: err.to_string(),
                        };
                        if let Some(tracer) = ctx.tracer() {
                            tracer.registry_package_versions_failure(&req_ctx, &pkg_addr, &err);
                        }
                        return Err(err);
                    }
                }
            }
        };

        // Versions are sorted ascending, so the newest allowed version is
        // the last match.
        let selected = available
            .iter()
            .rev()
            .find(|v| allowed.matches(v))
            .cloned()
            .ok_or_else(|| BundleError::NoMatchingVersion {
                package: pkg_addr.to_string(),
            })?;

        let cache_key = (pkg_addr.clone(), selected.clone());
        let real_source = match self.resolved_registry.get(&cache_key) {
            Some(real_source) => {
                if let Some(tracer) = ctx.tracer() {
                    tracer.registry_package_source_already(ctx, &pkg_addr, &selected, real_source);
                }
                real_source.clone()
            }
            None => {
                let req_ctx = ctx
                    .tracer()
                    .and_then(|t| t.registry_package_source_start(ctx, &pkg_addr, &selected))
                    .unwrap_or_else(|| ctx.clone());
                match self
                    .registry_client
                    .package_source_addr(&req_ctx, &pkg_addr, &selected)
                {
                    Ok(real_source) => {
                        self.resolved_registry
                            .insert(cache_key, real_source.clone());
                        if let Some(tracer) = ctx.tracer() {
                            tracer.registry_package_source_success(
                                &req_ctx,
                                &pkg_addr,
                                &selected,
                                &real_source,
                            );
                        }
                        real_source
                    }
                    Err(err) => {
                        let err = BundleError::RegistrySourceAddr {
                            package: pkg_addr.to_string(),
                            version: selected.clone(),
                            reason: err.to_string(),
                        };
                        if let Some(tracer) = ctx.tracer() {
                            tracer.registry_package_source_failure(
                                &req_ctx, &pkg_addr, &selected, &err,
                            );
                        }
                        return Err(err);
                    }
                }
            }
        };

        // The caller's sub-path is relative to whatever sub-path the
        // registry response carried, so combine the two.
        Ok(source_addr.final_source_addr(&real_source))
    }

    /// Makes sure the given remote package is present in the bundle
    /// directory, fetching and installing it if it isn't already, and
    /// returns its local directory name.
    fn ensure_remote_package(
        &mut self,
        ctx: &BuildContext,
        pkg_addr: &RemotePackage,
    ) -> Result<String, BundleError> {
        if let Some(existing) = self.remote_package_dirs.get(pkg_addr) {
            if let Some(tracer) = ctx.tracer() {
                tracer.remote_package_download_already(ctx, pkg_addr);
            }
            return Ok(existing.clone());
        }

        let req_ctx = ctx
            .tracer()
            .and_then(|t| t.remote_package_download_start(ctx, pkg_addr))
            .unwrap_or_else(|| ctx.clone());

        let result = self.install_remote_package(&req_ctx, pkg_addr);
        if let Some(tracer) = ctx.tracer() {
            match &result {
                Ok(_) => tracer.remote_package_download_success(&req_ctx, pkg_addr),
                Err(err) => tracer.remote_package_download_failure(&req_ctx, pkg_addr, err),
            }
        }
        result
    }

    fn install_remote_package(
        &mut self,
        ctx: &BuildContext,
        pkg_addr: &RemotePackage,
    ) -> Result<String, BundleError> {
        if ctx.is_cancelled() {
            return Err(BundleError::Cancelled);
        }
        let target_dir = self
            .target_dir
            .clone()
            .expect("builder is open while installing");

        // The final directory is named after a checksum of the content, so
        // the package is staged under a temporary name first.
        let work_dir = tempfile::Builder::new()
            .prefix(".tmp-")
            .tempdir_in(&target_dir)
            .map_err(|e| BundleError::io("failed to create new package directory", e))?;

        let response = self
            .fetcher
            .fetch_source_package(ctx, pkg_addr.source_type(), pkg_addr.url(), work_dir.path())
            .map_err(|e| BundleError::Fetch {
                package: pkg_addr.to_string(),
                reason: e.to_string(),
            })?;
        if let Some(meta) = response.package_meta {
            self.remote_package_meta.insert(pkg_addr.clone(), meta);
        }

        // Remove everything the package's own .terraformignore excludes,
        // and vet what stays. These checks are only sound because nothing
        // else modifies the staging directory concurrently: bundles must be
        // built on hosts trusted by whoever consumes them.
        let ignore_rules = Ruleset::load_package_ignore_rules(work_dir.path());
        if let Some(err) = ignore_rules.error() {
            return Err(BundleError::InvalidIgnoreFile(err));
        }
        prepare_package_dir(work_dir.path(), &ignore_rules)?;

        let dir_name = hash_package_dir(work_dir.path())?;
        self.remote_package_dirs
            .insert(pkg_addr.clone(), dir_name.clone());

        // Two different package addresses can return byte-identical source
        // code, for example one Git source with an explicit main ref and
        // one without. An existing directory with the same hash serves
        // this package as-is and the staged copy is discarded.
        let final_dir = target_dir.join(&dir_name);
        if let Ok(info) = fs::symlink_metadata(&final_dir) {
            if info.is_dir() {
                drop(work_dir);
                return Ok(dir_name);
            }
        }

        let work_path = work_dir.into_path();
        fs::rename(&work_path, &final_dir)
            .map_err(|e| BundleError::io("failed to place final package directory", e))?;
        Ok(dir_name)
    }

    fn write_manifest(&self, base_dir: &Path) -> Result<(), BundleError> {
        let mut packages: Vec<ManifestRemotePackage> = self
            .remote_package_dirs
            .iter()
            .map(|(pkg_addr, local_dir)| ManifestRemotePackage {
                source: pkg_addr.to_string(),
                local: local_dir.clone(),
                meta: ManifestPackageMeta {
                    git_commit_id: self
                        .remote_package_meta
                        .get(pkg_addr)
                        .and_then(|m| m.git_commit_id())
                        .map(str::to_string),
                },
            })
            .collect();
        packages.sort_by(|a, b| a.source.cmp(&b.source));

        let mut registry_map: BTreeMap<String, BTreeMap<String, ManifestRegistryVersion>> =
            BTreeMap::new();
        for ((pkg_addr, version), source_addr) in &self.resolved_registry {
            registry_map
                .entry(pkg_addr.to_string())
                .or_default()
                .insert(
                    version.to_string(),
                    ManifestRegistryVersion {
                        source: source_addr.to_string(),
                    },
                );
        }
        let registry_meta = registry_map
            .into_iter()
            .map(|(source, versions)| ManifestRegistryMeta { source, versions })
            .collect();

        let root = ManifestRoot {
            format_version: MANIFEST_FORMAT_VERSION,
            packages,
            registry_meta,
        };
        let buf = serde_json::to_vec_pretty(&root).map_err(|e| BundleError::ManifestInvalid {
            reason: e.to_string(),
        })?;

        // Written to a temporary name and renamed into place so a crash
        // can never leave a truncated manifest behind.
        let mut tmp = tempfile::NamedTempFile::new_in(base_dir)
            .map_err(|e| BundleError::io("failed to create manifest file", e))?;
        tmp.write_all(&buf)
            .map_err(|e| BundleError::io("failed to write manifest", e))?;
        tmp.persist(base_dir.join(MANIFEST_FILENAME))
            .map_err(|e| BundleError::io("failed to write manifest", e.error))?;

        Ok(())
    }
}

/// An exact-version requirement, for installing an already-selected
/// registry version through the regular constraint path.
fn only_version(version: &Version) -> VersionReq {
    VersionReq {
        comparators: vec![Comparator {
            op: Op::Exact,
            major: version.major,
            minor: Some(version.minor),
            patch: Some(version.patch),
            pre: version.pre.clone(),
        }],
    }
}

/// Applies ignore rules to a freshly fetched package and vets the
/// remainder: no symlink may escape the package root once resolved, and
/// everything kept must be a regular file, a directory, or a symlink to
/// one of those.
fn prepare_package_dir(root: &Path, ignore_rules: &Ruleset) -> Result<(), BundleError> {
    let real_root = fs::canonicalize(root)
        .map_err(|e| BundleError::io("failed to resolve package directory", e))?;

    let mut walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| BundleError::Io {
            message: "failed to prepare package directory".to_string(),
            source: e.into(),
        })?;
        let path = entry.path();
        let rel = path
            .strip_prefix(root)
            .expect("walked path is always below its walk root");
        let rel_slash = slash_path(rel);
        let is_dir = entry.file_type().is_dir();

        // Directories are tested both bare and with a trailing separator,
        // matching how rules for directories are written.
        let mut decision = ignore_rules.excludes(&rel_slash);
        if !decision.excluded && is_dir {
            decision = ignore_rules.excludes(&format!("{rel_slash}/"));
        }
        if decision.excluded {
            if is_dir {
                // An excluded directory can only be removed wholesale when
                // the decision is dominating; otherwise a later negation
                // rule may re-include entries below it, so the walk
                // descends and removes excluded children one by one.
                if decision.dominating {
                    fs::remove_dir_all(path).map_err(|e| {
                        BundleError::io(format!("failed to remove ignored file {rel_slash}"), e)
                    })?;
                    walker.skip_current_dir();
                }
            } else {
                fs::remove_file(path).map_err(|e| {
                    BundleError::io(format!("failed to remove ignored file {rel_slash}"), e)
                })?;
            }
            continue;
        }

        let real_path = fs::canonicalize(path).map_err(|e| {
            BundleError::io(format!("failed to get real path for sub-path \"{rel_slash}\""), e)
        })?;
        if !target_within_root(&real_root, &real_path) {
            return Err(BundleError::PackageSymlinkEscape { path: rel_slash });
        }

        let info = fs::symlink_metadata(&real_path).map_err(|e| {
            BundleError::io(format!("failed to stat \"{rel_slash}\""), e)
        })?;
        if !info.is_file() && !info.is_dir() {
            return Err(BundleError::UnsupportedPackageFile { path: rel_slash });
        }
    }

    Ok(())
}

/// Computes the content hash that names a package directory inside the
/// bundle: each file's sha-256 combined with its slash-relative name into
/// one listing, the listing hashed again, and the digest rendered as
/// URL-safe unpadded base64 so it is always a single path segment.
fn hash_package_dir(root: &Path) -> Result<String, BundleError> {
    let mut files: Vec<(String, PathBuf)> = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| BundleError::Io {
            message: "failed to walk package directory".to_string(),
            source: e.into(),
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .expect("walked path is always below its walk root");
        files.push((slash_path(rel), entry.path().to_path_buf()));
    }
    files.sort();

    let mut listing = Sha256::new();
    for (name, path) in &files {
        let mut file = fs::File::open(path).map_err(|e| {
            BundleError::io(format!("failed to open \"{name}\" for checksumming"), e)
        })?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher)
            .map_err(|e| BundleError::io(format!("failed to read \"{name}\""), e))?;
        let digest = hasher.finalize();
        listing.update(format!("{}  {}\n", hex::encode(digest), name).as_bytes());
    }

    Ok(URL_SAFE_NO_PAD.encode(listing.finalize()))
}

/// Converts a relative path into slash-separated form.
pub(super) fn slash_path(path: &Path) -> String {
    let s = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}
