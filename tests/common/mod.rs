//! Shared fakes for bundle integration tests: an in-memory package
//! fetcher, a table-driven registry client, dependency finders, and a
//! tracer that records build events as readable strings.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use semver::Version;
use sourcepack::error::BundleError;
use sourcepack::sourceaddr::{self, RemotePackage, RemoteSource, Source};
use sourcepack::sourcebundle::{
    BoxError, BuildContext, BuildTracer, Dependencies, DependencyFinder, Diagnostic, Diagnostics,
    FetchSourcePackageResponse, FinderRef, PackageFetcher, PackageMeta, RegistryClient,
    RegistryPackageAddr, SourcePos, SourceRange,
};
use url::Url;

/// One file inside a fake package: (relative slash path, content).
pub type PackageTree = Vec<(&'static str, &'static str)>;

/// Serves package content from an in-memory table keyed by package URL.
pub struct FakeFetcher {
    packages: HashMap<String, PackageTree>,
    git_commits: HashMap<String, &'static str>,
    fetch_count: AtomicUsize,
}

impl FakeFetcher {
    pub fn new(packages: HashMap<String, PackageTree>) -> FakeFetcher {
        FakeFetcher {
            packages,
            git_commits: HashMap::new(),
            fetch_count: AtomicUsize::new(0),
        }
    }

    pub fn with_git_commit(mut self, url: &str, commit_id: &'static str) -> FakeFetcher {
        self.git_commits.insert(url.to_string(), commit_id);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

impl PackageFetcher for FakeFetcher {
    fn fetch_source_package(
        &self,
        ctx: &BuildContext,
        _source_type: &str,
        url: &Url,
        target_dir: &Path,
    ) -> Result<FetchSourcePackageResponse, BoxError> {
        if ctx.is_cancelled() {
            return Err("fetch cancelled".into());
        }
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        let key = url.to_string();
        let tree = self
            .packages
            .get(&key)
            .ok_or_else(|| format!("no fake package registered for {key}"))?;
        for (rel, content) in tree {
            let path = target_dir.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, content)?;
        }

        Ok(FetchSourcePackageResponse {
            package_meta: self
                .git_commits
                .get(&key)
                .map(|commit| PackageMeta::with_git_commit(*commit)),
        })
    }
}

/// Answers registry lookups from a static table:
/// package address string -> version string -> remote source address.
pub struct FakeRegistry {
    packages: HashMap<String, HashMap<&'static str, &'static str>>,
}

impl FakeRegistry {
    pub fn new(packages: HashMap<String, HashMap<&'static str, &'static str>>) -> FakeRegistry {
        FakeRegistry { packages }
    }
}

impl RegistryClient for FakeRegistry {
    fn package_versions(
        &self,
        ctx: &BuildContext,
        pkg: &RegistryPackageAddr,
    ) -> Result<Vec<Version>, BoxError> {
        if ctx.is_cancelled() {
            return Err("registry request cancelled".into());
        }
        let versions = self
            .packages
            .get(&pkg.to_string())
            .ok_or_else(|| format!("unknown registry package {pkg}"))?;
        Ok(versions
            .keys()
            .map(|v| Version::parse(v).expect("test version is valid"))
            .collect())
    }

    fn package_source_addr(
        &self,
        _ctx: &BuildContext,
        pkg: &RegistryPackageAddr,
        version: &Version,
    ) -> Result<RemoteSource, BoxError> {
        let versions = self
            .packages
            .get(&pkg.to_string())
            .ok_or_else(|| format!("unknown registry package {pkg}"))?;
        let source = versions
            .get(version.to_string().as_str())
            .ok_or_else(|| format!("unknown version {version} for {pkg}"))?;
        Ok(RemoteSource::parse(source).expect("test source address is valid"))
    }
}

/// A finder that reports nothing.
pub struct NoDependencyFinder;

impl DependencyFinder for NoDependencyFinder {
    fn finder_id(&self) -> &'static str {
        "none"
    }

    fn find_dependencies(
        &self,
        _package_root: &Path,
        _sub_path: &str,
        _deps: &mut Dependencies,
    ) -> Diagnostics {
        Diagnostics::new()
    }
}

pub fn no_dependencies() -> FinderRef {
    Arc::new(NoDependencyFinder)
}

/// A finder that reads `deps.txt` at the artifact location and reports one
/// dependency per line: `remote <addr>`, `local <path>`, or
/// `registry <addr> <version-req>`.
pub struct DepsFileFinder;

impl DependencyFinder for DepsFileFinder {
    fn finder_id(&self) -> &'static str {
        "deps-file"
    }

    fn find_dependencies(
        &self,
        package_root: &Path,
        sub_path: &str,
        deps: &mut Dependencies,
    ) -> Diagnostics {
        let mut dir = package_root.to_path_buf();
        if !sub_path.is_empty() {
            dir.push(sub_path);
        }
        let Ok(content) = fs::read_to_string(dir.join("deps.txt")) else {
            return Diagnostics::new();
        };

        let mut diags = Diagnostics::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let mut parts = line.split_whitespace();
            let kind = parts.next().unwrap_or_default();
            let addr = parts.next().unwrap_or_default();
            match kind {
                "remote" => deps.add_remote_source(
                    RemoteSource::parse(addr).expect("test remote address is valid"),
                    Arc::new(DepsFileFinder),
                ),
                "local" => {
                    let Ok(Source::Local(local)) = sourceaddr::parse_source(addr) else {
                        panic!("test local address {addr} is invalid");
                    };
                    deps.add_local_source(local, Arc::new(DepsFileFinder));
                }
                "registry" => {
                    let req = parts.next().unwrap_or("*");
                    let Ok(Source::Registry(reg)) = sourceaddr::parse_source(addr) else {
                        panic!("test registry address {addr} is invalid");
                    };
                    deps.add_registry_source(
                        reg,
                        semver::VersionReq::parse(req).expect("test version req is valid"),
                        Arc::new(DepsFileFinder),
                    );
                }
                other => diags.push(Diagnostic::error(
                    "Unsupported dependency kind",
                    format!("Don't know how to handle {other} dependencies."),
                )),
            }
        }
        diags
    }
}

/// A finder that emits one warning diagnostic anchored at a file inside
/// the analyzed package, for exercising range rewriting.
pub struct WarningFinder;

impl DependencyFinder for WarningFinder {
    fn finder_id(&self) -> &'static str {
        "warning"
    }

    fn find_dependencies(
        &self,
        _package_root: &Path,
        _sub_path: &str,
        _deps: &mut Dependencies,
    ) -> Diagnostics {
        let mut diags = Diagnostics::new();
        diags.push(
            Diagnostic::warning("Deprecated syntax", "This file uses deprecated syntax.")
                .with_subject(SourceRange {
                    filename: "main.tf".to_string(),
                    start: SourcePos { line: 2, column: 1, byte: 10 },
                    end: SourcePos { line: 2, column: 8, byte: 17 },
                }),
        );
        diags
    }
}

/// Records build events as human-readable strings, in order.
#[derive(Default)]
pub struct TestTracer {
    log: Mutex<Vec<String>>,
}

impl TestTracer {
    pub fn new() -> Arc<TestTracer> {
        Arc::new(TestTracer::default())
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, message: String) {
        self.log.lock().unwrap().push(message);
    }
}

impl BuildTracer for TestTracer {
    fn registry_package_versions_start(
        &self,
        _ctx: &BuildContext,
        pkg: &RegistryPackageAddr,
    ) -> Option<BuildContext> {
        self.record(format!("start requesting versions for {pkg}"));
        None
    }

    fn registry_package_versions_success(
        &self,
        _ctx: &BuildContext,
        pkg: &RegistryPackageAddr,
        _versions: &[Version],
    ) {
        self.record(format!("success requesting versions for {pkg}"));
    }

    fn registry_package_versions_failure(
        &self,
        _ctx: &BuildContext,
        pkg: &RegistryPackageAddr,
        _error: &BundleError,
    ) {
        self.record(format!("failed requesting versions for {pkg}"));
    }

    fn registry_package_versions_already(
        &self,
        _ctx: &BuildContext,
        pkg: &RegistryPackageAddr,
        _versions: &[Version],
    ) {
        self.record(format!("already have versions for {pkg}"));
    }

    fn registry_package_source_start(
        &self,
        _ctx: &BuildContext,
        pkg: &RegistryPackageAddr,
        version: &Version,
    ) -> Option<BuildContext> {
        self.record(format!("start requesting source address for {pkg} {version}"));
        None
    }

    fn registry_package_source_success(
        &self,
        _ctx: &BuildContext,
        pkg: &RegistryPackageAddr,
        version: &Version,
        source_addr: &RemoteSource,
    ) {
        self.record(format!("source address for {pkg} {version} is {source_addr}"));
    }

    fn registry_package_source_failure(
        &self,
        _ctx: &BuildContext,
        pkg: &RegistryPackageAddr,
        version: &Version,
        _error: &BundleError,
    ) {
        self.record(format!("failed requesting source address for {pkg} {version}"));
    }

    fn registry_package_source_already(
        &self,
        _ctx: &BuildContext,
        pkg: &RegistryPackageAddr,
        version: &Version,
        _source_addr: &RemoteSource,
    ) {
        self.record(format!("already have source address for {pkg} {version}"));
    }

    fn remote_package_download_start(
        &self,
        _ctx: &BuildContext,
        pkg: &RemotePackage,
    ) -> Option<BuildContext> {
        self.record(format!("start downloading {pkg}"));
        None
    }

    fn remote_package_download_success(&self, _ctx: &BuildContext, pkg: &RemotePackage) {
        self.record(format!("downloaded {pkg}"));
    }

    fn remote_package_download_failure(
        &self,
        _ctx: &BuildContext,
        pkg: &RemotePackage,
        _error: &BundleError,
    ) {
        self.record(format!("failed downloading {pkg}"));
    }

    fn remote_package_download_already(&self, _ctx: &BuildContext, pkg: &RemotePackage) {
        self.record(format!("already downloaded {pkg}"));
    }
}

/// Convenience parser for test addresses.
pub fn remote(addr: &str) -> RemoteSource {
    RemoteSource::parse(addr).expect("test remote address is valid")
}

pub fn registry(addr: &str) -> sourceaddr::RegistrySource {
    sourceaddr::RegistrySource::parse(addr).expect("test registry address is valid")
}

pub fn component(addr: &str) -> sourceaddr::ComponentSource {
    sourceaddr::ComponentSource::parse(addr).expect("test component address is valid")
}

pub fn any_version() -> semver::VersionReq {
    semver::VersionReq::STAR
}
