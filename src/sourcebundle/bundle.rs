//! Read-only access to a finished source bundle.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use semver::Version;
use sha2::{Digest, Sha256};

use crate::error::BundleError;
use crate::pathsafety::lexical_clean;
use crate::slug::Packer;
use crate::sourceaddr::{
    ComponentSource, ComponentSourceFinal, FinalSource, RegistrySource, RegistrySourceFinal,
    RemotePackage, RemoteSource,
};

use super::builder::slash_path;
use super::manifest::{ManifestRoot, MANIFEST_FILENAME, MANIFEST_FORMAT_VERSION};
use super::meta::PackageMeta;
use super::registry::RegistryPackageAddr;

/// A finished source bundle directory, opened for reading.
///
/// The manifest is the sole source of truth: every query answers from the
/// indices loaded at open time. Nothing inside or outside the process may
/// modify the directory while a `Bundle` is alive.
#[derive(Debug)]
pub struct Bundle {
    root_dir: PathBuf,

    /// Hex sha-256 of the manifest file, which indirectly covers every
    /// package because package directories are named by content checksum.
    manifest_checksum: String,

    remote_package_dirs: BTreeMap<RemotePackage, String>,
    remote_package_meta: BTreeMap<RemotePackage, PackageMeta>,
    registry_package_sources: BTreeMap<RegistryPackageAddr, BTreeMap<Version, RemoteSource>>,
}

impl Bundle {
    /// Opens a bundle rooted at the given directory by reading and
    /// validating its manifest.
    pub fn open_dir(base_dir: &Path) -> Result<Bundle, BundleError> {
        // The absolute form survives a later working-directory change.
        let root_dir = std::path::absolute(base_dir).map_err(|e| BundleError::ManifestRead {
            reason: format!("cannot resolve base directory: {e}"),
        })?;

        let manifest_src =
            fs::read(root_dir.join(MANIFEST_FILENAME)).map_err(|e| BundleError::ManifestRead {
                reason: e.to_string(),
            })?;
        let manifest_checksum = hex::encode(Sha256::digest(&manifest_src));

        let manifest: ManifestRoot =
            serde_json::from_slice(&manifest_src).map_err(|e| BundleError::ManifestInvalid {
                reason: e.to_string(),
            })?;
        if manifest.format_version != MANIFEST_FORMAT_VERSION {
            return Err(BundleError::ManifestVersionUnsupported {
                version: manifest.format_version,
            });
        }

        let mut remote_package_dirs = BTreeMap::new();
        let mut remote_package_meta = BTreeMap::new();
        for pkg in &manifest.packages {
            // Be fussy about the local directory name so a crafted manifest
            // cannot point elsewhere in the filesystem: a single plain path
            // segment, no separators, no traversal.
            if !valid_local_dir_name(&pkg.local) {
                return Err(BundleError::InvalidLocalDirName {
                    name: pkg.local.clone(),
                });
            }

            let pkg_addr =
                RemotePackage::parse(&pkg.source).map_err(|e| BundleError::ManifestAddress {
                    given: pkg.source.clone(),
                    source: e,
                })?;
            remote_package_dirs.insert(pkg_addr.clone(), pkg.local.clone());

            if let Some(commit_id) = &pkg.meta.git_commit_id {
                remote_package_meta.insert(pkg_addr, PackageMeta::with_git_commit(commit_id));
            }
        }

        let mut registry_package_sources: BTreeMap<
            RegistryPackageAddr,
            BTreeMap<Version, RemoteSource>,
        > = BTreeMap::new();
        for reg in &manifest.registry_meta {
            let pkg_addr = parse_registry_package_addr(&reg.source)?;
            let versions = registry_package_sources.entry(pkg_addr).or_default();
            for (version_str, version_meta) in &reg.versions {
                let version =
                    Version::parse(version_str).map_err(|e| BundleError::ManifestInvalid {
                        reason: format!("invalid registry package version \"{version_str}\": {e}"),
                    })?;
                let source_addr = RemoteSource::parse(&version_meta.source).map_err(|e| {
                    BundleError::ManifestAddress {
                        given: version_meta.source.clone(),
                        source: e,
                    }
                })?;
                versions.insert(version, source_addr);
            }
        }

        Ok(Bundle {
            root_dir,
            manifest_checksum,
            remote_package_dirs,
            remote_package_meta,
            registry_package_sources,
        })
    }

    /// Returns the local path corresponding to any final source address.
    ///
    /// A bundle only contains remote packages, but as a convenience a
    /// local source address is translated to its relative filesystem path,
    /// on the assumption that it is relative to the process working
    /// directory; such a result is not generally inside the bundle.
    pub fn local_path_for_source(&self, addr: &FinalSource) -> Result<PathBuf, BundleError> {
        match addr {
            FinalSource::Remote(remote) => self.local_path_for_remote_source(remote),
            FinalSource::Registry(reg) => self.local_path_for_final_registry_source(reg),
            FinalSource::Component(comp) => self.local_path_for_final_component_source(comp),
            FinalSource::Local(local) => Ok(PathBuf::from(local.relative_path())),
        }
    }

    /// Returns the local path holding the given remote source, or an error
    /// if its package is not in the bundle.
    pub fn local_path_for_remote_source(&self, addr: &RemoteSource) -> Result<PathBuf, BundleError> {
        let pkg_addr = addr.package();
        let local_dir = self.remote_package_dirs.get(pkg_addr).ok_or_else(|| {
            BundleError::PackageNotInBundle {
                package: pkg_addr.to_string(),
            }
        })?;
        let mut path = self.root_dir.join(local_dir);
        if !addr.sub_path().is_empty() {
            for segment in addr.sub_path().split('/') {
                path.push(segment);
            }
        }
        Ok(path)
    }

    /// Returns the local path for the given registry source at the given
    /// version.
    pub fn local_path_for_registry_source(
        &self,
        addr: &RegistrySource,
        version: &Version,
    ) -> Result<PathBuf, BundleError> {
        let pkg_addr = RegistryPackageAddr::Module(addr.package().clone());
        let base_source = self.registry_version_source(&pkg_addr, version)?;
        // The given address may carry its own sub-path below the one the
        // registry resolution produced.
        let final_source = addr.final_source_addr(base_source);
        self.local_path_for_remote_source(&final_source)
    }

    /// A variant of [`Bundle::local_path_for_registry_source`] taking the
    /// address and selected version as one value.
    pub fn local_path_for_final_registry_source(
        &self,
        addr: &RegistrySourceFinal,
    ) -> Result<PathBuf, BundleError> {
        self.local_path_for_registry_source(addr.unversioned(), addr.selected_version())
    }

    /// The component analog of [`Bundle::local_path_for_registry_source`].
    pub fn local_path_for_component_source(
        &self,
        addr: &ComponentSource,
        version: &Version,
    ) -> Result<PathBuf, BundleError> {
        let pkg_addr = RegistryPackageAddr::Component(addr.package().clone());
        let base_source = self.registry_version_source(&pkg_addr, version)?;
        let final_source = addr.final_source_addr(base_source);
        self.local_path_for_remote_source(&final_source)
    }

    /// The component analog of
    /// [`Bundle::local_path_for_final_registry_source`].
    pub fn local_path_for_final_component_source(
        &self,
        addr: &ComponentSourceFinal,
    ) -> Result<PathBuf, BundleError> {
        self.local_path_for_component_source(addr.unversioned(), addr.selected_version())
    }

    fn registry_version_source(
        &self,
        pkg_addr: &RegistryPackageAddr,
        version: &Version,
    ) -> Result<&RemoteSource, BundleError> {
        let versions = self.registry_package_sources.get(pkg_addr).ok_or_else(|| {
            BundleError::PackageNotInBundle {
                package: pkg_addr.to_string(),
            }
        })?;
        versions
            .get(version)
            .ok_or_else(|| BundleError::VersionNotInBundle {
                package: pkg_addr.to_string(),
                version: version.clone(),
            })
    }

    /// The inverse of [`Bundle::local_path_for_source`]: translates a path
    /// below the bundle directory back into a source address it is a
    /// snapshot of.
    ///
    /// Content coalescing means several packages can share one local
    /// directory; the candidate with the shortest address string wins so
    /// the result is deterministic. This direction is not indexed and
    /// costs a scan over the package table; it is intended for presenting
    /// friendly names in diagnostics, not for hot paths.
    pub fn source_for_local_path(&self, path: &Path) -> Result<FinalSource, BundleError> {
        let abs = std::path::absolute(path).map_err(|e| {
            BundleError::io(format!("cannot resolve path \"{}\"", path.display()), e)
        })?;
        let abs = lexical_clean(&abs);
        let rel = abs
            .strip_prefix(&self.root_dir)
            .map_err(|_| BundleError::PathNotInBundle { path: abs.clone() })?;

        let rel_slash = slash_path(rel);
        if rel_slash.is_empty() || rel_slash == "." {
            return Err(BundleError::PathNotInBundle { path: abs });
        }
        let (local_dir, sub_path) = match rel_slash.split_once('/') {
            Some((dir, rest)) => (dir, rest),
            None => (rel_slash.as_str(), ""),
        };

        let mut found: Option<(&RemotePackage, String)> = None;
        for (candidate, candidate_dir) in &self.remote_package_dirs {
            if candidate_dir != local_dir {
                continue;
            }
            let addr_str = candidate.to_string();
            let better = match &found {
                None => true,
                Some((_, best)) => (addr_str.len(), addr_str.as_str()) < (best.len(), best.as_str()),
            };
            if better {
                found = Some((candidate, addr_str));
            }
        }

        match found {
            Some((pkg_addr, _)) => Ok(FinalSource::Remote(pkg_addr.source_addr(sub_path))),
            None => Err(BundleError::PathNotInBundle { path: abs }),
        }
    }

    /// A checksum of the bundle contents, usable to decide whether another
    /// bundle is equivalent: same packages, identical content.
    ///
    /// The result carries an `h1:` prefix naming the checksum scheme. The
    /// manifest hash is sufficient because every package directory is
    /// itself named by a hash of its content.
    pub fn checksum_v1(&self) -> String {
        format!("h1:{}", self.manifest_checksum)
    }

    /// All remote source packages in the bundle, in a consistent order.
    pub fn remote_packages(&self) -> Vec<RemotePackage> {
        let mut ret: Vec<RemotePackage> = self.remote_package_dirs.keys().cloned().collect();
        ret.sort_by_key(|pkg| pkg.to_string());
        ret
    }

    /// The stored metadata for the given package, if any was recorded.
    pub fn remote_package_meta(&self, pkg_addr: &RemotePackage) -> Option<&PackageMeta> {
        self.remote_package_meta.get(pkg_addr)
    }

    /// All registry packages that contributed to the bundle, in a
    /// consistent order.
    pub fn registry_packages(&self) -> Vec<RegistryPackageAddr> {
        let mut ret: Vec<RegistryPackageAddr> =
            self.registry_package_sources.keys().cloned().collect();
        ret.sort_by_key(|pkg| pkg.to_string());
        ret
    }

    /// The versions of the given registry package the bundle has content
    /// for, sorted with lower-precedence versions first.
    ///
    /// This can substitute for a registry versions request whenever the
    /// caller only wants what is bundled.
    pub fn registry_package_versions(&self, pkg_addr: &RegistryPackageAddr) -> Vec<Version> {
        match self.registry_package_sources.get(pkg_addr) {
            Some(versions) => versions.keys().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// The remote source address the given registry package version
    /// resolved to, or `None` if that version is not in the bundle.
    pub fn registry_package_source_addr(
        &self,
        pkg_addr: &RegistryPackageAddr,
        version: &Version,
    ) -> Option<&RemoteSource> {
        self.registry_package_sources.get(pkg_addr)?.get(version)
    }

    /// Writes the whole bundle as a slug archive: a gzip-compressed tar
    /// stream that extracts into an equivalent bundle directory.
    pub fn write_archive<W: Write>(&self, w: W) -> Result<(), BundleError> {
        // A bundle archive is just a slug over the bundle directory, with
        // symlinks dereferenced so the result is self-contained.
        Packer::new()
            .dereference_symlinks(true)
            .pack(&self.root_dir, w)?;
        Ok(())
    }

    /// Reads a bundle archive from `r`, extracts it into `target_dir`
    /// (which must exist and be empty), and opens the result.
    pub fn extract_archive<R: Read>(r: R, target_dir: &Path) -> Result<Bundle, BundleError> {
        crate::slug::unpack(r, target_dir)?;
        Bundle::open_dir(target_dir)
    }
}

fn valid_local_dir_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains(':')
}

fn parse_registry_package_addr(given: &str) -> Result<RegistryPackageAddr, BundleError> {
    if let Ok(pkg) = RegistrySource::parse_package(given) {
        return Ok(RegistryPackageAddr::Module(pkg));
    }
    ComponentSource::parse_package(given)
        .map(RegistryPackageAddr::Component)
        .map_err(|e| BundleError::ManifestAddress {
            given: given.to_string(),
            source: e,
        })
}
