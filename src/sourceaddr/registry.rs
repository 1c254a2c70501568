//! Module registry source addresses.
//!
//! A registry source is an extra indirection over a set of
//! [`RemoteSource`](super::RemoteSource) addresses: the registry is asked
//! for the available versions of a package and then for the real remote
//! source address of the selected version.

use std::fmt;

use semver::Version;

use super::remote::RemoteSource;
use super::subpath::{normalize_subpath, split_subpath};
use crate::error::SourceError;

/// The registry host used when an address does not name one.
pub const DEFAULT_REGISTRY_HOST: &str = "registry.terraform.io";

/// Hosts that can never be registry hosts, because scheme-less addresses on
/// these hosts are reserved for the Git repository shorthands.
const DISALLOWED_REGISTRY_HOSTS: &[&str] = &["github.com", "bitbucket.org"];

/// The address of a module registry package: `[host/]namespace/name/target`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModulePackage {
    host: String,
    namespace: String,
    name: String,
    target_system: String,
}

impl ModulePackage {
    /// Parses a bare module package address, with no sub-path portion.
    pub fn parse(given: &str) -> Result<Self, SourceError> {
        let parts: Vec<&str> = given.split('/').collect();
        let (host, name_parts) = match parts.len() {
            3 => (DEFAULT_REGISTRY_HOST.to_string(), &parts[..]),
            4 => (parse_registry_host(given, parts[0])?, &parts[1..]),
            _ => {
                return Err(SourceError::InvalidRegistryAddress {
                    given: given.to_string(),
                    problem:
                        "a module registry address must have either three or four slash-separated components"
                            .to_string(),
                })
            }
        };
        for part in name_parts {
            validate_name_part(given, part)?;
        }
        Ok(ModulePackage {
            host,
            namespace: name_parts[0].to_string(),
            name: name_parts[1].to_string(),
            target_system: name_parts[2].to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_system(&self) -> &str {
        &self.target_system
    }
}

impl fmt::Display for ModulePackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host != DEFAULT_REGISTRY_HOST {
            write!(f, "{}/", self.host)?;
        }
        write!(f, "{}/{}/{}", self.namespace, self.name, self.target_system)
    }
}

/// A source address referring to a set of versions published in a module
/// registry, optionally with a sub-path under whatever package the registry
/// resolves the selected version to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrySource {
    pkg: ModulePackage,
    // Always in normalized form; empty means the package root.
    sub_path: String,
}

impl RegistrySource {
    pub(crate) fn looks_like(given: &str) -> bool {
        // Only the package portion decides the address kind; an invalid
        // sub-path still dispatches here so the error names the sub-path.
        let (pkg_raw, _) = split_subpath(given);
        ModulePackage::parse(&pkg_raw).is_ok()
    }

    /// Parses the given string as a registry source address.
    pub fn parse(given: &str) -> Result<Self, SourceError> {
        let (pkg_raw, sub_path_raw) = split_subpath(given);
        let sub_path = normalize_subpath(&sub_path_raw)?;
        let pkg = ModulePackage::parse(&pkg_raw)?;
        Ok(RegistrySource { pkg, sub_path })
    }

    /// Parses a registry package address: registry source syntax with no
    /// sub-path portion allowed.
    pub fn parse_package(given: &str) -> Result<ModulePackage, SourceError> {
        let src = Self::parse(given)?;
        if !src.sub_path.is_empty() {
            return Err(SourceError::SubPathForbidden {
                what: "registry package",
            });
        }
        Ok(src.pkg)
    }

    pub(crate) fn from_parts(pkg: ModulePackage, sub_path: String) -> Self {
        RegistrySource { pkg, sub_path }
    }

    pub fn package(&self) -> &ModulePackage {
        &self.pkg
    }

    /// The sub-path under the package root, or an empty string for the root
    /// itself.
    pub fn sub_path(&self) -> &str {
        &self.sub_path
    }

    /// Combines the receiver with a specific selected version number to
    /// produce a final source address.
    pub fn versioned(&self, selected_version: Version) -> RegistrySourceFinal {
        RegistrySourceFinal {
            src: self.clone(),
            version: selected_version,
        }
    }

    /// Takes the result of looking up the package portion of the receiver in
    /// a module registry and appends the receiver's sub-path to the returned
    /// sub-path, producing the fully-qualified remote source address.
    ///
    /// This relies on the registry protocol's assumption that the resolved
    /// remote source always refers to a directory.
    pub fn final_source_addr(&self, real_source: &RemoteSource) -> RemoteSource {
        real_source.join_sub_path(&self.sub_path)
    }
}

impl fmt::Display for RegistrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sub_path.is_empty() {
            write!(f, "{}", self.pkg)
        } else {
            write!(f, "{}//{}", self.pkg, self.sub_path)
        }
    }
}

/// A [`RegistrySource`] annotated with a specific version selection, thereby
/// sufficient to select a single real source package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrySourceFinal {
    src: RegistrySource,
    version: Version,
}

impl RegistrySourceFinal {
    pub(crate) fn looks_like(given: &str) -> bool {
        match super::split_final_version(given) {
            Some((addr, _)) => RegistrySource::looks_like(&addr),
            None => false,
        }
    }

    /// Parses the given string as a final registry source address of the
    /// form `[host/]namespace/name/target@version[//sub/path]`.
    pub fn parse(given: &str) -> Result<Self, SourceError> {
        let (addr, ver) = super::split_final_version(given).unwrap_or_default();
        let version = Version::parse(&ver).map_err(|e| SourceError::InvalidVersion {
            given: ver.clone(),
            reason: e.to_string(),
        })?;
        let src = RegistrySource::parse(&addr)?;
        Ok(src.versioned(version))
    }

    /// The address of the registry package that this final address is a
    /// version of.
    pub fn unversioned(&self) -> &RegistrySource {
        &self.src
    }

    pub fn package(&self) -> &ModulePackage {
        self.src.package()
    }

    pub fn sub_path(&self) -> &str {
        self.src.sub_path()
    }

    pub fn selected_version(&self) -> &Version {
        &self.version
    }

    /// See [`RegistrySource::final_source_addr`]; the version has no impact
    /// on how the paths combine.
    pub fn final_source_addr(&self, real_source: &RemoteSource) -> RemoteSource {
        self.src.final_source_addr(real_source)
    }
}

impl fmt::Display for RegistrySourceFinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.src.package(), self.version)?;
        if !self.src.sub_path().is_empty() {
            write!(f, "//{}", self.src.sub_path())?;
        }
        Ok(())
    }
}

/// Validates and normalizes the host portion of a registry address.
pub(crate) fn parse_registry_host(given: &str, host: &str) -> Result<String, SourceError> {
    let host = host.to_ascii_lowercase();
    if !host.contains('.') && !host.contains(':') {
        return Err(SourceError::InvalidRegistryAddress {
            given: given.to_string(),
            problem: format!("\"{host}\" is not a valid registry hostname"),
        });
    }
    if DISALLOWED_REGISTRY_HOSTS.contains(&host.as_str()) {
        return Err(SourceError::InvalidRegistryAddress {
            given: given.to_string(),
            problem: format!("can't use \"{host}\" as a registry host"),
        });
    }
    Ok(host)
}

/// Validates a namespace, name, or target-system segment: ASCII
/// alphanumeric with interior `-` or `_`, never dots.
pub(crate) fn validate_name_part(given: &str, part: &str) -> Result<(), SourceError> {
    let bytes = part.as_bytes();
    let interior_ok = bytes
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || *b == b'-' || *b == b'_');
    let ends_ok = !bytes.is_empty()
        && bytes[0].is_ascii_alphanumeric()
        && bytes[bytes.len() - 1].is_ascii_alphanumeric();
    if !interior_ok || !ends_ok {
        return Err(SourceError::InvalidRegistryAddress {
            given: given.to_string(),
            problem: format!("invalid address component \"{part}\""),
        });
    }
    Ok(())
}
