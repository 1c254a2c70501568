//! Component registry source addresses.
//!
//! Components follow the same patterns and restrictions as module registry
//! sources, with a two-part package address (`[host/]namespace/name`) and
//! no target system.

use std::fmt;

use semver::Version;

use super::registry::{parse_registry_host, validate_name_part, DEFAULT_REGISTRY_HOST};
use super::remote::RemoteSource;
use super::subpath::{normalize_subpath, split_subpath};
use crate::error::SourceError;

/// The address of a component registry package: `[host/]namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentPackage {
    host: String,
    namespace: String,
    name: String,
}

impl ComponentPackage {
    /// Parses a bare component package address, with no sub-path portion.
    pub fn parse(given: &str) -> Result<Self, SourceError> {
        let parts: Vec<&str> = given.split('/').collect();
        let (host, name_parts) = match parts.len() {
            2 => (DEFAULT_REGISTRY_HOST.to_string(), &parts[..]),
            3 => (parse_registry_host(given, parts[0])?, &parts[1..]),
            _ => {
                return Err(SourceError::InvalidRegistryAddress {
                    given: given.to_string(),
                    problem:
                        "a component registry address must have either two or three slash-separated components"
                            .to_string(),
                })
            }
        };
        for part in name_parts {
            validate_name_part(given, part)?;
        }
        Ok(ComponentPackage {
            host,
            namespace: name_parts[0].to_string(),
            name: name_parts[1].to_string(),
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
}

impl fmt::Display for ComponentPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host != DEFAULT_REGISTRY_HOST {
            write!(f, "{}/", self.host)?;
        }
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A source address referring to a set of versions published in a component
/// registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentSource {
    pkg: ComponentPackage,
    sub_path: String,
}

impl ComponentSource {
    pub(crate) fn looks_like(given: &str) -> bool {
        let (pkg_raw, _) = split_subpath(given);
        ComponentPackage::parse(&pkg_raw).is_ok()
    }

    /// Parses the given string as a component source address, splitting out
    /// any sub-path and normalizing it.
    pub fn parse(given: &str) -> Result<Self, SourceError> {
        let (pkg_raw, sub_path_raw) = split_subpath(given);
        let sub_path = normalize_subpath(&sub_path_raw)?;
        let pkg = ComponentPackage::parse(&pkg_raw)?;
        Ok(ComponentSource { pkg, sub_path })
    }

    /// Parses a component package address, rejecting any sub-path portion.
    pub fn parse_package(given: &str) -> Result<ComponentPackage, SourceError> {
        let src = Self::parse(given)?;
        if !src.sub_path.is_empty() {
            return Err(SourceError::SubPathForbidden {
                what: "component package",
            });
        }
        Ok(src.pkg)
    }

    pub(crate) fn from_parts(pkg: ComponentPackage, sub_path: String) -> Self {
        ComponentSource { pkg, sub_path }
    }

    pub fn package(&self) -> &ComponentPackage {
        &self.pkg
    }

    pub fn sub_path(&self) -> &str {
        &self.sub_path
    }

    /// Combines the receiver with a selected version number to produce a
    /// final source address.
    pub fn versioned(&self, selected_version: Version) -> ComponentSourceFinal {
        ComponentSourceFinal {
            src: self.clone(),
            version: selected_version,
        }
    }

    /// See [`super::RegistrySource::final_source_addr`]; the combination
    /// rules are identical.
    pub fn final_source_addr(&self, real_source: &RemoteSource) -> RemoteSource {
        real_source.join_sub_path(&self.sub_path)
    }
}

impl fmt::Display for ComponentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sub_path.is_empty() {
            write!(f, "{}", self.pkg)
        } else {
            write!(f, "{}//{}", self.pkg, self.sub_path)
        }
    }
}

/// A [`ComponentSource`] annotated with a specific version selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentSourceFinal {
    src: ComponentSource,
    version: Version,
}

impl ComponentSourceFinal {
    pub(crate) fn looks_like(given: &str) -> bool {
        match super::split_final_version(given) {
            Some((addr, _)) => ComponentSource::looks_like(&addr),
            None => false,
        }
    }

    /// Parses the given string as a final component source address of the
    /// form `[host/]namespace/name@version[//sub/path]`.
    pub fn parse(given: &str) -> Result<Self, SourceError> {
        let (addr, ver) = super::split_final_version(given).unwrap_or_default();
        let version = Version::parse(&ver).map_err(|e| SourceError::InvalidVersion {
            given: ver.clone(),
            reason: e.to_string(),
        })?;
        let src = ComponentSource::parse(&addr)?;
        Ok(src.versioned(version))
    }

    /// The address of the component package that this final address is a
    /// version of.
    pub fn unversioned(&self) -> &ComponentSource {
        &self.src
    }

    pub fn package(&self) -> &ComponentPackage {
        self.src.package()
    }

    pub fn sub_path(&self) -> &str {
        self.src.sub_path()
    }

    pub fn selected_version(&self) -> &Version {
        &self.version
    }

    pub fn final_source_addr(&self, real_source: &RemoteSource) -> RemoteSource {
        self.src.final_source_addr(real_source)
    }
}

impl fmt::Display for ComponentSourceFinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.src.package(), self.version)?;
        if !self.src.sub_path().is_empty() {
            write!(f, "//{}", self.src.sub_path())?;
        }
        Ok(())
    }
}
