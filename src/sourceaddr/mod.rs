//! Source address algebra.
//!
//! This module defines the different kinds of source address that can
//! describe where source code comes from:
//!
//! - [`LocalSource`]: a relative path within the same package (`./x`, `../x`)
//! - [`RegistrySource`]: a module registry package plus optional sub-path
//! - [`ComponentSource`]: a component registry package plus optional sub-path
//! - [`RemoteSource`]: a fully-qualified package URL plus optional sub-path
//!
//! [`Source`] is the closed sum over those kinds for situations where any is
//! acceptable. [`FinalSource`] is the variant used once installation
//! decisions have been made: registry and component sources gain a selected
//! version number, making every final address sufficient to identify a
//! single package snapshot.

mod component;
mod local;
mod registry;
mod remote;
mod subpath;

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::SourceError;
use crate::pathsafety::clean_slash_path;

pub use component::{ComponentPackage, ComponentSource, ComponentSourceFinal};
pub use local::LocalSource;
pub use registry::{ModulePackage, RegistrySource, RegistrySourceFinal, DEFAULT_REGISTRY_HOST};
pub use remote::{RemotePackage, RemoteSource};
pub use subpath::valid_sub_path;

/// Any of the supported source address kinds, for situations where all are
/// acceptable.
///
/// Sources are used to specify addresses for installation. Once packages
/// have been resolved and installed, use [`FinalSource`] instead to
/// represent those finalized selections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    Local(LocalSource),
    Registry(RegistrySource),
    Component(ComponentSource),
    Remote(RemoteSource),
}

impl Source {
    /// Whether this address kind can meaningfully carry a version
    /// constraint: only registry and component sources select among
    /// published versions.
    pub fn supports_version_constraints(&self) -> bool {
        matches!(self, Source::Registry(_) | Source::Component(_))
    }

    fn is_abs(&self) -> bool {
        !matches!(self, Source::Local(_))
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Local(s) => s.fmt(f),
            Source::Registry(s) => s.fmt(f),
            Source::Component(s) => s.fmt(f),
            Source::Remote(s) => s.fmt(f),
        }
    }
}

impl From<LocalSource> for Source {
    fn from(s: LocalSource) -> Self {
        Source::Local(s)
    }
}

impl From<RegistrySource> for Source {
    fn from(s: RegistrySource) -> Self {
        Source::Registry(s)
    }
}

impl From<ComponentSource> for Source {
    fn from(s: ComponentSource) -> Self {
        Source::Component(s)
    }
}

impl From<RemoteSource> for Source {
    fn from(s: RemoteSource) -> Self {
        Source::Remote(s)
    }
}

/// A source address that identifies a single, immutable package snapshot.
///
/// Local and remote sources already do that on their own; registry and
/// component sources only become final once combined with a selected
/// version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FinalSource {
    Local(LocalSource),
    Registry(RegistrySourceFinal),
    Component(ComponentSourceFinal),
    Remote(RemoteSource),
}

impl FinalSource {
    fn is_abs(&self) -> bool {
        !matches!(self, FinalSource::Local(_))
    }
}

impl fmt::Display for FinalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalSource::Local(s) => s.fmt(f),
            FinalSource::Registry(s) => s.fmt(f),
            FinalSource::Component(s) => s.fmt(f),
            FinalSource::Remote(s) => s.fmt(f),
        }
    }
}

impl From<LocalSource> for FinalSource {
    fn from(s: LocalSource) -> Self {
        FinalSource::Local(s)
    }
}

impl From<RegistrySourceFinal> for FinalSource {
    fn from(s: RegistrySourceFinal) -> Self {
        FinalSource::Registry(s)
    }
}

impl From<ComponentSourceFinal> for FinalSource {
    fn from(s: ComponentSourceFinal) -> Self {
        FinalSource::Component(s)
    }
}

impl From<RemoteSource> for FinalSource {
    fn from(s: RemoteSource) -> Self {
        FinalSource::Remote(s)
    }
}

/// Attempts to parse the given string as any of the supported source address
/// kinds, recognizing which kind it belongs to from the syntax differences
/// between the address forms.
pub fn parse_source(given: &str) -> Result<Source, SourceError> {
    check_outer_shape(given)?;
    if LocalSource::looks_like(given) || given == "." || given == ".." {
        LocalSource::parse(given).map(Source::Local)
    } else if RegistrySource::looks_like(given) {
        RegistrySource::parse(given).map(Source::Registry)
    } else if ComponentSource::looks_like(given) {
        ComponentSource::parse(given).map(Source::Component)
    } else {
        // Neither local nor registry-shaped, so it's intended as a remote
        // source; the remote parser produces the appropriate error if it's
        // not a supported address at all.
        RemoteSource::parse(given).map(Source::Remote)
    }
}

/// Like [`parse_source`] but for [`FinalSource`] addresses, additionally
/// accepting the `package@version[//sub/path]` forms for registry and
/// component selections.
pub fn parse_final_source(given: &str) -> Result<FinalSource, SourceError> {
    check_outer_shape(given)?;
    if LocalSource::looks_like(given) || given == "." || given == ".." {
        LocalSource::parse(given).map(FinalSource::Local)
    } else if RegistrySourceFinal::looks_like(given) {
        RegistrySourceFinal::parse(given).map(FinalSource::Registry)
    } else if ComponentSourceFinal::looks_like(given) {
        ComponentSourceFinal::parse(given).map(FinalSource::Component)
    } else {
        RemoteSource::parse(given).map(FinalSource::Remote)
    }
}

fn check_outer_shape(given: &str) -> Result<(), SourceError> {
    if given.trim() != given {
        return Err(SourceError::LeadingTrailingWhitespace);
    }
    if given.is_empty() {
        return Err(SourceError::EmptyAddress);
    }
    Ok(())
}

/// Calculates a new source address from the combination of two others.
///
/// If `rel` is already an absolute source address then the result is `rel`
/// verbatim. If `rel` is a local source then the result is an address of the
/// same kind as `base` with a different path component.
///
/// Returns an error if `rel` is a relative path that attempts to traverse
/// out of the package of an absolute address given in `base`.
pub fn resolve_relative(base: &Source, rel: &Source) -> Result<Source, SourceError> {
    if rel.is_abs() {
        return Ok(rel.clone());
    }
    let Source::Local(rel) = rel else {
        unreachable!("non-absolute source is always local");
    };
    let rel_path = rel.relative_path();

    match base {
        Source::Local(base) => Ok(Source::Local(join_local(base, rel_path))),
        Source::Registry(base) => {
            let new_sub = subpath::join_subpath(base.sub_path(), rel_path)?;
            Ok(Source::Registry(RegistrySource::from_parts(
                base.package().clone(),
                new_sub,
            )))
        }
        Source::Component(base) => {
            let new_sub = subpath::join_subpath(base.sub_path(), rel_path)?;
            Ok(Source::Component(ComponentSource::from_parts(
                base.package().clone(),
                new_sub,
            )))
        }
        Source::Remote(base) => {
            let new_sub = subpath::join_subpath(base.sub_path(), rel_path)?;
            Ok(Source::Remote(base.with_sub_path(new_sub)))
        }
    }
}

/// Like [`resolve_relative`] but for [`FinalSource`] addresses. Registry and
/// component bases keep their selected version in the result.
pub fn resolve_relative_final(
    base: &FinalSource,
    rel: &FinalSource,
) -> Result<FinalSource, SourceError> {
    if rel.is_abs() {
        return Ok(rel.clone());
    }
    let FinalSource::Local(rel) = rel else {
        unreachable!("non-absolute source is always local");
    };
    let rel_path = rel.relative_path();

    match base {
        FinalSource::Local(base) => Ok(FinalSource::Local(join_local(base, rel_path))),
        FinalSource::Registry(base) => {
            let new_sub = subpath::join_subpath(base.sub_path(), rel_path)?;
            let src = RegistrySource::from_parts(base.package().clone(), new_sub);
            Ok(FinalSource::Registry(
                src.versioned(base.selected_version().clone()),
            ))
        }
        FinalSource::Component(base) => {
            let new_sub = subpath::join_subpath(base.sub_path(), rel_path)?;
            let src = ComponentSource::from_parts(base.package().clone(), new_sub);
            Ok(FinalSource::Component(
                src.versioned(base.selected_version().clone()),
            ))
        }
        FinalSource::Remote(base) => {
            let new_sub = subpath::join_subpath(base.sub_path(), rel_path)?;
            Ok(FinalSource::Remote(base.with_sub_path(new_sub)))
        }
    }
}

fn join_local(base: &LocalSource, rel_path: &str) -> LocalSource {
    let mut joined = clean_slash_path(&format!("{}/{}", base.relative_path(), rel_path));
    if joined == "." {
        joined = "./".to_string();
    } else if joined == ".." {
        joined = "../".to_string();
    }
    if !LocalSource::looks_like(&joined) {
        joined = format!("./{joined}");
    }
    LocalSource::from_joined(joined)
}

/// Returns the base name of the local path or sub-path portion of the given
/// address, for needs such as choosing a parser from a file's suffix.
///
/// This only makes real sense for addresses referring to an individual
/// file; a directory address does not fail but the result is unlikely to be
/// useful.
pub fn source_filename(addr: &Source) -> &str {
    match addr {
        Source::Local(s) => slash_base(s.relative_path()),
        Source::Registry(s) => slash_base(s.sub_path()),
        Source::Component(s) => slash_base(s.sub_path()),
        Source::Remote(s) => slash_base(s.sub_path()),
    }
}

/// [`source_filename`] for final source addresses.
pub fn final_source_filename(addr: &FinalSource) -> &str {
    match addr {
        FinalSource::Local(s) => slash_base(s.relative_path()),
        FinalSource::Registry(s) => slash_base(s.sub_path()),
        FinalSource::Component(s) => slash_base(s.sub_path()),
        FinalSource::Remote(s) => slash_base(s.sub_path()),
    }
}

/// The last segment of a slash-separated path, with trailing slashes
/// removed; `"."` for an empty path.
fn slash_base(path: &str) -> &str {
    if path.is_empty() {
        return ".";
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

// Recognizes the three components of a final registry or component source
// string: package address, version, and optional sub-path.
static FINAL_SOURCE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)@([^/]+)(//(.+))?$").expect("valid pattern"));

/// Splits `addr@version[//sub]` into the address (with any sub-path
/// re-attached) and the version string. Returns `None` when the string
/// doesn't have that shape at all.
fn split_final_version(given: &str) -> Option<(String, String)> {
    let caps = FINAL_SOURCE_PATTERN.captures(given)?;
    let mut addr = caps.get(1).expect("capture 1").as_str().to_string();
    if let Some(sub) = caps.get(4) {
        addr = format!("{addr}//{}", sub.as_str());
    }
    Some((addr, caps.get(2).expect("capture 2").as_str().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source_outer_shape() {
        assert_eq!(parse_source("").unwrap_err(), SourceError::EmptyAddress);
        assert_eq!(
            parse_source(" hello").unwrap_err(),
            SourceError::LeadingTrailingWhitespace
        );
        assert_eq!(
            parse_source("hello ").unwrap_err(),
            SourceError::LeadingTrailingWhitespace
        );
    }

    #[test]
    fn test_parse_source_dispatch() {
        assert!(matches!(parse_source("./boop").unwrap(), Source::Local(_)));
        assert!(matches!(
            parse_source("hashicorp/subnets/cidr").unwrap(),
            Source::Registry(_)
        ));
        assert!(matches!(
            parse_source("awesomecorp/happycloud").unwrap(),
            Source::Component(_)
        ));
        assert!(matches!(
            parse_source("git::https://github.com/org/repo.git").unwrap(),
            Source::Remote(_)
        ));
    }

    #[test]
    fn test_registry_shorthand_beats_gitlab_shorthand() {
        // gitlab.com also hosts a module registry, so the three-component
        // form is interpreted as a registry source.
        let src = parse_source("gitlab.com/hashicorp/go-slug/bleep").unwrap();
        let Source::Registry(reg) = src else {
            panic!("expected registry source, got {src:?}");
        };
        assert_eq!(reg.package().host(), "gitlab.com");
        assert_eq!(reg.package().namespace(), "hashicorp");
        assert_eq!(reg.package().name(), "go-slug");
        assert_eq!(reg.package().target_system(), "bleep");
    }

    #[test]
    fn test_explicit_git_overrides_registry_interpretation() {
        let src = parse_source("git::https://gitlab.com/hashicorp/go-slug//bleep").unwrap();
        let Source::Remote(remote) = src else {
            panic!("expected remote source, got {src:?}");
        };
        assert_eq!(remote.package().source_type(), "git");
        assert_eq!(
            remote.package().url().as_str(),
            "https://gitlab.com/hashicorp/go-slug"
        );
        assert_eq!(remote.sub_path(), "bleep");
    }

    #[test]
    fn test_gitlab_four_components_is_git() {
        let src = parse_source("gitlab.com/hashicorp/go-slug/bleep/bloop").unwrap();
        assert!(matches!(src, Source::Remote(_)));
    }

    #[test]
    fn test_github_is_never_a_registry() {
        let src = parse_source("github.com/hashicorp/go-slug/bleep").unwrap();
        let Source::Remote(remote) = src else {
            panic!("expected remote source, got {src:?}");
        };
        assert_eq!(remote.sub_path(), "bleep");
    }

    #[test]
    fn test_parse_final_source() {
        let fin = parse_final_source("host.example/ns/name/target@1.2.3//sub").unwrap();
        let FinalSource::Registry(reg) = &fin else {
            panic!("expected final registry source, got {fin:?}");
        };
        assert_eq!(reg.selected_version().to_string(), "1.2.3");
        assert_eq!(fin.to_string(), "host.example/ns/name/target@1.2.3//sub");

        assert!(matches!(
            parse_final_source("./local/path").unwrap(),
            FinalSource::Local(_)
        ));
        assert!(matches!(
            parse_final_source("https://example.com/foo.tgz").unwrap(),
            FinalSource::Remote(_)
        ));
    }

    #[test]
    fn test_round_trip_corpus() {
        let corpus = [
            "./a/b",
            "../c",
            "hashicorp/subnets/cidr",
            "hashicorp/subnets/cidr//sub/path",
            "host.example/ns/name/target",
            "git::https://github.com/org/repo.git//sub?ref=main",
            "https://example.com/pkg.tar.gz//sub?archive=tgz",
        ];
        for addr in corpus {
            assert_eq!(parse_source(addr).unwrap().to_string(), addr, "{addr}");
        }
    }

    #[test]
    fn test_resolve_relative_absolute_passthrough() {
        let base = parse_source("./a").unwrap();
        let rel = parse_source("git::https://github.com/org/repo.git").unwrap();
        assert_eq!(resolve_relative(&base, &rel).unwrap(), rel);
    }

    #[test]
    fn test_resolve_relative_local_base() {
        let base = parse_source("./a/b").unwrap();
        let rel = parse_source("../c").unwrap();
        let got = resolve_relative(&base, &rel).unwrap();
        assert_eq!(got.to_string(), "./a/c");
    }

    #[test]
    fn test_resolve_relative_remote_base() {
        let base = parse_source("git::https://github.com/hashicorp/go-slug.git//beep/boop").unwrap();
        let rel = parse_source("../bleep").unwrap();
        let got = resolve_relative(&base, &rel).unwrap();
        assert_eq!(
            got.to_string(),
            "git::https://github.com/hashicorp/go-slug.git//beep/bleep"
        );
    }

    #[test]
    fn test_resolve_relative_escape() {
        let base = parse_source("git::https://github.com/hashicorp/go-slug.git//beep/boop").unwrap();
        let rel = parse_source("../../../baz").unwrap();
        let err = resolve_relative(&base, &rel).unwrap_err();
        assert!(
            err.to_string()
                .contains("traverses up too many levels from source path beep/boop"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_resolve_relative_final_keeps_version() {
        let base = parse_final_source("hashicorp/subnets/cidr@1.0.0//sub").unwrap();
        let rel = parse_final_source("./deeper").unwrap();
        let got = resolve_relative_final(&base, &rel).unwrap();
        assert_eq!(got.to_string(), "hashicorp/subnets/cidr@1.0.0//sub/deeper");
    }

    #[test]
    fn test_source_filename() {
        let addr = parse_source("./modules/main.tf").unwrap();
        assert_eq!(source_filename(&addr), "main.tf");
        let addr = parse_source("hashicorp/subnets/cidr//test/simple.tf").unwrap();
        assert_eq!(source_filename(&addr), "simple.tf");
    }
}
