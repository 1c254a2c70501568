//! Error types for sourcepack
//!
//! Uses `thiserror` for error definitions and `miette` for pretty
//! diagnostics. One enum per error domain so callers can tell address
//! errors, illegal-archive errors, and bundle errors apart at the boundary:
//!
//! - [`SourceError`]: source address parsing and resolution
//! - [`IllegalSlugError`]: archives that violate a safety rule
//! - [`SlugError`]: everything else that can go wrong packing or unpacking
//! - [`IgnoreError`]: invalid `.terraformignore` rules
//! - [`PathError`]: path containment and limited-copy primitives
//! - [`BundleError`]: source bundle building and reading

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors from parsing or combining source addresses
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("source address must not have leading or trailing spaces")]
    #[diagnostic(code(sourcepack::addr::whitespace))]
    LeadingTrailingWhitespace,

    #[error("a valid source address is required")]
    #[diagnostic(code(sourcepack::addr::empty))]
    EmptyAddress,

    #[error("relative path must be written in canonical form \"{canonical}\"")]
    #[diagnostic(code(sourcepack::addr::non_canonical_local))]
    NonCanonicalLocal { given: String, canonical: String },

    #[error(
        "must be a relative path using forward-slash separators between segments, like in a relative URL"
    )]
    #[diagnostic(code(sourcepack::addr::local_separators))]
    LocalPathSeparators,

    #[error("must start with either ./ or ../ to indicate a local path")]
    #[diagnostic(code(sourcepack::addr::local_prefix))]
    LocalPrefixRequired,

    #[error("invalid sub-path: must be slash-separated relative path without any .. or . segments")]
    #[diagnostic(code(sourcepack::addr::sub_path))]
    InvalidSubPath,

    #[error("{what} address may not have a sub-path")]
    #[diagnostic(code(sourcepack::addr::sub_path_forbidden))]
    SubPathForbidden { what: &'static str },

    #[error("invalid URL syntax in \"{given}\": {reason}")]
    #[diagnostic(code(sourcepack::addr::url))]
    InvalidUrl { given: String, reason: String },

    #[error("must contain an absolute URL with a scheme")]
    #[diagnostic(code(sourcepack::addr::scheme_missing))]
    MissingScheme,

    #[error("must not use username or password in URL portion")]
    #[diagnostic(code(sourcepack::addr::userinfo))]
    UserInfoForbidden,

    #[error("don't specify redundant \"{source_type}\" source type for \"{scheme}\" URL")]
    #[diagnostic(code(sourcepack::addr::redundant_type))]
    SchemeTypeRedundant { source_type: String, scheme: String },

    #[error("unsupported URL scheme \"{scheme}\"")]
    #[diagnostic(code(sourcepack::addr::unsupported_scheme))]
    UnsupportedScheme { scheme: String },

    #[error("unsupported package source type \"{source_type}\"")]
    #[diagnostic(code(sourcepack::addr::unsupported_type))]
    UnsupportedSourceType { source_type: String },

    #[error("a Git repository URL's query string may include only one 'ref' argument")]
    #[diagnostic(code(sourcepack::addr::git_ref_duplicate))]
    GitRefDuplicate,

    #[error("a Git repository URL's query string may include only the argument 'ref'")]
    #[diagnostic(code(sourcepack::addr::git_ref_extra))]
    GitRefExtra,

    #[error("a Git repository URL must use either the https or ssh scheme")]
    #[diagnostic(code(sourcepack::addr::git_scheme))]
    GitSchemeInvalid,

    #[error("source package addresses may not use unencrypted HTTP")]
    #[diagnostic(
        code(sourcepack::addr::http_insecure),
        help("use an https:// URL instead")
    )]
    HttpInsecure,

    #[error("the special 'archive' query string argument must be set to 'tgz' if present")]
    #[diagnostic(code(sourcepack::addr::http_archive))]
    HttpBadArchive,

    #[error("a HTTPS URL's path must end with either .tar.gz or .tgz")]
    #[diagnostic(code(sourcepack::addr::http_not_archive))]
    HttpPathNotArchive,

    #[error("a HTTPS URL's query string must not include 'checksum' argument")]
    #[diagnostic(code(sourcepack::addr::http_checksum))]
    HttpChecksumForbidden,

    #[error("{host} shorthand addresses must start with {host}/organization/repository")]
    #[diagnostic(code(sourcepack::addr::shorthand))]
    ShorthandMalformed { host: &'static str },

    #[error("relative path {rel} traverses up too many levels from source path {base}")]
    #[diagnostic(code(sourcepack::addr::traversal))]
    TraverseAbovePackage { rel: String, base: String },

    #[error("invalid registry address \"{given}\": {problem}")]
    #[diagnostic(code(sourcepack::addr::registry))]
    InvalidRegistryAddress { given: String, problem: String },

    #[error("invalid version \"{given}\": {reason}")]
    #[diagnostic(code(sourcepack::addr::version))]
    InvalidVersion { given: String, reason: String },
}

/// An archive (being packed or unpacked) violates a rule about its contents,
/// for example an absolute or external symlink.
///
/// These indicate untrusted or hand-crafted input and are never retried.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum IllegalSlugError {
    #[error("invalid symlink (\"{link}\" -> \"{target}\") has external target")]
    #[diagnostic(
        code(sourcepack::slug::external_symlink),
        help("allow the target explicitly, or enable symlink dereferencing")
    )]
    ExternalSymlink { link: String, target: String },

    #[error("invalid filename \"{name}\", traversal with \"..\" outside of current directory")]
    #[diagnostic(code(sourcepack::slug::path_traversal))]
    PathTraversal { name: String },

    #[error("cannot extract \"{name}\" through symlink")]
    #[diagnostic(code(sourcepack::slug::through_symlink))]
    ThroughSymlink { name: String },

    #[error("archive entry has an empty name")]
    #[diagnostic(code(sourcepack::slug::empty_name))]
    EmptyName,

    #[error("absolute symlink target \"{target}\" is not allowed")]
    #[diagnostic(code(sourcepack::slug::absolute_symlink))]
    AbsoluteSymlinkForbidden { target: String },
}

/// Errors from packing or unpacking slug archives
#[derive(Error, Diagnostic, Debug)]
pub enum SlugError {
    #[error("illegal slug: {0}")]
    #[diagnostic(transparent)]
    Illegal(#[from] IllegalSlugError),

    #[error("unexpected file mode for \"{}\"", path.display())]
    #[diagnostic(code(sourcepack::slug::file_mode))]
    UnsupportedFileMode { path: PathBuf },

    #[error("failed creating \"{name}\": unsupported type flag {flag}")]
    #[diagnostic(code(sourcepack::slug::typeflag))]
    UnsupportedTypeflag { name: String, flag: u8 },

    #[error("failed to copy slug file \"{}\": {source}", path.display())]
    #[diagnostic(code(sourcepack::slug::copy))]
    Copy { path: PathBuf, source: PathError },

    #[error("{message}: {source}")]
    #[diagnostic(code(sourcepack::slug::io))]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

impl SlugError {
    /// Wraps an I/O error with a short description of the operation that
    /// failed.
    pub(crate) fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        SlugError::Io {
            message: message.into(),
            source,
        }
    }
}

/// Errors from `.terraformignore` rule handling
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum IgnoreError {
    #[error("invalid ignore rule patterns: {}", patterns.join(", "))]
    #[diagnostic(code(sourcepack::ignore::patterns))]
    InvalidPatterns { patterns: Vec<String> },
}

/// Errors from the path-safety primitives
#[derive(Error, Diagnostic, Debug)]
pub enum PathError {
    #[error("copy limit exceeded")]
    #[diagnostic(
        code(sourcepack::path::copy_limit),
        help("archive entries are limited to 400 MiB each")
    )]
    CopyLimitExceeded,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from building or reading source bundles
#[derive(Error, Diagnostic, Debug)]
pub enum BundleError {
    #[error("invalid target directory \"{}\": {reason}", path.display())]
    #[diagnostic(code(sourcepack::bundle::target_dir))]
    TargetDirInvalid { path: PathBuf, reason: String },

    #[error("failed to fetch package {package}: {reason}")]
    #[diagnostic(code(sourcepack::bundle::fetch))]
    Fetch { package: String, reason: String },

    #[error("failed to query available versions for {package}: {reason}")]
    #[diagnostic(code(sourcepack::bundle::registry_versions))]
    RegistryVersions { package: String, reason: String },

    #[error("failed to find real source address for {package} {version}: {reason}")]
    #[diagnostic(code(sourcepack::bundle::registry_source))]
    RegistrySourceAddr {
        package: String,
        version: semver::Version,
        reason: String,
    },

    #[error("no available version of {package} matches the specified version constraint")]
    #[diagnostic(code(sourcepack::bundle::no_version))]
    NoMatchingVersion { package: String },

    #[error("invalid .terraformignore file: {0}")]
    #[diagnostic(code(sourcepack::bundle::ignore_file))]
    InvalidIgnoreFile(#[from] IgnoreError),

    #[error("package path \"{path}\" is a symlink traversing out of the package root")]
    #[diagnostic(code(sourcepack::bundle::symlink_escape))]
    PackageSymlinkEscape { path: String },

    #[error("package path \"{path}\" is not a regular file or directory")]
    #[diagnostic(code(sourcepack::bundle::file_mode))]
    UnsupportedPackageFile { path: String },

    #[error("cannot read manifest: {reason}")]
    #[diagnostic(code(sourcepack::bundle::manifest_read))]
    ManifestRead { reason: String },

    #[error("invalid manifest: {reason}")]
    #[diagnostic(code(sourcepack::bundle::manifest_invalid))]
    ManifestInvalid { reason: String },

    #[error("invalid manifest: unsupported format version {version}")]
    #[diagnostic(code(sourcepack::bundle::manifest_version))]
    ManifestVersionUnsupported { version: u64 },

    #[error("invalid package directory name \"{name}\"")]
    #[diagnostic(code(sourcepack::bundle::local_dir))]
    InvalidLocalDirName { name: String },

    #[error("invalid address \"{given}\" in manifest: {source}")]
    #[diagnostic(code(sourcepack::bundle::manifest_address))]
    ManifestAddress {
        given: String,
        #[source]
        source: SourceError,
    },

    #[error("source bundle does not include {package}")]
    #[diagnostic(code(sourcepack::bundle::package_missing))]
    PackageNotInBundle { package: String },

    #[error("source bundle does not include {package} v{version}")]
    #[diagnostic(code(sourcepack::bundle::version_missing))]
    VersionNotInBundle {
        package: String,
        version: semver::Version,
    },

    #[error("path \"{}\" does not belong to the source bundle", path.display())]
    #[diagnostic(code(sourcepack::bundle::foreign_path))]
    PathNotInBundle { path: PathBuf },

    #[error("operation was cancelled")]
    #[diagnostic(code(sourcepack::bundle::cancelled))]
    Cancelled,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Slug(#[from] SlugError),

    #[error("{message}: {source}")]
    #[diagnostic(code(sourcepack::bundle::io))]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

impl BundleError {
    pub(crate) fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        BundleError::Io {
            message: message.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! test_error_contains {
        ($test_name:ident, $err:expr, $($contains:expr),+ $(,)?) => {
            #[test]
            fn $test_name() {
                let err = $err;
                let error_string = err.to_string();
                $(
                    assert!(error_string.contains($contains),
                        "Error message should contain '{}', got: {}",
                        $contains,
                        error_string
                    );
                )+
            }
        };
    }

    fn code_of(err: &impl Diagnostic) -> Option<String> {
        err.code().map(|c| c.to_string())
    }

    #[test]
    fn test_traverse_above_package_display() {
        let err = SourceError::TraverseAbovePackage {
            rel: "../../../baz".to_string(),
            base: "beep/boop".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "relative path ../../../baz traverses up too many levels from source path beep/boop"
        );
        assert_eq!(code_of(&err), Some("sourcepack::addr::traversal".to_string()));
    }

    #[test]
    fn test_non_canonical_local_display() {
        let err = SourceError::NonCanonicalLocal {
            given: "./boop/../beep".to_string(),
            canonical: "./beep".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "relative path must be written in canonical form \"./beep\""
        );
    }

    #[test]
    fn test_scheme_type_redundant_display() {
        let err = SourceError::SchemeTypeRedundant {
            source_type: "git".to_string(),
            scheme: "git".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "don't specify redundant \"git\" source type for \"git\" URL"
        );
    }

    test_error_contains!(
        test_whitespace_error,
        SourceError::LeadingTrailingWhitespace,
        "leading or trailing spaces"
    );

    test_error_contains!(
        test_empty_address_error,
        SourceError::EmptyAddress,
        "a valid source address is required"
    );

    test_error_contains!(
        test_git_ref_extra_error,
        SourceError::GitRefExtra,
        "only the argument 'ref'"
    );

    test_error_contains!(
        test_http_insecure_error,
        SourceError::HttpInsecure,
        "unencrypted HTTP"
    );

    test_error_contains!(
        test_invalid_sub_path_error,
        SourceError::InvalidSubPath,
        "must be slash-separated relative path without any .. or . segments"
    );

    #[test]
    fn test_external_symlink_display() {
        let err = IllegalSlugError::ExternalSymlink {
            link: "sub/sym".to_string(),
            target: "/outside/foo/bar".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid symlink (\"sub/sym\" -> \"/outside/foo/bar\") has external target"
        );
        assert_eq!(
            code_of(&err),
            Some("sourcepack::slug::external_symlink".to_string())
        );
    }

    #[test]
    fn test_through_symlink_display() {
        let err = IllegalSlugError::ThroughSymlink {
            name: "subdir/parent/escape".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cannot extract \"subdir/parent/escape\" through symlink"
        );
    }

    test_error_contains!(
        test_path_traversal_error,
        IllegalSlugError::PathTraversal {
            name: "../escape.txt".to_string(),
        },
        "../escape.txt",
        "traversal with \"..\" outside of current directory",
    );

    test_error_contains!(
        test_absolute_symlink_error,
        IllegalSlugError::AbsoluteSymlinkForbidden {
            target: "/etc/passwd".to_string(),
        },
        "absolute symlink target \"/etc/passwd\"",
    );

    #[test]
    fn test_illegal_slug_conversion() {
        let err: SlugError = IllegalSlugError::EmptyName.into();
        assert!(matches!(err, SlugError::Illegal(IllegalSlugError::EmptyName)));
        assert_eq!(err.to_string(), "illegal slug: archive entry has an empty name");
        // The diagnostic is forwarded transparently to the inner error.
        assert_eq!(code_of(&err), Some("sourcepack::slug::empty_name".to_string()));
    }

    #[test]
    fn test_unsupported_file_mode_display() {
        let err = SlugError::UnsupportedFileMode {
            path: PathBuf::from("/pkg/weird.sock"),
        };
        assert_eq!(err.to_string(), "unexpected file mode for \"/pkg/weird.sock\"");
    }

    test_error_contains!(
        test_unsupported_typeflag_error,
        SlugError::UnsupportedTypeflag {
            name: "queue".to_string(),
            flag: b'6',
        },
        "failed creating \"queue\"",
        "unsupported type flag",
    );

    #[test]
    fn test_ignore_error_lists_patterns() {
        let err = IgnoreError::InvalidPatterns {
            patterns: vec!["broken[".to_string(), "also[".to_string()],
        };
        assert_eq!(err.to_string(), "invalid ignore rule patterns: broken[, also[");
    }

    #[test]
    fn test_copy_limit_display() {
        let err = PathError::CopyLimitExceeded;
        assert_eq!(err.to_string(), "copy limit exceeded");
        assert_eq!(code_of(&err), Some("sourcepack::path::copy_limit".to_string()));
    }

    #[test]
    fn test_path_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PathError = io_err.into();
        assert!(matches!(err, PathError::Io(_)));
        assert_eq!(err.to_string(), "file not found");
    }

    #[test]
    fn test_target_dir_invalid_display() {
        let err = BundleError::TargetDirInvalid {
            path: PathBuf::from("/bundle"),
            reason: "directory is not empty".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid target directory \"/bundle\": directory is not empty"
        );
    }

    #[test]
    fn test_version_not_in_bundle_display() {
        let err = BundleError::VersionNotInBundle {
            package: "example.com/foo/bar/baz".to_string(),
            version: semver::Version::new(1, 2, 3),
        };
        assert_eq!(
            err.to_string(),
            "source bundle does not include example.com/foo/bar/baz v1.2.3"
        );
        assert_eq!(
            code_of(&err),
            Some("sourcepack::bundle::version_missing".to_string())
        );
    }

    test_error_contains!(
        test_fetch_error,
        BundleError::Fetch {
            package: "https://example.com/foo.tgz".to_string(),
            reason: "connection refused".to_string(),
        },
        "failed to fetch package https://example.com/foo.tgz",
        "connection refused",
    );

    test_error_contains!(
        test_no_matching_version_error,
        BundleError::NoMatchingVersion {
            package: "example.com/foo/bar/baz".to_string(),
        },
        "no available version of example.com/foo/bar/baz",
    );

    test_error_contains!(
        test_manifest_version_error,
        BundleError::ManifestVersionUnsupported { version: 2 },
        "unsupported format version 2",
    );

    #[test]
    fn test_bundle_error_wraps_slug_error() {
        let err: BundleError = SlugError::from(IllegalSlugError::EmptyName).into();
        assert!(matches!(err, BundleError::Slug(_)));
        assert_eq!(err.to_string(), "illegal slug: archive entry has an empty name");
    }

    #[test]
    fn test_bundle_error_wraps_ignore_error() {
        let err: BundleError = IgnoreError::InvalidPatterns {
            patterns: vec!["broken[".to_string()],
        }
        .into();
        assert_eq!(
            err.to_string(),
            "invalid .terraformignore file: invalid ignore rule patterns: broken["
        );
    }
}
