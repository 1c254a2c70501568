//! Local (relative) source addresses.

use std::fmt;

use crate::error::SourceError;
use crate::pathsafety::clean_slash_path;

/// A relative traversal to another path within the same source package as
/// whatever artifact referred to it.
///
/// Local sources typically need to be resolved into a
/// [`RemoteSource`](super::RemoteSource) or
/// [`RegistrySource`](super::RegistrySource) by reference to the address of
/// the artifact that declared them, because on their own they cannot be
/// mapped onto any real source location. See
/// [`resolve_relative`](super::resolve_relative).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalSource {
    // A slash-separated path in cleaned form, aside from the mandatory
    // "./" or "../" prefix.
    rel_path: String,
}

impl LocalSource {
    /// Returns true if the string uses one of the relative-path prefixes
    /// that distinguish local addresses from the other address kinds.
    pub(crate) fn looks_like(given: &str) -> bool {
        given.starts_with("./") || given.starts_with("../")
    }

    /// Parses the given string as a local source address.
    ///
    /// The address must be written in canonical form: cleaned, slash
    /// separated, and carrying a `./` or `../` prefix. Anything else is an
    /// error that names the canonical spelling to use.
    pub fn parse(given: &str) -> Result<Self, SourceError> {
        // Catch attempts to use a real filesystem path instead of a virtual
        // relative path within a source package.
        if given.contains(':') || given.contains('\\') {
            return Err(SourceError::LocalPathSeparators);
        }

        if !Self::looks_like(given) && given != "." && given != ".." {
            return Err(SourceError::LocalPrefixRequired);
        }

        let mut clean = clean_slash_path(given);

        // Cleaning strips the prefix we use to recognize local addresses,
        // so put it back; bare "." and ".." keep a trailing slash instead.
        if clean == ".." {
            clean = "../".to_string();
        } else if clean == "." {
            clean = "./".to_string();
        }
        if !Self::looks_like(&clean) {
            clean = format!("./{clean}");
        }

        if clean != given {
            return Err(SourceError::NonCanonicalLocal {
                given: given.to_string(),
                canonical: clean,
            });
        }

        Ok(LocalSource { rel_path: clean })
    }

    /// Interprets a normalized sub-path as a local source address relative
    /// to the root of the package the sub-path was presented against.
    pub(crate) fn from_sub_path(sub_path: &str) -> Self {
        // Sub-paths are a subset of local addresses except that downward
        // traversals must start with "./" to disambiguate.
        LocalSource {
            rel_path: format!("./{sub_path}"),
        }
    }

    pub(crate) fn from_joined(rel_path: String) -> Self {
        LocalSource { rel_path }
    }

    /// The effective relative path of this address, in slash-separated
    /// canonical syntax.
    pub fn relative_path(&self) -> &str {
        &self.rel_path
    }
}

impl fmt::Display for LocalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rel_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical() {
        assert_eq!(LocalSource::parse("./boop").unwrap().relative_path(), "./boop");
        assert_eq!(LocalSource::parse("../boop").unwrap().relative_path(), "../boop");
        assert_eq!(LocalSource::parse("./").unwrap().relative_path(), "./");
        assert_eq!(LocalSource::parse("../").unwrap().relative_path(), "../");
    }

    #[test]
    fn test_parse_non_canonical() {
        let err = LocalSource::parse("./boop/../beep").unwrap_err();
        assert_eq!(
            err,
            SourceError::NonCanonicalLocal {
                given: "./boop/../beep".to_string(),
                canonical: "./beep".to_string(),
            }
        );
        let err = LocalSource::parse(".").unwrap_err();
        assert!(matches!(err, SourceError::NonCanonicalLocal { canonical, .. } if canonical == "./"));
        let err = LocalSource::parse("..").unwrap_err();
        assert!(matches!(err, SourceError::NonCanonicalLocal { canonical, .. } if canonical == "../"));
    }

    #[test]
    fn test_parse_rejects_filesystem_paths() {
        assert_eq!(
            LocalSource::parse("C:\\boop").unwrap_err(),
            SourceError::LocalPathSeparators
        );
        assert_eq!(
            LocalSource::parse(".\\boop"),
            Err(SourceError::LocalPathSeparators)
        );
    }

    #[test]
    fn test_parse_requires_prefix() {
        assert_eq!(
            LocalSource::parse("boop").unwrap_err(),
            SourceError::LocalPrefixRequired
        );
    }

    #[test]
    fn test_display_round_trip() {
        for addr in ["./boop", "../boop/beep", "../", "./"] {
            assert_eq!(LocalSource::parse(addr).unwrap().to_string(), addr);
        }
    }
}
