//! Sub-path handling shared by the registry, component, and remote address
//! kinds.
//!
//! A sub-path is a slash-separated sequence of path segments without a
//! leading or trailing slash and without any `.` or `..` segments, since a
//! sub-path can only traverse downwards from the root of a package. The
//! empty string represents the package root.

use crate::error::SourceError;
use crate::pathsafety::clean_slash_path;

/// Returns true if the given string is a valid sub-path as could be
/// included in a remote or registry source address. The empty string is
/// valid and means the package root.
pub fn valid_sub_path(s: &str) -> bool {
    normalize_subpath(s).is_ok()
}

/// Interprets the given string as a package sub-path, returning its
/// normalized form or an error if it does not use correct syntax.
pub(crate) fn normalize_subpath(given: &str) -> Result<String, SourceError> {
    if given.is_empty() {
        // The absence of a sub-path represents the root directory of
        // a package.
        return Ok(String::new());
    }

    // Sub-paths use the same shape as entries in a virtual filesystem:
    // downward-only, no "." or ".." or empty segments. "." is tolerated
    // by the shape check but rejected below because we represent the
    // package root by omitting the sub-path entirely.
    if !valid_slash_rel_path(given) {
        return Err(SourceError::InvalidSubPath);
    }

    let clean = clean_slash_path(given);
    if clean == "." {
        return Err(SourceError::InvalidSubPath);
    }

    Ok(clean)
}

/// Shape check for slash-separated relative paths: no empty, `.`, or `..`
/// segments. The string `"."` alone passes, mirroring virtual-filesystem
/// path validity.
pub(crate) fn valid_slash_rel_path(p: &str) -> bool {
    if p == "." {
        return true;
    }
    !p.is_empty() && !p.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
}

/// Splits a source address into its package portion and sub-path portion at
/// the first `//` that is neither part of a `scheme://` prefix nor inside
/// the query string.
///
/// If the raw sub-path carried a query string, the query is moved back onto
/// the package portion, preserving URL semantics for the
/// `package//subpath?query` idiom:
///
/// ```text
/// dom.com/path/?q=p               => ("dom.com/path/?q=p", "")
/// proto://dom.com/path//a?q=p     => ("proto://dom.com/path?q=p", "a")
/// ```
///
/// The returned sub-path is not validated or normalized; pass it to
/// [`normalize_subpath`].
pub(crate) fn split_subpath(src: &str) -> (String, String) {
    let stop = src.find('?').unwrap_or(src.len());

    // Skip over the scheme separator so we don't mistake it for a sub-path
    // marker.
    let offset = match src[..stop].find("://") {
        Some(idx) => idx + 3,
        None => 0,
    };

    let Some(idx) = src[offset..stop].find("//") else {
        return (src.to_string(), String::new());
    };
    let idx = idx + offset;

    let mut pkg = src[..idx].to_string();
    let mut subdir = src[idx + 2..].to_string();

    if let Some(q) = subdir.find('?') {
        pkg.push_str(&subdir[q..]);
        subdir.truncate(q);
    }

    (pkg, subdir)
}

/// Joins a relative path onto an existing sub-path, failing if the result
/// would traverse above the package root.
pub(crate) fn join_subpath(sub_path: &str, rel: &str) -> Result<String, SourceError> {
    let joined = if sub_path.is_empty() {
        clean_slash_path(rel)
    } else {
        clean_slash_path(&format!("{sub_path}/{rel}"))
    };
    if joined == "." {
        return Ok(String::new()); // the root of the package
    }
    // If sub_path was valid (no "." or ".." segments) then such segments in
    // the result mean rel traversed up past the package root.
    if !valid_slash_rel_path(&joined) {
        return Err(SourceError::TraverseAbovePackage {
            rel: rel.to_string(),
            base: sub_path.to_string(),
        });
    }
    Ok(joined)
}
