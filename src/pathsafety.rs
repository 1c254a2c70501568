//! Path containment and bounded-copy primitives
//!
//! These helpers are the shared foundation of the zip-slip defenses in
//! [`crate::slug`] and [`crate::sourcebundle`]: purely lexical containment
//! checks (no filesystem access) and a chunked copy that bounds the cost of
//! a single archive entry.

use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use crate::error::PathError;

/// Size of a single copy chunk used by [`copy_with_limit`].
pub const COPY_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// Maximum number of chunks [`copy_with_limit`] will transfer before
/// failing, bounding one entry at 400 MiB.
pub const COPY_MAX_CHUNKS: u64 = 100;

/// Reports whether `target` stays at or below `root` when both are
/// interpreted lexically.
///
/// Both paths are cleaned (`.` removed, `..` resolved within the path)
/// before comparing, and containment is decided component-by-component, so
/// sibling directories sharing a string prefix (`/tmp/root` vs
/// `/tmp/root-other`) are not confused. Empty inputs are never contained.
pub fn target_within_root(root: &Path, target: &Path) -> bool {
    if root.as_os_str().is_empty() || target.as_os_str().is_empty() {
        return false;
    }

    let root = lexical_clean(root);
    let target = lexical_clean(target);

    // Relativizing target against root must not require any upward steps.
    let mut root_parts = root.components();
    let mut target_parts = target.components();
    loop {
        match (root_parts.next(), target_parts.next()) {
            (None, _) => return true,
            (Some(r), Some(t)) if r == t => continue,
            _ => return false,
        }
    }
}

/// Cleans a path lexically: drops `.` components and resolves `..` against
/// preceding components where possible. Never touches the filesystem.
pub fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_normal =
                    matches!(out.components().next_back(), Some(Component::Normal(_)));
                let rooted = matches!(
                    out.components().next(),
                    Some(Component::RootDir | Component::Prefix(_))
                );
                if last_is_normal {
                    out.pop();
                } else if !rooted {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Cleans a slash-separated virtual path, in the same way URLs and archive
/// entry names are cleaned: `.` segments removed, `..` resolved where a
/// preceding segment exists, repeated slashes collapsed. Returns `"."` for
/// an effectively empty relative path.
pub fn clean_slash_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut out: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if matches!(out.last(), Some(&last) if last != "..") {
                    out.pop();
                } else if !rooted {
                    out.push("..");
                }
            }
            seg => out.push(seg),
        }
    }

    let joined = out.join("/");
    match (rooted, joined.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Copies `src` into `dst` in fixed-size chunks, failing with
/// [`PathError::CopyLimitExceeded`] once [`COPY_MAX_CHUNKS`] chunks have
/// been transferred. Returns the number of bytes copied.
pub fn copy_with_limit<R: Read, W: Write + ?Sized>(
    dst: &mut W,
    src: &mut R,
) -> Result<u64, PathError> {
    let mut total = 0u64;
    for _ in 0..COPY_MAX_CHUNKS {
        let mut chunk = src.by_ref().take(COPY_CHUNK_SIZE);
        let n = std::io::copy(&mut chunk, dst)?;
        total += n;
        if n < COPY_CHUNK_SIZE {
            return Ok(total);
        }
    }
    Err(PathError::CopyLimitExceeded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_root_basic() {
        assert!(target_within_root(
            Path::new("/opt/data"),
            Path::new("/opt/data/sub/file.txt")
        ));
        assert!(target_within_root(Path::new("/opt/data"), Path::new("/opt/data")));
    }

    #[test]
    fn test_within_root_traversal() {
        assert!(!target_within_root(
            Path::new("/opt/data"),
            Path::new("/opt/data/../other")
        ));
        assert!(!target_within_root(
            Path::new("/opt/data"),
            Path::new("/opt/data/sub/../../../etc/passwd")
        ));
    }

    #[test]
    fn test_within_root_string_prefix_is_not_enough() {
        assert!(!target_within_root(
            Path::new("/opt/data"),
            Path::new("/opt/data-other/file")
        ));
    }

    #[test]
    fn test_within_root_inner_dotdot_resolves() {
        assert!(target_within_root(
            Path::new("/opt/data"),
            Path::new("/opt/data/a/../b")
        ));
    }

    #[test]
    fn test_within_root_empty() {
        assert!(!target_within_root(Path::new(""), Path::new("/opt")));
        assert!(!target_within_root(Path::new("/opt"), Path::new("")));
    }

    #[test]
    fn test_within_root_relative() {
        assert!(target_within_root(Path::new("data"), Path::new("data/sub")));
        assert!(!target_within_root(Path::new("data"), Path::new("other/sub")));
    }

    #[test]
    fn test_lexical_clean() {
        assert_eq!(lexical_clean(Path::new("/a/b/../c")), PathBuf::from("/a/c"));
        assert_eq!(lexical_clean(Path::new("/a/../../b")), PathBuf::from("/b"));
        assert_eq!(lexical_clean(Path::new("a/./b")), PathBuf::from("a/b"));
        assert_eq!(lexical_clean(Path::new("../a")), PathBuf::from("../a"));
        assert_eq!(lexical_clean(Path::new("a/..")), PathBuf::from("."));
    }

    #[test]
    fn test_clean_slash_path() {
        assert_eq!(clean_slash_path("a/b/../c"), "a/c");
        assert_eq!(clean_slash_path("./a//b/"), "a/b");
        assert_eq!(clean_slash_path("../x"), "../x");
        assert_eq!(clean_slash_path("a/../../x"), "../x");
        assert_eq!(clean_slash_path(""), ".");
        assert_eq!(clean_slash_path("/a/../../b"), "/b");
    }

    #[test]
    fn test_copy_under_limit() {
        let data = vec![7u8; 1024];
        let mut out = Vec::new();
        let n = copy_with_limit(&mut out, &mut &data[..]).unwrap();
        assert_eq!(n, 1024);
        assert_eq!(out, data);
    }

    #[test]
    fn test_copy_limit_exceeded() {
        let mut src = std::io::repeat(1).take(COPY_CHUNK_SIZE * COPY_MAX_CHUNKS + 1);
        let mut out = std::io::sink();
        let err = copy_with_limit(&mut out, &mut src).unwrap_err();
        assert!(matches!(err, PathError::CopyLimitExceeded));
    }
}
