//! Compilation of individual ignore patterns into matchers.

use regex::Regex;

/// A single ignore rule: a glob pattern, whether it re-includes rather than
/// excludes, and its compiled matcher.
#[derive(Debug)]
pub(crate) struct Rule {
    pub(crate) pattern: String,
    /// A `!`-prefixed rule re-includes paths that an earlier rule excluded.
    pub(crate) negated: bool,
    /// A `/`-prefixed rule only matches relative to the package root, never
    /// by basename.
    pub(crate) anchored: bool,
    /// True when no later rule in the set is a negation, so a positive
    /// match here can never be flipped back.
    pub(crate) dominating: bool,
    /// None when the pattern failed to compile; such rules never match but
    /// are reported through the ruleset's invalid-pattern list.
    matcher: Option<Regex>,
}

impl Rule {
    pub(crate) fn new(pattern: String, negated: bool) -> Rule {
        let anchored = pattern.starts_with('/');
        let matcher = compile_pattern(&pattern).ok();
        Rule {
            pattern,
            negated,
            anchored,
            dominating: false,
            matcher,
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.matcher.is_some()
    }

    /// Decides whether this rule applies to the given slash-separated
    /// relative path.
    ///
    /// A rule matches if the whole path matches, if the path's basename
    /// matches (for unanchored patterns without a separator), or if any
    /// parent prefix of the path matches with its trailing separator, so
    /// that a rule for a directory covers everything below it.
    pub(crate) fn matches(&self, path: &str) -> bool {
        let Some(matcher) = &self.matcher else {
            return false;
        };

        if matcher.is_match(path) {
            return true;
        }

        if !self.anchored && !self.pattern.contains('/') {
            let base = path.trim_end_matches('/').rsplit('/').next().unwrap_or(path);
            if matcher.is_match(base) {
                return true;
            }
        }

        // Try each parent directory prefix with its trailing separator.
        let mut end = 0;
        for (idx, ch) in path.char_indices() {
            if ch == '/' && idx + 1 < path.len() {
                end = idx + 1;
                if matcher.is_match(&path[..end]) {
                    return true;
                }
            }
        }

        false
    }
}

/// Compiles one ignore pattern into an anchored regex over slash-separated
/// paths:
///
/// - `**` matches any number of path segments including zero; a following
///   separator is consumed, and a trailing `**` matches everything left
/// - `*` matches any run of non-separator characters
/// - `?` matches one non-separator character
/// - `[class]` matches as in glob, with `!` accepted for negation
/// - `\x` escapes `x`
///
/// Everything else, `.` and `$` included, is matched literally. A leading
/// `/` only anchors the rule and is not part of the matcher.
fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let body = pattern.strip_prefix('/').unwrap_or(pattern);
    let chars: Vec<char> = body.chars().collect();
    let mut re = String::with_capacity(body.len() + 8);
    re.push('^');

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    if chars.get(i + 2) == Some(&'/') {
                        // Zero or more whole segments.
                        re.push_str("(?:[^/]*/)*");
                        i += 3;
                    } else {
                        re.push_str(".*");
                        i += 2;
                    }
                } else {
                    re.push_str("[^/]*");
                    i += 1;
                }
            }
            '?' => {
                re.push_str("[^/]");
                i += 1;
            }
            '[' => match chars[i + 1..].iter().position(|&c| c == ']') {
                Some(off) if off > 0 => {
                    re.push('[');
                    let mut inner = &chars[i + 1..i + 1 + off];
                    if inner.first() == Some(&'!') {
                        re.push('^');
                        inner = &inner[1..];
                    }
                    re.extend(inner.iter());
                    re.push(']');
                    i += off + 2;
                }
                _ => {
                    // Empty or unterminated class; let the regex compiler
                    // report the invalid pattern.
                    re.push('[');
                    i += 1;
                }
            },
            '\\' => {
                if let Some(&next) = chars.get(i + 1) {
                    re.push_str(&regex::escape(&next.to_string()));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            '/' => {
                re.push('/');
                i += 1;
            }
            other => {
                re.push_str(&regex::escape(&other.to_string()));
                i += 1;
            }
        }
    }

    re.push('$');
    Regex::new(&re)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str) -> Rule {
        Rule::new(pattern.to_string(), false)
    }

    #[test]
    fn test_whole_path() {
        assert!(rule("foo/*.md").matches("foo/doc.md"));
        assert!(!rule("foo/*.md").matches("foo/sub/doc.md"));
        assert!(!rule("foo/*.md").matches("other/foo/doc.md"));
    }

    #[test]
    fn test_basename() {
        assert!(rule("baz.txt").matches("parent/foo/baz.txt"));
        assert!(!rule("baz.txt").matches("something/with-baz.txt"));
        assert!(!rule("baz.txt").matches("something/baz.x"));
    }

    #[test]
    fn test_directory_prefix() {
        assert!(rule("parent/").matches("parent/foo/bar.tf"));
        assert!(rule("parent/").matches("parent/"));
        assert!(!rule("parent/").matches("parent"));
    }

    #[test]
    fn test_anchored() {
        let r = rule("/boop.txt");
        assert!(r.matches("boop.txt"));
        assert!(!r.matches("baz/boop.txt"));
    }

    #[test]
    fn test_double_star() {
        let r = rule("**/terraform.d/");
        assert!(r.matches("terraform.d/"));
        assert!(r.matches("some-module/terraform.d/"));
        assert!(r.matches("some-module/terraform.d/x"));
        assert!(!r.matches("terraform.d"));
    }

    #[test]
    fn test_char_class() {
        assert!(rule("bar/something-[a-z].txt").matches("bar/something-a.txt"));
        assert!(!rule("bar/something-[a-z].txt").matches("bar/something-0.txt"));
        assert!(rule("x-[!0-9].txt").matches("x-a.txt"));
        assert!(!rule("x-[!0-9].txt").matches("x-1.txt"));
    }

    #[test]
    fn test_question_mark() {
        assert!(rule("fo?.txt").matches("foo.txt"));
        assert!(!rule("fo?.txt").matches("fo/.txt"));
    }

    #[test]
    fn test_escape() {
        assert!(rule(r"star\*.txt").matches("star*.txt"));
        assert!(!rule(r"star\*.txt").matches("starlet.txt"));
    }

    #[test]
    fn test_literal_dot_not_wildcard() {
        assert!(!rule("baz.txt").matches("bazatxt"));
    }

    #[test]
    fn test_invalid_pattern() {
        let r = rule("broken[");
        assert!(!r.is_valid());
        assert!(!r.matches("broken["));
    }
}
