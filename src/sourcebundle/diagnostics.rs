//! Diagnostics produced while building a bundle.
//!
//! A diagnostic is a problem report, not an error value: warnings
//! accumulate without stopping a build, while any error-severity
//! diagnostic poisons the builder once the current call returns.
//! Dependency finders attach source ranges whose filenames are sub-paths
//! within the package being analyzed; before leaving the builder those are
//! rewritten to full source addresses so a UI can show something the user
//! can re-fetch.

use std::any::Any;
use std::sync::Arc;

use crate::sourceaddr::{self, RemotePackage};

/// How severe a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A position within a source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourcePos {
    pub line: usize,
    pub column: usize,
    pub byte: usize,
}

/// A contiguous range within a source file.
///
/// The filename is a human-oriented label: inside a dependency finder it is
/// a sub-path from the package root, and after the builder rewrites it, the
/// string form of a source address. It is not guaranteed to be either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRange {
    pub filename: String,
    pub start: SourcePos,
    pub end: SourcePos,
}

/// A single problem encountered during an operation.
#[derive(Clone)]
pub struct Diagnostic {
    severity: Severity,
    summary: String,
    detail: String,
    subject: Option<SourceRange>,
    context: Option<SourceRange>,
    extra: Option<Arc<dyn Any + Send + Sync>>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Diagnostic {
        Diagnostic::new(Severity::Error, summary, detail)
    }

    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Diagnostic {
        Diagnostic::new(Severity::Warning, summary, detail)
    }

    fn new(severity: Severity, summary: impl Into<String>, detail: impl Into<String>) -> Diagnostic {
        Diagnostic {
            severity,
            summary: summary.into(),
            detail: detail.into(),
            subject: None,
            context: None,
            extra: None,
        }
    }

    /// Attaches the range the problem is about.
    pub fn with_subject(mut self, range: SourceRange) -> Diagnostic {
        self.subject = Some(range);
        self
    }

    /// Attaches a wider range giving the subject context, such as the whole
    /// declaration containing the offending expression.
    pub fn with_context(mut self, range: SourceRange) -> Diagnostic {
        self.context = Some(range);
        self
    }

    /// Attaches an opaque payload passed through verbatim for callers that
    /// know how to interpret it.
    pub fn with_extra(mut self, extra: Arc<dyn Any + Send + Sync>) -> Diagnostic {
        self.extra = Some(extra);
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn subject(&self) -> Option<&SourceRange> {
        self.subject.as_ref()
    }

    pub fn context(&self) -> Option<&SourceRange> {
        self.context.as_ref()
    }

    pub fn extra(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.extra.as_ref()
    }
}

impl std::fmt::Debug for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostic")
            .field("severity", &self.severity)
            .field("summary", &self.summary)
            .field("detail", &self.detail)
            .field("subject", &self.subject)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// A collection of problems that occurred during an operation.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.0.push(diag);
    }

    pub fn extend(&mut self, more: Diagnostics) {
        self.0.extend(more.0);
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity() == Severity::Error)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reinterprets the filename of every source range as a sub-path within
    /// the given remote package, replacing it with the string form of the
    /// corresponding source address. Filenames that are not valid sub-paths
    /// are free-form labels and pass through untouched.
    pub(crate) fn in_remote_source_package(mut self, pkg: &RemotePackage) -> Diagnostics {
        for diag in &mut self.0 {
            for range in [&mut diag.subject, &mut diag.context] {
                if let Some(range) = range {
                    if sourceaddr::valid_sub_path(&range.filename) {
                        range.filename = pkg.source_addr(&range.filename).to_string();
                    }
                }
            }
        }
        self
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<T: IntoIterator<Item = Diagnostic>>(iter: T) -> Diagnostics {
        Diagnostics(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_errors() {
        let mut diags = Diagnostics::new();
        assert!(!diags.has_errors());
        diags.push(Diagnostic::warning("hmm", "just a warning"));
        assert!(!diags.has_errors());
        diags.push(Diagnostic::error("bad", "an actual error"));
        assert!(diags.has_errors());
    }

    #[test]
    fn test_range_rewriting() {
        let pkg = crate::sourceaddr::RemoteSource::parse("git::https://github.com/org/repo.git")
            .unwrap()
            .package()
            .clone();

        let diag = Diagnostic::error("bad expression", "something is off").with_subject(SourceRange {
            filename: "modules/main.tf".to_string(),
            start: SourcePos { line: 1, column: 1, byte: 0 },
            end: SourcePos { line: 1, column: 5, byte: 4 },
        });
        let mut diags = Diagnostics::new();
        diags.push(diag);
        diags.push(
            Diagnostic::error("elsewhere", "free-form filename").with_subject(SourceRange {
                filename: "../outside-the-package".to_string(),
                start: SourcePos::default(),
                end: SourcePos::default(),
            }),
        );

        let diags = diags.in_remote_source_package(&pkg);
        let rewritten: Vec<&str> = diags
            .iter()
            .map(|d| d.subject().unwrap().filename.as_str())
            .collect();
        assert_eq!(
            rewritten,
            vec![
                "git::https://github.com/org/repo.git//modules/main.tf",
                "../outside-the-package",
            ]
        );
    }
}
