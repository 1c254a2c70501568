//! Metadata about how a remote package's content was derived.

/// A collection of metadata about a fetched remote package.
///
/// Fields are private so the storage strategy can evolve; construct with
/// the `with_*` constructors and read through the accessors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMeta {
    git_commit_id: Option<String>,
}

impl PackageMeta {
    /// Returns a [`PackageMeta`] tracking a Git commit ID. The ID must be
    /// fully qualified, never an abbreviated ID, a ref name, or any other
    /// proxy for a commit.
    pub fn with_git_commit(commit_id: impl Into<String>) -> PackageMeta {
        PackageMeta {
            git_commit_id: Some(commit_id.into()),
        }
    }

    /// The fully-qualified Git commit ID this package's content came from,
    /// if the package was derived from a Git repository.
    pub fn git_commit_id(&self) -> Option<&str> {
        self.git_commit_id.as_deref()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.git_commit_id.is_none()
    }
}
