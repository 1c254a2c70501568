//! Building and reading source bundles.
//!
//! A source bundle is a directory (or its archived form) containing a
//! number of remote source packages plus a manifest mapping source
//! addresses to local directories. [`Builder`] gathers packages by walking
//! a graph of source references, fetching each distinct package content
//! exactly once; [`Bundle`] answers path and address queries over the
//! finished result.
//!
//! The builder does not know how to talk to networks itself: callers
//! supply a [`PackageFetcher`] for downloading packages, a
//! [`RegistryClient`] for resolving registry indirections, and
//! [`DependencyFinder`]s that inspect fetched sources and report what else
//! they require.

mod builder;
mod bundle;
mod context;
mod dependencies;
mod diagnostics;
mod fetcher;
mod manifest;
mod meta;
mod registry;
mod trace;

pub use builder::Builder;
pub use bundle::Bundle;
pub use context::{BuildContext, CancelFlag};
pub use dependencies::{Dependencies, DependencyFinder, FinderRef};
pub use diagnostics::{Diagnostic, Diagnostics, Severity, SourcePos, SourceRange};
pub use fetcher::{BoxError, FetchSourcePackageResponse, PackageFetcher};
pub use meta::PackageMeta;
pub use registry::{RegistryClient, RegistryPackageAddr};
pub use trace::BuildTracer;
