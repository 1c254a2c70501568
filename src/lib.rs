//! Source package acquisition and bundling.
//!
//! This crate has two halves that share a security model and an address
//! algebra:
//!
//! - [`slug`] converts directories to and from gzip-compressed tar archives
//!   ("slugs") with a strict symlink policy, zip-slip defenses, and
//!   `.terraformignore` filtering.
//! - [`sourcebundle`] resolves a graph of source addresses (local, registry,
//!   remote) into a self-describing on-disk bundle, fetching each distinct
//!   package content exactly once.
//!
//! [`sourceaddr`] is the shared address algebra, [`ignorefiles`] the ignore
//! rule engine, and [`pathsafety`]/[`unpackinfo`] the path-containment and
//! extraction-restore primitives underneath both halves.
//!
//! Network and VCS access is deliberately not part of this crate: the bundle
//! builder drives caller-supplied [`sourcebundle::PackageFetcher`],
//! [`sourcebundle::RegistryClient`], and [`sourcebundle::DependencyFinder`]
//! implementations.

pub mod error;
pub mod ignorefiles;
pub mod pathsafety;
pub mod slug;
pub mod sourceaddr;
pub mod sourcebundle;
pub mod unpackinfo;
