//! Packing and unpacking of slug archives.
//!
//! A slug is a gzip-compressed tar archive of a directory. Packing applies
//! `.terraformignore` filtering and a strict symlink policy; unpacking
//! defends against zip-slip style attacks: path traversal in entry names,
//! extraction through symlinked parents, and symlinks escaping the
//! destination.
//!
//! ```no_run
//! use sourcepack::slug::Packer;
//!
//! # fn main() -> Result<(), sourcepack::error::SlugError> {
//! let packer = Packer::new().apply_terraform_ignore(true);
//! let mut out = Vec::new();
//! let meta = packer.pack(std::path::Path::new("./pkg"), &mut out)?;
//! println!("packed {} files, {} bytes", meta.files.len(), meta.size);
//! # Ok(())
//! # }
//! ```

mod overlay;
mod pack;
mod unpack;

pub use overlay::OverlayPacker;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{IllegalSlugError, SlugError};
use crate::pathsafety::{lexical_clean, target_within_root};

/// Detailed information about a packed slug.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Meta {
    /// The archive entry names, in the exact order they were written.
    pub files: Vec<String>,
    /// Total size of the regular-file bodies in the slug, in bytes.
    pub size: u64,
}

/// Options for packing and unpacking slugs.
///
/// The zero-configuration [`Packer::new`] packs everything, refuses
/// symlinks pointing outside the source directory, and applies no ignore
/// rules.
#[derive(Debug, Clone, Default)]
pub struct Packer {
    dereference: bool,
    apply_ignore: bool,
    allow_symlink_targets: Vec<PathBuf>,
}

impl Packer {
    pub fn new() -> Packer {
        Packer::default()
    }

    /// Applies the package's `.terraformignore` rules while packing,
    /// skipping the files they exclude.
    pub fn apply_terraform_ignore(mut self, apply: bool) -> Packer {
        self.apply_ignore = apply;
        self
    }

    /// Allows symlinks whose target lies outside the source directory by
    /// copying the target's content, turning the link into a normal file
    /// (or directory subtree) within the archive.
    pub fn dereference_symlinks(mut self, dereference: bool) -> Packer {
        self.dereference = dereference;
        self
    }

    /// Relaxes the symlink safety checks for targets resolving to `path`
    /// exactly or to anything below it. By default any symlink target
    /// outside the source (for pack) or destination (for unpack) directory
    /// is forbidden; exercise caution when overriding that.
    pub fn allow_symlink_target(mut self, path: impl Into<PathBuf>) -> Packer {
        self.allow_symlink_targets.push(path.into());
        self
    }

    /// Creates a slug from the `src` directory and writes it to `w`,
    /// returning metadata about the written archive.
    pub fn pack<W: Write>(&self, src: &Path, w: W) -> Result<Meta, SlugError> {
        pack::pack(self, src, w)
    }

    /// Reads a slug from `r` and extracts it into the existing directory
    /// `dst`.
    pub fn unpack<R: Read>(&self, r: R, dst: &Path) -> Result<(), SlugError> {
        unpack::unpack(self, r, dst)
    }

    /// Checks that a symlink's target either falls somewhere under `root`
    /// or is expressly allowed by the packer's configuration.
    ///
    /// `link` is the symlink's own location and `target` its raw target;
    /// relative targets are interpreted from the link's directory.
    pub(crate) fn check_symlink(
        &self,
        root: &Path,
        link: &Path,
        target: &Path,
        flavor: SymlinkErrorFlavor,
    ) -> Result<(), IllegalSlugError> {
        let abs_link = if link.is_absolute() {
            link.to_path_buf()
        } else {
            root.join(link)
        };
        let abs_target = if target.is_absolute() {
            lexical_clean(target)
        } else {
            let parent = abs_link.parent().unwrap_or(root);
            lexical_clean(&parent.join(target))
        };

        if target_within_root(root, &abs_target) {
            return Ok(());
        }

        for allowed in &self.allow_symlink_targets {
            let allowed = if allowed.is_absolute() {
                lexical_clean(allowed)
            } else {
                lexical_clean(&root.join(allowed))
            };
            if target_within_root(&allowed, &abs_target) {
                return Ok(());
            }
        }

        match flavor {
            SymlinkErrorFlavor::Unpack if target.is_absolute() => {
                Err(IllegalSlugError::AbsoluteSymlinkForbidden {
                    target: target.display().to_string(),
                })
            }
            _ => Err(IllegalSlugError::ExternalSymlink {
                link: link.display().to_string(),
                target: target.display().to_string(),
            }),
        }
    }
}

/// Which error variant a refused symlink produces; packing always reports
/// an external target, unpacking distinguishes absolute link names.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SymlinkErrorFlavor {
    Pack,
    Unpack,
}

/// Packs `src` into `w` with `.terraformignore` rules applied, matching the
/// historical default behavior of slug packing.
///
/// When `dereference` is true, symlinks targeting paths outside `src` have
/// their content copied into the archive; when false such symlinks fail
/// the pack.
pub fn pack<W: Write>(src: &Path, w: W, dereference: bool) -> Result<Meta, SlugError> {
    Packer::new()
        .apply_terraform_ignore(true)
        .dereference_symlinks(dereference)
        .pack(src, w)
}

/// Extracts the slug read from `r` into the existing directory `dst` with
/// default options. Symlinks within the slug are supported provided their
/// targets point at paths within the destination directory.
pub fn unpack<R: Read>(r: R, dst: &Path) -> Result<(), SlugError> {
    Packer::new().unpack(r, dst)
}
