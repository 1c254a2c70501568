//! Incremental slugs: pack only what changed against a snapshot.
//!
//! An [`OverlayPacker`] takes a checksum snapshot of a base directory when
//! created. A later [`OverlayPacker::pack_overlay`] walks the same
//! directory again and produces a slug holding only the entries that were
//! created or modified since the snapshot, plus a `.tombstone` entry for
//! every path that disappeared. [`OverlayPacker::unpack_overlay`] applies
//! such a slug on top of an existing directory tree, deleting whatever the
//! tombstones name.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tar::{Builder, EntryType};
use walkdir::WalkDir;

use crate::error::SlugError;
use crate::unpackinfo::EntryKind;

use super::pack::{append, base_header, slash_path, write_file_body};
use super::{unpack, Meta, Packer, SymlinkErrorFlavor};

/// What the snapshot remembers about one path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SnapshotEntry {
    Dir,
    File { digest: [u8; 32] },
    Symlink { target: PathBuf },
}

/// Packs the difference between a directory and an earlier snapshot of it.
pub struct OverlayPacker {
    packer: Packer,
    base_dir: PathBuf,
    snapshot: BTreeMap<String, SnapshotEntry>,
}

impl OverlayPacker {
    /// Snapshots `base_dir` so later changes to it can be packed as an
    /// overlay. The directory must exist.
    pub fn new(base_dir: &Path) -> Result<OverlayPacker, SlugError> {
        let base_dir = std::path::absolute(base_dir).map_err(|e| {
            SlugError::io(format!("invalid base directory \"{}\"", base_dir.display()), e)
        })?;
        fs::metadata(&base_dir).map_err(|e| {
            SlugError::io(format!("cannot snapshot \"{}\"", base_dir.display()), e)
        })?;

        let mut snapshot = BTreeMap::new();
        for entry in WalkDir::new(&base_dir).min_depth(1).follow_links(false) {
            let entry = entry.map_err(|e| SlugError::Io {
                message: format!("failed to walk \"{}\"", base_dir.display()),
                source: e.into(),
            })?;
            let rel = slash_path(
                entry
                    .path()
                    .strip_prefix(&base_dir)
                    .expect("walked path is always below its walk root"),
            );
            snapshot.insert(rel, snapshot_entry(entry.path(), entry.file_type())?);
        }

        Ok(OverlayPacker {
            packer: Packer::new(),
            base_dir,
            snapshot,
        })
    }

    /// Writes a slug to `w` containing every entry of the base directory
    /// that was created or modified after the snapshot, and a tombstone
    /// for every snapshotted path that no longer exists. The snapshot
    /// itself is left as it was, so repeated calls diff against the same
    /// baseline.
    pub fn pack_overlay<W: Write>(&self, w: W) -> Result<Meta, SlugError> {
        let gz = flate2::write::GzEncoder::new(w, flate2::Compression::fast());
        let mut tar = Builder::new(gz);
        let mut meta = Meta::default();
        let mut seen: Vec<&str> = Vec::new();

        for entry in WalkDir::new(&self.base_dir)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| SlugError::Io {
                message: format!("failed to walk \"{}\"", self.base_dir.display()),
                source: e.into(),
            })?;
            let path = entry.path();
            let rel = slash_path(
                path.strip_prefix(&self.base_dir)
                    .expect("walked path is always below its walk root"),
            );

            let current = snapshot_entry(path, entry.file_type())?;
            if let Some((known_rel, known)) = self.snapshot.get_key_value(rel.as_str()) {
                seen.push(known_rel.as_str());
                if *known == current {
                    continue;
                }
            }

            let info = entry.metadata().map_err(|e| SlugError::Io {
                message: format!("failed to stat \"{}\"", path.display()),
                source: e.into(),
            })?;
            match current {
                SnapshotEntry::Dir => {
                    let mut header = base_header(&info);
                    header.set_entry_type(EntryType::Directory);
                    header.set_size(0);
                    append(&mut tar, &mut header, format!("{rel}/"), std::io::empty(), &mut meta)?;
                }
                SnapshotEntry::File { .. } => {
                    write_file_body(&mut tar, &info, rel, path, &mut meta)?;
                }
                SnapshotEntry::Symlink { ref target } => {
                    // The same policy as a full pack: resolve the target and
                    // refuse links leaving the base directory.
                    let abs_target = if target.is_absolute() {
                        crate::pathsafety::lexical_clean(target)
                    } else {
                        let parent = path.parent().unwrap_or(&self.base_dir);
                        crate::pathsafety::lexical_clean(&parent.join(target))
                    };
                    self.packer
                        .check_symlink(&self.base_dir, path, &abs_target, SymlinkErrorFlavor::Pack)?;

                    let mut header = base_header(&info);
                    header.set_entry_type(EntryType::Symlink);
                    header.set_size(0);
                    tar.append_link(&mut header, &rel, &abs_target).map_err(|e| {
                        SlugError::io(
                            format!("failed writing archive header for file \"{rel}\""),
                            e,
                        )
                    })?;
                    meta.files.push(rel);
                }
            }
        }

        // Everything the snapshot knew and the walk no longer saw has been
        // deleted. Tombstones are emitted in sorted order so a removed
        // directory's tombstone precedes its children's.
        seen.sort_unstable();
        for rel in self.snapshot.keys() {
            if seen.binary_search(&rel.as_str()).is_ok() {
                continue;
            }
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(EntryType::Regular);
            header.set_mode(0o644);
            header.set_mtime(0);
            header.set_size(0);
            append(
                &mut tar,
                &mut header,
                format!("{rel}.tombstone"),
                std::io::empty(),
                &mut meta,
            )?;
        }

        let gz = tar
            .into_inner()
            .map_err(|e| SlugError::io("failed to close the tar archive", e))?;
        gz.finish()
            .map_err(|e| SlugError::io("failed to close the gzip writer", e))?;

        Ok(meta)
    }

    /// Applies an overlay slug on top of `dst`: new and changed entries
    /// are written (replacing an existing object when its kind changed)
    /// and tombstoned paths are deleted. The usual unpack safety rules
    /// apply unchanged.
    pub fn unpack_overlay<R: Read>(&self, r: R, dst: &Path) -> Result<(), SlugError> {
        unpack::unpack_stream(&self.packer, r, dst, true)
    }
}

fn snapshot_entry(path: &Path, file_type: fs::FileType) -> Result<SnapshotEntry, SlugError> {
    match EntryKind::from_file_type(file_type) {
        Some(EntryKind::Dir) => Ok(SnapshotEntry::Dir),
        Some(EntryKind::File) => {
            let mut file = fs::File::open(path).map_err(|e| {
                SlugError::io(format!("failed opening file \"{}\"", path.display()), e)
            })?;
            let mut hasher = Sha256::new();
            std::io::copy(&mut file, &mut hasher).map_err(|e| {
                SlugError::io(format!("failed reading file \"{}\"", path.display()), e)
            })?;
            Ok(SnapshotEntry::File {
                digest: hasher.finalize().into(),
            })
        }
        Some(EntryKind::Symlink) => {
            let target = fs::read_link(path).map_err(|e| {
                SlugError::io(format!("failed to read symlink \"{}\"", path.display()), e)
            })?;
            Ok(SnapshotEntry::Symlink { target })
        }
        None => Err(SlugError::UnsupportedFileMode {
            path: path.to_path_buf(),
        }),
    }
}
