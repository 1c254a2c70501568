//! Slug extraction with zip-slip defenses.

use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

use crate::error::{IllegalSlugError, SlugError};
use crate::pathsafety::{copy_with_limit, lexical_clean, target_within_root};
use crate::unpackinfo::{restore_times, EntryKind, UnpackEntry};

use super::{Packer, SymlinkErrorFlavor};

pub(super) fn unpack<R: Read>(packer: &Packer, r: R, dst: &Path) -> Result<(), SlugError> {
    unpack_stream(packer, r, dst, false)
}

/// The shared extraction loop. In overlay mode, tombstone entries delete
/// their counterpart instead of being written, and an entry whose kind
/// changed (file where a directory was, or the reverse) replaces the
/// existing object.
pub(super) fn unpack_stream<R: Read>(
    packer: &Packer,
    r: R,
    dst: &Path,
    overlay: bool,
) -> Result<(), SlugError> {
    let dst = std::path::absolute(dst).map_err(|e| {
        SlugError::io(format!("invalid destination directory \"{}\"", dst.display()), e)
    })?;

    let gz = GzDecoder::new(r);
    let mut archive = Archive::new(gz);

    // Entry metadata is collected and restored in a post-pass so directory
    // timestamps survive child writes, including archives that list a child
    // before its parent.
    let mut restore: Vec<UnpackEntry> = Vec::new();

    let entries = archive
        .entries()
        .map_err(|e| SlugError::io("failed to uncompress slug", e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| SlugError::io("failed to untar slug", e))?;

        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

        // Get rid of absolute paths.
        let name = name.trim_start_matches('/').to_string();
        if name.is_empty() {
            return Err(IllegalSlugError::EmptyName.into());
        }

        // Paths outside the destination directory are forbidden. A string
        // prefix comparison is not enough here; containment is decided
        // component by component on the cleaned path.
        let path = dst.join(slash_name_to_path(&name));
        let path = lexical_clean(&path);
        if !target_within_root(&dst, &path) {
            return Err(IllegalSlugError::PathTraversal { name }.into());
        }

        // Ensure the destination is not reached through any symlink, which
        // would allow a crafted archive to escape the destination even
        // though the entry name itself stays inside it.
        check_not_through_symlink(&dst, &name)?;

        if overlay {
            // Tombstones mark deletions; they never land on disk
            // themselves. The path they name passed the same containment
            // checks as the entry, being a prefix of it.
            if let Some(target_name) = name.strip_suffix(".tombstone") {
                apply_tombstone(&dst, target_name)?;
                continue;
            }
        }

        // Make the directories to the path.
        let dir = path.parent().unwrap_or(&dst);
        make_dirs(dir).map_err(|e| {
            SlugError::io(format!("failed to create directory \"{}\"", dir.display()), e)
        })?;

        let header = entry.header().clone();
        match header.entry_type() {
            EntryType::Symlink => {
                let target = entry
                    .link_name()
                    .map_err(|e| SlugError::io("failed to read symlink target", e))?
                    .ok_or(IllegalSlugError::EmptyName)?
                    .into_owned();

                packer.check_symlink(&dst, Path::new(&name), &target, SymlinkErrorFlavor::Unpack)?;

                make_symlink(&target, &path).map_err(|e| {
                    SlugError::io(
                        format!(
                            "failed creating symlink (\"{}\" -> \"{}\")",
                            name,
                            target.display()
                        ),
                        e,
                    )
                })?;
                restore.push(UnpackEntry::new(path, EntryKind::Symlink, &header));
            }
            EntryType::Directory => {
                if overlay {
                    if let Ok(info) = fs::symlink_metadata(&path) {
                        if !info.is_dir() {
                            fs::remove_file(&path).map_err(|e| {
                                SlugError::io(
                                    format!("failed replacing \"{}\"", path.display()),
                                    e,
                                )
                            })?;
                        }
                    }
                }
                if let Err(e) = fs::create_dir(&path) {
                    if e.kind() != ErrorKind::AlreadyExists {
                        return Err(SlugError::io(
                            format!("failed to create directory \"{}\"", path.display()),
                            e,
                        ));
                    }
                }
                restore.push(UnpackEntry::new(path, EntryKind::Dir, &header));
            }
            EntryType::Regular => {
                if overlay {
                    if let Ok(info) = fs::symlink_metadata(&path) {
                        if info.is_dir() {
                            fs::remove_dir_all(&path).map_err(|e| {
                                SlugError::io(
                                    format!("failed replacing \"{}\"", path.display()),
                                    e,
                                )
                            })?;
                        }
                    }
                }
                let mut file = create_clobbering(&path).map_err(|e| {
                    SlugError::io(format!("failed creating file \"{}\"", path.display()), e)
                })?;
                copy_with_limit(&mut file, &mut entry).map_err(|source| SlugError::Copy {
                    path: path.clone(),
                    source,
                })?;
                drop(file);

                // Restore the mode after writing, since a read-only mode
                // would prevent writing the body first.
                let unpack_entry = UnpackEntry::new(path.clone(), EntryKind::File, &header);
                unpack_entry.restore_perms().map_err(|e| {
                    SlugError::io(
                        format!("failed setting permissions on \"{}\"", path.display()),
                        e,
                    )
                })?;
                restore.push(unpack_entry);
            }
            EntryType::XHeader | EntryType::XGlobalHeader => {
                // PAX metadata records, not files.
                continue;
            }
            other => {
                return Err(SlugError::UnsupportedTypeflag {
                    name,
                    flag: other.as_byte(),
                });
            }
        }
    }

    restore_times(&mut restore)
        .map_err(|e| SlugError::io("failed restoring timestamps", e))?;

    Ok(())
}

/// Deletes whatever object a tombstone names; a tombstone for something
/// already gone is not an error.
fn apply_tombstone(dst: &Path, target_name: &str) -> Result<(), SlugError> {
    if target_name.is_empty() {
        return Err(IllegalSlugError::EmptyName.into());
    }
    let path = dst.join(slash_name_to_path(target_name));
    let result = match fs::symlink_metadata(&path) {
        Ok(info) if info.is_dir() => fs::remove_dir_all(&path),
        Ok(_) => fs::remove_file(&path),
        // Anything that can't be stat'ed (missing, or a parent that is no
        // longer a directory) is already gone.
        Err(_) => return Ok(()),
    };
    result.map_err(|e| {
        SlugError::io(format!("failed removing \"{}\"", path.display()), e)
    })
}

/// Walks each path component from `dst` down to the entry's immediate
/// parent, failing if any existing component is a symlink. A missing
/// component ends the walk: nothing above it can be a symlink yet.
fn check_not_through_symlink(dst: &Path, name: &str) -> Result<(), SlugError> {
    let components: Vec<&str> = name.split('/').filter(|c| !c.is_empty()).collect();
    let mut current = dst.to_path_buf();
    for component in &components[..components.len().saturating_sub(1)] {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(info) if info.file_type().is_symlink() => {
                return Err(IllegalSlugError::ThroughSymlink {
                    name: name.to_string(),
                }
                .into());
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => break,
            Err(e) => {
                return Err(SlugError::io(format!("failed to evaluate path \"{name}\""), e));
            }
        }
    }
    Ok(())
}

/// Creates or truncates a file, retrying once through a chmod when an
/// earlier duplicate of the entry left a read-only file behind. This
/// mirrors tar's tolerance for archives containing the same file twice.
fn create_clobbering(path: &Path) -> std::io::Result<fs::File> {
    match fs::File::create(path) {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            make_writable(path)?;
            fs::File::create(path)
        }
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn make_writable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn make_writable(path: &Path) -> std::io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(false);
    fs::set_permissions(path, perms)
}

#[cfg(unix)]
fn make_dirs(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o755).create(dir)
}

#[cfg(not(unix))]
fn make_dirs(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

/// Interprets a slash-separated archive name as a relative filesystem path.
fn slash_name_to_path(name: &str) -> PathBuf {
    name.split('/').filter(|c| !c.is_empty()).collect()
}
