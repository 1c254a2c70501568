//! Slug creation: directory walk, ignore filtering, symlink policy, and
//! tar/gzip encoding.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Builder, EntryType, Header};
use walkdir::WalkDir;

use crate::error::SlugError;
use crate::ignorefiles::Ruleset;
use crate::pathsafety::lexical_clean;
use crate::unpackinfo::EntryKind;

use super::{Meta, Packer, SymlinkErrorFlavor};

pub(super) fn pack<W: Write>(packer: &Packer, src: &Path, w: W) -> Result<Meta, SlugError> {
    let root = std::path::absolute(src)
        .map_err(|e| SlugError::io(format!("invalid source directory \"{}\"", src.display()), e))?;

    let gz = GzEncoder::new(w, Compression::fast());
    let mut tar = Builder::new(gz);

    // Load the ignore rule configuration, which falls back to defaults when
    // no .terraformignore is present.
    let ignore_rules = packer
        .apply_ignore
        .then(|| Ruleset::load_package_ignore_rules(&root));

    let mut meta = Meta::default();
    pack_tree(
        packer,
        &root,
        &root,
        &root,
        &mut tar,
        &mut meta,
        ignore_rules.as_ref(),
    )?;

    let gz = tar
        .into_inner()
        .map_err(|e| SlugError::io("failed to close the tar archive", e))?;
    gz.finish()
        .map_err(|e| SlugError::io("failed to close the gzip writer", e))?;

    Ok(meta)
}

/// Walks `src` in lexical order, writing each entry under the archive name
/// it would have if `src` were mounted at `dst`; both start out as `root`
/// and diverge only when a dereferenced directory symlink maps its target
/// back to the link's own location.
fn pack_tree<W: Write>(
    packer: &Packer,
    root: &Path,
    src: &Path,
    dst: &Path,
    tar: &mut Builder<W>,
    meta: &mut Meta,
    ignore_rules: Option<&Ruleset>,
) -> Result<(), SlugError> {
    let mut walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| SlugError::Io {
            message: format!("failed to walk \"{}\"", src.display()),
            source: e.into(),
        })?;
        let path = entry.path();
        let rel = path
            .strip_prefix(src)
            .expect("walked path is always below its walk root");
        let rel_slash = slash_path(rel);

        let file_type = entry.file_type();
        if let Some(rules) = ignore_rules {
            // An excluded directory is only skipped as an entry; its
            // children are still tested one by one, since a later negation
            // rule can re-include them. Only a dominating decision lets the
            // walk drop the subtree wholesale.
            let result = rules.excludes(&rel_slash);
            if result.excluded {
                if file_type.is_dir() && result.dominating {
                    walker.skip_current_dir();
                }
                continue;
            }
            if file_type.is_dir() {
                let result = rules.excludes(&format!("{rel_slash}/"));
                if result.excluded {
                    if result.dominating {
                        walker.skip_current_dir();
                    }
                    continue;
                }
            }
        }

        // The archive name maps the walked path back through dst, then
        // relative to the original root.
        let name_abs = dst.join(rel);
        let name = match name_abs.strip_prefix(root) {
            Ok(rel_to_root) => slash_path(rel_to_root),
            Err(_) => continue,
        };
        if name.is_empty() {
            continue;
        }

        let info = entry.metadata().map_err(|e| SlugError::Io {
            message: format!("failed to stat \"{}\"", path.display()),
            source: e.into(),
        })?;

        match EntryKind::from_file_type(file_type) {
            Some(EntryKind::Dir) => {
                let mut header = base_header(&info);
                header.set_entry_type(EntryType::Directory);
                header.set_size(0);
                append(tar, &mut header, format!("{name}/"), std::io::empty(), meta)?;
            }
            Some(EntryKind::File) => {
                write_file_body(tar, &info, name, path, meta)?;
            }
            Some(EntryKind::Symlink) => {
                let resolved = resolve_link(root, path)?;

                match packer.check_symlink(
                    root,
                    path,
                    &resolved.abs_target,
                    SymlinkErrorFlavor::Pack,
                ) {
                    Ok(()) => {
                        let mut header = base_header(&info);
                        header.set_entry_type(EntryType::Symlink);
                        header.set_size(0);
                        tar.append_link(&mut header, &name, &resolved.abs_target)
                            .map_err(|e| {
                                SlugError::io(
                                    format!("failed writing archive header for file \"{name}\""),
                                    e,
                                )
                            })?;
                        meta.files.push(name);
                    }
                    Err(err) if !packer.dereference => return Err(err.into()),
                    Err(_) => {
                        if resolved.info.is_dir() {
                            // Recurse into the target directory as if it
                            // were mounted at the symlink's location.
                            pack_tree(
                                packer,
                                root,
                                &resolved.abs_target,
                                path,
                                tar,
                                meta,
                                ignore_rules,
                            )?;
                        } else {
                            // Dereference the symlink into a regular file
                            // carrying the target's contents and metadata.
                            write_file_body(tar, &resolved.info, name, &resolved.abs_target, meta)?;
                        }
                    }
                }
            }
            None => {
                return Err(SlugError::UnsupportedFileMode {
                    path: path.to_path_buf(),
                });
            }
        }
    }

    Ok(())
}

pub(super) fn write_file_body<W: Write>(
    tar: &mut Builder<W>,
    info: &fs::Metadata,
    name: String,
    body_path: &Path,
    meta: &mut Meta,
) -> Result<(), SlugError> {
    let mut header = base_header(info);
    header.set_entry_type(EntryType::Regular);
    header.set_size(info.len());

    let file = fs::File::open(body_path).map_err(|e| {
        SlugError::io(
            format!("failed opening file \"{}\" for archiving", body_path.display()),
            e,
        )
    })?;
    meta.size += info.len();
    append(tar, &mut header, name, file, meta)
}

pub(super) fn append<W: Write, R: std::io::Read>(
    tar: &mut Builder<W>,
    header: &mut Header,
    name: String,
    body: R,
    meta: &mut Meta,
) -> Result<(), SlugError> {
    tar.append_data(header, &name, body)
        .map_err(|e| SlugError::io(format!("failed writing archive entry \"{name}\""), e))?;
    meta.files.push(name);
    Ok(())
}

pub(super) fn base_header(info: &fs::Metadata) -> Header {
    let mut header = Header::new_gnu();
    header.set_mode(permissions_mode(info));
    let mtime = info
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    header.set_mtime(mtime);
    header.set_uid(0);
    header.set_gid(0);
    header
}

#[cfg(unix)]
fn permissions_mode(info: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    info.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permissions_mode(info: &fs::Metadata) -> u32 {
    if info.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

/// A symlink with its chain of links followed to a non-link target.
struct ResolvedSymlink {
    abs_target: PathBuf,
    info: fs::Metadata,
}

fn resolve_link(root: &Path, link: &Path) -> Result<ResolvedSymlink, SlugError> {
    let raw = fs::read_link(link)
        .map_err(|e| SlugError::io(format!("failed to read symlink \"{}\"", link.display()), e))?;

    let mut abs_target = if raw.is_absolute() {
        raw.clone()
    } else {
        link.parent().unwrap_or(root).join(&raw)
    };
    if !abs_target.is_absolute() {
        abs_target = root.join(&abs_target);
    }
    let abs_target = lexical_clean(&abs_target);

    let info = fs::symlink_metadata(&abs_target).map_err(|e| {
        SlugError::io(
            format!("failed to get file info from file \"{}\"", raw.display()),
            e,
        )
    })?;

    // Follow chains of symlinks to their eventual target.
    if info.file_type().is_symlink() {
        return resolve_link(root, &abs_target);
    }

    Ok(ResolvedSymlink { abs_target, info })
}

/// Converts a relative path into slash-separated archive form.
pub(super) fn slash_path(path: &Path) -> String {
    let s = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}
