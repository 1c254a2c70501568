//! Metadata restoration for unpacked archive entries.
//!
//! Extraction writes file bodies first and fixes up permissions and
//! timestamps afterwards: permissions because a read-only mode would
//! prevent writing the body, and timestamps because writing into a
//! directory bumps the directory's own mtime. [`restore_times`] therefore
//! runs as a bottom-up post-pass over everything extracted, which also
//! keeps directory timestamps correct for archives that list a child
//! before its parent.

use std::fs;
use std::io;
use std::path::PathBuf;

use filetime::FileTime;

/// The kinds of filesystem entry an archive may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
    Symlink,
}

impl EntryKind {
    /// Classifies a filesystem entry, returning `None` for kinds that have
    /// no place in an archive (sockets, fifos, device nodes and the like).
    pub fn from_file_type(file_type: fs::FileType) -> Option<EntryKind> {
        if file_type.is_dir() {
            Some(EntryKind::Dir)
        } else if file_type.is_file() {
            Some(EntryKind::File)
        } else if file_type.is_symlink() {
            Some(EntryKind::Symlink)
        } else {
            None
        }
    }
}

/// A record of one extracted entry, capturing the header metadata to be
/// restored after its content is on disk.
#[derive(Debug, Clone)]
pub struct UnpackEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
    /// Permission bits from the tar header.
    pub perm: u32,
    /// Modification time at second resolution, the precision tar headers
    /// guarantee.
    pub mtime: FileTime,
    /// Access time; falls back to the modification time when the header
    /// carries none.
    pub atime: FileTime,
}

impl UnpackEntry {
    /// Captures the metadata of a tar header for later restoration.
    pub fn new(path: PathBuf, kind: EntryKind, header: &tar::Header) -> UnpackEntry {
        let perm = header.mode().unwrap_or(0o644) & 0o7777;
        let mtime_secs = header.mtime().unwrap_or(0) as i64;
        let mtime = FileTime::from_unix_time(mtime_secs, 0);
        let atime_secs = header
            .as_gnu()
            .and_then(|gnu| gnu.atime().ok())
            .map(|t| t as i64)
            .unwrap_or(mtime_secs);
        let atime = FileTime::from_unix_time(atime_secs, 0);
        UnpackEntry {
            path,
            kind,
            perm,
            mtime,
            atime,
        }
    }

    /// Restores permission bits on a regular file. Directories keep the
    /// fixed mode they were created with and symlink permissions are not a
    /// meaningful concept on the supported platforms.
    pub fn restore_perms(&self) -> io::Result<()> {
        if self.kind != EntryKind::File {
            return Ok(());
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(self.perm))?;
        }
        Ok(())
    }

    /// Restores access and modification times for this entry.
    ///
    /// Symlink timestamps can only be changed where the platform offers a
    /// non-following time update; elsewhere symlinks are left untouched.
    pub fn restore_times(&self) -> io::Result<()> {
        match self.kind {
            EntryKind::Symlink => {
                if can_maintain_symlink_timestamps() {
                    filetime::set_symlink_file_times(&self.path, self.atime, self.mtime)?;
                }
                Ok(())
            }
            _ => filetime::set_file_times(&self.path, self.atime, self.mtime),
        }
    }
}

/// Whether the current platform can change timestamps on a symlink itself
/// rather than its referent.
pub fn can_maintain_symlink_timestamps() -> bool {
    cfg!(any(target_os = "linux", target_os = "macos"))
}

/// Restores timestamps for a whole extraction run, deepest paths first so
/// that touching a directory's children never disturbs an already-restored
/// directory time.
pub fn restore_times(entries: &mut [UnpackEntry]) -> io::Result<()> {
    entries.sort_by_key(|entry| std::cmp::Reverse(entry.path.components().count()));
    for entry in entries.iter() {
        entry.restore_times()?;
    }
    Ok(())
}
