//! Thin wrapper around the POSIX permission primitives.
//!
//! Every mode/ownership syscall in permsnap goes through this module. Nothing
//! here follows symlinks: metadata comes from `lstat` and ownership is changed
//! with `lchown`. Linux has no way to change the mode of a symlink itself, so
//! callers must not pass symlinks to [`set_unix_permissions`].

use crate::common::{EntryKind, Mode};
use std::fs::Metadata;
use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

/// Raw permission facts about one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawState {
    pub kind: EntryKind,
    pub mode: Mode,
    pub uid: u32,
    pub gid: u32,
}

impl RawState {
    pub fn from_metadata(meta: &Metadata) -> Self {
        RawState {
            kind: EntryKind::from_file_type(meta.file_type()),
            mode: Mode::new(meta.mode()),
            uid: meta.uid(),
            gid: meta.gid(),
        }
    }
}

/// `lstat` the entry.
pub fn stat_no_follow(path: &Path) -> io::Result<RawState> {
    std::fs::symlink_metadata(path).map(|meta| RawState::from_metadata(&meta))
}

/// Set POSIX permission bits.
pub fn set_unix_permissions(path: &Path, mode: Mode) -> io::Result<()> {
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode.bits()))
}

/// Change owner and group without dereferencing symlinks.
pub fn set_ownership(path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
    std::os::unix::fs::lchown(path, uid, gid)
}
