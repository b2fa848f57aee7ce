//! Common types shared by the walker, codec, applier and engine.
// PathRecord / Snapshot model, permission bits, relative paths.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Permission bits kept in a snapshot: rwx for owner/group/other plus setuid, setgid and sticky.
pub const PERMISSION_MASK: u32 = 0o7777;

/// Token used for the base directory itself.
pub const ROOT_TOKEN: &str = ".";

/// Permission portion of `st_mode`, with file-type bits stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Mode(u32);

impl Mode {
    pub fn new(raw: u32) -> Self {
        Mode(raw & PERMISSION_MASK)
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03o}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid permission token '{0}': expected 1-4 octal digits")]
pub struct ParseModeError(String);

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseModeError(s.to_string());
        if s.is_empty() || s.len() > 4 || !s.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
            return Err(invalid());
        }
        let raw = u32::from_str_radix(s, 8).map_err(|_| invalid())?;
        Ok(Mode(raw))
    }
}

/// Kind of filesystem entry, as seen by `lstat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryKind {
    Dir,
    File,
    Symlink,
    /// FIFOs, sockets and device nodes.
    Other,
}

impl EntryKind {
    pub fn from_file_type(ft: std::fs::FileType) -> Self {
        if ft.is_symlink() {
            EntryKind::Symlink
        } else if ft.is_dir() {
            EntryKind::Dir
        } else if ft.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        }
    }
}

/// A path relative to a base directory, `/`-separated, never absolute and never containing `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelPath(String);

impl RelPath {
    /// The base directory itself.
    pub fn root() -> Self {
        RelPath(ROOT_TOKEN.to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_TOKEN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builds the relative path of `path`, which must live under `base`.
    pub fn from_base(base: &Path, path: &Path) -> Result<Self, String> {
        let rel = path
            .strip_prefix(base)
            .map_err(|_| format!("not below '{}'", base.display()))?;
        let mut parts = Vec::new();
        for comp in rel.components() {
            match comp {
                Component::Normal(part) => {
                    let part = part.to_str().ok_or("name is not valid UTF-8")?;
                    parts.push(part);
                }
                Component::CurDir => {}
                _ => return Err("unexpected path component".to_string()),
            }
        }
        if parts.is_empty() {
            return Ok(Self::root());
        }
        Ok(RelPath(parts.join("/")))
    }

    /// Validates a relative path read back from storage.
    pub fn parse(raw: &str) -> Result<Self, String> {
        if raw == ROOT_TOKEN {
            return Ok(Self::root());
        }
        if raw.is_empty() {
            return Err("empty path".into());
        }
        if raw.starts_with('/') {
            return Err("absolute path".into());
        }
        let mut parts = Vec::new();
        for part in raw.split('/') {
            match part {
                "" | "." => {}
                ".." => return Err("path contains '..'".into()),
                other => parts.push(other),
            }
        }
        if parts.is_empty() {
            return Err("empty path".into());
        }
        Ok(RelPath(parts.join("/")))
    }

    /// Path components below the base; empty for the base itself.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        let parts = if self.is_root() { "" } else { self.0.as_str() };
        parts.split('/').filter(|part| !part.is_empty())
    }

    /// Joins this path onto `base`.
    pub fn resolve(&self, base: &Path) -> PathBuf {
        self.components().fold(base.to_path_buf(), |acc, part| acc.join(part))
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Permission state of one entry, keyed by its path relative to the snapshot base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRecord {
    pub relative_path: RelPath,
    pub mode: Mode,
    pub owner: String,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("duplicate record for '{0}'")]
pub struct DuplicateRecord(pub RelPath);

/// Ordered set of records; at most one record per relative path.
#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    records: Vec<PathRecord>,
    seen: HashSet<RelPath>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: PathRecord) -> Result<(), DuplicateRecord> {
        if !self.seen.insert(record.relative_path.clone()) {
            return Err(DuplicateRecord(record.relative_path));
        }
        self.records.push(record);
        Ok(())
    }

    pub fn records(&self) -> &[PathRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl IntoIterator for Snapshot {
    type Item = PathRecord;
    type IntoIter = std::vec::IntoIter<PathRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
