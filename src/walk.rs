//! Physical, pre-order traversal of a directory tree.

use crate::common::EntryKind;
use crate::error::EntryError;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub depth: usize,
    pub kind: EntryKind,
}

/// Yields every entry under a root, the root first. Children are sorted by
/// file name so repeated walks of an unchanged tree produce the same order.
/// A directory that cannot be read yields one error and the walk continues.
pub struct TreeWalker {
    root: PathBuf,
    follow_symlinks: bool,
}

impl TreeWalker {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            follow_symlinks: false,
        }
    }

    /// Descend into symlinked directories. Off by default.
    pub fn follow_symlinks(mut self, yes: bool) -> Self {
        self.follow_symlinks = yes;
        self
    }
}

impl IntoIterator for TreeWalker {
    type Item = Result<WalkEntry, EntryError>;
    type IntoIter = Walk;

    fn into_iter(self) -> Walk {
        let inner = WalkDir::new(&self.root)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name()
            .into_iter();
        Walk { inner }
    }
}

pub struct Walk {
    inner: walkdir::IntoIter,
}

impl Iterator for Walk {
    type Item = Result<WalkEntry, EntryError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        Some(match item {
            Ok(entry) => Ok(WalkEntry {
                kind: EntryKind::from_file_type(entry.file_type()),
                depth: entry.depth(),
                path: entry.into_path(),
            }),
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                Err(EntryError::Walk {
                    path,
                    message: err.to_string(),
                })
            }
        })
    }
}
