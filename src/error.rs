use std::io;
use std::path::PathBuf;

/// Fatal errors: any of these stops a run before (or instead of) mutating anything.
#[derive(thiserror::Error, Debug)]
pub enum PermsnapError {
    /// The base directory is missing, not a directory, or cannot be resolved.
    #[error("invalid base directory '{}': {reason}", path.display())]
    Configuration { path: PathBuf, reason: String },

    /// The snapshot file could not be opened or read.
    #[error("cannot read snapshot '{}': {source}", path.display())]
    SnapshotOpen { path: PathBuf, source: io::Error },

    /// The snapshot file could not be written.
    #[error("cannot write snapshot '{}': {source}", path.display())]
    SnapshotWrite { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Guard(#[from] GuardRejection),
}

pub type Result<T> = std::result::Result<T, PermsnapError>;

/// The safety guard refused to let a mutating run touch `candidate`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("refusing to operate on '{}': {reason}", candidate.display())]
pub struct GuardRejection {
    pub candidate: PathBuf,
    pub reason: String,
}

/// A uid/gid (or user/group name) that the name database cannot resolve.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("no user name for uid {0}")]
    UnknownUid(u32),
    #[error("no group name for gid {0}")]
    UnknownGid(u32),
    #[error("no such user '{0}'")]
    UnknownUser(String),
    #[error("no such group '{0}'")]
    UnknownGroup(String),
    #[error("user database error: {0}")]
    Database(String),
}

/// A record that cannot be written in the whitespace-separated snapshot format.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot encode {field} '{value}': {reason}")]
pub struct UnencodableRecordError {
    pub field: &'static str,
    pub value: String,
    pub reason: &'static str,
}

/// A snapshot line that was skipped while decoding.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line_no}: {reason}: {line:?}")]
pub struct MalformedRecord {
    pub line_no: usize,
    pub line: String,
    pub reason: String,
}

/// A recorded path that no longer exists under the restore base.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("'{}' no longer exists", path.display())]
pub struct StaleRecord {
    pub path: PathBuf,
}

/// Which half of an apply failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStep {
    Mode,
    Ownership,
}

impl std::fmt::Display for ApplyStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplyStep::Mode => f.write_str("set mode"),
            ApplyStep::Ownership => f.write_str("set ownership"),
        }
    }
}

/// Recoverable, per-entry errors. The run records them and moves on.
#[derive(thiserror::Error, Debug)]
pub enum EntryError {
    /// The walker could not descend into or stat an entry.
    #[error("cannot traverse '{}': {message}", path.display())]
    Walk { path: PathBuf, message: String },

    /// Metadata of an entry could not be read.
    #[error("cannot read metadata of '{}': {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    /// The path is not valid UTF-8 or not below the base directory.
    #[error("unusable path '{}': {reason}", path.display())]
    Path { path: PathBuf, reason: String },

    #[error("'{}': {source}", path.display())]
    Lookup { path: PathBuf, source: LookupError },

    /// An ancestor of the entry is no longer a real directory; restore does not go through it.
    #[error("not restoring '{}': ancestor '{}' is a {kind}", path.display(), ancestor.display())]
    Traversal {
        path: PathBuf,
        ancestor: PathBuf,
        kind: &'static str,
    },

    /// Changing mode or ownership failed part-way through.
    #[error("failed to {step} on '{}': {source}", path.display())]
    Apply {
        path: PathBuf,
        step: ApplyStep,
        source: io::Error,
    },

    #[error("'{}': {source}", path.display())]
    Unencodable {
        path: PathBuf,
        source: UnencodableRecordError,
    },
}

impl EntryError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            EntryError::Walk { path, .. }
            | EntryError::Read { path, .. }
            | EntryError::Path { path, .. }
            | EntryError::Lookup { path, .. }
            | EntryError::Traversal { path, .. }
            | EntryError::Apply { path, .. }
            | EntryError::Unencodable { path, .. } => path,
        }
    }
}

/// Errors raised while encoding a whole snapshot.
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error(transparent)]
    Unencodable(#[from] UnencodableRecordError),
    #[error(transparent)]
    Io(#[from] io::Error),
}
