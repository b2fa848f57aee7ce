//! Reading and applying the permission state of a single entry.

use crate::common::{EntryKind, Mode};
use crate::error::{ApplyStep, EntryError};
use crate::fsx::{self, RawState};
use crate::names::NameResolver;
use std::fmt;
use std::path::{Path, PathBuf};

/// Permission state of an entry with owner and group already translated to names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryState {
    pub kind: EntryKind,
    pub mode: Mode,
    pub uid: u32,
    pub gid: u32,
    pub owner: String,
    pub group: String,
}

/// An owner or group, either by name (snapshots) or by numeric id (fix mode).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Name(String),
    Id(u32),
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::Name(name) => f.write_str(name),
            Principal::Id(id) => write!(f, "{id}"),
        }
    }
}

/// Target state for an entry. `mode: None` leaves the mode alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Desired {
    pub mode: Option<Mode>,
    pub owner: Principal,
    pub group: Principal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<T> {
    pub from: T,
    pub to: T,
}

/// The fields of one entry that differ from the desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub path: PathBuf,
    pub mode: Option<Transition<Mode>>,
    pub uid: Option<Transition<u32>>,
    pub gid: Option<Transition<u32>>,
}

impl Change {
    pub fn is_empty(&self) -> bool {
        self.mode.is_none() && self.uid.is_none() && self.gid.is_none()
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.path.display())?;
        if let Some(t) = &self.mode {
            write!(f, " mode {} -> {}", t.from, t.to)?;
        }
        if let Some(t) = &self.uid {
            write!(f, " uid {} -> {}", t.from, t.to)?;
        }
        if let Some(t) = &self.gid {
            write!(f, " gid {} -> {}", t.from, t.to)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied(Change),
    /// Dry-run: the change that would have been made.
    Simulated(Change),
    Unchanged,
}

/// The boundary between the engine and the operating system's permission model.
pub trait MetadataAccessor {
    fn read(&self, path: &Path) -> Result<EntryState, EntryError>;

    /// Brings `path` to `desired`. With `dry_run` nothing is mutated.
    fn apply(&self, path: &Path, desired: &Desired, dry_run: bool)
        -> Result<ApplyOutcome, EntryError>;
}

/// [`MetadataAccessor`] for the local filesystem.
#[derive(Debug, Clone)]
pub struct HostAccessor<R> {
    names: R,
}

impl<R: NameResolver> HostAccessor<R> {
    pub fn new(names: R) -> Self {
        Self { names }
    }

    fn stat(&self, path: &Path) -> Result<RawState, EntryError> {
        fsx::stat_no_follow(path).map_err(|source| EntryError::Read {
            path: path.to_path_buf(),
            source,
        })
    }

    fn resolve_uid(&self, path: &Path, owner: &Principal) -> Result<u32, EntryError> {
        match owner {
            Principal::Id(id) => Ok(*id),
            Principal::Name(name) => self.names.uid_of(name).map_err(|source| EntryError::Lookup {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn resolve_gid(&self, path: &Path, group: &Principal) -> Result<u32, EntryError> {
        match group {
            Principal::Id(id) => Ok(*id),
            Principal::Name(name) => self.names.gid_of(name).map_err(|source| EntryError::Lookup {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn plan(&self, path: &Path, current: &RawState, desired: &Desired) -> Result<Change, EntryError> {
        let uid = self.resolve_uid(path, &desired.owner)?;
        let gid = self.resolve_gid(path, &desired.group)?;
        // A symlink's own mode cannot be changed, and chmod would hit the target.
        let mode = desired
            .mode
            .filter(|m| current.kind != EntryKind::Symlink && *m != current.mode)
            .map(|to| Transition { from: current.mode, to });
        Ok(Change {
            path: path.to_path_buf(),
            mode,
            uid: (uid != current.uid).then_some(Transition { from: current.uid, to: uid }),
            gid: (gid != current.gid).then_some(Transition { from: current.gid, to: gid }),
        })
    }
}

impl<R: NameResolver> MetadataAccessor for HostAccessor<R> {
    fn read(&self, path: &Path) -> Result<EntryState, EntryError> {
        let raw = self.stat(path)?;
        let lookup = |source| EntryError::Lookup {
            path: path.to_path_buf(),
            source,
        };
        let owner = self.names.user_name(raw.uid).map_err(lookup)?;
        let group = self.names.group_name(raw.gid).map_err(lookup)?;
        Ok(EntryState {
            kind: raw.kind,
            mode: raw.mode,
            uid: raw.uid,
            gid: raw.gid,
            owner,
            group,
        })
    }

    fn apply(
        &self,
        path: &Path,
        desired: &Desired,
        dry_run: bool,
    ) -> Result<ApplyOutcome, EntryError> {
        let current = self.stat(path)?;
        let change = self.plan(path, &current, desired)?;
        if change.is_empty() {
            return Ok(ApplyOutcome::Unchanged);
        }
        if dry_run {
            return Ok(ApplyOutcome::Simulated(change));
        }

        // Mode first: the process still owns the entry at this point.
        if let Some(t) = &change.mode {
            fsx::set_unix_permissions(path, t.to).map_err(|source| EntryError::Apply {
                path: path.to_path_buf(),
                step: ApplyStep::Mode,
                source,
            })?;
        }
        if change.uid.is_some() || change.gid.is_some() {
            let uid = change.uid.map(|t| t.to);
            let gid = change.gid.map(|t| t.to);
            fsx::set_ownership(path, uid, gid).map_err(|source| EntryError::Apply {
                path: path.to_path_buf(),
                step: ApplyStep::Ownership,
                source,
            })?;
        }
        Ok(ApplyOutcome::Applied(change))
    }
}
