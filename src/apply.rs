//! Applying recorded or fixed targets to entries on disk.

use crate::accessor::{ApplyOutcome, Change, Desired, MetadataAccessor, Principal};
use crate::common::{EntryKind, Mode, PathRecord};
use crate::error::{EntryError, StaleRecord};
use crate::fsx;
use crate::walk::WalkEntry;
use std::io;
use std::path::{Path, PathBuf};

/// Result of processing one entry.
#[derive(Debug)]
pub enum EntryOutcome {
    Applied(Change),
    Simulated(Change),
    Unchanged(PathBuf),
    Skipped(StaleRecord),
    Failed(EntryError),
}

impl EntryOutcome {
    fn from_apply(path: &Path, result: Result<ApplyOutcome, EntryError>) -> Self {
        match result {
            Ok(ApplyOutcome::Applied(change)) => EntryOutcome::Applied(change),
            Ok(ApplyOutcome::Simulated(change)) => EntryOutcome::Simulated(change),
            Ok(ApplyOutcome::Unchanged) => EntryOutcome::Unchanged(path.to_path_buf()),
            Err(err) => EntryOutcome::Failed(err),
        }
    }
}

/// Targets for `fix`: one mode for directories, one for everything else, one owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixPolicy {
    pub file_mode: Mode,
    pub dir_mode: Mode,
    pub uid: u32,
    pub gid: u32,
}

impl FixPolicy {
    pub const DEFAULT_FILE_MODE: u32 = 0o644;
    pub const DEFAULT_DIR_MODE: u32 = 0o755;

    /// Default modes, owned by the invoking user.
    pub fn for_current_user() -> Self {
        let (uid, gid) = crate::names::current_ids();
        FixPolicy {
            file_mode: Mode::new(Self::DEFAULT_FILE_MODE),
            dir_mode: Mode::new(Self::DEFAULT_DIR_MODE),
            uid,
            gid,
        }
    }

    fn desired_for(&self, kind: EntryKind) -> Desired {
        let mode = match kind {
            EntryKind::Dir => Some(self.dir_mode),
            EntryKind::Symlink => None,
            EntryKind::File | EntryKind::Other => Some(self.file_mode),
        };
        Desired {
            mode,
            owner: Principal::Id(self.uid),
            group: Principal::Id(self.gid),
        }
    }
}

pub struct PermissionApplier<'a, A: ?Sized> {
    accessor: &'a A,
    dry_run: bool,
}

impl<'a, A: MetadataAccessor + ?Sized> PermissionApplier<'a, A> {
    pub fn new(accessor: &'a A, dry_run: bool) -> Self {
        Self { accessor, dry_run }
    }

    /// Restores `record` onto `base/relative_path`, skipping it when the entry is gone.
    ///
    /// Every directory between `base` and the entry is `lstat`ed first. If one of them
    /// has been replaced by a symlink or a non-directory the record fails instead of
    /// being applied through it.
    pub fn apply_record(&self, base: &Path, record: &PathRecord) -> EntryOutcome {
        let path = record.relative_path.resolve(base);
        if let Err(outcome) = check_ancestors(base, record, &path) {
            return outcome;
        }
        match fsx::stat_no_follow(&path) {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return EntryOutcome::Skipped(StaleRecord { path });
            }
            Err(source) => return EntryOutcome::Failed(EntryError::Read { path, source }),
        }
        let desired = Desired {
            mode: Some(record.mode),
            owner: Principal::Name(record.owner.clone()),
            group: Principal::Name(record.group.clone()),
        };
        let result = self.accessor.apply(&path, &desired, self.dry_run);
        EntryOutcome::from_apply(&path, result)
    }

    pub fn apply_fixed(&self, entry: &WalkEntry, policy: &FixPolicy) -> EntryOutcome {
        let desired = policy.desired_for(entry.kind);
        let result = self.accessor.apply(&entry.path, &desired, self.dry_run);
        EntryOutcome::from_apply(&entry.path, result)
    }
}

/// Walks from `base` down to the parent of `path`, requiring a real directory at each step.
fn check_ancestors(base: &Path, record: &PathRecord, path: &Path) -> Result<(), EntryOutcome> {
    let parts: Vec<&str> = record.relative_path.components().collect();
    let mut ancestor = base.to_path_buf();
    for part in parts.iter().take(parts.len().saturating_sub(1)) {
        ancestor.push(part);
        let kind = match fsx::stat_no_follow(&ancestor) {
            Ok(state) => state.kind,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(EntryOutcome::Skipped(StaleRecord {
                    path: path.to_path_buf(),
                }));
            }
            Err(source) => {
                return Err(EntryOutcome::Failed(EntryError::Read {
                    path: ancestor,
                    source,
                }));
            }
        };
        let kind = match kind {
            EntryKind::Dir => continue,
            EntryKind::Symlink => "symlink",
            EntryKind::File => "regular file",
            EntryKind::Other => "special file",
        };
        return Err(EntryOutcome::Failed(EntryError::Traversal {
            path: path.to_path_buf(),
            ancestor,
            kind,
        }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::HostAccessor;
    use crate::common::RelPath;
    use crate::names::{current_ids, StaticNames};
    use tempfile::tempdir;

    fn accessor() -> HostAccessor<StaticNames> {
        let (uid, gid) = current_ids();
        HostAccessor::new(StaticNames::new().with_user(uid, "alice").with_group(gid, "staff"))
    }

    fn record(path: &str, mode: u32) -> PathRecord {
        PathRecord {
            relative_path: RelPath::parse(path).unwrap(),
            mode: Mode::new(mode),
            owner: "alice".into(),
            group: "staff".into(),
        }
    }

    #[test]
    fn test_apply_record_missing_entry_is_stale() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let acc = accessor();
        let applier = PermissionApplier::new(&acc, false);
        match applier.apply_record(dir.path(), &record("gone.txt", 0o644)) {
            EntryOutcome::Skipped(stale) => assert_eq!(stale.path, dir.path().join("gone.txt")),
            other => panic!("expected stale skip, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_apply_record_refuses_symlinked_ancestor() -> Result<(), Box<dyn std::error::Error>> {
        let outside = tempdir()?;
        let secret = outside.path().join("secret");
        std::fs::write(&secret, b"x")?;
        fsx::set_unix_permissions(&secret, Mode::new(0o600))?;
        let dir = tempdir()?;
        std::os::unix::fs::symlink(outside.path(), dir.path().join("d"))?;

        let acc = accessor();
        match PermissionApplier::new(&acc, false).apply_record(dir.path(), &record("d/secret", 0o777)) {
            EntryOutcome::Failed(EntryError::Traversal { ancestor, kind, .. }) => {
                assert_eq!(ancestor, dir.path().join("d"));
                assert_eq!(kind, "symlink");
            }
            other => panic!("expected traversal failure, got {other:?}"),
        }
        assert_eq!(fsx::stat_no_follow(&secret)?.mode, Mode::new(0o600));
        Ok(())
    }

    #[test]
    fn test_apply_record_file_ancestor_fails_not_stale() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join("d"), b"not a dir")?;

        let acc = accessor();
        let outcome = PermissionApplier::new(&acc, false).apply_record(dir.path(), &record("d/f.txt", 0o644));
        assert!(
            matches!(outcome, EntryOutcome::Failed(EntryError::Traversal { kind: "regular file", .. })),
            "got {outcome:?}"
        );
        Ok(())
    }

    #[test]
    fn test_apply_record_missing_ancestor_is_stale() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let acc = accessor();
        let outcome = PermissionApplier::new(&acc, false).apply_record(dir.path(), &record("gone/f.txt", 0o644));
        match outcome {
            EntryOutcome::Skipped(stale) => assert_eq!(stale.path, dir.path().join("gone/f.txt")),
            other => panic!("expected stale skip, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_apply_record_unreadable_parent_fails_not_stale() -> Result<(), Box<dyn std::error::Error>> {
        if current_ids().0 == 0 {
            // root bypasses directory permission checks
            return Ok(());
        }
        let dir = tempdir()?;
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked)?;
        std::fs::write(locked.join("f.txt"), b"x")?;
        fsx::set_unix_permissions(&locked, Mode::new(0o000))?;

        let acc = accessor();
        let outcome = PermissionApplier::new(&acc, false).apply_record(dir.path(), &record("locked/f.txt", 0o644));
        fsx::set_unix_permissions(&locked, Mode::new(0o755))?;
        match outcome {
            EntryOutcome::Failed(EntryError::Read { path, source }) => {
                assert_eq!(path, locked.join("f.txt"));
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("expected read failure, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_apply_record_sets_mode() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"x")?;
        fsx::set_unix_permissions(&file, Mode::new(0o600))?;

        let acc = accessor();
        let outcome = PermissionApplier::new(&acc, false).apply_record(dir.path(), &record("f.txt", 0o640));
        assert!(matches!(outcome, EntryOutcome::Applied(_)));
        assert_eq!(fsx::stat_no_follow(&file)?.mode, Mode::new(0o640));
        Ok(())
    }

    #[test]
    fn test_apply_fixed_uses_kind() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub)?;
        fsx::set_unix_permissions(&sub, Mode::new(0o700))?;
        let file = sub.join("f.txt");
        std::fs::write(&file, b"x")?;
        fsx::set_unix_permissions(&file, Mode::new(0o600))?;

        let acc = accessor();
        let applier = PermissionApplier::new(&acc, false);
        let policy = FixPolicy::for_current_user();
        for (path, kind) in [(&sub, EntryKind::Dir), (&file, EntryKind::File)] {
            let entry = WalkEntry { path: path.clone(), depth: 1, kind };
            assert!(matches!(applier.apply_fixed(&entry, &policy), EntryOutcome::Applied(_)));
        }
        assert_eq!(fsx::stat_no_follow(&sub)?.mode, Mode::new(0o755));
        assert_eq!(fsx::stat_no_follow(&file)?.mode, Mode::new(0o644));
        Ok(())
    }
}
