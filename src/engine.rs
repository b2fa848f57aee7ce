//! # Collect / restore / fix workflows
//!
//! ```text
//! collect: validate base -> walk -> read -> snapshot -> encode -> write
//! restore: validate base -> guard -> open + decode -> apply per record
//! fix:     validate base -> guard -> walk -> apply fixed targets
//! ```
//!
//! Only a bad base directory, an unreadable or unwritable snapshot file and a
//! guard rejection stop a run. Everything else is a per-entry outcome that is
//! reported to the sink and counted in the returned [`Summary`].

use crate::accessor::MetadataAccessor;
use crate::apply::{EntryOutcome, FixPolicy, PermissionApplier};
use crate::codec;
use crate::common::{PathRecord, RelPath, Snapshot};
use crate::error::{EntryError, PermsnapError, Result};
use crate::guard::SafetyGuard;
use crate::report::{Event, EventSink, Operation, Summary};
use crate::walk::{TreeWalker, WalkEntry};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, Default)]
pub struct CollectOptions {
    /// Report records without writing the snapshot file.
    pub dry_run: bool,
    /// Descend into symlinked directories.
    pub follow_symlinks: bool,
}

/// Checks that `path` is an existing directory and returns its canonical form.
pub fn validate_base_dir(path: &Path) -> Result<PathBuf> {
    let configuration = |reason: String| PermsnapError::Configuration {
        path: path.to_path_buf(),
        reason,
    };
    let meta = std::fs::metadata(path).map_err(|e| configuration(e.to_string()))?;
    if !meta.is_dir() {
        return Err(configuration("not a directory".into()));
    }
    path.canonicalize().map_err(|e| configuration(e.to_string()))
}

pub struct Engine<'a, A: ?Sized, S> {
    accessor: &'a A,
    guard: &'a SafetyGuard,
    sink: S,
}

impl<'a, A, S> Engine<'a, A, S>
where
    A: MetadataAccessor + ?Sized,
    S: EventSink,
{
    pub fn new(accessor: &'a A, guard: &'a SafetyGuard, sink: S) -> Self {
        Self {
            accessor,
            guard,
            sink,
        }
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn finish(&mut self, summary: Summary) -> Summary {
        self.sink.event(Event::Finished(&summary));
        summary
    }

    fn record_for(&self, base: &Path, entry: &WalkEntry) -> std::result::Result<PathRecord, EntryError> {
        let relative_path =
            RelPath::from_base(base, &entry.path).map_err(|reason| EntryError::Path {
                path: entry.path.clone(),
                reason,
            })?;
        let state = self.accessor.read(&entry.path)?;
        let record = PathRecord {
            relative_path,
            mode: state.mode,
            owner: state.owner,
            group: state.group,
        };
        codec::check_record(&record).map_err(|source| EntryError::Unencodable {
            path: entry.path.clone(),
            source,
        })?;
        Ok(record)
    }

    /// Captures the permission state of every entry under `base_dir` into `destination`.
    pub fn collect(
        &mut self,
        base_dir: &Path,
        destination: &Path,
        options: &CollectOptions,
    ) -> Result<Summary> {
        let base = validate_base_dir(base_dir)?;
        self.sink.event(Event::Started {
            operation: Operation::Collect,
            base_dir: &base,
            dry_run: options.dry_run,
        });
        let mut summary = Summary::new(Operation::Collect, &base, options.dry_run);

        let mut snapshot = Snapshot::new();
        let walker = TreeWalker::new(&base).follow_symlinks(options.follow_symlinks);
        for entry in walker {
            let record = entry.and_then(|entry| self.record_for(&base, &entry));
            match record {
                Ok(record) => {
                    self.sink.event(Event::Collected {
                        record: &record,
                        dry_run: options.dry_run,
                    });
                    // Following symlinks can reach the same entry twice; keep the first.
                    if snapshot.push(record).is_err() {
                        summary.skipped += 1;
                    }
                }
                Err(err) => {
                    self.sink.event(Event::ReadFailed(&err));
                    summary.failed += 1;
                }
            }
        }
        summary.recorded = snapshot.len();

        if !options.dry_run {
            write_snapshot(&snapshot, destination)?;
        }
        Ok(self.finish(summary))
    }

    /// Re-applies the snapshot at `source` onto the tree under `base_dir`.
    pub fn restore(&mut self, base_dir: &Path, source: &Path, dry_run: bool) -> Result<Summary> {
        let base = validate_base_dir(base_dir)?;
        self.guard.ensure_allowed(&base)?;

        let file = File::open(source).map_err(|e| PermsnapError::SnapshotOpen {
            path: source.to_path_buf(),
            source: e,
        })?;
        let decoded = codec::decode(BufReader::new(file)).map_err(|e| {
            PermsnapError::SnapshotOpen {
                path: source.to_path_buf(),
                source: e,
            }
        })?;

        self.sink.event(Event::Started {
            operation: Operation::Restore,
            base_dir: &base,
            dry_run,
        });
        let mut summary = Summary::new(Operation::Restore, &base, dry_run);
        for diag in &decoded.diagnostics {
            self.sink.event(Event::Malformed(diag));
            summary.skipped += 1;
        }
        summary.recorded = decoded.snapshot.len();

        let applier = PermissionApplier::new(self.accessor, dry_run);
        for record in decoded.snapshot {
            let outcome = applier.apply_record(&base, &record);
            self.sink.event(Event::Outcome(&outcome));
            summary.tally(&outcome);
        }
        Ok(self.finish(summary))
    }

    /// Forces every entry under `base_dir` to the modes and owner in `policy`.
    pub fn fix(&mut self, base_dir: &Path, policy: &FixPolicy, dry_run: bool) -> Result<Summary> {
        let base = validate_base_dir(base_dir)?;
        self.guard.ensure_allowed(&base)?;

        self.sink.event(Event::Started {
            operation: Operation::Fix,
            base_dir: &base,
            dry_run,
        });
        let mut summary = Summary::new(Operation::Fix, &base, dry_run);
        let applier = PermissionApplier::new(self.accessor, dry_run);
        for entry in TreeWalker::new(&base) {
            let outcome = match entry {
                Ok(entry) => applier.apply_fixed(&entry, policy),
                Err(err) => EntryOutcome::Failed(err),
            };
            self.sink.event(Event::Outcome(&outcome));
            summary.tally(&outcome);
        }
        Ok(self.finish(summary))
    }
}

/// Writes the snapshot next to `destination` and renames it into place.
/// The file comes from `NamedTempFile`, so it ends up with mode 0600.
fn write_snapshot(snapshot: &Snapshot, destination: &Path) -> Result<()> {
    let write_error = |e: std::io::Error| PermsnapError::SnapshotWrite {
        path: destination.to_path_buf(),
        source: e,
    };
    let parent = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let tmp = NamedTempFile::new_in(&parent).map_err(write_error)?;
    let mut writer = BufWriter::new(tmp);
    codec::encode(snapshot, &mut writer).map_err(|e| match e {
        crate::error::CodecError::Io(io) => write_error(io),
        crate::error::CodecError::Unencodable(err) => write_error(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            err,
        )),
    })?;
    writer.flush().map_err(write_error)?;
    let tmp = writer.into_inner().map_err(|e| write_error(e.into_error()))?;
    tmp.persist(destination).map_err(|e| write_error(e.error))?;
    Ok(())
}
