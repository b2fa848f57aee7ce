//! Where the engine sends what it did.
//!
//! The engine never logs directly; it hands [`Event`]s to a caller-supplied
//! [`EventSink`]. The CLI uses [`TracingSink`], tests use [`MemorySink`].

use crate::apply::EntryOutcome;
use crate::common::PathRecord;
use crate::error::{EntryError, MalformedRecord};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::Level;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Collect,
    Restore,
    Fix,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Collect => "collect",
            Operation::Restore => "restore",
            Operation::Fix => "fix",
        })
    }
}

/// Counts for one run. Per-entry problems end up here instead of aborting the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub operation: Operation,
    pub base_dir: PathBuf,
    pub dry_run: bool,
    /// Records written (collect) or read (restore).
    pub recorded: usize,
    /// Entries changed, or that would change under dry-run.
    pub applied: usize,
    pub unchanged: usize,
    /// Stale records, plus malformed snapshot lines.
    pub skipped: usize,
    pub failed: usize,
}

impl Summary {
    pub fn new(operation: Operation, base_dir: &Path, dry_run: bool) -> Self {
        Summary {
            operation,
            base_dir: base_dir.to_path_buf(),
            dry_run,
            recorded: 0,
            applied: 0,
            unchanged: 0,
            skipped: 0,
            failed: 0,
        }
    }

    pub fn tally(&mut self, outcome: &EntryOutcome) {
        match outcome {
            EntryOutcome::Applied(_) | EntryOutcome::Simulated(_) => self.applied += 1,
            EntryOutcome::Unchanged(_) => self.unchanged += 1,
            EntryOutcome::Skipped(_) => self.skipped += 1,
            EntryOutcome::Failed(_) => self.failed += 1,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let applied = if self.dry_run { "would change" } else { "changed" };
        write!(
            f,
            "{} finished for {}: {} recorded, {} {}, {} unchanged, {} skipped, {} failed",
            self.operation,
            self.base_dir.display(),
            self.recorded,
            self.applied,
            applied,
            self.unchanged,
            self.skipped,
            self.failed
        )
    }
}

#[derive(Debug)]
pub enum Event<'a> {
    Started {
        operation: Operation,
        base_dir: &'a Path,
        dry_run: bool,
    },
    Collected {
        record: &'a PathRecord,
        dry_run: bool,
    },
    /// An entry that could not be read while collecting.
    ReadFailed(&'a EntryError),
    Malformed(&'a MalformedRecord),
    Outcome(&'a EntryOutcome),
    Finished(&'a Summary),
}

impl Event<'_> {
    /// Log level and human-readable line for this event.
    pub fn render(&self) -> (Level, String) {
        match self {
            Event::Started {
                operation,
                base_dir,
                dry_run,
            } => {
                let suffix = if *dry_run { " (dry-run)" } else { "" };
                (
                    Level::INFO,
                    format!("starting {operation} in {}{suffix}", base_dir.display()),
                )
            }
            Event::Collected { record, dry_run } => {
                let verb = if *dry_run { "dry-run: would collect" } else { "collected" };
                (
                    Level::INFO,
                    format!(
                        "{verb}: {} {} {} {}",
                        record.relative_path, record.mode, record.owner, record.group
                    ),
                )
            }
            Event::ReadFailed(err) => (Level::ERROR, format!("skipping entry: {err}")),
            Event::Malformed(diag) => {
                (Level::WARN, format!("skipping malformed snapshot line {diag}"))
            }
            Event::Outcome(outcome) => match outcome {
                EntryOutcome::Applied(change) => (Level::INFO, format!("updated {change}")),
                EntryOutcome::Simulated(change) => {
                    (Level::INFO, format!("dry-run: would update {change}"))
                }
                EntryOutcome::Unchanged(path) => {
                    (Level::DEBUG, format!("unchanged: {}", path.display()))
                }
                EntryOutcome::Skipped(stale) => (Level::WARN, format!("skipping: {stale}")),
                EntryOutcome::Failed(err) => (Level::ERROR, err.to_string()),
            },
            Event::Finished(summary) => (Level::INFO, summary.to_string()),
        }
    }
}

pub trait EventSink {
    fn event(&mut self, event: Event<'_>);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn event(&mut self, event: Event<'_>) {
        let (level, message) = event.render();
        match level {
            Level::ERROR => tracing::error!("{message}"),
            Level::WARN => tracing::warn!("{message}"),
            Level::INFO => tracing::info!("{message}"),
            Level::DEBUG => tracing::debug!("{message}"),
            _ => tracing::trace!("{message}"),
        }
    }
}

/// Keeps rendered events in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub lines: Vec<(Level, String)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|(_, msg)| msg.as_str())
    }

    pub fn at_level(&self, level: Level) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .filter(move |(l, _)| *l == level)
            .map(|(_, msg)| msg.as_str())
    }
}

impl EventSink for MemorySink {
    fn event(&mut self, event: Event<'_>) {
        self.lines.push(event.render());
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn event(&mut self, event: Event<'_>) {
        (**self).event(event);
    }
}
