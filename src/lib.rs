//! # permsnap Core Library
//!
//! Snapshots and restores POSIX permission metadata (mode bits, owning user,
//! owning group) for a whole directory tree, and normalizes trees to fixed
//! modes. Mutating runs are gated by a guard that refuses the home directory
//! and system directories.
//!
//! ## Key Modules
//!
//! - [`walk`]: physical pre-order traversal of a tree.
//! - [`accessor`]: reading and applying one entry's permission state.
//! - [`codec`]: the line-oriented snapshot format.
//! - [`guard`]: the safety check run before `restore` and `fix`.
//! - [`apply`]: per-entry application of recorded or fixed targets.
//! - [`engine`]: the `collect`, `restore` and `fix` workflows.
//!
//! ## Examples
//!
//! ```no_run
//! use permsnap::accessor::HostAccessor;
//! use permsnap::engine::{CollectOptions, Engine};
//! use permsnap::guard::SafetyGuard;
//! use permsnap::names::SystemNames;
//! use permsnap::report::TracingSink;
//! use std::path::Path;
//!
//! let accessor = HostAccessor::new(SystemNames);
//! let guard = SafetyGuard::system();
//! let mut engine = Engine::new(&accessor, &guard, TracingSink);
//! engine.collect(Path::new("/srv/app"), Path::new("perms.txt"), &CollectOptions::default())?;
//! engine.restore(Path::new("/srv/app"), Path::new("perms.txt"), true)?;
//! # Ok::<(), permsnap::PermsnapError>(())
//! ```

#[cfg(not(unix))]
compile_error!("permsnap only supports Unix-like platforms");

pub mod accessor;
pub mod apply;
pub mod cli;
pub mod cli_runner;
pub mod codec;
pub mod common;
pub mod engine;
pub mod error;
pub use error::PermsnapError;

// POSIX permission syscalls
pub mod fsx;

pub mod guard;
pub mod names;
pub mod report;
pub mod walk;
