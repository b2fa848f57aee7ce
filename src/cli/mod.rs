use crate::common::Mode;
use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// More output (-v debug, -vv trace). RUST_LOG overrides this.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print the run summary as JSON on stdout.
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Record mode, owner and group of every entry under a directory.
    Collect {
        /// Directory to snapshot. A leading `~` is expanded.
        #[arg(long, value_name = "DIR")]
        base_dir: PathBuf,

        /// Where to write the snapshot.
        #[arg(long, value_name = "FILE")]
        output_file: PathBuf,

        /// Log what would be collected without writing the snapshot.
        #[arg(long)]
        dry_run: bool,

        /// Descend into symlinked directories instead of recording the link only.
        /// Entries reached through a link are recorded but `restore` will not apply them.
        #[arg(long)]
        follow_symlinks: bool,
    },

    /// Re-apply a snapshot onto a directory tree.
    Restore {
        /// Directory the snapshot paths are relative to. A leading `~` is expanded.
        #[arg(long, value_name = "DIR")]
        base_dir: PathBuf,

        /// Snapshot written by `collect`.
        #[arg(long, value_name = "FILE")]
        file: PathBuf,

        /// Log the changes without making them.
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        guard: GuardArgs,
    },

    /// Reset every entry to fixed modes, owned by the invoking user.
    Fix {
        /// Directory to normalize. A leading `~` is expanded.
        #[arg(long, value_name = "DIR")]
        base_dir: PathBuf,

        /// Log the changes without making them.
        #[arg(long)]
        dry_run: bool,

        /// Mode for files and other non-directories (octal).
        #[arg(long, value_name = "OCTAL", default_value = "644")]
        file_mode: Mode,

        /// Mode for directories (octal).
        #[arg(long, value_name = "OCTAL", default_value = "755")]
        dir_mode: Mode,

        #[command(flatten)]
        guard: GuardArgs,
    },
}

#[derive(ClapArgs, Clone, Debug, Default)]
pub struct GuardArgs {
    /// Additional directory the run must not touch. Repeatable; also read from PERMSNAP_PROTECT.
    #[arg(long = "protect", value_name = "DIR")]
    pub protect: Vec<PathBuf>,
}

/// Parses command-line arguments using `clap`.
pub fn run() -> Args {
    Args::parse()
}
