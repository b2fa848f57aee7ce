//! Glue between the parsed command line and the engine: logging setup, path
//! expansion, guard configuration and the final summary.

use crate::accessor::HostAccessor;
use crate::apply::FixPolicy;
use crate::cli::{self, Args, Commands, GuardArgs};
use crate::engine::{CollectOptions, Engine};
use crate::guard::SafetyGuard;
use crate::names::{self, SystemNames};
use crate::report::{Summary, TracingSink};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Public entry for running the CLI.
pub fn run_cli_app() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::run();
    init_logging(&args);

    let accessor = HostAccessor::new(SystemNames);
    let summary = match &args.command {
        Commands::Collect {
            base_dir,
            output_file,
            dry_run,
            follow_symlinks,
        } => {
            // collect is read-only and never consults the guard.
            let guard = SafetyGuard::new(None, Vec::<PathBuf>::new());
            let options = CollectOptions {
                dry_run: *dry_run,
                follow_symlinks: *follow_symlinks,
            };
            Engine::new(&accessor, &guard, TracingSink).collect(
                &expand_tilde(base_dir),
                output_file,
                &options,
            )?
        }
        Commands::Restore {
            base_dir,
            file,
            dry_run,
            guard,
        } => {
            let guard = build_guard(guard);
            Engine::new(&accessor, &guard, TracingSink).restore(
                &expand_tilde(base_dir),
                file,
                *dry_run,
            )?
        }
        Commands::Fix {
            base_dir,
            dry_run,
            file_mode,
            dir_mode,
            guard,
        } => {
            let guard = build_guard(guard);
            let policy = FixPolicy {
                file_mode: *file_mode,
                dir_mode: *dir_mode,
                ..FixPolicy::for_current_user()
            };
            Engine::new(&accessor, &guard, TracingSink).fix(
                &expand_tilde(base_dir),
                &policy,
                *dry_run,
            )?
        }
    };

    if args.json {
        print_json(&summary)?;
    }
    Ok(())
}

fn init_logging(args: &Args) {
    let default_level = if args.quiet {
        "warn"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // Ignore the error if a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn build_guard(args: &GuardArgs) -> SafetyGuard {
    SafetyGuard::system()
        .with_env_roots()
        .with_extra_roots(&args.protect)
}

fn print_json(summary: &Summary) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

/// Expands a leading `~` to the invoking user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match names::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}
