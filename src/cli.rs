//! Command-line interface definitions.
//!
//! The tool takes exactly two positional paths: the tree to copy and the
//! directory that receives the instrumented copy. Everything else is an
//! optional flag mapping onto [`Options`].

use blanket::group::DEFAULT_OPEN_FILES;
use blanket::pipeline::{DEFAULT_PATTERN, Options};
use blanket::registry::{DEFAULT_REGISTRY, RegistrySyntax};
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Wrap your javascript in code coverage magic.
///
/// Copies SOURCE to DESTINATION and rewrites every matching file in the copy
/// so each line counts its own executions. Most people should run:
/// `blanket lib lib-cov`.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Directory to instrument. Never modified.
    pub source: PathBuf,

    /// Directory that receives the instrumented copy. Must not be inside SOURCE.
    pub destination: PathBuf,

    /// Regular expression selecting files to instrument, matched against the full path.
    #[arg(long, default_value = DEFAULT_PATTERN)]
    pub pattern: String,

    /// Global expression that holds the counter registry at runtime.
    #[arg(long, default_value = DEFAULT_REGISTRY)]
    pub registry: String,

    /// Maximum number of files and directory listings held open at once.
    #[arg(long, default_value_t = DEFAULT_OPEN_FILES, value_parser = parse_limit)]
    pub max_open_files: usize,

    /// Emit a JSON report instead of human-readable output.
    #[arg(long)]
    pub json: bool,

    /// Log more (-v for stage progress, -vv for every file).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn options(&self) -> Options {
        Options {
            pattern: self.pattern.clone(),
            registry: RegistrySyntax::new(&self.registry),
            max_open_files: self.max_open_files,
        }
    }

    /// Default log filter for the chosen verbosity.
    pub fn log_directive(&self) -> &'static str {
        match self.verbose {
            0 => "blanket=warn",
            1 => "blanket=info",
            _ => "blanket=debug",
        }
    }
}

fn parse_limit(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(limit) => Ok(limit),
        Err(e) => Err(e.to_string()),
    }
}
