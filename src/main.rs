//! blanket: copy a source tree and instrument its scripts for line coverage.
//!
//! Replicates SOURCE into DESTINATION, then rewrites every file in the copy
//! whose path matches `--pattern` so that each executed line bumps a counter
//! in a process-wide registry. Files that fail to instrument are reported and
//! skipped; anything else that goes wrong ends the run with a non-zero exit.

mod cli;

use anyhow::{Context, Result};
use blanket::pipeline::{self, Report};
use blanket::replicate::resolve;
use clap::Parser;
use cli::Args;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args)?;

    let source = resolve(&args.source)
        .with_context(|| format!("Failed to resolve {}", args.source.display()))?;
    let destination = resolve(&args.destination)
        .with_context(|| format!("Failed to resolve {}", args.destination.display()))?;

    let report = pipeline::process_with(&source, &destination, &args.options())
        .await
        .with_context(|| {
            format!(
                "Failed to instrument {} into {}",
                source.display(),
                destination.display()
            )
        })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn init_tracing(args: &Args) -> Result<()> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::try_new(args.log_directive())
            .context("Failed to build log filter")?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn print_report(report: &Report) {
    for failed in &report.failed {
        eprintln!(
            "{} {} {}",
            "warn:".yellow().bold(),
            failed.path.display(),
            format!("({})", failed.reason).dimmed()
        );
    }

    println!(
        "{} Done! Instrumented {} file(s)",
        "ok:".green().bold(),
        report.instrumented.len()
    );
    if !report.is_clean() {
        println!(
            "{} {} file(s) left uninstrumented",
            "hint:".cyan().bold(),
            report.failed.len()
        );
    }
}
