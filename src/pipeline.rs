//! Replicate, match, and instrument.
//!
//! Copies the source tree to the destination, finds the script files in the
//! destination copy, and rewrites each one in place. The first two stages are
//! all-or-nothing. The last stage isolates files from each other: a file that
//! cannot be read, decoded, or written is recorded in the [`Report`] and the
//! rest of the batch carries on.

use crate::error::{BlanketError, IoContext, Result};
use crate::group::{DEFAULT_OPEN_FILES, Throttle};
use crate::instrument::instrument_with;
use crate::matcher::{compile, find_matching_with};
use crate::registry::RegistrySyntax;
use crate::replicate::{replicate_with, resolve};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Pattern selecting the files to instrument, tested against the full path.
pub const DEFAULT_PATTERN: &str = r"\.js$";

/// Pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Regular expression a destination path must match to be instrumented.
    pub pattern: String,
    /// Registry expression used by the injected code.
    pub registry: RegistrySyntax,
    /// Upper bound on files and directory listings open at once, per stage.
    pub max_open_files: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PATTERN.to_string(),
            registry: RegistrySyntax::default(),
            max_open_files: DEFAULT_OPEN_FILES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstrumentedFile {
    pub path: PathBuf,
    pub lines: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of the instrumentation stage. Both lists are sorted by path.
#[derive(Debug, Default, Serialize)]
pub struct Report {
    pub instrumented: Vec<InstrumentedFile>,
    pub failed: Vec<FailedFile>,
}

impl Report {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs the pipeline with default [`Options`].
pub async fn process(source: &Path, destination: &Path) -> Result<Report> {
    process_with(source, destination, &Options::default()).await
}

/// Runs the pipeline.
///
/// Relative paths are resolved against the working directory and `..` is
/// collapsed, so registry keys are always absolute and clean. Fails if the
/// pattern is invalid, if replication fails, or if matching fails. Per-file
/// instrumentation failures only show up in the report.
pub async fn process_with(source: &Path, destination: &Path, options: &Options) -> Result<Report> {
    let regex = compile(&options.pattern)?;
    let source = resolve(source)?;
    let destination = resolve(destination)?;
    let (source, destination) = (source.as_path(), destination.as_path());
    let throttle = Throttle::new(options.max_open_files);

    replicate_with(source, destination, &throttle).await?;
    tracing::info!(
        source = %source.display(),
        destination = %destination.display(),
        "replicated tree"
    );

    let files = find_matching_with(destination, &regex, true, &throttle).await?;
    tracing::info!(count = files.len(), pattern = %options.pattern, "matched files");

    let syntax = Arc::new(options.registry.clone());
    let mut tasks = JoinSet::new();
    for path in files {
        let syntax = Arc::clone(&syntax);
        let throttle = throttle.clone();
        tasks.spawn(async move {
            let outcome = async {
                let _permit = throttle.acquire().await?;
                instrument_file(&path, &syntax).await
            }
            .await;
            (path, outcome)
        });
    }

    let mut report = Report::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((path, Ok(lines))) => {
                tracing::debug!(path = %path.display(), lines, "instrumented");
                report.instrumented.push(InstrumentedFile { path, lines });
            }
            Ok((path, Err(err))) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping file");
                report.failed.push(FailedFile {
                    path,
                    reason: err.to_string(),
                });
            }
            // The path went down with the task; only the panic message is left.
            Err(join_err) => {
                tracing::warn!(error = %join_err, "instrumentation task failed");
                report.failed.push(FailedFile {
                    path: PathBuf::new(),
                    reason: BlanketError::from(join_err).to_string(),
                });
            }
        }
    }

    report.instrumented.sort_by(|a, b| a.path.cmp(&b.path));
    report.failed.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::info!(
        instrumented = report.instrumented.len(),
        failed = report.failed.len(),
        "instrumentation finished"
    );
    Ok(report)
}

/// Rewrites one file in place. Returns the number of lines instrumented.
///
/// The file's own path, as given, is the registry key.
pub async fn instrument_file(path: &Path, syntax: &RegistrySyntax) -> Result<usize> {
    let bytes = tokio::fs::read(path).await.fs_context("read", path)?;
    let text = String::from_utf8(bytes).map_err(|e| {
        BlanketError::fs(
            "decode",
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        )
    })?;

    let out = instrument_with(syntax, &path.to_string_lossy(), &text);
    tokio::fs::write(path, out.text)
        .await
        .fs_context("write", path)?;
    Ok(out.lines)
}
