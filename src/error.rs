//! Error taxonomy for replication, matching, and instrumentation.
//!
//! Every fallible operation in the library returns [`BlanketError`]. Within a
//! single fan-out (one [`replicate`](crate::replicate::replicate) or one
//! [`find_matching_files`](crate::matcher::find_matching_files) call) only the
//! first error raised by any branch is ever returned; see [`crate::group`].

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlanketError {
    /// The destination tree would be written inside the source tree.
    #[error(
        "destination '{}' is inside source '{}'",
        .destination.display(),
        .source_root.display()
    )]
    PathConflict {
        source_root: PathBuf,
        destination: PathBuf,
    },

    /// A path that must be a directory is missing or is something else.
    #[error("'{}' is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// A directory to be created is already present. Replication swallows this.
    #[error("'{}' already exists", .0.display())]
    AlreadyExists(PathBuf),

    /// Any other OS-level failure.
    #[error("failed to {action} '{}': {source}", .path.display())]
    FileSystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The open-file permit pool was closed while a branch waited on it.
    #[error("file permit pool closed: {0}")]
    Permits(#[from] tokio::sync::AcquireError),

    /// A spawned branch panicked or was aborted by the runtime.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, BlanketError>;

impl BlanketError {
    /// Wraps an I/O error with the action and path that produced it.
    pub fn fs(action: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        BlanketError::FileSystem {
            action,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Attaches an action and path to an `io::Result`.
pub(crate) trait IoContext<T> {
    fn fs_context(self, action: &'static str, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn fs_context(self, action: &'static str, path: &Path) -> Result<T> {
        self.map_err(|e| BlanketError::fs(action, path, e))
    }
}
