//! blanket library for instrumenting script trees with line counters.
//!
//! The workflow has three stages, composed by [`pipeline::process`]:
//!
//! 1. **Replication**: copy the source tree into the destination, byte for byte
//! 2. **Matching**: collect destination files whose full path matches a pattern
//! 3. **Instrumentation**: rewrite each match so every line counts its executions
//!
//! Replication and matching fan out one task per directory entry and join
//! through [`group::TaskGroup`], reporting only the first error of a run.
//! Every stage draws open-file permits from one [`group::Throttle`].
//!
//! # Example
//!
//! ```no_run
//! use blanket::{instrument, pipeline};
//! use std::path::Path;
//!
//! # async fn run() -> blanket::Result<()> {
//! // Copy lib/ to lib-cov/ and instrument every .js file in the copy
//! let report = pipeline::process(Path::new("/work/lib"), Path::new("/work/lib-cov")).await?;
//! for failed in &report.failed {
//!     eprintln!("skipped {}: {}", failed.path.display(), failed.reason);
//! }
//!
//! // Or rewrite a single buffer without touching the filesystem
//! let out = instrument::instrument("/work/lib/a.js", "var x = 1;\n");
//! assert_eq!(out.lines, 1);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod group;
pub mod instrument;
pub mod matcher;
pub mod pipeline;
pub mod registry;
pub mod replicate;

// Re-export commonly used types at crate root
pub use error::{BlanketError, Result};
pub use instrument::Instrumented;
pub use pipeline::{Options, Report};
