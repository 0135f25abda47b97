//! Pattern-based recursive file discovery.
//!
//! Walks a directory tree and collects every path whose full path string
//! matches a regular expression. Subdirectories are always descended into;
//! `exclude_directories` only controls whether a matching directory's own
//! path is reported. The order of the returned paths depends on how sibling
//! branches race and must not be relied upon.

use crate::error::{BlanketError, IoContext, Result};
use crate::group::{ErrorLatch, TaskGroup, Throttle, latched};
use regex::Regex;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::fs;

type Listing = Pin<Box<dyn Future<Output = Result<Vec<PathBuf>>> + Send>>;

/// Compiles `pattern`, failing with [`BlanketError::InvalidPattern`].
pub fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| BlanketError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Returns every path under `dir` whose full path matches `pattern`.
///
/// The pattern is compiled before any filesystem access, so a bad pattern
/// fails without touching `dir`. Any stat or listing failure fails the whole
/// call with the first error observed.
pub async fn find_matching_files(
    dir: &Path,
    pattern: &str,
    exclude_directories: bool,
) -> Result<Vec<PathBuf>> {
    let regex = compile(pattern)?;
    find_matching_with(dir, &regex, exclude_directories, &Throttle::default()).await
}

/// Like [`find_matching_files`] with an already compiled pattern.
///
/// At most as many directories as `throttle` allows are listed at once.
pub async fn find_matching_with(
    dir: &Path,
    regex: &Regex,
    exclude_directories: bool,
    throttle: &Throttle,
) -> Result<Vec<PathBuf>> {
    let walker = Walker {
        regex: regex.clone(),
        exclude_directories,
        throttle: throttle.clone(),
    };
    let matches = latched(|latch| walk(dir.to_path_buf(), Arc::new(walker), latch)).await?;

    tracing::debug!(
        dir = %dir.display(),
        matches = matches.len(),
        "finished matching"
    );
    Ok(matches)
}

fn is_match(regex: &Regex, path: &Path) -> bool {
    regex.is_match(&path.to_string_lossy())
}

/// Settings shared by every branch of one walk.
struct Walker {
    regex: Regex,
    exclude_directories: bool,
    throttle: Throttle,
}

fn walk(dir: PathBuf, walker: Arc<Walker>, latch: Arc<ErrorLatch>) -> Listing {
    Box::pin(async move {
        let permit = walker.throttle.acquire().await?;
        let mut entries = fs::read_dir(&dir).await.fs_context("list", &dir)?;

        let mut found = Vec::new();
        let mut subdirs = TaskGroup::new(Arc::clone(&latch));

        while let Some(entry) = entries.next_entry().await.fs_context("list", &dir)? {
            if latch.is_tripped() {
                return Ok(Vec::new());
            }

            let path = entry.path();
            let meta = fs::symlink_metadata(&path)
                .await
                .fs_context("lstat", &path)?;

            if meta.is_dir() {
                if !walker.exclude_directories && is_match(&walker.regex, &path) {
                    found.push(path.clone());
                }
                subdirs.spawn(walk(
                    path,
                    Arc::clone(&walker),
                    Arc::clone(subdirs.latch()),
                ));
            } else if is_match(&walker.regex, &path) {
                found.push(path);
            }
        }
        drop(entries);
        drop(permit);

        match subdirs.join().await {
            Some(nested) => {
                found.extend(nested.into_iter().flatten());
                Ok(found)
            }
            None => Ok(Vec::new()),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    fn fixture() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("lib/deep/deeper")).unwrap();
        std::fs::create_dir_all(root.join("vendor.js")).unwrap();
        std::fs::create_dir_all(root.join("empty")).unwrap();
        for file in [
            "index.js",
            "README.md",
            "lib/a.js",
            "lib/a.json",
            "lib/deep/b.js",
            "lib/deep/deeper/c.js",
            "lib/deep/deeper/notes.txt",
            "vendor.js/inner.js",
        ] {
            std::fs::write(root.join(file), "// x\n").unwrap();
        }
        tmp
    }

    fn relative(root: &Path, paths: Vec<PathBuf>) -> BTreeSet<String> {
        paths
            .into_iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().into_owned())
            .collect()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn finds_matching_files_recursively() {
        let tmp = fixture();
        let found = find_matching_files(tmp.path(), r"\.js$", true).await.unwrap();
        assert_eq!(
            relative(tmp.path(), found),
            set(&[
                "index.js",
                "lib/a.js",
                "lib/deep/b.js",
                "lib/deep/deeper/c.js",
                "vendor.js/inner.js",
            ])
        );
    }

    #[tokio::test]
    async fn includes_matching_directories_when_not_excluded() {
        let tmp = fixture();
        let found = find_matching_files(tmp.path(), r"\.js$", false).await.unwrap();
        let found = relative(tmp.path(), found);
        assert!(found.contains("vendor.js"));
        assert!(found.contains("vendor.js/inner.js"));
        assert_eq!(found.len(), 6);
    }

    #[tokio::test]
    async fn match_all_returns_every_non_directory() {
        let tmp = fixture();
        let found = find_matching_files(tmp.path(), ".*", true).await.unwrap();

        let expected: BTreeSet<PathBuf> = WalkDir::new(tmp.path())
            .min_depth(1)
            .into_iter()
            .map(|e| e.unwrap())
            .filter(|e| !e.file_type().is_dir())
            .map(|e| e.into_path())
            .collect();
        let found: BTreeSet<PathBuf> = found.into_iter().collect();
        assert_eq!(found, expected);
    }

    #[tokio::test]
    async fn pattern_is_tested_against_the_full_path() {
        let tmp = fixture();
        let found = find_matching_files(tmp.path(), "deep/", true).await.unwrap();
        assert_eq!(
            relative(tmp.path(), found),
            set(&["lib/deep/b.js", "lib/deep/deeper/c.js", "lib/deep/deeper/notes.txt"])
        );
    }

    #[tokio::test]
    async fn empty_directory_yields_nothing() {
        let tmp = TempDir::new().unwrap();
        let found = find_matching_files(tmp.path(), ".*", false).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn invalid_pattern_fails_before_io() {
        let err = find_matching_files(Path::new("/definitely/not/here"), "(unclosed", true)
            .await
            .unwrap_err();
        assert!(matches!(err, BlanketError::InvalidPattern { .. }));
    }

    #[tokio::test]
    async fn missing_directory_is_a_file_system_error() {
        let tmp = TempDir::new().unwrap();
        let err = find_matching_files(&tmp.path().join("gone"), ".*", true)
            .await
            .unwrap_err();
        assert!(matches!(err, BlanketError::FileSystem { action: "list", .. }));
    }

    /// Builds `levels` nested directories with long names under `root`.
    fn long_chain(root: &Path, levels: usize) -> PathBuf {
        let name = "n".repeat(200);
        let mut path = root.to_path_buf();
        for _ in 0..levels {
            path.push(&name);
        }
        std::fs::create_dir_all(&path).unwrap();
        path
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn failure_below_the_root_discards_sibling_results() {
        let tmp = fixture();
        // Moving one chain inside another yields a tree whose deepest paths
        // exceed PATH_MAX, so listing below the root fails while the
        // fixture's own subtrees match normally.
        let outer = long_chain(&tmp.path().join("long"), 10);
        long_chain(&tmp.path().join("staging"), 12);
        std::fs::rename(tmp.path().join("staging"), outer.join("staging")).unwrap();

        let err = find_matching_files(tmp.path(), r"\.js$", true)
            .await
            .unwrap_err();
        match err {
            BlanketError::FileSystem { path, source, .. } => {
                assert!(path.starts_with(tmp.path().join("long")));
                assert!(path.as_os_str().len() >= 4096);
                assert_eq!(source.raw_os_error(), Some(36));
            }
            other => panic!("expected one FileSystem error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn single_permit_walks_the_whole_tree() {
        let tmp = fixture();
        let regex = compile(r"\.js$").unwrap();
        let found = find_matching_with(tmp.path(), &regex, true, &Throttle::new(1))
            .await
            .unwrap();
        assert_eq!(found.len(), 5);
    }

    #[test]
    fn compile_reports_the_pattern() {
        match compile("[") {
            Err(BlanketError::InvalidPattern { pattern, .. }) => assert_eq!(pattern, "["),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
