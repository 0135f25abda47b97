//! Recursive tree replication.
//!
//! Copies the directory structure and the bytes of every file under a source
//! root into a destination root. Each directory entry is handled by its own
//! branch; siblings run concurrently and in no particular order. A single
//! [`ErrorLatch`] spans the whole call, so the first failure anywhere in the
//! tree is the only one returned. Branches wait on a shared [`Throttle`]
//! before opening anything, which keeps wide trees under the descriptor limit.

use crate::error::{BlanketError, IoContext, Result};
use crate::group::{ErrorLatch, TaskGroup, Throttle, latched};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Component, MAIN_SEPARATOR_STR, Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufReader};

/// Size of the transfer buffer used when streaming file contents.
pub const COPY_BUFFER_SIZE: usize = 64 * 1024;

type Branch = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Copies the tree rooted at `source` into `destination`.
///
/// Fails with [`BlanketError::PathConflict`] when `destination` lies inside
/// `source`, and with [`BlanketError::NotADirectory`] when `source` is not an
/// existing directory. Directories already present in the destination are
/// reused. `source` is never modified.
pub async fn replicate(source: &Path, destination: &Path) -> Result<()> {
    replicate_with(source, destination, &Throttle::default()).await
}

/// Like [`replicate`], drawing open-file permits from `throttle`.
pub async fn replicate_with(source: &Path, destination: &Path, throttle: &Throttle) -> Result<()> {
    let source_root = normalize(&resolve(source)?);
    let destination_root = normalize(&resolve(destination)?);

    if destination_root
        .as_os_str()
        .as_encoded_bytes()
        .starts_with(source_root.as_os_str().as_encoded_bytes())
    {
        return Err(BlanketError::PathConflict {
            source_root,
            destination: destination_root,
        });
    }

    match fs::metadata(&source_root).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(BlanketError::NotADirectory(source_root)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(BlanketError::NotADirectory(source_root));
        }
        Err(e) => return Err(BlanketError::fs("stat", &source_root, e)),
    }

    tracing::debug!(
        source = %source_root.display(),
        destination = %destination_root.display(),
        "replicating tree"
    );

    let throttle = throttle.clone();
    latched(|latch| replicate_entry(source_root, destination_root, latch, throttle)).await
}

/// Makes `path` absolute against the working directory and collapses it.
///
/// No symlinks are followed, so `a/link/..` becomes `a`.
pub fn resolve(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path).fs_context("resolve", path)?;
    Ok(collapse(&absolute))
}

/// Returns `path` collapsed, with exactly one trailing separator.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = collapse(path);
    if !normalized
        .as_os_str()
        .as_encoded_bytes()
        .ends_with(MAIN_SEPARATOR_STR.as_bytes())
    {
        normalized.as_mut_os_string().push(MAIN_SEPARATOR_STR);
    }
    normalized
}

/// Drops `.` components and lets each `..` cancel the component before it.
///
/// `..` never climbs above the root. A relative path keeps the `..` it
/// cannot cancel.
fn collapse(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(Component::ParentDir),
            },
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(Component::CurDir);
    }
    out
}

fn replicate_entry(
    source: PathBuf,
    destination: PathBuf,
    latch: Arc<ErrorLatch>,
    throttle: Throttle,
) -> Branch {
    Box::pin(async move {
        if latch.is_tripped() {
            return Ok(());
        }

        let meta = fs::symlink_metadata(&source)
            .await
            .fs_context("lstat", &source)?;

        if latch.is_tripped() {
            return Ok(());
        }

        if meta.is_dir() {
            replicate_dir(source, destination, latch, throttle).await
        } else {
            let _permit = throttle.acquire().await?;
            copy_file(&source, &destination).await.map(|_| ())
        }
    })
}

async fn replicate_dir(
    source: PathBuf,
    destination: PathBuf,
    latch: Arc<ErrorLatch>,
    throttle: Throttle,
) -> Result<()> {
    match create_dir(&destination).await {
        Ok(()) | Err(BlanketError::AlreadyExists(_)) => {}
        Err(e) => return Err(e),
    }

    let permit = throttle.acquire().await?;
    let mut entries = fs::read_dir(&source)
        .await
        .fs_context("list", &source)?;

    let mut children = TaskGroup::new(Arc::clone(&latch));
    while let Some(entry) = entries
        .next_entry()
        .await
        .fs_context("list", &source)?
    {
        if latch.is_tripped() {
            break;
        }
        let name = entry.file_name();
        children.spawn(replicate_entry(
            source.join(&name),
            destination.join(&name),
            Arc::clone(&latch),
            throttle.clone(),
        ));
    }
    // The listing handle and its permit must not be held across the join.
    drop(entries);
    drop(permit);

    tracing::trace!(dir = %source.display(), children = children.len(), "waiting on children");
    // A tripped latch already holds the error for the top-level caller.
    children.join().await;
    Ok(())
}

/// Creates a single directory, reporting an existing one as `AlreadyExists`.
async fn create_dir(path: &Path) -> Result<()> {
    match fs::create_dir(path).await {
        Ok(()) => {
            tracing::debug!(dir = %path.display(), "created directory");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            Err(BlanketError::AlreadyExists(path.to_path_buf()))
        }
        Err(e) => Err(BlanketError::fs("create directory", path, e)),
    }
}

/// Streams the bytes of `source` into `destination`, truncating any existing file.
///
/// Reads through a [`COPY_BUFFER_SIZE`] buffer. Returns the number of bytes copied.
pub async fn copy_file(source: &Path, destination: &Path) -> Result<u64> {
    let reader = fs::File::open(source).await.fs_context("open", source)?;
    let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, reader);
    let mut writer = fs::File::create(destination)
        .await
        .fs_context("create", destination)?;

    let copied = tokio::io::copy_buf(&mut reader, &mut writer)
        .await
        .fs_context("copy", source)?;
    writer.flush().await.fs_context("flush", destination)?;

    tracing::debug!(
        source = %source.display(),
        destination = %destination.display(),
        bytes = copied,
        "copied file"
    );
    Ok(copied)
}
