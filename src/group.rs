//! First-failure-wins fan-out and fan-in.
//!
//! A recursive walk spawns one branch per directory entry. Every branch of a
//! single top-level call shares one [`ErrorLatch`]; each directory joins its
//! own children through a [`TaskGroup`]. The latch records the first error any
//! branch reports and from then on every other outcome is discarded. Branches
//! already in flight are left to finish, they are never aborted.

use crate::error::{BlanketError, Result};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::task::JoinSet;

/// Default cap on branches holding file descriptors at the same time.
pub const DEFAULT_OPEN_FILES: usize = 64;

/// One-shot guard shared by every branch of a fan-out tree.
///
/// Transitions from closed to tripped at most once. Only the error passed to
/// the tripping call is kept.
#[derive(Debug, Default)]
pub struct ErrorLatch {
    tripped: AtomicBool,
    first: Mutex<Option<BlanketError>>,
}

impl ErrorLatch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    /// Records `err` if the latch is still closed.
    ///
    /// Returns `true` when this call tripped the latch. Later errors are dropped.
    pub fn trip(&self, err: BlanketError) -> bool {
        let mut first = self.first.lock().unwrap_or_else(PoisonError::into_inner);
        if first.is_some() {
            tracing::trace!(error = %err, "latch already tripped, discarding error");
            return false;
        }
        *first = Some(err);
        self.tripped.store(true, Ordering::Release);
        true
    }

    /// Takes the recorded error out of the latch. The latch stays tripped.
    pub fn take(&self) -> Option<BlanketError> {
        self.first
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Caps how many branches of a walk hold open files at once.
///
/// Spawning stays unbounded; only the sections that open descriptors (a
/// directory listing, a file copy, a read-rewrite-write) wait for a permit.
#[derive(Debug, Clone)]
pub struct Throttle {
    permits: Arc<Semaphore>,
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(DEFAULT_OPEN_FILES)
    }
}

impl Throttle {
    /// A limit of zero is treated as one.
    pub fn new(limit: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limit.max(1))),
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        Ok(self.permits.acquire().await?)
    }
}

/// Joins the children of one directory.
///
/// The inner join set doubles as the outstanding counter: `join` returns once
/// it drains, and returns immediately when nothing was spawned. Dropping a
/// group without joining it detaches its branches instead of aborting them.
pub struct TaskGroup<T: 'static> {
    latch: Arc<ErrorLatch>,
    tasks: JoinSet<Result<T>>,
}

impl<T> TaskGroup<T>
where
    T: Send + 'static,
{
    pub fn new(latch: Arc<ErrorLatch>) -> Self {
        Self {
            latch,
            tasks: JoinSet::new(),
        }
    }

    pub fn latch(&self) -> &Arc<ErrorLatch> {
        &self.latch
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Starts a branch. Nothing is spawned once the latch has tripped.
    pub fn spawn<F>(&mut self, branch: F)
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        if self.latch.is_tripped() {
            return;
        }
        self.tasks.spawn(branch);
    }

    /// Waits for every branch to report.
    ///
    /// Failed branches trip the shared latch. Returns the successful outputs
    /// in completion order, or `None` if the latch is tripped by the time the
    /// group drains (in which case the outputs are meaningless to the caller).
    pub async fn join(mut self) -> Option<Vec<T>> {
        let mut outputs = Vec::with_capacity(self.tasks.len());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Ok(value)) => outputs.push(value),
                Ok(Err(err)) => {
                    self.latch.trip(err);
                }
                Err(join_err) => {
                    self.latch.trip(join_err.into());
                }
            }
        }

        if self.latch.is_tripped() {
            None
        } else {
            Some(outputs)
        }
    }
}

impl<T: 'static> Drop for TaskGroup<T> {
    // Dropping a join set aborts its tasks. Branches must run to completion.
    fn drop(&mut self) {
        self.tasks.detach_all();
    }
}

/// Runs a top-level fan-out under a fresh latch.
///
/// Whatever error tripped the latch first is the call's error, even if the
/// root branch itself returned `Ok` or failed later.
pub async fn latched<T, F, Fut>(root: F) -> Result<T>
where
    F: FnOnce(Arc<ErrorLatch>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let latch = ErrorLatch::new();
    match root(Arc::clone(&latch)).await {
        Ok(value) => match latch.take() {
            Some(err) => Err(err),
            None => Ok(value),
        },
        Err(err) => Err(latch.take().unwrap_or(err)),
    }
}
