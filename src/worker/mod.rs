//! Bounded worker pool with fail-fast cancellation.
//!
//! A [`Pool`] runs at most `N` tasks at once on the tokio runtime. Every task
//! receives a child of the caller's [`CancellationToken`]; the first task to
//! fail cancels that shared scope so that no further task bodies start.
//! Running tasks are never interrupted, they are expected to observe the
//! token they were handed.

use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default number of concurrent fetches.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Errors reported by [`Pool::submit`] and [`Pool::wait`].
#[derive(Debug, Error)]
pub enum PoolError<E> {
    /// The first task failure.
    #[error("{0}")]
    Task(E),

    /// The pool scope or the caller's token was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// A task panicked.
    #[error("task panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text.
        message: String,
    },
}

/// Lifecycle of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting for a slot.
    Queued,
    /// Body executing.
    Running,
    /// Body returned `Ok`.
    Succeeded,
    /// Body returned `Err` or panicked.
    Failed,
    /// Slot granted after the scope was cancelled, or refused at submit.
    Skipped,
}

/// Terminal-state counts for one pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSummary {
    /// Tasks that completed successfully.
    pub succeeded: usize,
    /// Tasks that returned an error or panicked.
    pub failed: usize,
    /// Tasks whose body never ran.
    pub skipped: usize,
}

struct Shared<E> {
    first_error: Mutex<Option<E>>,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

impl<E> Shared<E> {
    const fn new() -> Self {
        Self {
            first_error: Mutex::new(None),
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
        }
    }

    fn fail(&self, error: E, scope: &CancellationToken) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        let mut first = self
            .first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if first.is_none() {
            *first = Some(error);
            scope.cancel();
        }
    }

    fn take_error(&self) -> Option<E> {
        self.first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn summary(&self) -> PoolSummary {
        PoolSummary {
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
        }
    }
}

/// Cancels the scope if the task body unwinds.
struct PanicGuard {
    scope: CancellationToken,
}

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.scope.cancel();
        }
    }
}

/// Bounded-concurrency task executor.
pub struct Pool<E> {
    parent: CancellationToken,
    scope: CancellationToken,
    capacity: usize,
    slots: Arc<Semaphore>,
    tasks: JoinSet<()>,
    shared: Arc<Shared<E>>,
    next_id: usize,
}

impl<E: Send + 'static> Pool<E> {
    /// Creates a pool of `concurrency` slots under `parent`.
    ///
    /// A concurrency below one is treated as one.
    #[must_use]
    pub fn new(parent: &CancellationToken, concurrency: usize) -> Self {
        let capacity = concurrency.max(1);
        Self {
            parent: parent.clone(),
            scope: parent.child_token(),
            capacity,
            slots: Arc::new(Semaphore::new(capacity)),
            tasks: JoinSet::new(),
            shared: Arc::new(Shared::new()),
            next_id: 0,
        }
    }

    /// Number of tasks that may run at once.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Token shared by every task; cancelled by the first failure.
    #[must_use]
    pub const fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    /// Waits for a free slot and starts `task` on it.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Cancelled`] without running `task` when the scope
    /// is cancelled before a slot becomes free.
    pub async fn submit<F, Fut>(&mut self, task: F) -> Result<(), PoolError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        let id = self.next_id;
        self.next_id = id.saturating_add(1);
        debug!(task = id, state = ?TaskState::Queued, "task submitted");

        let acquired = tokio::select! {
            biased;
            () = self.scope.cancelled() => None,
            permit = Arc::clone(&self.slots).acquire_owned() => permit.ok(),
        };
        let Some(permit) = acquired else {
            self.shared.skipped.fetch_add(1, Ordering::SeqCst);
            debug!(task = id, state = ?TaskState::Skipped, "pool cancelled before slot was granted");
            return Err(PoolError::Cancelled);
        };

        let scope = self.scope.clone();
        let shared = Arc::clone(&self.shared);
        self.tasks.spawn(async move {
            let _slot = permit;
            if scope.is_cancelled() {
                shared.skipped.fetch_add(1, Ordering::SeqCst);
                debug!(task = id, state = ?TaskState::Skipped, "slot granted after cancellation");
                return;
            }
            debug!(task = id, state = ?TaskState::Running, "task started");
            let _guard = PanicGuard {
                scope: scope.clone(),
            };
            match task(scope.clone()).await {
                Ok(()) => {
                    shared.succeeded.fetch_add(1, Ordering::SeqCst);
                    debug!(task = id, state = ?TaskState::Succeeded, "task finished");
                }
                Err(error) => {
                    debug!(task = id, state = ?TaskState::Failed, "task failed");
                    shared.fail(error, &scope);
                }
            }
        });
        Ok(())
    }

    /// Joins every task and reports the outcome.
    ///
    /// # Errors
    ///
    /// Returns the first task error, otherwise [`PoolError::Panicked`] if a
    /// task panicked, otherwise [`PoolError::Cancelled`] if the caller's token
    /// fired.
    pub async fn wait(mut self) -> Result<PoolSummary, PoolError<E>> {
        let mut panic_message = None;
        while let Some(joined) = self.tasks.join_next().await {
            let Err(join_error) = joined else {
                continue;
            };
            if join_error.is_panic() {
                self.shared.failed.fetch_add(1, Ordering::SeqCst);
                self.scope.cancel();
                let message = describe_panic(join_error.into_panic());
                panic_message.get_or_insert(message);
            }
        }

        let summary = self.shared.summary();
        debug!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            "pool drained"
        );

        if let Some(error) = self.shared.take_error() {
            return Err(PoolError::Task(error));
        }
        if let Some(message) = panic_message {
            return Err(PoolError::Panicked { message });
        }
        if self.parent.is_cancelled() {
            return Err(PoolError::Cancelled);
        }
        Ok(summary)
    }
}

fn describe_panic(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(other) => other
            .downcast_ref::<&str>()
            .map_or_else(|| "non-string panic payload".to_owned(), |s| (*s).to_owned()),
    }
}
