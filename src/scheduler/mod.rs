//! Worker scheduling and the default failure handler.
//!
//! A [`Scheduler`] is the execution context every worker-backed
//! [`Task`](crate::Task) runs on and every `on_complete` callback is delivered
//! through. It wraps a tokio runtime handle, either a dedicated runtime built
//! from a [`SchedulerConfig`] or a runtime the caller already owns.
//!
//! The scheduler also carries the default failure handler: the callback that
//! receives failures (and absence) from `on_complete`-style observers that did
//! not supply their own failure callback. The handler lives in a cell shared by
//! every clone of the scheduler and can be swapped at any time; deliveries
//! read whichever handler is installed when they run.
//!
//! # Example
//!
//! ```no_run
//! use pagewise::{Scheduler, SchedulerConfig, Task};
//!
//! # fn main() -> pagewise::Result<()> {
//! let scheduler = Scheduler::new(&SchedulerConfig::default())?;
//! scheduler.set_default_failure_handler(|error| eprintln!("unhandled: {error}"));
//!
//! Task::of(21)
//!     .map(|n| n * 2)
//!     .on_success(&scheduler, |n| println!("got {n}"));
//! # Ok(())
//! # }
//! ```

use crate::config::SchedulerConfig;
use crate::error::{Error, Result, panic_message};
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::runtime::{Builder, Handle, Runtime};

/// Callback receiving failures nobody else observed
pub type FailureHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// Execution context for task workers and callback delivery
///
/// Cloning is cheap; clones share the runtime and the default failure handler.
#[derive(Clone)]
pub struct Scheduler {
    handle: Handle,
    failures: DefaultFailure,
    /// Present when this scheduler built its own runtime
    _runtime: Option<Arc<OwnedRuntime>>,
}

impl Scheduler {
    /// Builds a scheduler backed by a dedicated multi-thread runtime
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero worker count and [`Error::Io`] if
    /// the runtime cannot be created.
    pub fn new(config: &SchedulerConfig) -> Result<Self> {
        if config.worker_threads == 0 {
            return Err(Error::config(
                "worker_threads",
                "at least one worker thread is required",
            ));
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name(config.thread_name.clone())
            .enable_all()
            .build()?;

        tracing::debug!(
            worker_threads = config.worker_threads,
            thread_name = %config.thread_name,
            "started task scheduler"
        );

        Ok(Self {
            handle: runtime.handle().clone(),
            failures: DefaultFailure::default(),
            _runtime: Some(Arc::new(OwnedRuntime(Some(runtime)))),
        })
    }

    /// Attaches to a runtime the caller owns
    ///
    /// The runtime must outlive every task scheduled through it; work spawned
    /// after it shuts down is dropped and its tasks resolve as
    /// [`Error::Abandoned`].
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            failures: DefaultFailure::default(),
            _runtime: None,
        }
    }

    /// Attaches to the runtime of the calling context
    ///
    /// # Errors
    ///
    /// Returns [`Error::Runtime`] when called outside a tokio runtime.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::from_handle)
            .map_err(|e| Error::Runtime(e.to_string()))
    }

    /// The runtime handle work is spawned on
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Installs the handler for failures no explicit callback observes
    ///
    /// Takes effect for every delivery that runs after this call, including
    /// deliveries of tasks registered earlier. Handlers must not panic; a panic
    /// is caught and logged.
    pub fn set_default_failure_handler<F>(&self, handler: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.failures.replace(Arc::new(handler));
    }

    /// Restores the built-in handler, which logs through `tracing`
    pub fn reset_default_failure_handler(&self) {
        self.failures.replace(Arc::new(log_failure));
    }

    pub(crate) fn default_failure(&self) -> DefaultFailure {
        self.failures.clone()
    }

    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        drop(self.handle.spawn(future));
    }

    pub(crate) fn spawn_blocking<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        drop(self.handle.spawn_blocking(work));
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("runtime_flavor", &self.handle.runtime_flavor())
            .field("owns_runtime", &self._runtime.is_some())
            .finish()
    }
}

/// Shared, swappable default failure handler
#[derive(Clone)]
pub(crate) struct DefaultFailure(Arc<RwLock<FailureHandler>>);

impl Default for DefaultFailure {
    fn default() -> Self {
        Self(Arc::new(RwLock::new(Arc::new(log_failure))))
    }
}

impl DefaultFailure {
    fn replace(&self, handler: FailureHandler) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = handler;
    }

    /// Hands `error` to the installed handler
    pub(crate) fn report(&self, error: &Error) {
        // Clone out of the lock so a handler may swap itself
        let handler = Arc::clone(&self.0.read().unwrap_or_else(PoisonError::into_inner));

        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(error))) {
            tracing::error!(
                error = %error,
                panic = %panic_message(payload.as_ref()),
                "default failure handler panicked"
            );
        }
    }
}

fn log_failure(error: &Error) {
    match error {
        Error::NoValue | Error::Abandoned => {
            tracing::debug!(error = %error, "task completed without a value");
        }
        _ => {
            tracing::error!(error = %error, "task failed with no failure callback");
        }
    }
}

/// Runtime owned by a [`Scheduler`]
///
/// Shuts down in the background so dropping the last scheduler clone never
/// blocks, even from inside an async context.
struct OwnedRuntime(Option<Runtime>);

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
            tracing::debug!("task scheduler shut down");
        }
    }
}
