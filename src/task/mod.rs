//! Deferred, composable values.
//!
//! A [`Task<T>`] stands for a value of type `T` that may already exist, may
//! still be on its way from a worker, or may never arrive because something
//! failed. It completes at most once, with exactly one of:
//!
//! - a value,
//! - absence (a well-formed "no value", e.g. a remote 404), or
//! - a failure ([`Error`]).
//!
//! Tasks are built from factories ([`Task::of`], [`Task::absent`],
//! [`Task::failed`], [`Task::spawn`], [`Task::spawn_blocking`],
//! [`Task::pending`]) and composed with [`map`](Task::map),
//! [`try_map`](Task::try_map), [`flat_map`](Task::flat_map) and
//! [`and`](Task::and). Composition is lazy: the transform runs when the
//! composed task is observed. Absence and failures pass through every
//! combinator untouched, so a not-found result travels down an arbitrarily long
//! chain without any step special-casing it.
//!
//! A task is observed exactly once, by one of:
//! - [`wait`](Task::wait) / [`wait_optional`](Task::wait_optional), blocking the
//!   calling thread,
//! - `.await` in async code (tasks implement [`IntoFuture`]),
//! - [`on_complete`](Task::on_complete) and friends, which deliver the outcome
//!   through a [`Scheduler`] and never on the registering thread.

mod compose;
mod promise;

pub use promise::Promise;

use crate::error::{Error, Result, panic_message};
use crate::scheduler::Scheduler;
use compose::{Pair, Resolve, Then};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::panic::{AssertUnwindSafe, catch_unwind};
use tokio::sync::oneshot;

/// What a task completes with: a value, absence (`Ok(None)`), or a failure
pub type Outcome<T> = Result<Option<T>>;

/// A deferred value that completes at most once
#[must_use = "tasks do nothing observable unless waited on, awaited, or queued"]
pub struct Task<T> {
    inner: Inner<T>,
}

enum Inner<T> {
    /// Already resolved with a value
    Ready(T),
    /// Resolved with absence
    Absent,
    /// Resolved with a failure
    Failed(Error),
    /// Delivered later by a worker or a [`Promise`]
    Pending(oneshot::Receiver<Outcome<T>>),
    /// A transform of another task
    Mapped(Box<dyn Resolve<T>>),
    /// Two tasks paired into one
    Paired(Box<dyn Resolve<T>>),
}

impl<T: Send + 'static> Task<T> {
    /// A task already holding `value`
    pub fn of(value: T) -> Self {
        Self {
            inner: Inner::Ready(value),
        }
    }

    /// The absence task
    ///
    /// Carries no allocation; every absent task is interchangeable, and
    /// `map`/`flat_map` on it return absence without calling the mapper.
    pub fn absent() -> Self {
        Self {
            inner: Inner::Absent,
        }
    }

    /// A task already failed with `error`
    pub fn failed(error: Error) -> Self {
        Self {
            inner: Inner::Failed(error),
        }
    }

    /// A task holding `value` if present, absence otherwise
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::of(value),
            None => Self::absent(),
        }
    }

    /// A task already completed with `outcome`
    pub fn from_outcome(outcome: Outcome<T>) -> Self {
        match outcome {
            Ok(value) => Self::from_option(value),
            Err(error) => Self::failed(error),
        }
    }

    /// A task resolved later through the returned [`Promise`]
    ///
    /// Dropping the promise without completing it resolves the task as
    /// [`Error::Abandoned`].
    pub fn pending() -> (Promise<T>, Self) {
        let (sender, receiver) = oneshot::channel();
        (
            Promise::new(sender),
            Self {
                inner: Inner::Pending(receiver),
            },
        )
    }

    /// Runs `work` on the scheduler and completes with its outcome
    ///
    /// The work starts immediately. A panic inside it becomes
    /// [`Error::Panicked`].
    pub fn spawn<F>(scheduler: &Scheduler, work: F) -> Self
    where
        F: Future<Output = Outcome<T>> + Send + 'static,
    {
        let (promise, task) = Self::pending();
        scheduler.spawn(async move {
            let outcome = AssertUnwindSafe(work)
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(Error::Panicked(panic_message(payload.as_ref()))));
            promise.complete(outcome);
        });
        task
    }

    /// Runs the blocking `work` on the scheduler's blocking pool
    ///
    /// Use this for suppliers that block the thread (file reads, synchronous
    /// clients). A panic inside `work` becomes [`Error::Panicked`].
    pub fn spawn_blocking<F>(scheduler: &Scheduler, work: F) -> Self
    where
        F: FnOnce() -> Outcome<T> + Send + 'static,
    {
        let (promise, task) = Self::pending();
        scheduler.spawn_blocking(move || {
            promise.complete(guarded(work).and_then(|outcome| outcome));
        });
        task
    }

    /// Transforms the value once it arrives
    ///
    /// Absence and failures skip `f`. A panic in `f` becomes this task's
    /// failure instead of unwinding into the caller.
    pub fn map<U, F>(self, f: F) -> Task<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.then(move |value| Task::of(f(value)))
    }

    /// Like [`map`](Task::map), with a mapper that can fail
    pub fn try_map<U, F>(self, f: F) -> Task<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        self.then(move |value| match f(value) {
            Ok(mapped) => Task::of(mapped),
            Err(error) => Task::failed(error),
        })
    }

    /// Chains a dependent task onto the value once it arrives
    ///
    /// The returned task completes with whatever the task produced by `f`
    /// completes with.
    pub fn flat_map<U, F>(self, f: F) -> Task<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Task<U> + Send + 'static,
    {
        self.then(f)
    }

    /// Pairs this task with `other`
    ///
    /// Both sides run concurrently and the pair completes once both have.
    /// If either side fails the pair fails with that failure; when both fail
    /// the left failure wins. If neither fails but either is absent, the pair
    /// is absent.
    pub fn and<U>(self, other: Task<U>) -> Task<(T, U)>
    where
        U: Send + 'static,
    {
        Task {
            inner: Inner::Paired(Box::new(Pair::new(self, other))),
        }
    }

    /// Blocks until the task completes and returns its value
    ///
    /// A task that already holds its outcome never touches a worker, so this is
    /// safe to call anywhere for such tasks. For pending tasks, do not call this
    /// from a worker of the scheduler that must deliver the value.
    ///
    /// # Errors
    ///
    /// Returns the task's failure, or [`Error::NoValue`] if it completed with
    /// absence.
    pub fn wait(self) -> Result<T> {
        self.wait_optional()?.ok_or(Error::NoValue)
    }

    /// Blocks until the task completes, reporting absence as `Ok(None)`
    pub fn wait_optional(self) -> Outcome<T> {
        match self.inner {
            Inner::Ready(value) => Ok(Some(value)),
            Inner::Absent => Ok(None),
            Inner::Failed(error) => Err(error),
            inner => futures::executor::block_on(Task { inner }.into_future()),
        }
    }

    /// Delivers the raw outcome to `deliver` on the scheduler
    ///
    /// Delivery always goes through the scheduler, even for tasks that are
    /// already complete. A pending delivery holds on to the scheduler, so a
    /// runtime the scheduler owns stays up until the callback has run even if
    /// every other clone is dropped.
    pub fn on_outcome<F>(self, scheduler: &Scheduler, deliver: F)
    where
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        let keep_alive = scheduler.clone();
        scheduler.spawn(async move {
            let outcome = self.await;
            deliver(outcome);
            drop(keep_alive);
        });
    }

    /// Delivers the value to `on_success` or the failure to `on_failure`
    ///
    /// Absence is delivered to `on_failure` as [`Error::NoValue`].
    pub fn on_complete<S, E>(self, scheduler: &Scheduler, on_success: S, on_failure: E)
    where
        S: FnOnce(T) + Send + 'static,
        E: FnOnce(Error) + Send + 'static,
    {
        self.deliver(scheduler, Some(Box::new(on_success)), Some(Box::new(on_failure)));
    }

    /// Delivers the value to `on_success`
    ///
    /// Failures and absence go to the scheduler's default failure handler.
    pub fn on_success<S>(self, scheduler: &Scheduler, on_success: S)
    where
        S: FnOnce(T) + Send + 'static,
    {
        self.deliver(scheduler, Some(Box::new(on_success)), None);
    }

    /// Delivers the failure to `on_failure`, discarding the value
    ///
    /// Absence is delivered as [`Error::NoValue`].
    pub fn on_failure<E>(self, scheduler: &Scheduler, on_failure: E)
    where
        E: FnOnce(Error) + Send + 'static,
    {
        self.deliver(scheduler, None, Some(Box::new(on_failure)));
    }

    /// Runs the task to completion, discarding the value
    ///
    /// Failures and absence go to the scheduler's default failure handler.
    pub fn queue(self, scheduler: &Scheduler) {
        self.deliver(scheduler, None, None);
    }

    fn deliver(
        self,
        scheduler: &Scheduler,
        on_success: Option<Box<dyn FnOnce(T) + Send>>,
        on_failure: Option<Box<dyn FnOnce(Error) + Send>>,
    ) {
        let fallback = scheduler.default_failure();
        self.on_outcome(scheduler, move |outcome| {
            let error = match outcome {
                Ok(Some(value)) => {
                    if let Some(on_success) = on_success {
                        on_success(value);
                    }
                    return;
                }
                Ok(None) => Error::NoValue,
                Err(error) => error,
            };
            match on_failure {
                Some(on_failure) => on_failure(error),
                None => fallback.report(&error),
            }
        });
    }

    fn then<U, F>(self, next: F) -> Task<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Task<U> + Send + 'static,
    {
        match self.inner {
            Inner::Absent => Task::absent(),
            Inner::Failed(error) => Task::failed(error),
            inner => Task {
                inner: Inner::Mapped(Box::new(Then::new(Task { inner }, next))),
            },
        }
    }
}

impl<T: Send + 'static> IntoFuture for Task<T> {
    type Output = Outcome<T>;
    type IntoFuture = BoxFuture<'static, Outcome<T>>;

    fn into_future(self) -> Self::IntoFuture {
        match self.inner {
            Inner::Ready(value) => futures::future::ready(Ok(Some(value))).boxed(),
            Inner::Absent => futures::future::ready(Ok(None)).boxed(),
            Inner::Failed(error) => futures::future::ready(Err(error)).boxed(),
            Inner::Pending(receiver) => async move {
                receiver.await.unwrap_or(Err(Error::Abandoned))
            }
            .boxed(),
            Inner::Mapped(node) | Inner::Paired(node) => node.resolve(),
        }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.inner {
            Inner::Ready(_) => "ready",
            Inner::Absent => "absent",
            Inner::Failed(_) => "failed",
            Inner::Pending(_) => "pending",
            Inner::Mapped(_) => "mapped",
            Inner::Paired(_) => "paired",
        };
        f.debug_struct("Task").field("state", &state).finish()
    }
}

/// Runs `f`, turning a panic into [`Error::Panicked`]
pub(crate) fn guarded<R>(f: impl FnOnce() -> R) -> Result<R> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| Error::Panicked(panic_message(payload.as_ref())))
}
