//! Composite task nodes: transforms and pairs.

use super::{Outcome, Task, guarded};
use futures::FutureExt;
use futures::future::BoxFuture;

/// A composite node that resolves into an outcome when observed
pub(super) trait Resolve<T>: Send {
    fn resolve(self: Box<Self>) -> BoxFuture<'static, Outcome<T>>;
}

/// `source` followed by the dependent step `next`
pub(super) struct Then<S, F> {
    source: Task<S>,
    next: F,
}

impl<S, F> Then<S, F> {
    pub(super) fn new(source: Task<S>, next: F) -> Self {
        Self { source, next }
    }
}

impl<S, U, F> Resolve<U> for Then<S, F>
where
    S: Send + 'static,
    U: Send + 'static,
    F: FnOnce(S) -> Task<U> + Send + 'static,
{
    fn resolve(self: Box<Self>) -> BoxFuture<'static, Outcome<U>> {
        let Then { source, next } = *self;
        async move {
            let Some(value) = source.await? else {
                return Ok(None);
            };
            guarded(move || next(value))?.await
        }
        .boxed()
    }
}

/// Two tasks observed concurrently
pub(super) struct Pair<A, B> {
    left: Task<A>,
    right: Task<B>,
}

impl<A, B> Pair<A, B> {
    pub(super) fn new(left: Task<A>, right: Task<B>) -> Self {
        Self { left, right }
    }
}

impl<A, B> Resolve<(A, B)> for Pair<A, B>
where
    A: Send + 'static,
    B: Send + 'static,
{
    fn resolve(self: Box<Self>) -> BoxFuture<'static, Outcome<(A, B)>> {
        let Pair { left, right } = *self;
        async move {
            let (left, right) = futures::future::join(left.into_future(), right.into_future()).await;
            combine(left, right)
        }
        .boxed()
    }
}

fn combine<A, B>(left: Outcome<A>, right: Outcome<B>) -> Outcome<(A, B)> {
    match (left, right) {
        (Err(error), _) | (Ok(_), Err(error)) => Err(error),
        (Ok(Some(a)), Ok(Some(b))) => Ok(Some((a, b))),
        (Ok(_), Ok(_)) => Ok(None),
    }
}
