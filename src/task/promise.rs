use super::Outcome;
use crate::error::Error;
use tokio::sync::oneshot;

/// The write side of a task created with [`Task::pending`](super::Task::pending)
///
/// Completing consumes the promise, so a pending task is fulfilled at most
/// once. Completion happens-before any callback registered on the task observes
/// the value. Dropping the promise uncompleted resolves the task as
/// [`Error::Abandoned`].
#[derive(Debug)]
pub struct Promise<T> {
    sender: oneshot::Sender<Outcome<T>>,
}

impl<T> Promise<T> {
    pub(super) fn new(sender: oneshot::Sender<Outcome<T>>) -> Self {
        Self { sender }
    }

    /// Completes the task with `value`
    pub fn fulfill(self, value: T) {
        self.complete(Ok(Some(value)));
    }

    /// Completes the task with absence
    pub fn fulfill_absent(self) {
        self.complete(Ok(None));
    }

    /// Completes the task with `error`
    pub fn fail(self, error: Error) {
        self.complete(Err(error));
    }

    /// Completes the task with `outcome`
    ///
    /// If nobody holds the task anymore the outcome is discarded.
    pub fn complete(self, outcome: Outcome<T>) {
        if self.sender.send(outcome).is_err() {
            tracing::trace!("promise completed after its task was dropped");
        }
    }

    /// Returns true if the task this promise completes has been dropped
    pub fn is_abandoned(&self) -> bool {
        self.sender.is_closed()
    }
}
