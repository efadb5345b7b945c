use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use crate::error::BatchError;
use super::TaskId;

/// # Ticket
///
/// The caller's half of an admitted task: a future that resolves once the
/// runner has settled the task.
///
/// Dropping a ticket abandons the wait only. The task stays queued and is
/// executed in its turn unless it is withdrawn explicitly.
pub struct Ticket<O> {
    id: TaskId,
    receiver: oneshot::Receiver<Result<O, BatchError>>,
}

impl<O> Ticket<O> {
    pub(crate) fn new(id: TaskId, receiver: oneshot::Receiver<Result<O, BatchError>>) -> Self {
        Self { id, receiver }
    }

    /// Identity of the queued task, usable with `withdraw`.
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl<O> Future for Ticket<O> {
    type Output = Result<O, BatchError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped completion means the runner is gone with the task unsettled.
        Pin::new(&mut self.get_mut().receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(BatchError::Stopped)))
    }
}
