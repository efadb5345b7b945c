use async_trait::async_trait;
use crate::communication::{TaskId, Ticket};
use crate::error::BatchError;
use crate::input::Inputs;

/// The admission surface callers program against.
///
/// Callers never learn which batch their request ran in; they submit inputs
/// and await their own result.
#[async_trait]
pub trait Batcher: Send + Sync {
    /// What a successful submission resolves to.
    type Output: Send + 'static;

    /// Validates and enqueues a request without waiting for it to run.
    ///
    /// # Returns
    ///
    /// A [`Ticket`] resolving to this request's output, or
    /// [`BatchError::MissingInputs`] when a required input is absent, in which
    /// case nothing was enqueued.
    async fn submit(&self, inputs: Inputs) -> Result<Ticket<Self::Output>, BatchError>;

    /// Removes a task that has not been drained yet, settling it with
    /// [`BatchError::Cancelled`]. Returns `false` once the task has left the queue.
    async fn withdraw(&self, id: TaskId) -> bool;

    /// Submits and waits for the result.
    async fn generate(&self, inputs: Inputs) -> Result<Self::Output, BatchError> {
        self.submit(inputs).await?.await
    }
}
