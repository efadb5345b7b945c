use std::fmt::{Display, Formatter};
use tokio::sync::oneshot::Sender;
use tokio::time::Instant;
use crate::error::BatchError;
use crate::input::Inputs;

/// Identity of an admitted task. Ids are handed out in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// # Completion
///
/// The writer half of a task's single-resolution handle.
///
/// Settling consumes the completion, so a task can never be settled twice.
/// If the caller has stopped waiting the result is discarded.
pub(crate) struct Completion<O> {
    id: TaskId,
    sender: Sender<Result<O, BatchError>>,
}

impl<O> Completion<O> {
    pub(crate) fn new(id: TaskId, sender: Sender<Result<O, BatchError>>) -> Self {
        Self { id, sender }
    }

    pub(crate) fn settle(self, result: Result<O, BatchError>) {
        if self.sender.send(result).is_err() {
            tracing::trace!(task = %self.id, "caller stopped waiting; result discarded");
        }
    }
}

/// # PendingTask
///
/// One admitted unit of work: its inputs, when it arrived, and the handle the
/// runner settles once the task's batch has been executed.
///
/// ## Type Parameters
///
/// * `O` - The per-task output the executor produces
pub(crate) struct PendingTask<O> {
    id: TaskId,
    inputs: Inputs,
    arrival: Instant,
    completion: Completion<O>,
}

impl<O> PendingTask<O> {
    pub(crate) fn new(
        id: TaskId,
        inputs: Inputs,
        arrival: Instant,
        sender: Sender<Result<O, BatchError>>,
    ) -> Self {
        Self {
            id,
            inputs,
            arrival,
            completion: Completion::new(id, sender),
        }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn arrival(&self) -> Instant {
        self.arrival
    }

    /// Hands the inputs over to batch assembly, keeping the completion for settling.
    pub(crate) fn into_parts(self) -> (Inputs, Completion<O>) {
        (self.inputs, self.completion)
    }

    pub(crate) fn settle(self, result: Result<O, BatchError>) {
        self.completion.settle(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_settle_delivers_result() {
        let (tx, rx) = oneshot::channel();
        let task = PendingTask::new(TaskId(7), Inputs::new().with_prompt("x"), Instant::now(), tx);
        assert_eq!(task.id(), TaskId(7));
        task.settle(Ok::<_, BatchError>(42u32));
        assert_eq!(rx.await.unwrap(), Ok(42));
    }

    #[tokio::test]
    async fn test_settle_after_caller_left_is_noop() {
        let (tx, rx) = oneshot::channel::<Result<u32, BatchError>>();
        drop(rx);
        let task = PendingTask::new(TaskId(1), Inputs::new(), Instant::now(), tx);
        task.settle(Err(BatchError::Cancelled));
    }

    #[tokio::test]
    async fn test_into_parts_keeps_inputs() {
        let (tx, rx) = oneshot::channel();
        let task = PendingTask::new(TaskId(3), Inputs::new().with_prompt("owl"), Instant::now(), tx);
        let (inputs, completion) = task.into_parts();
        assert_eq!(inputs, Inputs::new().with_prompt("owl"));
        completion.settle(Ok::<_, BatchError>("done"));
        assert_eq!(rx.await.unwrap(), Ok("done"));
    }

    #[test]
    fn test_task_id_display() {
        assert_eq!(TaskId(12).to_string(), "task-12");
    }
}
