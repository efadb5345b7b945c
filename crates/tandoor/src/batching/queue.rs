use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex, Notify};
use tokio::time::Instant;
use crate::communication::{PendingTask, TaskId};
use crate::config::BatchConfig;
use crate::error::BatchError;
use crate::input::Inputs;
use super::trigger::{BatchTrigger, Readiness};

struct QueueState<O> {
    tasks: VecDeque<PendingTask<O>>,
    trigger: BatchTrigger,
    next_id: u64,
    closed: bool,
}

impl<O> QueueState<O> {
    fn oldest(&self) -> Option<Instant> {
        self.tasks.front().map(PendingTask::arrival)
    }

    fn drain_head(&mut self, max_n: usize) -> Vec<PendingTask<O>> {
        let take = max_n.min(self.tasks.len());
        let batch = self.tasks.drain(..take).collect::<Vec<_>>();
        let (len, oldest) = (self.tasks.len(), self.oldest());
        self.trigger.on_removal(len, oldest);
        batch
    }
}

/// FIFO of admitted tasks shared between every caller and the runner.
///
/// All reads and writes, including trigger evaluation, happen inside one
/// critical section per call, and no call holds it across an await on anything
/// but the lock itself. The runner is woken through [`TaskQueue::notifier`]
/// whenever the trigger's decision changes.
pub(crate) struct TaskQueue<O> {
    state: Mutex<QueueState<O>>,
    notifier: Arc<Notify>,
}

impl<O> TaskQueue<O> {
    pub(crate) fn new(config: &BatchConfig) -> Self {
        Self {
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                trigger: BatchTrigger::new(config),
                next_id: 0,
                closed: false,
            }),
            notifier: Arc::new(Notify::new()),
        }
    }

    pub(crate) fn notifier(&self) -> Arc<Notify> {
        self.notifier.clone()
    }

    /// Appends a new task at the tail and re-evaluates the trigger.
    ///
    /// Identity and arrival time are stamped inside the critical section, so id
    /// order, arrival order and queue order always agree.
    pub(crate) async fn enqueue(
        &self,
        inputs: Inputs,
        sender: oneshot::Sender<Result<O, BatchError>>,
    ) -> Result<TaskId, BatchError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(BatchError::Stopped);
        }

        let now = Instant::now();
        let id = TaskId(state.next_id);
        state.next_id += 1;
        state.tasks.push_back(PendingTask::new(id, inputs, now, sender));

        let before = state.trigger.readiness_at(now);
        let (len, oldest) = (state.tasks.len(), state.oldest());
        state.trigger.on_enqueue(len, oldest);
        if state.trigger.readiness_at(now) != before {
            self.notifier.notify_one();
        }
        Ok(id)
    }

    /// Removes up to `max_n` tasks from the head, oldest first, if the trigger
    /// says a batch is due right now, and re-arms the trigger for whatever
    /// remains. Returns nothing otherwise.
    ///
    /// Readiness is checked under the same lock as the removal, so a deadline
    /// that was re-anchored by a withdrawal in the meantime is never acted on.
    pub(crate) async fn drain_ready(&self, max_n: usize) -> Vec<PendingTask<O>> {
        let mut state = self.state.lock().await;
        if state.trigger.readiness_at(Instant::now()) != Readiness::Ready {
            return vec![];
        }
        state.drain_head(max_n)
    }

    /// Removes up to `max_n` tasks from the head regardless of the trigger.
    #[cfg(test)]
    pub(crate) async fn drain(&self, max_n: usize) -> Vec<PendingTask<O>> {
        self.state.lock().await.drain_head(max_n)
    }

    /// Pulls a still-queued task out by identity.
    pub(crate) async fn withdraw(&self, id: TaskId) -> Option<PendingTask<O>> {
        let mut state = self.state.lock().await;
        let position = state.tasks.iter().position(|task| task.id() == id)?;
        let task = state.tasks.remove(position)?;
        let (len, oldest) = (state.tasks.len(), state.oldest());
        state.trigger.on_removal(len, oldest);
        self.notifier.notify_one();
        Some(task)
    }

    pub(crate) async fn readiness(&self) -> Readiness {
        self.state.lock().await.trigger.readiness_at(Instant::now())
    }

    #[cfg(test)]
    pub(crate) async fn oldest(&self) -> Option<Instant> {
        self.state.lock().await.oldest()
    }

    pub(crate) async fn len(&self) -> usize {
        self.state.lock().await.tasks.len()
    }

    pub(crate) async fn is_empty(&self) -> bool {
        self.state.lock().await.tasks.is_empty()
    }

    /// Refuses further admissions and hands back everything still queued.
    pub(crate) async fn close(&self) -> Vec<PendingTask<O>> {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.trigger.on_removal(0, None);
        state.tasks.drain(..).collect()
    }
}
