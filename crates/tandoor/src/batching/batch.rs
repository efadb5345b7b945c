use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use crate::communication::{Completion, PendingTask};
use crate::error::{BatchError, ExecutorError};
use crate::executor::{Batch, Executor};
use crate::input::InputField;
use super::queue::TaskQueue;
use super::trigger::Readiness;

/// Generations folded into each task's output.
const SAMPLES_PER_TASK: usize = 1;

/// The runner: the only place tasks leave the queue and the only caller of the
/// executor.
///
/// Waits for the trigger, drains up to `max_batch_size` tasks, runs them through
/// the executor on the blocking pool and settles every drained task before
/// looking at the queue again. A new batch therefore never starts while another
/// is executing or still being handed out.
pub(crate) async fn batching_loop<E: Executor>(
    executor: Arc<E>,
    fields: &'static [InputField],
    max_batch_size: usize,
    running: Arc<AtomicBool>,
    queue: Arc<TaskQueue<E::Output>>,
) {
    let notifier = queue.notifier();
    info!(max_batch_size, "batch runner started");

    loop {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        match queue.readiness().await {
            Readiness::Ready => {}
            Readiness::Until(deadline) => {
                // the deadline may have moved while asleep; look again either way
                tokio::select! {
                    biased;
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = notifier.notified() => {}
                }
                continue;
            }
            Readiness::Idle => {
                notifier.notified().await;
                continue;
            }
        }

        let tasks = queue.drain_ready(max_batch_size).await;
        if tasks.is_empty() {
            continue;
        }
        run_batch(&executor, fields, tasks).await;
    }

    let leftovers = queue.close().await;
    if !leftovers.is_empty() {
        warn!(count = leftovers.len(), "runner stopping with queued tasks");
    }
    for task in leftovers {
        task.settle(Err(BatchError::Stopped));
    }
    info!("batch runner stopped");
}

async fn run_batch<E: Executor>(
    executor: &Arc<E>,
    fields: &'static [InputField],
    tasks: Vec<PendingTask<E::Output>>,
) {
    let size = tasks.len();
    if let Some(oldest) = tasks.first() {
        let longest_wait = Instant::now().saturating_duration_since(oldest.arrival());
        debug!(
            batch = size,
            first = %oldest.id(),
            longest_wait_ms = longest_wait.as_millis() as u64,
            "processing batch"
        );
    }

    let (rows, completions): (Vec<_>, Vec<_>) = tasks
        .into_iter()
        .map(PendingTask::into_parts)
        .unzip();

    let batch = match Batch::assemble(fields, rows) {
        Ok(batch) => batch,
        Err(row) => {
            warn!(batch = size, row, "admitted task lacks a declared input");
            settle_all(completions, BatchError::Internal(format!("row {row} of the batch is incomplete")));
            return;
        }
    };

    let executor = executor.clone();
    let outcome = tokio::task::spawn_blocking(move || executor.execute(batch, SAMPLES_PER_TASK)).await;

    match outcome {
        Ok(Ok(outputs)) if outputs.len() == size => {
            for (completion, output) in completions.into_iter().zip(outputs) {
                completion.settle(Ok(output));
            }
        }
        Ok(Ok(outputs)) => {
            warn!(expected = size, produced = outputs.len(), "executor broke the batch ordering contract");
            settle_all(
                completions,
                BatchError::Internal(format!("executor produced {} outputs for {} tasks", outputs.len(), size)),
            );
        }
        Ok(Err(err)) => {
            error!(batch = size, error = %err, "executor failed");
            settle_all(completions, BatchError::Executor(err));
        }
        Err(join_err) => {
            error!(batch = size, error = %join_err, "executor panicked");
            settle_all(completions, BatchError::Executor(ExecutorError::new("executor panicked")));
        }
    }
}

fn settle_all<O>(completions: Vec<Completion<O>>, err: BatchError) {
    for completion in completions {
        completion.settle(Err(err.clone()));
    }
}
