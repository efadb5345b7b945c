use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, info};
use crate::communication::{TaskId, Ticket};
use crate::config::ServiceConfig;
use crate::batching::batch::batching_loop;
use crate::batching::queue::TaskQueue;
use crate::batching::worker::RunnerHandle;
use crate::error::{BatchError, ConfigError};
use crate::executor::Executor;
use crate::input::Inputs;
use super::core_trait::Batcher;

/// A running batching service in front of one executor.
///
/// Owns the task queue and the runner. Any number of callers may submit
/// concurrently; admission only takes the queue lock and never waits for the
/// executor.
///
/// # Type Parameters
///
/// * `E` - The executor batches are run through
pub struct BatchService<E: Executor> {
    config: ServiceConfig,
    queue: Arc<TaskQueue<E::Output>>,
    runner: RunnerHandle,
}

impl<E: Executor> BatchService<E> {
    /// Validates `config` and starts the runner on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the first configuration problem found; nothing is spawned then.
    pub fn start(config: ServiceConfig, executor: E) -> Result<Self, ConfigError> {
        config.validate()?;

        let queue = Arc::new(TaskQueue::new(&config.batching));
        let runner = RunnerHandle::spawn(queue.notifier(), {
            let queue = queue.clone();
            let executor = Arc::new(executor);
            let fields = config.task.required_inputs();
            let max_batch_size = config.batching.max_batch_size;
            move |running| batching_loop(executor, fields, max_batch_size, running, queue)
        });

        info!(
            task = %config.task,
            model = config.model(),
            max_batch_size = config.batching.max_batch_size,
            max_wait_ms = config.batching.max_wait.as_millis() as u64,
            "batch service started"
        );

        Ok(Self {
            config,
            queue,
            runner,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Number of tasks waiting to be drained.
    pub async fn queued(&self) -> usize {
        self.queue.len().await
    }

    pub async fn is_idle(&self) -> bool {
        self.queue.is_empty().await
    }

    /// `false` once shutdown has been requested.
    pub fn is_running(&self) -> bool {
        self.runner.is_running()
    }

    /// Stops the runner once the batch in flight, if any, is settled. Tasks
    /// still queued resolve to [`BatchError::Stopped`], as does any later submission.
    pub async fn shutdown(&self) {
        self.runner.join().await;
    }
}

#[async_trait]
impl<E: Executor> Batcher for BatchService<E> {
    type Output = E::Output;

    async fn submit(&self, mut inputs: Inputs) -> Result<Ticket<E::Output>, BatchError> {
        let task = self.config.task;
        let declared = task.required_inputs();

        let dropped = inputs.retain_declared(declared);
        if !dropped.is_empty() {
            debug!(task = %task, ?dropped, "ignoring inputs the task does not take");
        }

        let missing = inputs.missing(declared);
        if !missing.is_empty() {
            debug!(task = %task, ?missing, "rejecting request with missing inputs");
            return Err(BatchError::MissingInputs { task, missing });
        }

        let (tx, rx) = oneshot::channel();
        let id = self.queue.enqueue(inputs, tx).await?;
        debug!(task = %id, "admitted");
        Ok(Ticket::new(id, rx))
    }

    async fn withdraw(&self, id: TaskId) -> bool {
        match self.queue.withdraw(id).await {
            Some(task) => {
                task.settle(Err(BatchError::Cancelled));
                debug!(task = %id, "withdrawn before execution");
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use rand::Rng;
    use tokio::time::Instant;
    use crate::config::{BatchConfig, ExecutorSettings, Precision, TaskKind};
    use crate::error::ExecutorError;
    use crate::executor::Batch;
    use crate::input::{InputField, InputValue};

    fn config(task: TaskKind, max_batch_size: usize, max_wait_ms: u64) -> ServiceConfig {
        ServiceConfig {
            task,
            batching: BatchConfig {
                max_batch_size,
                max_wait: Duration::from_millis(max_wait_ms),
            },
            executor: ExecutorSettings {
                model: String::new(),
                precision: Precision::Fp16,
                steps: 20,
            },
        }
    }

    /// Echoes each prompt and keeps the batches it was called with.
    #[derive(Clone, Default)]
    struct Echo {
        batches: Arc<Mutex<Vec<Vec<String>>>>,
        fields: Arc<Mutex<Vec<Vec<InputField>>>>,
    }

    impl Echo {
        fn batches(&self) -> Vec<Vec<String>> {
            self.batches.lock().unwrap().clone()
        }
    }

    impl Executor for Echo {
        type Output = String;

        fn execute(&self, batch: Batch, _samples_per_task: usize) -> Result<Vec<String>, ExecutorError> {
            let prompts = batch.texts(InputField::Prompt)
                .ok_or_else(|| ExecutorError::new("no prompt column"))?
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>();
            self.fields.lock().unwrap().push(batch.fields().to_vec());
            self.batches.lock().unwrap().push(prompts.clone());
            Ok(prompts)
        }
    }

    /// Fails its first call, then echoes.
    #[derive(Default)]
    struct FailsOnce {
        calls: AtomicUsize,
    }

    impl Executor for FailsOnce {
        type Output = String;

        fn execute(&self, batch: Batch, _samples_per_task: usize) -> Result<Vec<String>, ExecutorError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(ExecutorError::new("CUDA out of memory"));
            }
            Ok(batch.texts(InputField::Prompt).unwrap().into_iter().map(str::to_string).collect())
        }
    }

    /// Tracks how many calls overlap.
    #[derive(Clone, Default)]
    struct Exclusive {
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
        order: Arc<Mutex<Vec<String>>>,
    }

    impl Executor for Exclusive {
        type Output = String;

        fn execute(&self, batch: Batch, _samples_per_task: usize) -> Result<Vec<String>, ExecutorError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(2));
            let prompts = batch.texts(InputField::Prompt)
                .unwrap()
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>();
            self.order.lock().unwrap().extend(prompts.iter().cloned());
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(prompts)
        }
    }

    fn prompt(text: &str) -> Inputs {
        Inputs::new().with_prompt(text)
    }

    #[tokio::test]
    async fn test_invalid_config_fails_fast() {
        let result = BatchService::start(config(TaskKind::TextToImage, 0, 10), Echo::default());
        assert!(matches!(result, Err(ConfigError::ZeroBatchSize)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_dispatches_before_deadline() {
        let echo = Echo::default();
        let service = BatchService::start(config(TaskKind::TextToImage, 2, 100), echo.clone()).unwrap();
        let start = Instant::now();

        let a = service.submit(prompt("A")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let b = service.submit(prompt("B")).await.unwrap();

        assert_eq!(a.await, Ok("A".to_string()));
        assert_eq!(b.await, Ok("B".to_string()));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(30));
        assert!(elapsed < Duration::from_millis(100), "drained at {elapsed:?}");
        assert_eq!(echo.batches(), vec![vec!["A".to_string(), "B".to_string()]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lone_task_dispatched_at_deadline() {
        let echo = Echo::default();
        let service = BatchService::start(config(TaskKind::TextToImage, 4, 50), echo.clone()).unwrap();
        let start = Instant::now();

        let result = service.generate(prompt("A")).await;

        assert_eq!(result, Ok("A".to_string()));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(50), "drained early at {elapsed:?}");
        assert!(elapsed < Duration::from_millis(60), "drained late at {elapsed:?}");
        assert_eq!(echo.batches(), vec![vec!["A".to_string()]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_wait_dispatches_each_task() {
        let echo = Echo::default();
        let service = BatchService::start(config(TaskKind::TextToImage, 8, 0), echo.clone()).unwrap();
        let start = Instant::now();

        assert_eq!(service.generate(prompt("A")).await, Ok("A".to_string()));
        assert_eq!(service.generate(prompt("B")).await, Ok("B".to_string()));

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(echo.batches(), vec![vec!["A".to_string()], vec!["B".to_string()]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_arrivals_do_not_delay_oldest() {
        let echo = Echo::default();
        let service = BatchService::start(config(TaskKind::TextToImage, 10, 50), echo.clone()).unwrap();
        let start = Instant::now();

        let a = service.submit(prompt("A")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        let b = service.submit(prompt("B")).await.unwrap();

        assert_eq!(a.await, Ok("A".to_string()));
        assert_eq!(b.await, Ok("B".to_string()));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(50) && elapsed < Duration::from_millis(90), "drained at {elapsed:?}");
        assert_eq!(echo.batches(), vec![vec!["A".to_string(), "B".to_string()]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_settles_every_task() {
        let service = BatchService::start(config(TaskKind::TextToImage, 2, 100), FailsOnce::default()).unwrap();

        let a = service.submit(prompt("A")).await.unwrap();
        let b = service.submit(prompt("B")).await.unwrap();
        let expected = Err(BatchError::Executor(ExecutorError::new("CUDA out of memory")));
        assert_eq!(a.await, expected);
        assert_eq!(b.await, expected);
        assert!(service.is_idle().await);

        // the runner survived and serves the next batch
        assert_eq!(service.generate(prompt("C")).await, Ok("C".to_string()));
    }

    #[tokio::test]
    async fn test_missing_inputs_rejected_before_enqueue() {
        let echo = Echo::default();
        let service = BatchService::start(config(TaskKind::ImageToImage, 2, 100), echo.clone()).unwrap();

        let err = service.submit(prompt("a cat")).await.err();

        assert_eq!(
            err,
            Some(BatchError::MissingInputs {
                task: TaskKind::ImageToImage,
                missing: vec![InputField::Image],
            })
        );
        assert_eq!(service.queued().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undeclared_inputs_are_not_batched() {
        let echo = Echo::default();
        let service = BatchService::start(config(TaskKind::TextToImage, 1, 100), echo.clone()).unwrap();

        let inputs = prompt("A").with_image(vec![0xff, 0xd8]);
        assert_eq!(service.generate(inputs).await, Ok("A".to_string()));
        assert_eq!(*echo.fields.lock().unwrap(), vec![vec![InputField::Prompt]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_task_batches_both_columns() {
        struct Sizes;

        impl Executor for Sizes {
            type Output = usize;

            fn execute(&self, batch: Batch, _samples_per_task: usize) -> Result<Vec<usize>, ExecutorError> {
                let images = batch.column(InputField::Image).unwrap();
                Ok(images
                    .iter()
                    .map(|image| match image {
                        InputValue::Image(bytes) => bytes.len(),
                        InputValue::Text(_) => 0,
                    })
                    .collect())
            }
        }

        let service = BatchService::start(config(TaskKind::SuperResolution, 2, 100), Sizes).unwrap();
        let a = service.submit(prompt("x").with_image(vec![1, 2, 3])).await.unwrap();
        let b = service.submit(prompt("y").with_image(vec![1])).await.unwrap();
        assert_eq!(a.await, Ok(3));
        assert_eq!(b.await, Ok(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_withdraw_cancels_queued_task() {
        let echo = Echo::default();
        let service = BatchService::start(config(TaskKind::TextToImage, 4, 10_000), echo.clone()).unwrap();

        let a = service.submit(prompt("A")).await.unwrap();
        let b = service.submit(prompt("B")).await.unwrap();
        let a_id = a.id();

        assert!(service.withdraw(a_id).await);
        assert!(!service.withdraw(a_id).await);
        assert_eq!(a.await, Err(BatchError::Cancelled));

        assert_eq!(b.await, Ok("B".to_string()));
        assert_eq!(echo.batches(), vec![vec!["B".to_string()]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_withdrawn_head_deadline_does_not_flush_successor() {
        let echo = Echo::default();
        let service = BatchService::start(config(TaskKind::TextToImage, 4, 100), echo.clone()).unwrap();
        let start = Instant::now();

        let a = service.submit(prompt("A")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let b = service.submit(prompt("B")).await.unwrap();
        tokio::time::sleep_until(start + Duration::from_millis(100)).await;

        assert!(service.withdraw(a.id()).await);
        assert_eq!(b.await, Ok("B".to_string()));
        // B waits out its own deadline, not the one A left behind
        assert_eq!(start.elapsed(), Duration::from_millis(150));
        assert_eq!(echo.batches(), vec![vec!["B".to_string()]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_ticket_still_runs() {
        let echo = Echo::default();
        let service = BatchService::start(config(TaskKind::TextToImage, 2, 100), echo.clone()).unwrap();

        drop(service.submit(prompt("gone")).await.unwrap());
        assert_eq!(service.generate(prompt("kept")).await, Ok("kept".to_string()));
        assert_eq!(echo.batches(), vec![vec!["gone".to_string(), "kept".to_string()]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_settles_and_refuses() {
        let service = BatchService::start(config(TaskKind::TextToImage, 4, 10_000), Echo::default()).unwrap();
        let queued = service.submit(prompt("A")).await.unwrap();

        assert!(service.is_running());
        service.shutdown().await;
        assert!(!service.is_running());

        assert_eq!(queued.await, Err(BatchError::Stopped));
        assert_eq!(service.submit(prompt("B")).await.err(), Some(BatchError::Stopped));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_single_flight_and_fifo() {
        let exclusive = Exclusive::default();
        let service = Arc::new(
            BatchService::start(config(TaskKind::TextToImage, 5, 3), exclusive.clone()).unwrap()
        );

        let mut rng = rand::thread_rng();
        let handles = (0..64).map(|i| {
            let service = service.clone();
            let delay = Duration::from_micros(rng.gen_range(0..12_000));
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let name = format!("task-{i}");
                let ticket = service.submit(prompt(&name)).await.unwrap();
                let id = ticket.id();
                (id, name, ticket.await)
            })
        }).collect::<Vec<_>>();

        let mut admitted = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect::<Vec<_>>();

        for (_, name, result) in &admitted {
            assert_eq!(result.as_ref(), Ok(name), "every caller gets its own output exactly once");
        }
        assert_eq!(exclusive.max_in_flight.load(Ordering::SeqCst), 1);

        admitted.sort_by_key(|(id, _, _)| *id);
        let admission_order = admitted.into_iter().map(|(_, name, _)| name).collect::<Vec<_>>();
        assert_eq!(*exclusive.order.lock().unwrap(), admission_order);
    }
}
