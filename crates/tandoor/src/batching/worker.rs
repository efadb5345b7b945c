//! Module for managing the background batch runner task.

use std::future::Future;
use std::sync::{Arc, Mutex, atomic::{AtomicBool, Ordering}};
use tokio::{task::JoinHandle, sync::Notify};

/// A handle for the long-lived runner task.
///
/// The runner watches `running` and sleeps on the queue's notifier, so stopping
/// it means clearing the flag and waking it once. A batch that is already
/// executing is finished first.
pub(crate) struct RunnerHandle {
    /// Flag indicating whether the runner should keep going
    running: Arc<AtomicBool>,

    /// Handle to the spawned runner, taken by [`RunnerHandle::join`]
    handle: Mutex<Option<JoinHandle<()>>>,

    /// The queue notifier the runner sleeps on
    notifier: Arc<Notify>,
}

impl RunnerHandle {
    /// Spawns the runner produced by `task` onto the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub(crate) fn spawn<F, Fut>(notifier: Arc<Notify>, task: F) -> Self
    where
        F: FnOnce(Arc<AtomicBool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(task(running.clone()));

        Self {
            running,
            handle: Mutex::new(Some(handle)),
            notifier,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Asks the runner to stop. Idempotent.
    pub(crate) fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.notifier.notify_one();
    }

    /// Stops the runner and waits until it has exited.
    pub(crate) async fn join(&self) {
        self.shutdown();
        let handle = self.handle.lock().ok().and_then(|mut handle| handle.take());
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "batch runner terminated abnormally");
            }
        }
    }
}

impl Drop for RunnerHandle {
    /// Ensures the runner is told to stop when its owner goes away.
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time;

    fn spawn_counter(notifier: Arc<Notify>, seen: Arc<std::sync::atomic::AtomicUsize>, stopped: Arc<AtomicBool>) -> RunnerHandle {
        let wake = notifier.clone();
        RunnerHandle::spawn(notifier, move |running| async move {
            while running.load(Ordering::SeqCst) {
                wake.notified().await;
                seen.fetch_add(1, Ordering::SeqCst);
            }
            stopped.store(true, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_runner_starts_running() {
        let notifier = Arc::new(Notify::new());
        let handle = RunnerHandle::spawn(notifier, |running| async move {
            while running.load(Ordering::SeqCst) {
                time::sleep(Duration::from_millis(10)).await;
            }
        });

        assert!(handle.is_running());
    }

    #[tokio::test]
    async fn test_runner_wakes_on_notify() {
        let notifier = Arc::new(Notify::new());
        let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let stopped = Arc::new(AtomicBool::new(false));
        let _handle = spawn_counter(notifier.clone(), seen.clone(), stopped);

        time::sleep(Duration::from_millis(20)).await;
        notifier.notify_one();
        time::sleep(Duration::from_millis(20)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        notifier.notify_one();
        time::sleep(Duration::from_millis(20)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_join_stops_runner() {
        let notifier = Arc::new(Notify::new());
        let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let stopped = Arc::new(AtomicBool::new(false));
        let handle = spawn_counter(notifier, seen, stopped.clone());

        handle.join().await;

        assert!(!handle.is_running());
        assert!(stopped.load(Ordering::SeqCst));
        // second join has nothing left to await
        handle.join().await;
    }

    #[tokio::test]
    async fn test_drop_triggers_shutdown() {
        let notifier = Arc::new(Notify::new());
        let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let stopped = Arc::new(AtomicBool::new(false));

        {
            let _handle = spawn_counter(notifier, seen, stopped.clone());
            time::sleep(Duration::from_millis(20)).await;
        }

        time::sleep(Duration::from_millis(50)).await;
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_multiple_shutdowns() {
        let notifier = Arc::new(Notify::new());
        let handle = RunnerHandle::spawn(notifier, |running| async move {
            while running.load(Ordering::SeqCst) {
                time::sleep(Duration::from_millis(10)).await;
            }
        });

        handle.shutdown();
        handle.shutdown();
        handle.shutdown();

        assert!(!handle.is_running());
    }
}
