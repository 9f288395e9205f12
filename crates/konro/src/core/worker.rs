//! Handle for the background task that drains a generation queue.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::{sync::Notify, task::JoinHandle};

/// A handle owning one long-running background worker task.
///
/// The worker is spawned on construction, woken through [`notify`](Self::notify)
/// whenever new work is queued, and shut down gracefully when the handle is
/// dropped: the running flag flips to `false` and a final notification lets
/// the task observe it and exit.
pub(crate) struct WorkerHandle {
    /// Flag the worker polls to decide whether to keep running.
    running: Arc<AtomicBool>,

    /// Handle to the spawned task, taken once shutdown starts.
    handle: Option<JoinHandle<()>>,

    /// Wakes the worker when work arrives.
    notifier: Arc<Notify>,
}

impl WorkerHandle {
    /// Spawns a worker task.
    ///
    /// `task` receives the shared running flag and notifier and must return
    /// the `JoinHandle` of the spawned loop.
    pub fn new<F>(task: F) -> Self
    where
        F: FnOnce(Arc<AtomicBool>, Arc<Notify>) -> JoinHandle<()> + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let notifier = Arc::new(Notify::new());
        let handle = task(running.clone(), notifier.clone());

        Self {
            running,
            handle: Some(handle),
            notifier,
        }
    }

    /// Wakes the worker to drain newly queued work.
    pub fn notify(&self) {
        self.notifier.notify_one();
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Flips the running flag and lets the task wind down in the background.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.notifier.notify_one();

        if let Some(handle) = self.handle.take() {
            tokio::spawn(async move {
                let _ = handle.await;
            });
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
