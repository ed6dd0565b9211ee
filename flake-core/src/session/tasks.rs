//! Cancellable background tasks

use std::future::Future;

use tokio::sync::oneshot;
use tracing::trace;

/// Owns a spawned task. Cancelling or dropping the handle stops it at its
/// next await point.
#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    cancel: Option<oneshot::Sender<()>>,
}

impl TaskHandle {
    /// Spawn `task` on the current tokio runtime
    pub fn spawn<F>(name: &'static str, task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel_rx => trace!("Task {} cancelled", name),
                _ = task => trace!("Task {} finished", name),
            }
        });

        Self {
            name,
            cancel: Some(cancel_tx),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the task already ended on its own or was cancelled
    pub fn is_finished(&self) -> bool {
        self.cancel.as_ref().map_or(true, |tx| tx.is_closed())
    }

    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let handle = TaskHandle::spawn("timer", async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(handle);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_to_completion() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let handle = TaskHandle::spawn("timer", async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
        assert_eq!(handle.name(), "timer");
    }
}
