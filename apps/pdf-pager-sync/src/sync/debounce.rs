//! Timer-reset debounce primitive
//!
//! `schedule` (re)starts a quiet-period timer; only the action passed to the
//! last `schedule` before the timer expires runs. The action is spawned as
//! its own task once the timer fires, so rescheduling or cancelling never
//! interrupts an action that is already running.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

pub struct Debouncer {
    name: &'static str,
    delay: Duration,
    runtime: Handle,
    generation: Arc<AtomicU64>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    /// Must be called from within a tokio runtime
    pub fn new(name: &'static str, delay: Duration) -> Self {
        Self {
            name,
            delay,
            runtime: Handle::current(),
            generation: Arc::new(AtomicU64::new(0)),
            timer: Mutex::new(None),
        }
    }

    /// Run `action` after the quiet period, replacing any pending action
    pub fn schedule<F>(&self, action: F)
    where
        F: FnOnce() -> BoxFuture<'static, ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = Arc::clone(&self.generation);
        let delay = self.delay;
        let name = self.name;

        let timer = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            tracing::trace!(debouncer = name, "Quiet period elapsed");
            tokio::spawn(action());
        });

        if let Some(previous) = self.timer.lock().replace(timer) {
            previous.abort();
        }
    }

    /// Drop the pending action, if any
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
    }

    /// Whether a timer is still counting down
    pub fn is_pending(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .map_or(false, |timer| !timer.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::AtomicUsize;

    fn counting_action(counter: &Arc<AtomicUsize>) -> impl FnOnce() -> BoxFuture<'static, ()> {
        let counter = Arc::clone(counter);
        move || {
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_runs_once() {
        let debouncer = Debouncer::new("test", Duration::from_millis(250));
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            debouncer.schedule(counting_action(&runs));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_windows_run_separately() {
        let debouncer = Debouncer::new("test", Duration::from_millis(250));
        let runs = Arc::new(AtomicUsize::new(0));

        debouncer.schedule(counting_action(&runs));
        tokio::time::sleep(Duration::from_millis(400)).await;
        debouncer.schedule(counting_action(&runs));
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_action() {
        let debouncer = Debouncer::new("test", Duration::from_millis(250));
        let runs = Arc::new(AtomicUsize::new(0));

        debouncer.schedule(counting_action(&runs));
        assert!(debouncer.is_pending());
        debouncer.cancel();
        assert!(!debouncer.is_pending());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let runs = Arc::new(AtomicUsize::new(0));
        {
            let debouncer = Debouncer::new("test", Duration::from_millis(250));
            debouncer.schedule(counting_action(&runs));
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
