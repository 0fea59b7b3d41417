//! Connectivity tracking
//!
//! A process-wide online/offline flag plus an explicit, cancellable
//! scheduled probe that keeps it fresh. Nothing here starts on its own;
//! hosts decide whether to flip the flag themselves or run a probe.

use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Answers "can the remote store be reached right now?".
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Process-wide connectivity flag.
///
/// Assumed online until a probe or the host says otherwise, which is
/// what lets the first toggle after startup attempt a direct write.
pub struct NetworkMonitor {
    online: AtomicBool,
}

impl NetworkMonitor {
    pub fn new(initially_online: bool) -> Self {
        Self {
            online: AtomicBool::new(initially_online),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn set_online(&self, online: bool) {
        let was = self.online.swap(online, Ordering::AcqRel);
        if was != online {
            info!(online, "connectivity changed");
        }
    }

    /// Run `probe` immediately and then every `period`, updating the
    /// flag from each result. The returned handle owns the task.
    pub fn start_probe(
        self: &Arc<Self>,
        probe: Arc<dyn ConnectivityProbe>,
        period: Duration,
    ) -> ScheduledTask {
        let monitor = Arc::clone(self);
        ScheduledTask::spawn(period, move || {
            let monitor = Arc::clone(&monitor);
            let probe = Arc::clone(&probe);
            async move {
                let reachable = probe.is_reachable().await;
                monitor.set_online(reachable);
            }
        })
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Handle to a cancellable periodic task.
///
/// The task stops when [`ScheduledTask::cancel`] is called or when the
/// handle drops, so a forgotten handle cannot leave a timer running for
/// the life of the process.
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Spawn a task that runs `op` immediately and then every `period`.
    pub fn spawn<F, Fut>(period: Duration, mut op: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                op().await;
            }
        });
        Self { handle }
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn monitor_tracks_transitions() {
        let monitor = NetworkMonitor::default();
        assert!(monitor.is_online());

        monitor.set_online(false);
        assert!(!monitor.is_online());

        monitor.set_online(true);
        assert!(monitor.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_task_repeats_until_cancelled() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let task = ScheduledTask::spawn(Duration::from_millis(100), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(350)).await;
        let before_cancel = runs.load(Ordering::SeqCst);
        assert!(before_cancel >= 2, "expected repeated runs, got {}", before_cancel);

        task.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), before_cancel);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_updates_monitor() {
        struct FlakyProbe {
            reachable: AtomicBool,
        }

        #[async_trait]
        impl ConnectivityProbe for FlakyProbe {
            async fn is_reachable(&self) -> bool {
                self.reachable.load(Ordering::SeqCst)
            }
        }

        let probe = Arc::new(FlakyProbe {
            reachable: AtomicBool::new(false),
        });
        let monitor = Arc::new(NetworkMonitor::default());
        let _task = monitor.start_probe(probe.clone(), Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!monitor.is_online());

        probe.reachable.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(monitor.is_online());
    }
}
