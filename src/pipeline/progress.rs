use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::info;

/// Periodic throughput reporter
///
/// Workers bump the shared counter with a relaxed add; this thread snapshots
/// and resets it on a fixed interval. No clock reads happen on the hot path.
pub struct ProgressMonitor {
    shared: Arc<MonitorShared>,
    handle: Option<JoinHandle<()>>,
}

struct MonitorShared {
    stopped: Mutex<bool>,
    wakeup: Condvar,
}

impl ProgressMonitor {
    /// Spawn the reporter thread reading `lines` every `interval`
    pub fn start(interval: Duration, lines: Arc<AtomicU64>) -> Self {
        let shared = Arc::new(MonitorShared {
            stopped: Mutex::new(false),
            wakeup: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::spawn(move || loop {
            let mut stopped = thread_shared.stopped.lock();
            if *stopped {
                break;
            }
            let timed_out = thread_shared
                .wakeup
                .wait_for(&mut stopped, interval)
                .timed_out();
            if *stopped {
                break;
            }
            if timed_out {
                let processed = lines.swap(0, Ordering::Relaxed);
                info!("Processed {} lines/min", processed);
            }
        });

        Self {
            shared,
            handle: Some(handle),
        }
    }

    /// Stop and join the reporter
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            *self.shared.stopped.lock() = true;
            self.shared.wakeup.notify_all();
            let _ = handle.join();
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_joins_quickly() {
        let counter = Arc::new(AtomicU64::new(0));
        let monitor = ProgressMonitor::start(Duration::from_secs(3600), counter);
        // must return long before the interval elapses
        monitor.stop();
    }

    #[test]
    fn test_counter_resets_on_snapshot() {
        let counter = Arc::new(AtomicU64::new(0));
        let monitor = ProgressMonitor::start(Duration::from_millis(20), Arc::clone(&counter));
        counter.fetch_add(42, Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(counter.load(Ordering::Relaxed), 0);
        monitor.stop();
    }
}
