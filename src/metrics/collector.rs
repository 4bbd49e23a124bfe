use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use super::Metrics;

// ─── Configuration ───────────────────────────────────────────────

/// Snapshots kept per window; at the default 1 s interval this covers
/// more than ten minutes, far past any sensible measurement window.
const MAX_SNAPSHOTS: usize = 1_024;

// ─── Public types ────────────────────────────────────────────────

/// Anything that can read the current per-GPU telemetry.
pub trait GpuMetricsSource: Send + 'static {
    fn snapshot(&mut self) -> Metrics;
}

/// Thread-safe buffer of telemetry snapshots for the current window.
/// The sampler task calls `record()`, the load driver calls `take()`.
pub struct MetricsCollector {
    inner: Mutex<VecDeque<Metrics>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(64)),
        }
    }

    /// Store one snapshot, dropping the oldest once the buffer is full.
    pub fn record(&self, snapshot: Metrics) {
        let mut inner = self.inner.lock();
        inner.push_back(snapshot);
        if inner.len() > MAX_SNAPSHOTS {
            inner.pop_front();
        }
    }

    /// Wipe all snapshots; called when a new window starts.
    pub fn reset(&self) {
        self.inner.lock().clear();
    }

    /// Hand over every snapshot recorded since the last reset, in order.
    pub fn take(&self) -> Vec<Metrics> {
        self.inner.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Poll `source` every `interval` until `running` goes false.
pub fn spawn_sampler<S: GpuMetricsSource>(
    mut source: S,
    collector: Arc<MetricsCollector>,
    interval: Duration,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        while running.load(Ordering::Relaxed) {
            ticker.tick().await;
            let snapshot = source.snapshot();
            debug!(gpus = snapshot.gpu_keys().len(), "gpu metrics sampled");
            collector.record(snapshot);
        }
    })
}
