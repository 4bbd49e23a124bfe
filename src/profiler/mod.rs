pub mod stability;
pub mod stats;
pub mod summary;
pub mod window;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ProfilerConfig;
use crate::error::Result;
use crate::metrics::Metrics;

pub use stability::{LatencyThreshold, LoadParams, LoadStatus, ProfilingDecision, StabilityDetector};
pub use stats::{mean_and_std_dev, LatencyStats, UNBOUNDED_STD_DEV_US};
pub use summary::{summarize_overhead, summarize_send_request_rate, summarize_windows, PerfStatus};
pub use window::{valid_latency_measurement, LatencyWindow, TimestampRecord};

// ─── Load driver seam ────────────────────────────────────────────

/// Everything the load generator hands back for one measurement window.
#[derive(Debug, Clone, Default)]
pub struct WindowCapture {
    /// `[start, end]` in nanoseconds on the same clock as `timestamps`.
    pub window: (u64, u64),
    pub timestamps: Vec<TimestampRecord>,
    /// Requests issued during the window, finished or not.
    pub sent_requests: usize,
    /// Worker time spent waiting, summed over workers.
    pub idle_ns: u64,
    pub worker_count: usize,
    pub gpu_snapshots: Vec<Metrics>,
}

impl WindowCapture {
    pub fn duration_ns(&self) -> u64 {
        self.window.1.saturating_sub(self.window.0)
    }
}

/// The component that actually sends inference requests.
#[async_trait]
pub trait LoadDriver: Send {
    /// Move to a new level; requests issued at the old one may still finish.
    async fn set_concurrency(&mut self, concurrency: usize) -> Result<()>;

    /// Let load run for `window` and hand back what happened in it.
    async fn measure(&mut self, window: Duration) -> Result<WindowCapture>;
}

// ─── Published results ───────────────────────────────────────────

/// Result of profiling one level.
#[derive(Debug, Clone, Serialize)]
pub struct LevelResult {
    pub status: PerfStatus,
    pub stable: bool,
    pub trials: usize,
}

/// Every per-trial `PerfStatus` of the run, readable while the sweep runs.
#[derive(Debug, Default)]
pub struct StatusBoard {
    inner: Mutex<Vec<PerfStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, status: PerfStatus) {
        self.inner.lock().push(status);
    }

    pub fn snapshot(&self) -> Vec<PerfStatus> {
        self.inner.lock().clone()
    }

    pub fn latest(&self) -> Option<PerfStatus> {
        self.inner.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

// ─── Profiler ────────────────────────────────────────────────────

/// Drives a [`LoadDriver`] through the configured levels, measuring each
/// one until it is stable, over the latency limit, or out of trials.
pub struct Profiler {
    config: ProfilerConfig,
    detector: StabilityDetector,
    board: Option<Arc<StatusBoard>>,
}

impl Profiler {
    pub fn new(config: ProfilerConfig) -> Result<Self> {
        config.validate()?;
        let detector = StabilityDetector::new(config.load_params(), config.latency_threshold());
        Ok(Self {
            config,
            detector,
            board: None,
        })
    }

    /// Publish every trial's status to `board` as it completes.
    pub fn with_board(mut self, board: Arc<StatusBoard>) -> Self {
        self.board = Some(board);
        self
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    /// Measure one level until the detector says it is done.
    ///
    /// A stable level reports the trailing stability window merged into one
    /// status; otherwise the last trial is reported as-is.
    pub async fn profile_level<D: LoadDriver + ?Sized>(
        &self,
        driver: &mut D,
        concurrency: usize,
    ) -> Result<LevelResult> {
        driver.set_concurrency(concurrency).await?;
        info!(concurrency, "profiling level");

        let window = self.config.measurement_window();
        let keep = self.config.stability_window;
        let mut load_status = LoadStatus::new();
        let mut recent: VecDeque<WindowCapture> = VecDeque::with_capacity(keep + 1);
        let mut trial = 0;

        loop {
            trial += 1;
            let capture = driver.measure(window).await?;
            let status = summarize_windows(
                concurrency,
                std::slice::from_ref(&capture),
                self.config.percentile,
            )?;

            load_status.push(status.client_stats.infer_per_sec, status.stabilizing_latency_ns);
            let decision = self.detector.is_done_profiling(&load_status);

            debug!(
                concurrency,
                trial,
                infer_per_sec = status.client_stats.infer_per_sec,
                latency_us = status.stabilizing_latency_ns / 1_000,
                stable = decision.stable,
                "trial complete"
            );

            if let Some(board) = &self.board {
                board.publish(status.clone());
            }

            recent.push_back(capture);
            if recent.len() > keep {
                recent.pop_front();
            }

            if decision.done || trial >= self.config.max_trials {
                if !decision.stable {
                    warn!(
                        concurrency,
                        trials = trial,
                        "failed to obtain a stable measurement"
                    );
                    return Ok(LevelResult {
                        status,
                        stable: false,
                        trials: trial,
                    });
                }

                let merged = summarize_windows(
                    concurrency,
                    recent.make_contiguous(),
                    self.config.percentile,
                )?;
                return Ok(LevelResult {
                    status: merged,
                    stable: true,
                    trials: trial,
                });
            }
        }
    }

    /// Walk every configured level in order.
    ///
    /// Stops after the first level that is unstable or whose stabilizing
    /// latency breaks the threshold; that level is still reported.
    pub async fn sweep<D: LoadDriver + ?Sized>(&self, driver: &mut D) -> Result<Vec<LevelResult>> {
        let threshold = self.config.latency_threshold();
        let mut results = Vec::new();

        for concurrency in self.config.concurrency_levels() {
            let result = self.profile_level(driver, concurrency).await?;
            let over_limit = threshold.is_exceeded_by(result.status.stabilizing_latency_ns);
            let stable = result.stable;

            info!(
                concurrency,
                infer_per_sec = result.status.client_stats.infer_per_sec,
                latency_us = result.status.stabilizing_latency_ns / 1_000,
                stable,
                "level complete"
            );
            results.push(result);

            if over_limit {
                warn!(?threshold, concurrency, "measured latency went over the set limit");
                break;
            }
            if !stable {
                break;
            }
        }

        Ok(results)
    }
}
