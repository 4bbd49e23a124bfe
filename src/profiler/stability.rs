use serde::{Deserialize, Serialize};

const NANOS_PER_MILLI: u64 = 1_000_000;

// ─── History & parameters ────────────────────────────────────────

/// Per-trial history for one load level, one entry per measurement window.
///
/// Only `push` grows it, so both sequences always have the same length and
/// keep iteration order; stability windows are positional.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadStatus {
    infer_per_sec: Vec<f64>,
    latencies: Vec<u64>,
}

impl LoadStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, infer_per_sec: f64, latency_ns: u64) {
        self.infer_per_sec.push(infer_per_sec);
        self.latencies.push(latency_ns);
    }

    pub fn len(&self) -> usize {
        self.infer_per_sec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infer_per_sec.is_empty()
    }

    pub fn infer_per_sec(&self) -> &[f64] {
        &self.infer_per_sec
    }

    pub fn latencies(&self) -> &[u64] {
        &self.latencies
    }
}

impl FromIterator<(f64, u64)> for LoadStatus {
    fn from_iter<I: IntoIterator<Item = (f64, u64)>>(entries: I) -> Self {
        let mut status = Self::new();
        for (throughput, latency) in entries {
            status.push(throughput, latency);
        }
        status
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadParams {
    /// Number of trailing trials examined together.
    pub stability_window: usize,
    /// Largest allowed `(max - min) / mean` inside a window, e.g. `0.1`.
    pub stability_threshold: f64,
}

impl Default for LoadParams {
    fn default() -> Self {
        Self {
            stability_window: 3,
            stability_threshold: 0.1,
        }
    }
}

/// Upper bound on the stabilizing latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LatencyThreshold {
    #[default]
    NoLimit,
    Millis(u64),
}

impl LatencyThreshold {
    /// `None` (or zero, the legacy CLI spelling) means no limit.
    pub fn from_millis(ms: Option<u64>) -> Self {
        match ms {
            Some(ms) if ms > 0 => Self::Millis(ms),
            _ => Self::NoLimit,
        }
    }

    pub fn as_nanos(&self) -> Option<u64> {
        match self {
            Self::NoLimit => None,
            Self::Millis(ms) => Some(ms.saturating_mul(NANOS_PER_MILLI)),
        }
    }

    pub fn is_exceeded_by(&self, latency_ns: u64) -> bool {
        self.as_nanos().is_some_and(|limit| latency_ns > limit)
    }
}

/// Outcome of one `is_done_profiling` check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProfilingDecision {
    /// Some full window in the history met the stability threshold.
    pub stable: bool,
    /// The control loop may stop measuring this level.
    pub done: bool,
}

// ─── Detector ────────────────────────────────────────────────────

/// Windowed convergence test over a [`LoadStatus`] history.
///
/// Every check answers `false` while the history is shorter than the
/// stability window; that is "keep measuring", not an error.
#[derive(Debug, Clone, Copy)]
pub struct StabilityDetector {
    params: LoadParams,
    latency_threshold: LatencyThreshold,
}

impl StabilityDetector {
    pub fn new(params: LoadParams, latency_threshold: LatencyThreshold) -> Self {
        Self {
            params,
            latency_threshold,
        }
    }

    pub fn params(&self) -> LoadParams {
        self.params
    }

    /// Start offset of the most recent full window, if one fits.
    pub fn trailing_window_start(&self, status: &LoadStatus) -> Option<usize> {
        status.len().checked_sub(self.params.stability_window)
    }

    fn window<'a>(
        &self,
        window_start: usize,
        status: &'a LoadStatus,
    ) -> Option<(&'a [f64], &'a [u64])> {
        let window = self.params.stability_window;
        if window == 0 {
            return None;
        }
        let end = window_start.checked_add(window)?;
        if end > status.len() {
            return None;
        }
        Some((
            &status.infer_per_sec[window_start..end],
            &status.latencies[window_start..end],
        ))
    }

    /// Every latency in the window at `window_start` is within the threshold.
    ///
    /// Always true under [`LatencyThreshold::NoLimit`]; false when the window
    /// does not fit.
    pub fn check_within_threshold(&self, window_start: usize, status: &LoadStatus) -> bool {
        let Some((_, latencies)) = self.window(window_start, status) else {
            return false;
        };
        latencies
            .iter()
            .all(|&latency| !self.latency_threshold.is_exceeded_by(latency))
    }

    /// Throughput and latency both vary by at most `stability_threshold`
    /// relative to their mean over the window at `window_start`.
    pub fn check_window_for_stability(&self, window_start: usize, status: &LoadStatus) -> bool {
        let Some((throughputs, latencies)) = self.window(window_start, status) else {
            return false;
        };

        // A stalled trial says nothing about convergence
        if throughputs.iter().any(|&t| t == 0.0) {
            return false;
        }

        let threshold = self.params.stability_threshold;
        within_spread(throughputs.iter().copied(), threshold)
            && within_spread(latencies.iter().map(|&l| l as f64), threshold)
    }

    /// Whether any full window in the history was stable.
    ///
    /// Scans every offset, so a level that converged earlier counts even if
    /// the latest trials got noisy.
    pub fn determine_stability(&self, status: &LoadStatus) -> bool {
        match self.trailing_window_start(status) {
            Some(last) if self.params.stability_window > 0 => {
                (0..=last).any(|start| self.check_window_for_stability(start, status))
            }
            _ => false,
        }
    }

    /// Decide whether the current level needs more trials.
    ///
    /// Done once the history is stable, or once the trailing window breaks
    /// the latency threshold (more trials at this level cannot bring it back
    /// under). Never done before a full window exists.
    pub fn is_done_profiling(&self, status: &LoadStatus) -> ProfilingDecision {
        let stable = self.determine_stability(status);

        let done = match self.trailing_window_start(status) {
            Some(start) if self.params.stability_window > 0 => {
                stable || !self.check_within_threshold(start, status)
            }
            _ => false,
        };

        ProfilingDecision { stable, done }
    }
}

/// `max - min <= threshold * mean` over a non-empty window.
fn within_spread(values: impl Iterator<Item = f64>, threshold: f64) -> bool {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    let mut count = 0usize;

    for v in values {
        min = min.min(v);
        max = max.max(v);
        sum += v;
        count += 1;
    }

    if count == 0 {
        return false;
    }
    let mean = sum / count as f64;
    max - min <= threshold * mean
}
