use hdrhistogram::Histogram;
use serde::Serialize;

/// Histogram range in nanoseconds: 1 ns up to one hour.
/// Anything slower is recorded as one hour.
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 3_600_000_000_000;
/// 3 significant figures keeps every percentile within 0.1 % of the truth.
const HIST_SIGFIG: u8 = 3;

/// Percentile breakdown of one window's latencies, in nanoseconds.
/// Serialized into the status JSON and printed in the client summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileSet {
    pub min: u64,
    pub max: u64,
    pub p50: u64,
    pub p90: u64,
    pub p95: u64,
    pub p99: u64,
    pub count: u64,
}

/// Load a latency sample into a histogram covering `HIST_LOW..=HIST_HIGH`.
pub fn build_histogram(latencies_ns: &[u64]) -> Histogram<u64> {
    let mut hist = Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
        .expect("histogram creation");
    for &latency in latencies_ns {
        hist.saturating_record(latency);
    }
    hist
}

impl PercentileSet {
    /// Extract a full percentile set from an HdrHistogram.
    /// Returns zeroed values if the histogram is empty.
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self::empty();
        }

        Self {
            min: hist.min(),
            max: hist.max(),
            p50: hist.value_at_percentile(50.0),
            p90: hist.value_at_percentile(90.0),
            p95: hist.value_at_percentile(95.0),
            p99: hist.value_at_percentile(99.0),
            count: hist.len(),
        }
    }

    pub fn from_latencies(latencies_ns: &[u64]) -> Self {
        Self::from_histogram(&build_histogram(latencies_ns))
    }

    /// All-zero placeholder for a window with no completed requests.
    pub fn empty() -> Self {
        Self {
            min: 0,
            max: 0,
            p50: 0,
            p90: 0,
            p95: 0,
            p99: 0,
            count: 0,
        }
    }

    pub fn has_data(&self) -> bool {
        self.count > 0
    }
}
