use serde::{Deserialize, Serialize};

/// One request as seen by the load generator.
///
/// Times are nanoseconds since the run's anchor `Instant`. Workers push these
/// in completion order, so a log is not sorted by `start_ns`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampRecord {
    pub start_ns: u64,
    pub end_ns: u64,
    /// Non-zero when the request carried a sequence-end flag.
    pub sequence_id: u32,
    /// Issued later than its schedule asked for.
    pub delayed: bool,
}

impl TimestampRecord {
    pub fn new(start_ns: u64, end_ns: u64) -> Self {
        Self {
            start_ns,
            end_ns,
            sequence_id: 0,
            delayed: false,
        }
    }
}

/// Latencies of the requests that fit inside one measurement window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatencyWindow {
    /// `end - start` in nanoseconds, in log order.
    pub latencies: Vec<u64>,
    pub valid_sequence_count: usize,
    pub delayed_request_count: usize,
}

impl LatencyWindow {
    pub fn len(&self) -> usize {
        self.latencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latencies.is_empty()
    }
}

/// Collect the latency of every record fully contained in the closed range
/// `[window.0, window.1]`.
///
/// A request that straddles either edge belongs to neither window, so
/// consecutive windows never count the same request twice.
pub fn valid_latency_measurement(
    window: (u64, u64),
    records: &[TimestampRecord],
) -> LatencyWindow {
    let (window_start, window_end) = window;
    let mut out = LatencyWindow::default();

    for record in records {
        // Skewed clocks can report an end before the start
        if record.end_ns < record.start_ns {
            continue;
        }
        if record.start_ns < window_start || record.end_ns > window_end {
            continue;
        }

        out.latencies.push(record.end_ns - record.start_ns);
        if record.sequence_id != 0 {
            out.valid_sequence_count += 1;
        }
        if record.delayed {
            out.delayed_request_count += 1;
        }
    }

    out
}
