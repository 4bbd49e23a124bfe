use chrono::{DateTime, Utc};
use serde::Serialize;

use super::stats::{mean_and_std_dev, LatencyStats};
use super::window::valid_latency_measurement;
use super::WindowCapture;
use crate::error::{ProfileError, Result};
use crate::metrics::percentiles::{build_histogram, PercentileSet};
use crate::metrics::{merge_metrics, Metrics};

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

// ─── Public types ────────────────────────────────────────────────

/// What the client side observed over one (possibly merged) window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientStats {
    /// Requests that started and finished inside the window.
    pub request_count: usize,
    pub sequence_count: usize,
    pub delayed_request_count: usize,
    pub duration_ns: u64,
    pub infer_per_sec: f64,
    pub latency: LatencyStats,
    pub percentiles: PercentileSet,
}

/// Everything known about one load level after a measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerfStatus {
    pub concurrency: usize,
    pub client_stats: ClientStats,
    /// Latency the stability check runs on: the configured percentile,
    /// or the mean when none is set.
    pub stabilizing_latency_ns: u64,
    pub overhead_pct: f64,
    pub send_request_rate: f64,
    pub metrics: Metrics,
    pub captured_at: DateTime<Utc>,
}

// ─── Derivations ─────────────────────────────────────────────────

/// Share of worker time spent doing anything but waiting, in percent.
///
/// `window_duration_ns` is summed over every worker. Idle time is measured
/// independently and can come out larger; that reads as zero overhead.
pub fn summarize_overhead(window_duration_ns: u64, idle_ns: u64) -> f64 {
    if window_duration_ns == 0 || idle_ns >= window_duration_ns {
        return 0.0;
    }
    let overhead_ns = window_duration_ns - idle_ns;
    overhead_ns as f64 / window_duration_ns as f64 * 100.0
}

/// Requests issued per second over the window.
pub fn summarize_send_request_rate(
    window_duration_s: f64,
    num_sent_requests: usize,
) -> Result<f64> {
    if window_duration_s.is_nan() || window_duration_s <= 0.0 {
        return Err(ProfileError::InvalidArgument(
            "window_duration_s must be positive".into(),
        ));
    }
    Ok(num_sent_requests as f64 / window_duration_s)
}

/// Build a [`PerfStatus`] from one or more consecutive windows.
///
/// Latencies from every window are pooled before the statistics run, so a
/// merged status reports the true spread rather than an average of spreads.
pub fn summarize_windows(
    concurrency: usize,
    captures: &[WindowCapture],
    percentile: Option<u8>,
) -> Result<PerfStatus> {
    let mut latencies = Vec::new();
    let mut sequence_count = 0;
    let mut delayed_request_count = 0;
    let mut duration_ns = 0u64;
    let mut worker_time_ns = 0u64;
    let mut idle_ns = 0u64;
    let mut sent_requests = 0usize;

    for capture in captures {
        let window = valid_latency_measurement(capture.window, &capture.timestamps);
        latencies.extend_from_slice(&window.latencies);
        sequence_count += window.valid_sequence_count;
        delayed_request_count += window.delayed_request_count;

        let span = capture.duration_ns();
        duration_ns += span;
        worker_time_ns += span.saturating_mul(capture.worker_count as u64);
        idle_ns += capture.idle_ns;
        sent_requests += capture.sent_requests;
    }

    let duration_s = duration_ns as f64 / NANOS_PER_SEC;
    let send_request_rate = summarize_send_request_rate(duration_s, sent_requests)?;

    let latency = mean_and_std_dev(&latencies);
    let hist = build_histogram(&latencies);
    let stabilizing_latency_ns = match percentile {
        Some(p) if !latencies.is_empty() => hist.value_at_percentile(f64::from(p)),
        _ => latency.mean_ns,
    };

    let metrics = merge_metrics(captures.iter().flat_map(|c| c.gpu_snapshots.iter()));

    Ok(PerfStatus {
        concurrency,
        client_stats: ClientStats {
            request_count: latencies.len(),
            sequence_count,
            delayed_request_count,
            duration_ns,
            infer_per_sec: latencies.len() as f64 / duration_s,
            latency,
            percentiles: PercentileSet::from_histogram(&hist),
        },
        stabilizing_latency_ns,
        overhead_pct: summarize_overhead(worker_time_ns, idle_ns),
        send_request_rate,
        metrics,
        captured_at: Utc::now(),
    })
}
