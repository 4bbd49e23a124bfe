use serde::Serialize;

/// Reported in place of a standard deviation when the sample is too small to
/// have one. Read it as "unbounded", never as a real measurement.
pub const UNBOUNDED_STD_DEV_US: u64 = u64::MAX;

const NANOS_PER_MICRO: f64 = 1_000.0;

/// Mean latency (ns) and sample standard deviation (µs) of one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatencyStats {
    pub mean_ns: u64,
    pub std_dev_us: u64,
}

impl LatencyStats {
    /// True when the std-dev is the single-sample sentinel.
    pub fn is_std_dev_unbounded(&self) -> bool {
        self.std_dev_us == UNBOUNDED_STD_DEV_US
    }
}

/// Mean and Bessel-corrected standard deviation of `latencies`.
///
/// The sum is accumulated in `u128`, so any number of `u64` values averages
/// exactly. The variance uses Welford's running update, which only ever
/// squares deviations from the running mean; raw values in the tens of
/// seconds would overflow a `u64` square.
///
/// Fewer than two samples give [`UNBOUNDED_STD_DEV_US`]; an empty sample
/// also has a mean of zero.
pub fn mean_and_std_dev(latencies: &[u64]) -> LatencyStats {
    let count = latencies.len();
    if count == 0 {
        return LatencyStats {
            mean_ns: 0,
            std_dev_us: UNBOUNDED_STD_DEV_US,
        };
    }

    let sum: u128 = latencies.iter().map(|&l| u128::from(l)).sum();
    // sum / count never exceeds the largest input
    let mean_ns = (sum / count as u128) as u64;

    if count == 1 {
        return LatencyStats {
            mean_ns,
            std_dev_us: UNBOUNDED_STD_DEV_US,
        };
    }

    let mut running_mean = 0.0_f64;
    let mut m2 = 0.0_f64;
    for (i, &latency) in latencies.iter().enumerate() {
        let x = latency as f64;
        let delta = x - running_mean;
        running_mean += delta / (i + 1) as f64;
        m2 += delta * (x - running_mean);
    }

    let variance_ns2 = m2 / (count - 1) as f64;
    let std_dev_us = (variance_ns2.sqrt() / NANOS_PER_MICRO) as u64;

    LatencyStats {
        mean_ns,
        std_dev_us,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_latencies() {
        let stats = mean_and_std_dev(&[100_000, 200_000, 50_000]);
        assert_eq!(stats.mean_ns, 116_666);
        assert_eq!(stats.std_dev_us, 76);
    }

    #[test]
    fn big_latencies_do_not_overflow() {
        // Each of these squared is past u64::MAX
        let stats = mean_and_std_dev(&[4_300_000_000, 4_400_000_000, 5_000_000_000]);
        assert_eq!(stats.mean_ns, 4_566_666_666);
        assert_eq!(stats.std_dev_us, 378_593);
    }

    #[test]
    fn single_latency_has_unbounded_std_dev() {
        let stats = mean_and_std_dev(&[100]);
        assert_eq!(stats.mean_ns, 100);
        assert_eq!(stats.std_dev_us, u64::MAX);
        assert!(stats.is_std_dev_unbounded());
    }

    #[test]
    fn empty_sample_is_total() {
        let stats = mean_and_std_dev(&[]);
        assert_eq!(stats.mean_ns, 0);
        assert!(stats.is_std_dev_unbounded());
    }

    #[test]
    fn mean_of_values_near_u64_max() {
        let stats = mean_and_std_dev(&[u64::MAX, u64::MAX, u64::MAX - 2]);
        assert_eq!(stats.mean_ns, u64::MAX - 1);
    }

    #[test]
    fn identical_samples_have_zero_std_dev() {
        let stats = mean_and_std_dev(&[5_000_000; 8]);
        assert_eq!(stats.mean_ns, 5_000_000);
        assert_eq!(stats.std_dev_us, 0);
    }
}
