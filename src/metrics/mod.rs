pub mod collector;
pub mod merge;
pub mod percentiles;
pub mod report;
pub mod stream;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub use collector::{GpuMetricsSource, MetricsCollector};
pub use merge::merge_metrics;
pub use percentiles::PercentileSet;

/// One set of per-GPU readings, keyed by GPU identifier.
///
/// Any map may be missing any GPU: telemetry scrapes race with device
/// hot-plug and exporter restarts, so partial snapshots are normal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Fraction of time busy, 0.0 – 1.0
    pub gpu_utilization_per_gpu: BTreeMap<String, f64>,
    /// Watts
    pub gpu_power_usage_per_gpu: BTreeMap<String, f64>,
    pub gpu_memory_used_bytes_per_gpu: BTreeMap<String, u64>,
    pub gpu_memory_total_bytes_per_gpu: BTreeMap<String, u64>,
}

impl Metrics {
    /// Every GPU that appears in at least one of the four maps, sorted.
    pub fn gpu_keys(&self) -> BTreeSet<&str> {
        self.gpu_utilization_per_gpu
            .keys()
            .chain(self.gpu_power_usage_per_gpu.keys())
            .chain(self.gpu_memory_used_bytes_per_gpu.keys())
            .chain(self.gpu_memory_total_bytes_per_gpu.keys())
            .map(String::as_str)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.gpu_utilization_per_gpu.is_empty()
            && self.gpu_power_usage_per_gpu.is_empty()
            && self.gpu_memory_used_bytes_per_gpu.is_empty()
            && self.gpu_memory_total_bytes_per_gpu.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_keys_is_the_sorted_union() {
        let mut m = Metrics::default();
        m.gpu_utilization_per_gpu.insert("gpu1".into(), 0.5);
        m.gpu_power_usage_per_gpu.insert("gpu0".into(), 70.0);
        m.gpu_memory_total_bytes_per_gpu.insert("gpu1".into(), 1);
        m.gpu_memory_used_bytes_per_gpu.insert("gpu2".into(), 1);

        let keys: Vec<_> = m.gpu_keys().into_iter().collect();
        assert_eq!(keys, vec!["gpu0", "gpu1", "gpu2"]);
        assert!(!m.is_empty());
        assert!(Metrics::default().is_empty());
    }
}
