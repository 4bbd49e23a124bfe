use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProfileError, Result};
use crate::profiler::stability::{LatencyThreshold, LoadParams};

// ─── Profiler configuration ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilerConfig {
    /// Length of one measurement window (ms)
    #[serde(default = "default_measurement_window_ms")]
    pub measurement_window_ms: u64,

    /// Windows to try per level before giving up on stability
    #[serde(default = "default_max_trials")]
    pub max_trials: usize,

    /// Trailing windows compared for stability
    #[serde(default = "default_stability_window")]
    pub stability_window: usize,

    /// Allowed relative spread inside the stability window (0.1 = ±10 %)
    #[serde(default = "default_stability_threshold")]
    pub stability_threshold: f64,

    /// Upper bound on the stabilizing latency; absent means no limit
    #[serde(default)]
    pub latency_threshold_ms: Option<u64>,

    /// Stabilize on this latency percentile instead of the mean
    #[serde(default)]
    pub percentile: Option<u8>,

    #[serde(default = "default_concurrency")]
    pub concurrency_start: usize,

    #[serde(default = "default_concurrency")]
    pub concurrency_end: usize,

    #[serde(default = "default_concurrency")]
    pub concurrency_step: usize,

    /// How often GPU telemetry is sampled inside a window (ms)
    #[serde(default = "default_metrics_interval_ms")]
    pub metrics_interval_ms: u64,
}

fn default_measurement_window_ms() -> u64 {
    5_000
}
fn default_max_trials() -> usize {
    10
}
fn default_stability_window() -> usize {
    3
}
fn default_stability_threshold() -> f64 {
    0.1
}
fn default_concurrency() -> usize {
    1
}
fn default_metrics_interval_ms() -> u64 {
    1_000
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            measurement_window_ms: default_measurement_window_ms(),
            max_trials: default_max_trials(),
            stability_window: default_stability_window(),
            stability_threshold: default_stability_threshold(),
            latency_threshold_ms: None,
            percentile: None,
            concurrency_start: default_concurrency(),
            concurrency_end: default_concurrency(),
            concurrency_step: default_concurrency(),
            metrics_interval_ms: default_metrics_interval_ms(),
        }
    }
}

impl ProfilerConfig {
    /// Read a JSON config file; fields it omits take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.measurement_window_ms == 0 {
            return Err(invalid("measurement_window_ms must be positive"));
        }
        if self.stability_window == 0 {
            return Err(invalid("stability_window must be at least 1"));
        }
        if !(self.stability_threshold.is_finite() && self.stability_threshold > 0.0) {
            return Err(invalid("stability_threshold must be a positive fraction"));
        }
        if self.max_trials < self.stability_window {
            return Err(invalid("max_trials must be at least stability_window"));
        }
        if let Some(p) = self.percentile {
            if !(1..=99).contains(&p) {
                return Err(invalid("percentile must be between 1 and 99"));
            }
        }
        if self.concurrency_start == 0 || self.concurrency_step == 0 {
            return Err(invalid("concurrency start and step must be at least 1"));
        }
        if self.concurrency_end < self.concurrency_start {
            return Err(invalid("concurrency end must not be below start"));
        }
        if self.metrics_interval_ms == 0 {
            return Err(invalid("metrics_interval_ms must be positive"));
        }
        Ok(())
    }

    pub fn load_params(&self) -> LoadParams {
        LoadParams {
            stability_window: self.stability_window,
            stability_threshold: self.stability_threshold,
        }
    }

    pub fn latency_threshold(&self) -> LatencyThreshold {
        LatencyThreshold::from_millis(self.latency_threshold_ms)
    }

    pub fn measurement_window(&self) -> Duration {
        Duration::from_millis(self.measurement_window_ms)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }

    /// Levels visited by a sweep, in order.
    pub fn concurrency_levels(&self) -> impl Iterator<Item = usize> {
        (self.concurrency_start..=self.concurrency_end).step_by(self.concurrency_step.max(1))
    }

    /// Apply a `start[:end[:step]]` range; a bare start profiles one level.
    pub fn set_concurrency_range(&mut self, range: &str) -> Result<()> {
        let parts: Vec<&str> = range.split(':').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(invalid("concurrency range must be start[:end[:step]]"));
        }

        let parse = |s: &str| -> Result<usize> {
            s.trim()
                .parse()
                .map_err(|_| invalid(&format!("'{s}' is not a valid concurrency value")))
        };

        let start = parse(parts[0])?;
        let end = parts.get(1).map(|s| parse(s)).transpose()?.unwrap_or(start);
        let step = parts.get(2).map(|s| parse(s)).transpose()?.unwrap_or(1);

        self.concurrency_start = start;
        self.concurrency_end = end;
        self.concurrency_step = step;
        Ok(())
    }
}

fn invalid(msg: &str) -> ProfileError {
    ProfileError::InvalidConfig(msg.to_string())
}
