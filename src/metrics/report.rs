use std::collections::BTreeMap;
use std::fmt::Display;

use super::Metrics;
use crate::profiler::summary::PerfStatus;
use crate::profiler::LevelResult;

/// Past this many GPUs the per-GPU console block stops being readable.
pub const MAX_GPUS_IN_STDOUT: usize = 16;

pub const TOO_MANY_GPUS_MESSAGE: &str = "Too many GPUs on system to print out individual \
     Prometheus metrics, use the CSV output feature to see metrics.";

const NANOS_PER_MICRO: u64 = 1_000;

// ─── GPU metrics block ───────────────────────────────────────────

/// Render the per-GPU block of the console report, sorted by GPU id.
pub fn render_gpu_metrics(metrics: &Metrics) -> String {
    if metrics.gpu_keys().len() > MAX_GPUS_IN_STDOUT {
        return format!("{TOO_MANY_GPUS_MESSAGE}\n");
    }

    let mut out = String::new();
    push_section(&mut out, "Avg GPU Utilization", &metrics.gpu_utilization_per_gpu, |v| {
        format!("{}%", format_general(v * 100.0))
    });
    push_section(&mut out, "Avg GPU Power Usage", &metrics.gpu_power_usage_per_gpu, |v| {
        format!("{} watts", format_general(v))
    });
    push_section(
        &mut out,
        "Max GPU Memory Usage",
        &metrics.gpu_memory_used_bytes_per_gpu,
        |v| format!("{v} bytes"),
    );
    push_section(
        &mut out,
        "Total GPU Memory",
        &metrics.gpu_memory_total_bytes_per_gpu,
        |v| format!("{v} bytes"),
    );
    out
}

pub fn print_gpu_metrics(metrics: &Metrics) {
    print!("{}", render_gpu_metrics(metrics));
}

fn push_section<T: Copy>(
    out: &mut String,
    title: &str,
    values: &BTreeMap<String, T>,
    fmt_value: impl Fn(T) -> String,
) {
    out.push_str(&format!("    {title}:\n"));
    for (gpu, &value) in values {
        out.push_str(&format!("      {gpu} : {}\n", fmt_value(value)));
    }
}

// ─── Per-level summary ───────────────────────────────────────────

/// Console summary of one load level.
pub fn render_status(status: &PerfStatus) -> String {
    let client = &status.client_stats;
    let std_dev = if client.latency.is_std_dev_unbounded() {
        "n/a".to_string()
    } else {
        format!("{} usec", client.latency.std_dev_us)
    };

    let mut out = String::new();
    out.push_str(&format!("Concurrency: {}\n", status.concurrency));
    out.push_str("  Client:\n");
    line(&mut out, "Request count", client.request_count);
    line(
        &mut out,
        "Throughput",
        format!("{} infer/sec", format_general(client.infer_per_sec)),
    );
    line(
        &mut out,
        "Send rate",
        format!("{} req/sec", format_general(status.send_request_rate)),
    );
    line(
        &mut out,
        "Avg latency",
        format!(
            "{} usec (standard deviation {std_dev})",
            client.latency.mean_ns / NANOS_PER_MICRO
        ),
    );
    if client.percentiles.has_data() {
        for (label, value) in [
            ("p50 latency", client.percentiles.p50),
            ("p90 latency", client.percentiles.p90),
            ("p95 latency", client.percentiles.p95),
            ("p99 latency", client.percentiles.p99),
        ] {
            line(&mut out, label, format!("{} usec", value / NANOS_PER_MICRO));
        }
    }
    if client.sequence_count > 0 {
        line(&mut out, "Sequence count", client.sequence_count);
    }
    if client.delayed_request_count > 0 {
        line(&mut out, "Delayed requests", client.delayed_request_count);
    }
    line(
        &mut out,
        "Overhead",
        format!("{}%", format_general(status.overhead_pct)),
    );

    if !status.metrics.is_empty() {
        out.push_str("  Server GPU metrics:\n");
        out.push_str(&render_gpu_metrics(&status.metrics));
    }
    out
}

fn line(out: &mut String, label: &str, value: impl Display) {
    out.push_str(&format!("    {label}: {value}\n"));
}

/// One line per level, in sweep order.
pub fn render_sweep_summary(results: &[LevelResult]) -> String {
    let mut out = String::from("Inferences/Second vs. Client Average Batch Latency\n");
    for result in results {
        out.push_str(&format!(
            "Concurrency: {}, throughput: {} infer/sec, latency {} usec{}\n",
            result.status.concurrency,
            format_general(result.status.client_stats.infer_per_sec),
            result.status.stabilizing_latency_ns / NANOS_PER_MICRO,
            if result.stable { "" } else { " (unstable)" },
        ));
    }
    out
}

// ─── Number formatting ───────────────────────────────────────────

/// Six significant digits, trailing zeros dropped: `45`, `84.5`, `1e+07`.
pub fn format_general(value: f64) -> String {
    const PRECISION: i32 = 6;

    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    // Round first: the exponent after rounding picks the notation
    let scientific = format!("{:.*e}", (PRECISION - 1) as usize, value);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= PRECISION {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{}e{sign}{:02}", trim_fraction(mantissa), exponent.abs());
    }

    let decimals = (PRECISION - 1 - exponent).max(0) as usize;
    trim_fraction(&format!("{value:.decimals$}")).to_string()
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_gpu_metrics() -> Metrics {
        let mut m = Metrics::default();
        m.gpu_utilization_per_gpu.insert("gpu0".into(), 0.45);
        m.gpu_utilization_per_gpu.insert("gpu1".into(), 0.52);
        m.gpu_power_usage_per_gpu.insert("gpu0".into(), 70.0);
        m.gpu_power_usage_per_gpu.insert("gpu1".into(), 84.5);
        m.gpu_memory_used_bytes_per_gpu.insert("gpu0".into(), 10_000);
        m.gpu_memory_used_bytes_per_gpu.insert("gpu1".into(), 12_000);
        m.gpu_memory_total_bytes_per_gpu.insert("gpu0".into(), 100_000);
        m.gpu_memory_total_bytes_per_gpu.insert("gpu1".into(), 100_000);
        m
    }

    #[test]
    fn regular_output() {
        assert_eq!(
            render_gpu_metrics(&two_gpu_metrics()),
            "    Avg GPU Utilization:\n\
             \x20     gpu0 : 45%\n\
             \x20     gpu1 : 52%\n\
             \x20   Avg GPU Power Usage:\n\
             \x20     gpu0 : 70 watts\n\
             \x20     gpu1 : 84.5 watts\n\
             \x20   Max GPU Memory Usage:\n\
             \x20     gpu0 : 10000 bytes\n\
             \x20     gpu1 : 12000 bytes\n\
             \x20   Total GPU Memory:\n\
             \x20     gpu0 : 100000 bytes\n\
             \x20     gpu1 : 100000 bytes\n"
        );
    }

    #[test]
    fn too_many_gpus() {
        let mut m = Metrics::default();
        for idx in 0..17 {
            let key = format!("gpu{idx}");
            m.gpu_utilization_per_gpu.insert(key.clone(), 0.5);
            m.gpu_power_usage_per_gpu.insert(key.clone(), 75.5);
            m.gpu_memory_used_bytes_per_gpu.insert(key.clone(), 12_500);
            m.gpu_memory_total_bytes_per_gpu.insert(key, 150_000);
        }

        assert_eq!(
            render_gpu_metrics(&m),
            "Too many GPUs on system to print out individual Prometheus metrics, \
             use the CSV output feature to see metrics.\n"
        );
    }

    #[test]
    fn sixteen_gpus_still_print() {
        let mut m = Metrics::default();
        for idx in 0..16 {
            m.gpu_memory_total_bytes_per_gpu.insert(format!("gpu{idx:02}"), 1);
        }
        let out = render_gpu_metrics(&m);
        assert!(out.contains("      gpu15 : 1 bytes\n"));
        assert!(!out.contains(TOO_MANY_GPUS_MESSAGE));
    }

    #[test]
    fn gpu_count_is_the_union_of_keys() {
        let mut m = Metrics::default();
        for idx in 0..9 {
            m.gpu_utilization_per_gpu.insert(format!("a{idx}"), 0.1);
            m.gpu_power_usage_per_gpu.insert(format!("b{idx}"), 1.0);
        }
        assert_eq!(render_gpu_metrics(&m), format!("{TOO_MANY_GPUS_MESSAGE}\n"));
    }

    #[test]
    fn empty_metrics_print_only_headers() {
        assert_eq!(
            render_gpu_metrics(&Metrics::default()),
            "    Avg GPU Utilization:\n    Avg GPU Power Usage:\n    \
             Max GPU Memory Usage:\n    Total GPU Memory:\n"
        );
    }

    #[test]
    fn general_number_format() {
        assert_eq!(format_general(45.000000000000014), "45");
        assert_eq!(format_general(84.5), "84.5");
        assert_eq!(format_general(0.0), "0");
        assert_eq!(format_general(76.06837606837607), "76.0684");
        assert_eq!(format_general(123456.7), "123457");
        assert_eq!(format_general(12345678.0), "1.23457e+07");
        assert_eq!(format_general(0.00001), "1e-05");
        assert_eq!(format_general(-2.5), "-2.5");
    }

    #[test]
    fn rounding_carry_moves_the_exponent() {
        assert_eq!(format_general(999999.5), "1e+06");
        assert_eq!(format_general(9.999999e-5), "0.0001");
        assert_eq!(format_general(99.99999), "100");
        assert_eq!(format_general(-999999.7), "-1e+06");
    }
}
