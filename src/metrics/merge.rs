use std::collections::BTreeMap;

use super::Metrics;

/// Numeric types a per-GPU metric can hold.
pub trait MetricValue: Copy + PartialOrd {
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

impl MetricValue for f64 {
    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Self {
        value
    }
}

impl MetricValue for u64 {
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value as u64
    }
}

// ─── Generic per-key reduction ───────────────────────────────────

/// Fold every map's entries key by key.
///
/// `init` seeds the accumulator from the first value seen for a key,
/// `combine` folds each later value in map order, and `finalize` turns the
/// accumulator into the output value. Keys absent from a map are simply not
/// visited for that map.
pub fn reduce_per_key<'a, T, A>(
    maps: impl IntoIterator<Item = &'a BTreeMap<String, T>>,
    init: impl Fn(T) -> A,
    combine: impl Fn(&mut A, T),
    finalize: impl Fn(A) -> T,
) -> BTreeMap<String, T>
where
    T: MetricValue + 'a,
{
    let mut acc: BTreeMap<String, A> = BTreeMap::new();

    for map in maps {
        for (key, &value) in map {
            match acc.get_mut(key) {
                Some(a) => combine(a, value),
                None => {
                    acc.insert(key.clone(), init(value));
                }
            }
        }
    }

    acc.into_iter().map(|(k, a)| (k, finalize(a))).collect()
}

/// Mean over the maps that report each key.
pub fn average_per_key<'a, T: MetricValue + 'a>(
    maps: impl IntoIterator<Item = &'a BTreeMap<String, T>>,
) -> BTreeMap<String, T> {
    reduce_per_key(
        maps,
        |v: T| (v.to_f64(), 1usize),
        |acc: &mut (f64, usize), v: T| {
            acc.0 += v.to_f64();
            acc.1 += 1;
        },
        |(sum, count): (f64, usize)| T::from_f64(sum / count as f64),
    )
}

/// Largest reading per key.
pub fn max_per_key<'a, T: MetricValue + 'a>(
    maps: impl IntoIterator<Item = &'a BTreeMap<String, T>>,
) -> BTreeMap<String, T> {
    reduce_per_key(
        maps,
        |v| v,
        |max, v| {
            if v > *max {
                *max = v;
            }
        },
        |max| max,
    )
}

/// Earliest reading per key, in map order.
pub fn first_per_key<'a, T: MetricValue + 'a>(
    maps: impl IntoIterator<Item = &'a BTreeMap<String, T>>,
) -> BTreeMap<String, T> {
    reduce_per_key(maps, |v| v, |_, _| {}, |first| first)
}

// ─── Snapshot merge ──────────────────────────────────────────────

/// Collapse several snapshots into one.
///
/// Utilization and power are averaged, memory used keeps its peak, and
/// memory total keeps the first reading since capacity does not change.
pub fn merge_metrics<'a, I>(snapshots: I) -> Metrics
where
    I: IntoIterator<Item = &'a Metrics>,
    I::IntoIter: Clone,
{
    let snapshots = snapshots.into_iter();

    Metrics {
        gpu_utilization_per_gpu: average_per_key(
            snapshots.clone().map(|m| &m.gpu_utilization_per_gpu),
        ),
        gpu_power_usage_per_gpu: average_per_key(
            snapshots.clone().map(|m| &m.gpu_power_usage_per_gpu),
        ),
        gpu_memory_used_bytes_per_gpu: max_per_key(
            snapshots.clone().map(|m| &m.gpu_memory_used_bytes_per_gpu),
        ),
        gpu_memory_total_bytes_per_gpu: first_per_key(
            snapshots.map(|m| &m.gpu_memory_total_bytes_per_gpu),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn map<T: Copy>(entries: &[(&str, T)]) -> BTreeMap<String, T> {
        entries.iter().map(|&(k, v)| (k.to_string(), v)).collect()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-4
    }

    // ── merge_metrics ───────────────────────────────────────────

    #[test]
    fn merge_with_all_metrics_present() {
        let mut m1 = Metrics::default();
        let mut m2 = Metrics::default();
        m1.gpu_utilization_per_gpu.insert("gpu0".into(), 0.45);
        m2.gpu_utilization_per_gpu.insert("gpu0".into(), 0.52);
        m1.gpu_power_usage_per_gpu.insert("gpu0".into(), 70.0);
        m2.gpu_power_usage_per_gpu.insert("gpu0".into(), 84.5);
        m1.gpu_memory_used_bytes_per_gpu.insert("gpu0".into(), 10_000);
        m2.gpu_memory_used_bytes_per_gpu.insert("gpu0".into(), 12_000);
        m1.gpu_memory_total_bytes_per_gpu.insert("gpu0".into(), 100_000);
        m2.gpu_memory_total_bytes_per_gpu.insert("gpu0".into(), 100_000);

        let merged = merge_metrics(&[m1, m2]);

        assert_eq!(merged.gpu_utilization_per_gpu.len(), 1);
        assert_eq!(merged.gpu_power_usage_per_gpu.len(), 1);
        assert_eq!(merged.gpu_memory_used_bytes_per_gpu.len(), 1);
        assert_eq!(merged.gpu_memory_total_bytes_per_gpu.len(), 1);
        assert!(approx(merged.gpu_utilization_per_gpu["gpu0"], 0.485));
        assert!(approx(merged.gpu_power_usage_per_gpu["gpu0"], 77.25));
        assert_eq!(merged.gpu_memory_used_bytes_per_gpu["gpu0"], 12_000);
        assert_eq!(merged.gpu_memory_total_bytes_per_gpu["gpu0"], 100_000);
    }

    #[test]
    fn merge_with_missing_metric_kinds() {
        let mut m1 = Metrics::default();
        let mut m2 = Metrics::default();
        m1.gpu_utilization_per_gpu.insert("gpu0".into(), 0.45);
        m2.gpu_utilization_per_gpu.insert("gpu0".into(), 0.52);
        m1.gpu_memory_used_bytes_per_gpu.insert("gpu0".into(), 10_000);
        m2.gpu_memory_used_bytes_per_gpu.insert("gpu0".into(), 12_000);

        let merged = merge_metrics(&[m1, m2]);

        assert_eq!(merged.gpu_utilization_per_gpu.len(), 1);
        assert!(merged.gpu_power_usage_per_gpu.is_empty());
        assert_eq!(merged.gpu_memory_used_bytes_per_gpu.len(), 1);
        assert!(merged.gpu_memory_total_bytes_per_gpu.is_empty());
        assert!(approx(merged.gpu_utilization_per_gpu["gpu0"], 0.485));
        assert_eq!(merged.gpu_memory_used_bytes_per_gpu["gpu0"], 12_000);
    }

    #[test]
    fn merge_of_nothing_is_empty() {
        assert!(merge_metrics(&Vec::<Metrics>::new()).is_empty());
    }

    // ── average ─────────────────────────────────────────────────

    #[test]
    fn average_with_all_gpus_present() {
        let a = map(&[("gpu0", 0.45), ("gpu1", 0.23)]);
        let b = map(&[("gpu0", 0.52), ("gpu1", 0.27)]);
        let c = map(&[("gpu0", 0.56), ("gpu1", 0.30)]);

        let avg = average_per_key([&a, &b, &c]);

        assert_eq!(avg.len(), 2);
        assert!(approx(avg["gpu0"], 0.51));
        assert!(approx(avg["gpu1"], 0.26666));
    }

    #[test]
    fn average_skips_missing_instead_of_counting_zero() {
        let a = map(&[("gpu0", 0.45), ("gpu1", 0.23)]);
        let b = map(&[("gpu0", 0.52)]);
        let c = map(&[("gpu0", 0.56), ("gpu1", 0.30)]);

        let avg = average_per_key([&a, &b, &c]);

        assert_eq!(avg.len(), 2);
        assert!(approx(avg["gpu0"], 0.51));
        assert!(approx(avg["gpu1"], 0.265));
    }

    #[test]
    fn average_of_integers_truncates() {
        let a = map(&[("gpu0", 10u64)]);
        let b = map(&[("gpu0", 15u64)]);
        assert_eq!(average_per_key([&a, &b])["gpu0"], 12);
    }

    // ── max ─────────────────────────────────────────────────────

    #[test]
    fn max_with_all_gpus_present() {
        let a = map(&[("gpu0", 10u64), ("gpu1", 55)]);
        let b = map(&[("gpu0", 12u64), ("gpu1", 84)]);
        let c = map(&[("gpu0", 15u64), ("gpu1", 47)]);

        let max = max_per_key([&a, &b, &c]);

        assert_eq!(max.len(), 2);
        assert_eq!(max["gpu0"], 15);
        assert_eq!(max["gpu1"], 84);
    }

    #[test]
    fn max_with_one_gpu_missing() {
        let a = map(&[("gpu0", 10u64), ("gpu1", 55)]);
        let b = map(&[("gpu0", 12u64)]);
        let c = map(&[("gpu0", 15u64), ("gpu1", 47)]);

        let max = max_per_key([&a, &b, &c]);

        assert_eq!(max["gpu0"], 15);
        assert_eq!(max["gpu1"], 55);
    }

    // ── first ───────────────────────────────────────────────────

    #[test]
    fn first_with_all_gpus_present() {
        let a = map(&[("gpu0", 10u64), ("gpu1", 55)]);
        let b = map(&[("gpu0", 12u64), ("gpu1", 84)]);
        let c = map(&[("gpu0", 15u64), ("gpu1", 47)]);

        let first = first_per_key([&a, &b, &c]);

        assert_eq!(first.len(), 2);
        assert_eq!(first["gpu0"], 10);
        assert_eq!(first["gpu1"], 55);
    }

    #[test]
    fn first_falls_through_to_the_first_map_that_has_the_key() {
        let a = map(&[("gpu0", 10u64)]);
        let b = map(&[("gpu0", 12u64), ("gpu1", 84)]);
        let c = map(&[("gpu0", 15u64), ("gpu1", 47)]);

        let first = first_per_key([&a, &b, &c]);

        assert_eq!(first.len(), 2);
        assert_eq!(first["gpu0"], 10);
        assert_eq!(first["gpu1"], 84);
    }

    #[test]
    fn first_depends_on_snapshot_order() {
        let a = map(&[("gpu0", 1u64)]);
        let b = map(&[("gpu0", 2u64)]);
        assert_eq!(first_per_key([&a, &b])["gpu0"], 1);
        assert_eq!(first_per_key([&b, &a])["gpu0"], 2);
    }

    fn snapshot_strategy() -> impl Strategy<Value = Vec<BTreeMap<String, u64>>> {
        prop::collection::vec(
            prop::collection::btree_map("gpu[0-3]", 0u64..1_000_000, 0..4),
            1..6,
        )
    }

    proptest! {
        #[test]
        fn max_and_average_ignore_snapshot_order(
            mut maps in snapshot_strategy(),
            shift in 0usize..6,
        ) {
            let before_max = max_per_key(maps.iter());
            let before_avg = average_per_key(maps.iter());

            let len = maps.len();
            maps.rotate_left(shift % len);
            maps.reverse();

            prop_assert_eq!(max_per_key(maps.iter()), before_max);
            // integer sums are exact in f64 at this magnitude
            prop_assert_eq!(average_per_key(maps.iter()), before_avg);
        }

        #[test]
        fn merged_keys_are_the_union_of_inputs(maps in snapshot_strategy()) {
            let merged = max_per_key(maps.iter());
            let expected: std::collections::BTreeSet<_> =
                maps.iter().flat_map(|m| m.keys().cloned()).collect();
            let keys: std::collections::BTreeSet<_> = merged.keys().cloned().collect();
            prop_assert_eq!(keys, expected);
        }
    }
}
