//! Property-based tests of partitioning, sharding and metric assertions.

use proptest::prelude::*;

use modelcheck_ml::config::MetricCheckConfig;
use modelcheck_ml::data::split::split_indices;
use modelcheck_ml::data::{
    Column, ColumnData, DataSpecification, Dataset, DatasetFormat, read_dataset, shard_dataset,
};
use modelcheck_ml::metric::{DUMP_HEADER, MetricAssertion, MetricChecker, MetricOutcome};
use tempfile::TempDir;

fn ids(rows: usize) -> Dataset {
    Dataset::new(vec![Column::new(
        "id",
        ColumnData::Numerical((0..rows).map(|i| Some(i as f32)).collect()),
    )])
    .unwrap()
}

// --- Partitioning ---

proptest! {
    #[test]
    fn split_is_deterministic(
        n in 0usize..500,
        ratio in 0.01f64..=1.0,
        with_validation in any::<bool>(),
    ) {
        let a = split_indices(n, ratio, with_validation, None).unwrap();
        let b = split_indices(n, ratio, with_validation, None).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn split_partitions_rows(
        n in 0usize..500,
        ratio in 0.01f64..=1.0,
        with_validation in any::<bool>(),
        seed in proptest::option::of(any::<u64>()),
    ) {
        let split = split_indices(n, ratio, with_validation, seed).unwrap();
        let mut all: Vec<usize> = split
            .train
            .iter()
            .chain(&split.valid)
            .chain(&split.test)
            .copied()
            .collect();
        all.sort_unstable();
        prop_assert_eq!(all, (0..n).collect::<Vec<_>>());
        let expected_train = (n as f64 * ratio).ceil() as usize;
        prop_assert_eq!(split.train.len(), expected_train);
        if !with_validation {
            prop_assert!(split.valid.is_empty());
        }
    }

    #[test]
    fn half_split_without_noise_is_even_odd(n in 0usize..300) {
        let split = split_indices(n, 0.5, false, None).unwrap();
        prop_assert!(split.train.iter().all(|i| i % 2 == 0));
        prop_assert!(split.test.iter().all(|i| i % 2 == 1));
    }
}

// --- Sharding ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn shards_partition_the_sample(
        n in 10usize..80,
        num_shards in 1usize..6,
        sampling in 0.1f64..=1.0,
        tfrecord in any::<bool>(),
    ) {
        let dir = TempDir::new().unwrap();
        let dataset = ids(n);
        let format = if tfrecord { DatasetFormat::TfRecord } else { DatasetFormat::Csv };
        let path = shard_dataset(&dataset, num_shards, sampling, format, "p", dir.path()).unwrap();
        prop_assert_eq!(path.files().len(), num_shards);

        let back = read_dataset(&path, &DataSpecification::from_dataset(&dataset)).unwrap();
        let mut rows: Vec<u32> = back
            .numerical("id")
            .unwrap()
            .iter()
            .map(|v| v.unwrap() as u32)
            .collect();
        prop_assert_eq!(rows.len(), (n as f64 * sampling).round() as usize);
        rows.sort_unstable();
        rows.dedup();
        prop_assert_eq!(rows.len(), (n as f64 * sampling).round() as usize);
        prop_assert!(rows.iter().all(|&r| (r as usize) < n));
    }
}

// --- Metric assertions ---

proptest! {
    #[test]
    fn margin_law(
        value in -1e3f64..1e3,
        center in -1e3f64..1e3,
        margin in 0.0f64..1e3,
        gold in proptest::option::of(-1e3f64..1e3),
    ) {
        let checker = MetricChecker::new(MetricCheckConfig::default());
        let assertion = MetricAssertion::new("margin_law", "m", value, center, margin, gold);
        let fails = checker.check(&assertion).is_err();
        prop_assert_eq!(fails, (value - center).abs() > margin);
    }

    #[test]
    fn dump_mode_never_fails(
        values in prop::collection::vec(
            (any::<f64>(), any::<f64>(), any::<f64>(), proptest::option::of(any::<f64>())),
            1..20,
        ),
    ) {
        let dir = TempDir::new().unwrap();
        let checker = MetricChecker::new(MetricCheckConfig {
            dump_dir: Some(dir.path().to_path_buf()),
            check_gold: true,
        });
        for (value, center, margin, gold) in &values {
            let assertion =
                MetricAssertion::new("dump_mode_never_fails", "m", *value, *center, *margin, *gold);
            let outcome = checker.check(&assertion).unwrap();
            prop_assert!(matches!(outcome, MetricOutcome::Recorded(_)));
        }
        let content =
            std::fs::read_to_string(dir.path().join("dump_mode_never_fails.csv")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        prop_assert_eq!(lines[0], DUMP_HEADER);
        prop_assert_eq!(lines.len(), values.len() + 1);
    }
}
