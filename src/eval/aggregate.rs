//! Dataset-level aggregation of per-pair Dice statistics.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::eval::executor::Executor;
use crate::eval::report::{DatasetReport, ReportRow, RowKind};
use crate::labels::LabelSet;
use crate::metrics::{evaluate_pair, pooled_dice, PairStats};
use crate::pairs::{validate_pairs, VolumePair};
use crate::stats::{mean, weighted_mean};
use crate::volume::{FileVolumeSource, LoadOptions, VolumeSource};

fn to_weights(counts: &[u64]) -> Vec<f64> {
    counts.iter().map(|&c| c as f64).collect()
}

fn row(kind: RowKind, scores: Vec<f64>, label_weights: &[f64]) -> ReportRow {
    ReportRow {
        mean: mean(&scores),
        weighted_mean: weighted_mean(&scores, label_weights),
        kind,
        scores,
    }
}

/// Build the report from per-case statistics.
///
/// `case_names` and `stats` are parallel and in input order. Every entry of
/// `stats` carries one value per label of `labels`.
///
/// # Panics
///
/// Panics if `case_names` and `stats` differ in length, or a case has the
/// wrong number of labels.
#[must_use]
pub fn aggregate(case_names: &[String], stats: &[PairStats], labels: &LabelSet) -> DatasetReport {
    assert_eq!(case_names.len(), stats.len(), "one name per case");
    let n_labels = labels.len();
    let mut report = DatasetReport::new(labels.names());

    for (name, case) in case_names.iter().zip(stats) {
        let gt = to_weights(&case.gt_voxels);
        report.push(row(RowKind::Case(name.clone()), case.dice_scores.clone(), &gt));
    }

    let total = |counts: fn(&PairStats) -> &[u64]| -> Vec<u64> {
        (0..n_labels).map(|i| stats.iter().map(|s| counts(s)[i]).sum()).collect()
    };
    // Dataset ground-truth totals weigh labels against each other.
    let label_weights = to_weights(&total(|s| s.gt_voxels.as_slice()));

    // Each case weighs as much as its ground-truth content over all labels.
    let case_weights: Vec<f64> = stats.iter().map(|s| s.total_gt_voxels() as f64).collect();
    let column = |i: usize| stats.iter().map(|s| s.dice_scores[i]).collect::<Vec<f64>>();

    let means = (0..n_labels).map(|i| mean(&column(i))).collect();
    report.push(row(RowKind::Mean, means, &label_weights));

    let weighted = (0..n_labels).map(|i| weighted_mean(&column(i), &case_weights)).collect();
    report.push(row(RowKind::WeightedMean, weighted, &label_weights));

    let common = total(|s| s.common_voxels.as_slice());
    let union = total(|s| s.union_voxels.as_slice())
        .iter()
        .zip(&common)
        .map(|(&both, &common)| pooled_dice(common, both))
        .collect();
    report.push(row(RowKind::UnionDice, union, &label_weights));

    report
}

/// Loads every pair, scores it and aggregates the dataset.
pub struct DatasetAggregator<S = FileVolumeSource> {
    source: S,
    options: LoadOptions,
    executor: Executor,
}

impl DatasetAggregator<FileVolumeSource> {
    /// Aggregator reading volumes from disk.
    #[must_use]
    pub fn new(options: LoadOptions, executor: Executor) -> Self {
        Self::with_source(FileVolumeSource, options, executor)
    }
}

impl<S: VolumeSource> DatasetAggregator<S> {
    /// Aggregator over a custom volume source.
    pub fn with_source(source: S, options: LoadOptions, executor: Executor) -> Self {
        Self { source, options, executor }
    }

    /// Score a single pair.
    pub fn evaluate(&self, pair: &VolumePair, labels: &LabelSet) -> Result<PairStats> {
        let gt = self.source.load(&pair.ground_truth, &self.options)?;
        let pred = self.source.load(&pair.prediction, &self.options)?;
        let stats = evaluate_pair(&gt, &pred, &labels.values())?;
        debug!(
            case = %pair.case_name(),
            shape = ?gt.shape(),
            scores = ?stats.dice_scores,
            "evaluated pair"
        );
        Ok(stats)
    }

    /// Evaluate every pair and build the dataset report.
    ///
    /// Any failure aborts the whole run.
    pub fn run(&self, pairs: &[VolumePair], labels: &LabelSet) -> Result<DatasetReport> {
        validate_pairs(pairs)?;
        info!("Found {} cases and {} labels", pairs.len(), labels.len());

        let max = i64::from(self.options.width.max_value());
        for label in labels.iter().filter(|l| l.value < 0 || l.value > max) {
            warn!(
                label = %label.name,
                value = label.value,
                width = self.options.width.name(),
                "label value cannot occur in volumes of this width"
            );
        }

        let stats = self.executor.map(pairs, |pair| self.evaluate(pair, labels))?;
        let names: Vec<String> = pairs.iter().map(VolumePair::case_name).collect();
        Ok(aggregate(&names, &stats, labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::eval::report::{MEAN_KEY, UNION_DICE_KEY, WEIGHTED_MEAN_KEY};
    use crate::volume::metaimage::write_mha;
    use crate::volume::{StorageWidth, Volume};
    use ndarray::Array3;
    use std::path::Path;

    fn lung() -> LabelSet {
        LabelSet::new([("lung", 1)]).unwrap()
    }

    fn case(common: u64, gt: u64, pred: u64, score: f64) -> PairStats {
        PairStats {
            common_voxels: vec![common],
            union_voxels: vec![gt + pred],
            gt_voxels: vec![gt],
            dice_scores: vec![score],
        }
    }

    #[test]
    fn test_row_order() {
        let names = vec!["b.nii.gz".to_string(), "a.nii.gz".to_string()];
        let stats = vec![case(10, 10, 10, 1.0), case(0, 0, 0, 1.0)];
        let report = aggregate(&names, &stats, &lung());
        let keys: Vec<&str> = report.rows().iter().map(|r| r.kind.key()).collect();
        assert_eq!(keys, vec!["b.nii.gz", "a.nii.gz", MEAN_KEY, WEIGHTED_MEAN_KEY, UNION_DICE_KEY]);
    }

    #[test]
    fn test_case_weighting() {
        // 0.8 with 100 ground-truth voxels, then an empty case scoring 1.0.
        let names = vec!["one".to_string(), "two".to_string()];
        let stats = vec![case(80, 100, 100, 0.8), case(0, 0, 0, 1.0)];
        let report = aggregate(&names, &stats, &lung());

        assert!((report.score(MEAN_KEY, "lung").unwrap() - 0.9).abs() < 1e-12);
        assert!((report.score(WEIGHTED_MEAN_KEY, "lung").unwrap() - 0.8).abs() < 1e-12);
        assert!((report.score(UNION_DICE_KEY, "lung").unwrap() - 0.8).abs() < 1e-12);

        // The empty case has no weight, so its weighted mean is its plain mean.
        let two = report.row("two").unwrap();
        assert_eq!(two.weighted_mean, 1.0);
        assert_eq!(two.mean, 1.0);
    }

    #[test]
    fn test_label_weighting() {
        let labels = LabelSet::new([("big", 1), ("small", 2)]).unwrap();
        let stats = vec![PairStats {
            common_voxels: vec![90, 1],
            union_voxels: vec![200, 20],
            gt_voxels: vec![100, 10],
            dice_scores: vec![0.9, 0.1],
        }];
        let report = aggregate(&["c".to_string()], &stats, &labels);
        let c = report.row("c").unwrap();
        assert!((c.mean - 0.5).abs() < 1e-12);
        assert!((c.weighted_mean - (0.9 * 100.0 + 0.1 * 10.0) / 110.0).abs() < 1e-12);

        let mean_row = report.row(MEAN_KEY).unwrap();
        assert_eq!(mean_row.weighted_mean, c.weighted_mean);
    }

    #[test]
    fn test_union_pools_voxels() {
        let names = vec!["a".to_string(), "b".to_string()];
        // Per-case 2*10/40 = 0.5 and 2*30/60 = 1.0, pooled 2*40/100.
        let stats = vec![case(10, 20, 20, 0.5), case(30, 30, 30, 1.0)];
        let report = aggregate(&names, &stats, &lung());
        assert!((report.score(UNION_DICE_KEY, "lung").unwrap() - 0.8).abs() < 1e-12);
        assert!((report.score(MEAN_KEY, "lung").unwrap() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_aggregate_rows_weigh_labels_by_dataset_totals() {
        let labels = LabelSet::new([("big", 1), ("small", 2)]).unwrap();
        let names = vec!["a".to_string(), "b".to_string()];
        // Case weights are 100 and 50; label weights are 120 and 30.
        let stats = vec![
            PairStats {
                common_voxels: vec![80, 0],
                union_voxels: vec![200, 10],
                gt_voxels: vec![100, 0],
                dice_scores: vec![0.8, 0.0],
            },
            PairStats {
                common_voxels: vec![10, 10],
                union_voxels: vec![40, 40],
                gt_voxels: vec![20, 30],
                dice_scores: vec![0.5, 0.5],
            },
        ];
        let report = aggregate(&names, &stats, &labels);
        let close = |a: f64, b: f64| (a - b).abs() < 1e-12;

        let mean_row = report.row(MEAN_KEY).unwrap();
        assert!(close(mean_row.scores[0], 0.65) && close(mean_row.scores[1], 0.25));
        assert!(close(mean_row.mean, 0.45));
        assert!(close(mean_row.weighted_mean, (0.65 * 120.0 + 0.25 * 30.0) / 150.0));

        let weighted_row = report.row(WEIGHTED_MEAN_KEY).unwrap();
        assert!(close(weighted_row.scores[0], 0.7));
        assert!(close(weighted_row.scores[1], 1.0 / 6.0));
        assert!(close(weighted_row.mean, (0.7 + 1.0 / 6.0) / 2.0));
        assert!(close(weighted_row.weighted_mean, 89.0 / 150.0));

        // Pooled: big 2*90/240, small 2*10/50.
        let union_row = report.row(UNION_DICE_KEY).unwrap();
        assert!(close(union_row.scores[0], 0.75) && close(union_row.scores[1], 0.4));
        assert!(close(union_row.mean, 0.575));
        assert!(close(union_row.weighted_mean, 0.68));
    }

    #[test]
    fn test_all_empty_dataset() {
        let names = vec!["a".to_string(), "b".to_string()];
        let stats = vec![case(0, 0, 0, 1.0), case(0, 0, 0, 1.0)];
        let report = aggregate(&names, &stats, &lung());
        for row in report.rows() {
            assert_eq!(row.scores, vec![1.0]);
            assert_eq!(row.weighted_mean, 1.0);
        }
    }

    fn random_labels(seed: u64) -> Array3<u16> {
        let mut state = seed;
        Array3::from_shape_simple_fn((20, 21, 22), || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 33) % 4) as u16
        })
    }

    #[test]
    fn test_identical_volumes_in_memory() {
        let data = random_labels(9);
        let source = move |_: &Path, _: &LoadOptions| Volume::new(data.clone(), StorageWidth::Narrow);
        let aggregator = DatasetAggregator::with_source(source, LoadOptions::default(), Executor::Sequential);

        let report = aggregator.run(&[VolumePair::new("gt/x.nii.gz", "pred/x.nii.gz")], &lung()).unwrap();
        assert_eq!(report.score("x.nii.gz", "lung"), Some(1.0));
        assert_eq!(report.score(MEAN_KEY, "lung"), Some(1.0));
        assert_eq!(report.score(UNION_DICE_KEY, "lung"), Some(1.0));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let dir = tempfile::tempdir().unwrap();
        let mut pairs = Vec::new();
        for i in 0..6 {
            let gt = dir.path().join(format!("gt_{}.mha", i));
            let pred = dir.path().join(format!("pred_{}.mha", i));
            write_mha(&gt, &random_labels(i), None);
            write_mha(&pred, &random_labels(i + 50), None);
            pairs.push(VolumePair::new(gt, pred));
        }
        let labels = LabelSet::new([("a", 1), ("b", 2), ("c", 3)]).unwrap();

        let sequential = DatasetAggregator::new(LoadOptions::default(), Executor::Sequential)
            .run(&pairs, &labels)
            .unwrap();
        let parallel = DatasetAggregator::new(LoadOptions::default(), Executor::from_workers(3))
            .run(&pairs, &labels)
            .unwrap();
        assert_eq!(sequential, parallel);

        let names: Vec<&str> = parallel.cases().map(|r| r.kind.key()).collect();
        assert_eq!(names, vec!["pred_0.mha", "pred_1.mha", "pred_2.mha", "pred_3.mha", "pred_4.mha", "pred_5.mha"]);
        for row in parallel.rows() {
            assert!(row.scores.iter().all(|s| (0.0..=1.0).contains(s)));
        }
    }

    #[test]
    fn test_failure_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let gt = dir.path().join("gt.mha");
        let pred = dir.path().join("pred.mha");
        write_mha(&gt, &Array3::zeros((4, 4, 4)), None);
        write_mha(&pred, &Array3::zeros((4, 4, 5)), None);
        let good = VolumePair::new(&gt, &gt);
        let bad = VolumePair::new(&gt, &pred);

        let err = DatasetAggregator::new(LoadOptions::default(), Executor::from_workers(2))
            .run(&[good.clone(), bad], &lung())
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));

        let missing = VolumePair::new(&gt, dir.path().join("missing.mha"));
        assert!(DatasetAggregator::new(LoadOptions::default(), Executor::Sequential)
            .run(&[good, missing], &lung())
            .is_err());
    }
}
