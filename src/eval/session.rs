//! Evaluation session: from two input paths to a written report.
//!
//! [`EvalSession`] ties together file-pair resolution, volume loading,
//! aggregation and report writing. Volume decoding is pluggable through
//! [`VolumeSource`]; by default volumes are read from disk.

use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::error::Result;
use crate::eval::aggregate::DatasetAggregator;
use crate::eval::executor::Executor;
use crate::eval::report::{DatasetReport, ReportFormat};
use crate::labels::LabelSet;
use crate::pairs::{resolve_pairs, FileFilter};
use crate::volume::{FileVolumeSource, LoadOptions, StorageWidth, VolumeSource};

/// Configuration for an evaluation session.
#[derive(Debug, Clone, Default)]
pub struct EvalConfig {
    /// Reorient volumes to LPS before comparing them.
    pub reorient: bool,

    /// Integer width volumes are loaded into.
    pub storage_width: StorageWidth,

    /// Worker threads; 0 evaluates on the calling thread.
    pub num_workers: usize,

    /// File name filter for directory inputs.
    pub filter: FileFilter,

    /// Echo the JSON report to stdout.
    pub console: bool,
}

impl EvalConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> EvalConfigBuilder {
        EvalConfigBuilder::default()
    }

    /// Volume loading options derived from this configuration.
    #[must_use]
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            reorient: self.reorient,
            width: self.storage_width,
        }
    }

    /// Scheduler derived from `num_workers`.
    #[must_use]
    pub fn executor(&self) -> Executor {
        Executor::from_workers(self.num_workers)
    }
}

/// Builder for [`EvalConfig`].
#[derive(Debug, Default)]
pub struct EvalConfigBuilder {
    reorient: Option<bool>,
    storage_width: Option<StorageWidth>,
    num_workers: Option<usize>,
    prefix: Option<String>,
    suffix: Option<String>,
    console: Option<bool>,
}

impl EvalConfigBuilder {
    /// Reorient volumes to LPS.
    #[must_use]
    pub fn reorient(mut self, reorient: bool) -> Self {
        self.reorient = Some(reorient);
        self
    }

    /// Set the storage width.
    #[must_use]
    pub fn storage_width(mut self, width: StorageWidth) -> Self {
        self.storage_width = Some(width);
        self
    }

    /// Set the number of worker threads.
    #[must_use]
    pub fn num_workers(mut self, workers: usize) -> Self {
        self.num_workers = Some(workers);
        self
    }

    /// Required file name prefix for directory inputs.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Required file name suffix for directory inputs.
    #[must_use]
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Echo the JSON report to stdout.
    #[must_use]
    pub fn console(mut self, console: bool) -> Self {
        self.console = Some(console);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> EvalConfig {
        let default_filter = FileFilter::default();
        EvalConfig {
            reorient: self.reorient.unwrap_or(false),
            storage_width: self.storage_width.unwrap_or_default(),
            num_workers: self.num_workers.unwrap_or(0),
            filter: FileFilter {
                prefix: self.prefix.unwrap_or(default_filter.prefix),
                suffix: self.suffix.unwrap_or(default_filter.suffix),
            },
            console: self.console.unwrap_or(false),
        }
    }
}

/// Evaluation session.
///
/// # Example
///
/// ```rust,no_run
/// use std::path::Path;
/// use dice_eval::{EvalConfig, EvalSession, LabelSet};
///
/// let config = EvalConfig::builder().num_workers(4).reorient(true).build();
/// let labels = LabelSet::parse(r#"{"liver": 1, "spleen": 2}"#)?;
///
/// let report = EvalSession::new(config).run(
///     Path::new("./ground_truth"),
///     Path::new("./predictions"),
///     &labels,
///     Path::new("./results.csv"),
/// )?;
/// println!("{} cases", report.cases().count());
/// # Ok::<(), dice_eval::Error>(())
/// ```
pub struct EvalSession<S = FileVolumeSource> {
    config: EvalConfig,
    aggregator: DatasetAggregator<S>,
}

impl EvalSession<FileVolumeSource> {
    /// Create a session reading volumes from disk.
    #[must_use]
    pub fn new(config: EvalConfig) -> Self {
        Self::with_source(config, FileVolumeSource)
    }
}

impl<S: VolumeSource> EvalSession<S> {
    /// Create a session over a custom volume source.
    pub fn with_source(config: EvalConfig, source: S) -> Self {
        let aggregator = DatasetAggregator::with_source(source, config.load_options(), config.executor());
        Self { config, aggregator }
    }

    /// The session configuration.
    #[must_use]
    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Evaluate every pair and build the report without writing it.
    pub fn evaluate(&self, ground_truths: &Path, predictions: &Path, labels: &LabelSet) -> Result<DatasetReport> {
        let pairs = resolve_pairs(ground_truths, predictions, &self.config.filter)?;
        self.aggregator.run(&pairs, labels)
    }

    /// Evaluate the dataset and write the report to `output`.
    ///
    /// Input paths are resolved first, then the output extension is checked,
    /// both before any volume is read.
    pub fn run(
        &self,
        ground_truths: &Path,
        predictions: &Path,
        labels: &LabelSet,
        output: &Path,
    ) -> Result<DatasetReport> {
        let pairs = resolve_pairs(ground_truths, predictions, &self.config.filter)?;
        ReportFormat::from_path(output)?;

        let report = self.aggregator.run(&pairs, labels)?;
        report.write(output)?;
        info!(path = %output.display(), "wrote report");

        if self.config.console {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", report.to_json_string()?)?;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::eval::report::{MEAN_KEY, UNION_DICE_KEY};
    use crate::volume::metaimage::write_mha;
    use crate::volume::Volume;
    use ndarray::Array3;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_builder_defaults() {
        let config = EvalConfig::builder().build();
        assert!(!config.reorient);
        assert_eq!(config.storage_width, StorageWidth::Narrow);
        assert_eq!(config.num_workers, 0);
        assert_eq!(config.filter, FileFilter::default());
        assert_eq!(config.executor(), Executor::Sequential);
    }

    #[test]
    fn test_builder_overrides() {
        let config = EvalConfig::builder()
            .reorient(true)
            .storage_width(StorageWidth::Wide)
            .num_workers(3)
            .prefix("case")
            .suffix(".mha")
            .console(true)
            .build();
        assert_eq!(config.filter.prefix, "case");
        assert_eq!(config.filter.suffix, ".mha");
        assert_eq!(config.load_options(), LoadOptions { reorient: true, width: StorageWidth::Wide });
        assert_eq!(config.executor(), Executor::Parallel { workers: 3 });
        assert!(config.console);
    }

    fn dataset(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let gt = dir.join("gt");
        let pred = dir.join("pred");
        std::fs::create_dir_all(&gt).unwrap();
        std::fs::create_dir_all(&pred).unwrap();

        let mut organ = Array3::<u16>::zeros((8, 8, 8));
        organ.slice_mut(ndarray::s![2..6, 2..6, 2..6]).fill(1);
        let mut shifted = Array3::<u16>::zeros((8, 8, 8));
        shifted.slice_mut(ndarray::s![2..6, 2..6, 3..7]).fill(1);

        write_mha(&gt.join("a.mha"), &organ, None);
        write_mha(&pred.join("a.mha"), &organ, None);
        write_mha(&gt.join("b.mha"), &organ, None);
        write_mha(&pred.join("b.mha"), &shifted, None);
        (gt, pred)
    }

    #[test]
    fn test_run_writes_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let (gt, pred) = dataset(dir.path());
        let labels = LabelSet::new([("organ", 1)]).unwrap();
        let session = EvalSession::new(EvalConfig::builder().suffix(".mha").num_workers(2).build());

        let json_path = dir.path().join("results.json");
        let report = session.run(&gt, &pred, &labels, &json_path).unwrap();
        assert_eq!(report.score("a.mha", "organ"), Some(1.0));
        // 48 of 64 voxels overlap after a one-voxel shift.
        assert_eq!(report.score("b.mha", "organ"), Some(0.75));
        assert_eq!(report.score(MEAN_KEY, "organ"), Some(0.875));
        assert_eq!(report.score(UNION_DICE_KEY, "organ"), Some(2.0 * 112.0 / 256.0));

        let text = std::fs::read_to_string(&json_path).unwrap();
        assert_eq!(DatasetReport::from_json(&text).unwrap(), report);

        let csv_path = dir.path().join("results.csv");
        session.run(&gt, &pred, &labels, &csv_path).unwrap();
        let csv = std::fs::read_to_string(&csv_path).unwrap();
        assert!(csv.starts_with("Cases,organ,Mean,Weighted mean\n"));
        assert_eq!(csv.lines().count(), 6);
    }

    #[test]
    fn test_bad_output_checked_before_loading() {
        let dir = tempfile::tempdir().unwrap();
        let (gt, pred) = dataset(dir.path());
        let loads = AtomicUsize::new(0);
        let source = |_: &Path, _: &LoadOptions| {
            loads.fetch_add(1, Ordering::SeqCst);
            Volume::new(Array3::zeros((2, 2, 2)), StorageWidth::Narrow)
        };
        let session = EvalSession::with_source(EvalConfig::builder().suffix(".mha").build(), source);
        let labels = LabelSet::new([("organ", 1)]).unwrap();

        let err = session.run(&gt, &pred, &labels, &dir.path().join("results.xlsx")).unwrap_err();
        assert!(matches!(err, Error::InputValidation(_)));
        assert_eq!(loads.load(Ordering::SeqCst), 0);

        session.evaluate(&gt, &pred, &labels).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_input_kind_checked_before_output_extension() {
        let dir = tempfile::tempdir().unwrap();
        let session = EvalSession::new(EvalConfig::builder().build());
        let labels = LabelSet::new([("organ", 1)]).unwrap();

        let err = session
            .run(dir.path(), &dir.path().join("missing"), &labels, &dir.path().join("results.txt"))
            .unwrap_err();
        assert!(err.to_string().contains("must both be a single file or a folder"));
    }

    #[test]
    fn test_mismatched_directories() {
        let dir = tempfile::tempdir().unwrap();
        let (gt, pred) = dataset(dir.path());
        std::fs::remove_file(pred.join("b.mha")).unwrap();
        let session = EvalSession::new(EvalConfig::builder().suffix(".mha").build());
        let labels = LabelSet::new([("organ", 1)]).unwrap();

        let err = session.evaluate(&gt, &pred, &labels).unwrap_err();
        assert!(matches!(err, Error::InputValidation(_)));
        assert!(err.to_string().contains("b.mha"));
    }
}
