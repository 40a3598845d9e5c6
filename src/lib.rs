//! # dice-eval
//!
//! Multi-label Dice similarity evaluation for 3D segmentation volumes.
//!
//! Ground-truth and predicted label volumes are paired by file name, scored
//! per label, and aggregated into a dataset report with three views of the
//! data: per-label means across cases, means weighted by each case's
//! ground-truth volume, and Dice over voxels pooled from every case.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use dice_eval::{EvalConfig, EvalSession, LabelSet};
//!
//! let config = EvalConfig::builder()
//!     .num_workers(4)
//!     .suffix(".nii.gz")
//!     .build();
//!
//! let labels = LabelSet::parse("{'liver': 1, 'spleen': 2}")?;
//! let report = EvalSession::new(config).run(
//!     Path::new("./labels"),
//!     Path::new("./predictions"),
//!     &labels,
//!     Path::new("./dice.json"),
//! )?;
//! # Ok::<(), dice_eval::Error>(())
//! ```
//!
//! ## Modules
//!
//! - [`error`]: Error types for the library
//! - [`labels`]: Label dictionaries
//! - [`pairs`]: Matching ground-truth and prediction files
//! - [`volume`]: Volume decoding and reorientation
//! - [`metrics`]: Dice scoring of a volume pair
//! - [`eval`]: Aggregation, scheduling and reports
//! - [`stats`]: Summary statistics

pub mod error;
pub mod eval;
pub mod labels;
pub mod metrics;
pub mod pairs;
pub mod stats;
pub mod volume;

// Re-export commonly used types
pub use error::{Error, Result};
pub use eval::{
    aggregate::{aggregate, DatasetAggregator},
    executor::Executor,
    report::{DatasetReport, ReportFormat, ReportRow, RowKind},
    session::{EvalConfig, EvalSession},
};
pub use labels::{Label, LabelSet};
pub use metrics::{dice, evaluate_pair, DiceResult, PairStats};
pub use pairs::{resolve_pairs, FileFilter, VolumePair};
pub use stats::Summary;
pub use volume::{FileVolumeSource, LoadOptions, StorageWidth, Volume, VolumeSource};
