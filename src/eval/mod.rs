//! Dataset evaluation and report generation.
//!
//! - [`session::EvalSession`]: main entry point, from input paths to a written report
//! - [`session::EvalConfig`]: configuration for evaluation
//! - [`aggregate`]: per-case, per-label and pooled aggregation
//! - [`executor::Executor`]: sequential or pooled scheduling of pairs
//! - [`report`]: report rows and their CSV / JSON encodings

pub mod aggregate;
pub mod executor;
pub mod report;
pub mod session;

pub use aggregate::{aggregate, DatasetAggregator};
pub use executor::Executor;
pub use report::{DatasetReport, ReportFormat, ReportRow, RowKind};
pub use session::{EvalConfig, EvalConfigBuilder, EvalSession};
