//! Evaluate command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use dice_eval::{EvalConfig, EvalSession, LabelSet, StorageWidth};

pub struct Args {
    pub ground_truths: PathBuf,
    pub predictions: PathBuf,
    pub output: PathBuf,
    pub indices: String,
    pub reorient: bool,
    pub dtype: Option<String>,
    pub prefix: String,
    pub suffix: String,
    pub num_workers: usize,
    pub console: bool,
}

pub fn run(args: Args) -> Result<()> {
    let labels = LabelSet::parse(&args.indices).context("Invalid --indices")?;
    let width: StorageWidth = match &args.dtype {
        Some(dtype) => dtype.parse().context("Invalid --dtype")?,
        None => labels.storage_width(),
    };

    let config = EvalConfig::builder()
        .reorient(args.reorient)
        .storage_width(width)
        .num_workers(args.num_workers)
        .prefix(args.prefix)
        .suffix(args.suffix)
        .console(args.console)
        .build();

    let report = EvalSession::new(config)
        .run(&args.ground_truths, &args.predictions, &labels, &args.output)
        .with_context(|| {
            format!(
                "Failed to evaluate {} against {}",
                args.predictions.display(),
                args.ground_truths.display()
            )
        })?;

    eprintln!(
        "Evaluated {} cases, report written to {}",
        report.cases().count(),
        args.output.display()
    );
    Ok(())
}
