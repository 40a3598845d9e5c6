//! Show command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use dice_eval::stats::Summary;
use dice_eval::{DatasetReport, ReportRow};

pub fn run(input: PathBuf, cases: bool) -> Result<()> {
    let text = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let report = DatasetReport::from_json(&text)
        .with_context(|| format!("Failed to parse report {}", input.display()))?;

    let width = report
        .labels()
        .iter()
        .map(String::len)
        .chain(report.rows().iter().map(|r| r.kind.key().len()))
        .max()
        .unwrap_or(0)
        .max(13);

    println!("Cases: {}, labels: {}", report.cases().count(), report.labels().len());
    println!();

    print_header(&report, width);
    for row in report.rows().iter().filter(|r| cases || r.kind.is_aggregate()) {
        print_row(row, width);
    }

    println!();
    print_spread(&report, width);
    Ok(())
}

fn print_header(report: &DatasetReport, width: usize) {
    print!("{:<width$}", "", width = width);
    for label in report.labels() {
        print!(" {:>width$}", label, width = width);
    }
    println!(" {:>width$} {:>width$}", "Mean", "Weighted mean", width = width);
    println!("{:-<total$}", "", total = (width + 1) * (report.labels().len() + 3));
}

fn print_row(row: &ReportRow, width: usize) {
    print!("{:<width$}", row.kind.key(), width = width);
    for score in &row.scores {
        print!(" {:>width$.4}", score, width = width);
    }
    println!(" {:>width$.4} {:>width$.4}", row.mean, row.weighted_mean, width = width);
}

/// Per-label spread of case scores.
fn print_spread(report: &DatasetReport, width: usize) {
    println!("Case score spread:");
    println!(
        "{:<width$} {:>8} {:>8} {:>8} {:>8}",
        "Label", "Median", "StdDev", "Min", "Max",
        width = width
    );
    for (i, label) in report.labels().iter().enumerate() {
        let scores: Vec<f64> = report.cases().map(|r| r.scores[i]).collect();
        if let Some(summary) = Summary::compute(&scores) {
            println!(
                "{:<width$} {:>8.4} {:>8.4} {:>8.4} {:>8.4}",
                label, summary.median, summary.std_dev, summary.min, summary.max,
                width = width
            );
        }
    }
}
