//! dice-eval CLI - Dice evaluation of 3D segmentation volumes

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

/// Multi-label Dice evaluation of segmentation volumes.
#[derive(Parser)]
#[command(name = "dice-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score predictions against ground truths and write a report
    Evaluate {
        /// Ground-truth volume, or directory of volumes
        ground_truths: PathBuf,

        /// Prediction volume, or directory of volumes
        predictions: PathBuf,

        /// Output report (.csv or .json)
        #[arg(short, long)]
        output: PathBuf,

        /// Label dictionary as a JSON file or inline JSON, e.g. '{"lung": 1}'
        #[arg(short, long)]
        indices: String,

        /// Reorient volumes to LPS before scoring
        #[arg(long)]
        reorient: bool,

        /// Storage width for labels (uint8, uint16); picked from the largest label when omitted
        #[arg(long)]
        dtype: Option<String>,

        /// Only evaluate files starting with this prefix
        #[arg(long, default_value = "")]
        prefix: String,

        /// Only evaluate files ending with this suffix
        #[arg(long, default_value = ".nii.gz")]
        suffix: String,

        /// Worker threads (0 runs on the main thread)
        #[arg(short = 'j', long, default_value_t = 0, env = "DICE_EVAL_NUM_WORKERS")]
        num_workers: usize,

        /// Also print the JSON report to stdout
        #[arg(long)]
        console: bool,
    },

    /// Show a JSON report as a table
    Show {
        /// Report file written by `evaluate`
        input: PathBuf,

        /// Also list every case row
        #[arg(long)]
        cases: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Evaluate {
            ground_truths,
            predictions,
            output,
            indices,
            reorient,
            dtype,
            prefix,
            suffix,
            num_workers,
            console,
        } => commands::evaluate::run(commands::evaluate::Args {
            ground_truths,
            predictions,
            output,
            indices,
            reorient,
            dtype,
            prefix,
            suffix,
            num_workers,
            console,
        }),
        Commands::Show { input, cases } => commands::show::run(input, cases),
    }
}
