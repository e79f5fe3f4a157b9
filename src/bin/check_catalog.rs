//! Load a problem dataset and report what survives normalization.
//!
//! Exits non-zero when the file cannot be read or no record loads.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use stagehand::logging;
use stagehand::problem::Problem;
use stagehand::problem::store::parse_catalog;

#[derive(Parser)]
#[command(name = "check_catalog", about = "Validate a stagehand problem dataset")]
struct Cli {
    /// Dataset file (JSON array or NDJSON)
    dataset: PathBuf,

    /// Print every loaded task id
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    logging::init_stderr();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<bool> {
    let text = fs::read_to_string(&cli.dataset)
        .with_context(|| format!("read {}", cli.dataset.display()))?;
    let load = parse_catalog(&text);

    let multi = load.problems.iter().filter(|p| p.is_multi_file()).count();
    let single = load.problems.len() - multi;
    println!("{}", cli.dataset.display());
    println!("  single-file: {single}");
    println!("  multi-file:  {multi}");
    println!("  skipped:     {}", load.skipped.len());

    for skipped in &load.skipped {
        println!("  line {}: {}", skipped.line, skipped.reason);
    }
    if cli.verbose {
        for problem in &load.problems {
            let files = problem.file_entries().len();
            let kind = match problem {
                Problem::SingleFile(_) => "single",
                Problem::MultiFile(_) => "multi",
            };
            println!("  {} [{kind}, {files} file(s), entry {}]", problem.task_id(), problem.entry_file());
        }
    }

    if load.problems.is_empty() {
        eprintln!("no usable problems in {}", cli.dataset.display());
        return Ok(false);
    }
    Ok(true)
}
