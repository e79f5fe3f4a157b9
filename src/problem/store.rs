use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rust_embed::Embed;
use serde_json::Value;
use tracing::{info, warn};

use crate::problem::{Problem, SingleFileProblem};

#[derive(Embed)]
#[folder = "assets/problems/"]
struct CatalogAssets;

const BUNDLED_CATALOG: &str = "catalog.jsonl";

/// A record that could not be turned into a problem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedRecord {
    /// 1-based line number for NDJSON input, 1-based element index for arrays.
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct CatalogLoad {
    pub problems: Vec<Problem>,
    pub skipped: Vec<SkippedRecord>,
}

/// Parse a dataset that is either a single JSON array or newline-delimited
/// JSON. Bad records are skipped and logged.
pub fn parse_catalog(text: &str) -> CatalogLoad {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        match serde_json::from_str::<Vec<Value>>(trimmed) {
            Ok(records) => return normalize_records(records.iter().enumerate()),
            Err(e) => {
                warn!(error = %e, "dataset looks like a JSON array but did not parse, trying NDJSON");
            }
        }
    }

    let mut load = CatalogLoad::default();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line == "[" || line == "]" {
            continue;
        }
        let line = line.trim_end_matches(',');
        match serde_json::from_str::<Value>(line) {
            Ok(value) => push_record(&mut load, idx + 1, &value),
            Err(e) => {
                warn!(line = idx + 1, error = %e, "skipping unparseable dataset line");
                load.skipped.push(SkippedRecord {
                    line: idx + 1,
                    reason: e.to_string(),
                });
            }
        }
    }
    load
}

fn normalize_records<'a>(records: impl Iterator<Item = (usize, &'a Value)>) -> CatalogLoad {
    let mut load = CatalogLoad::default();
    for (idx, value) in records {
        push_record(&mut load, idx + 1, value);
    }
    load
}

fn push_record(load: &mut CatalogLoad, line: usize, value: &Value) {
    match Problem::from_value(value) {
        Ok(problem) => load.problems.push(problem),
        Err(e) => {
            warn!(line, error = %e, "skipping invalid dataset record");
            load.skipped.push(SkippedRecord {
                line,
                reason: e.to_string(),
            });
        }
    }
}

pub struct ProblemStore {
    problems: Vec<Problem>,
    rng: SmallRng,
}

impl ProblemStore {
    pub fn new(problems: Vec<Problem>, rng: SmallRng) -> Self {
        Self { problems, rng }
    }

    /// Load a dataset file. Only I/O failures are errors; bad records are skipped.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read dataset {}", path.display()))?;
        let load = parse_catalog(&text);
        info!(
            path = %path.display(),
            loaded = load.problems.len(),
            skipped = load.skipped.len(),
            "loaded problem catalog"
        );
        Ok(Self::new(load.problems, SmallRng::from_entropy()))
    }

    /// The small catalog compiled into the binary.
    pub fn bundled() -> Self {
        let problems = CatalogAssets::get(BUNDLED_CATALOG)
            .and_then(|file| {
                std::str::from_utf8(file.data.as_ref())
                    .ok()
                    .map(|text| parse_catalog(text).problems)
            })
            .unwrap_or_default();
        Self::new(problems, SmallRng::from_entropy())
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn pick_random(&mut self) -> Option<Problem> {
        if self.problems.is_empty() {
            return None;
        }
        let idx = self.rng.gen_range(0..self.problems.len());
        Some(self.problems[idx].clone())
    }
}

pub const PASS_MARKER: &str = "ALL TESTS PASSED";
pub const FAIL_MARKER: &str = "TESTS FAILED:";

/// Assemble prompt, solution, test and a `__main__` harness into one script.
pub fn synthesize_runnable_script(problem: &SingleFileProblem) -> String {
    let mut script = String::new();
    script.push_str(&problem.prompt);
    script.push_str(&problem.canonical_solution);
    if !script.ends_with('\n') {
        script.push('\n');
    }
    script.push_str("\n\n");
    script.push_str(problem.test.trim_matches('\n'));
    script.push_str("\n\n\n");
    script.push_str("if __name__ == \"__main__\":\n");
    script.push_str("    try:\n");
    script.push_str(&format!("        check({})\n", problem.entry_point));
    script.push_str(&format!("        print(\"{PASS_MARKER}\")\n"));
    script.push_str("    except AssertionError as exc:\n");
    script.push_str(&format!("        print(\"{FAIL_MARKER}\", repr(exc))\n"));
    script.push_str("    except Exception as exc:\n");
    script.push_str(&format!("        print(\"{FAIL_MARKER}\", repr(exc))\n"));
    script
}
