use std::fs;

use stagehand::problem::Problem;
use stagehand::problem::store::{PASS_MARKER, ProblemStore, parse_catalog};

const SINGLE: &str = r#"{"task_id": "HumanEval/7", "prompt": "def double(x):\n", "canonical_solution": "    return x * 2\n", "test": "def check(f):\n    assert f(2) == 4\n", "entry_point": "double"}"#;
const MULTI: &str = r#"{"task_id": "calc", "files": [{"filename": "ops.py", "content": "def add(a, b):\n    return a + b\n"}, {"filename": "main.py", "content": "from ops import add\nprint(add(1, 2))\n"}]}"#;

#[test]
fn ndjson_file_loads_both_variants_and_skips_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dataset.jsonl");
    fs::write(&path, format!("{SINGLE}\nnot json\n\n{MULTI}\n{{\"task_id\": \"x\"}}\n")).unwrap();

    let store = ProblemStore::load(&path).unwrap();
    assert_eq!(store.len(), 2);
    assert!(matches!(store.problems()[0], Problem::SingleFile(_)));
    assert!(matches!(store.problems()[1], Problem::MultiFile(_)));

    let load = parse_catalog(&fs::read_to_string(&path).unwrap());
    let lines: Vec<usize> = load.skipped.iter().map(|s| s.line).collect();
    assert_eq!(lines, vec![2, 5]);
}

#[test]
fn json_array_file_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dataset.json");
    fs::write(&path, format!("[\n{SINGLE},\n{MULTI}\n]\n")).unwrap();

    let mut store = ProblemStore::load(&path).unwrap();
    assert_eq!(store.len(), 2);
    assert!(store.pick_random().is_some());
}

#[test]
fn single_file_problem_becomes_runnable_script() {
    let load = parse_catalog(SINGLE);
    let problem = &load.problems[0];
    assert_eq!(problem.entry_file(), "humaneval_7.py");

    let files = problem.file_entries();
    assert_eq!(files.len(), 1);
    let script = &files[0].content;
    assert!(script.starts_with("def double(x):\n    return x * 2\n"));
    assert!(script.contains("check(double)"));
    assert!(script.contains(PASS_MARKER));
}

#[test]
fn multi_file_entry_defaults_to_last_file() {
    let load = parse_catalog(MULTI);
    assert_eq!(load.problems[0].entry_file(), "main.py");
}

#[test]
fn missing_dataset_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(ProblemStore::load(&dir.path().join("nope.jsonl")).is_err());
}

#[test]
fn bundled_catalog_is_not_empty() {
    assert!(!ProblemStore::bundled().is_empty());
}
