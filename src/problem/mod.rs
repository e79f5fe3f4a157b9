pub mod store;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub filename: String,
    pub content: String,
}

impl FileEntry {
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }
}

/// A HumanEval-style exercise: one function plus its test.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleFileProblem {
    pub task_id: String,
    pub prompt: String,
    pub canonical_solution: String,
    pub test: String,
    pub entry_point: String,
}

impl SingleFileProblem {
    /// File name the synthesized script is typed into, e.g. `HumanEval/12` -> `humaneval_12.py`.
    pub fn script_filename(&self) -> String {
        let stem: String = self
            .task_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        let stem = stem.trim_matches('_');
        if stem.is_empty() {
            "solution.py".to_string()
        } else {
            format!("{stem}.py")
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiFileProblem {
    pub task_id: String,
    pub description: String,
    pub files: Vec<FileEntry>,
    pub entry_file: String,
}

impl MultiFileProblem {
    /// Validating constructor. `entry_file` defaults to the last file when `None`.
    pub fn new(
        task_id: impl Into<String>,
        description: impl Into<String>,
        files: Vec<FileEntry>,
        entry_file: Option<String>,
    ) -> Result<Self, ProblemError> {
        let task_id = task_id.into();
        if task_id.trim().is_empty() {
            return Err(ProblemError::MissingField("task_id"));
        }
        let Some(last) = files.last() else {
            return Err(ProblemError::EmptyFiles);
        };
        if let Some(empty) = files.iter().find(|f| f.filename.trim().is_empty()) {
            return Err(ProblemError::InvalidFile(format!(
                "file with {} chars has no name",
                empty.content.chars().count()
            )));
        }
        // Documents are keyed by name, so two entries would share one buffer.
        for (i, file) in files.iter().enumerate() {
            if files[..i].iter().any(|f| f.filename == file.filename) {
                return Err(ProblemError::DuplicateFile(file.filename.clone()));
            }
        }
        let entry_file = match entry_file.filter(|e| !e.trim().is_empty()) {
            Some(entry) => {
                if !files.iter().any(|f| f.filename == entry) {
                    return Err(ProblemError::UnknownEntryFile(entry));
                }
                entry
            }
            None => last.filename.clone(),
        };
        Ok(Self {
            task_id,
            description: description.into(),
            files,
            entry_file,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Problem {
    SingleFile(SingleFileProblem),
    MultiFile(MultiFileProblem),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProblemError {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("missing or non-string field `{0}`")]
    MissingField(&'static str),
    #[error("`files` must be a non-empty list")]
    EmptyFiles,
    #[error("invalid file entry: {0}")]
    InvalidFile(String),
    #[error("file `{0}` appears more than once")]
    DuplicateFile(String),
    #[error("entry file `{0}` is not one of the problem's files")]
    UnknownEntryFile(String),
}

impl Problem {
    /// Normalize a raw dataset record. The variant is decided here, once, by
    /// the presence of a `files` field.
    pub fn from_value(value: &Value) -> Result<Self, ProblemError> {
        let obj = value.as_object().ok_or(ProblemError::NotAnObject)?;
        if let Some(files) = obj.get("files") {
            let files = parse_files(files)?;
            let task_id = required_str(value, "task_id")?;
            let description = optional_str(value, "description").unwrap_or_default();
            let entry_file = optional_str(value, "entry_file");
            MultiFileProblem::new(task_id, description, files, entry_file).map(Problem::MultiFile)
        } else {
            Ok(Problem::SingleFile(SingleFileProblem {
                task_id: required_str(value, "task_id")?,
                prompt: required_str(value, "prompt")?,
                canonical_solution: required_str(value, "canonical_solution")?,
                test: required_str(value, "test")?,
                entry_point: required_str(value, "entry_point")?,
            }))
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            Problem::SingleFile(p) => &p.task_id,
            Problem::MultiFile(p) => &p.task_id,
        }
    }

    pub fn is_multi_file(&self) -> bool {
        matches!(self, Problem::MultiFile(_))
    }

    pub fn entry_file(&self) -> String {
        match self {
            Problem::SingleFile(p) => p.script_filename(),
            Problem::MultiFile(p) => p.entry_file.clone(),
        }
    }

    /// The ordered file list playback replays. Single-file problems become a
    /// one-entry list holding the synthesized runnable script.
    pub fn file_entries(&self) -> Vec<FileEntry> {
        match self {
            Problem::SingleFile(p) => vec![FileEntry::new(
                p.script_filename(),
                store::synthesize_runnable_script(p),
            )],
            Problem::MultiFile(p) => p.files.clone(),
        }
    }
}

/// `files` is normally a list of `{filename, content}` objects. Generators
/// sometimes emit a `{filename: content}` map instead; both are accepted.
pub(crate) fn parse_files(value: &Value) -> Result<Vec<FileEntry>, ProblemError> {
    let files = match value {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                let filename = item
                    .get("filename")
                    .or_else(|| item.get("path"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| ProblemError::InvalidFile("missing filename".to_string()))?;
                let content = item
                    .get("content")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ProblemError::InvalidFile(format!("{filename}: missing content")))?;
                Ok(FileEntry::new(filename, content))
            })
            .collect::<Result<Vec<_>, ProblemError>>()?,
        Value::Object(map) => map
            .iter()
            .map(|(filename, content)| {
                content
                    .as_str()
                    .map(|c| FileEntry::new(filename.as_str(), c))
                    .ok_or_else(|| ProblemError::InvalidFile(format!("{filename}: content is not a string")))
            })
            .collect::<Result<Vec<_>, ProblemError>>()?,
        _ => return Err(ProblemError::EmptyFiles),
    };
    if files.is_empty() {
        return Err(ProblemError::EmptyFiles);
    }
    Ok(files)
}

fn required_str(value: &Value, field: &'static str) -> Result<String, ProblemError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(ProblemError::MissingField(field))
}

fn optional_str(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_file_record_normalizes() {
        let value = json!({
            "task_id": "HumanEval/0",
            "prompt": "def add(a, b):\n",
            "canonical_solution": "    return a + b\n",
            "test": "def check(candidate):\n    assert candidate(1, 2) == 3\n",
            "entry_point": "add",
        });
        let problem = Problem::from_value(&value).unwrap();
        assert!(!problem.is_multi_file());
        assert_eq!(problem.task_id(), "HumanEval/0");
        assert_eq!(problem.entry_file(), "humaneval_0.py");
    }

    #[test]
    fn test_multi_file_record_defaults_entry_to_last_file() {
        let value = json!({
            "task_id": "kv-store",
            "files": [
                {"filename": "store.py", "content": "class Store: pass\n"},
                {"filename": "cli.py", "content": "import store\n"},
            ],
        });
        let problem = Problem::from_value(&value).unwrap();
        assert!(problem.is_multi_file());
        assert_eq!(problem.entry_file(), "cli.py");
    }

    #[test]
    fn test_files_presence_decides_variant_even_with_prompt() {
        let value = json!({
            "task_id": "mixed",
            "prompt": "ignored",
            "files": [{"filename": "a.py", "content": "x = 1\n"}],
        });
        assert!(Problem::from_value(&value).unwrap().is_multi_file());
    }

    #[test]
    fn test_empty_files_rejected() {
        let value = json!({"task_id": "t", "files": []});
        assert_eq!(Problem::from_value(&value), Err(ProblemError::EmptyFiles));
    }

    #[test]
    fn test_unknown_entry_file_rejected() {
        let value = json!({
            "task_id": "t",
            "files": [{"filename": "a.py", "content": ""}],
            "entry_file": "main.py",
        });
        assert_eq!(
            Problem::from_value(&value),
            Err(ProblemError::UnknownEntryFile("main.py".to_string()))
        );
    }

    #[test]
    fn test_duplicate_filenames_rejected() {
        let value = json!({
            "task_id": "t",
            "files": [
                {"filename": "a.py", "content": "one\n"},
                {"filename": "b.py", "content": ""},
                {"filename": "a.py", "content": "two\n"},
            ],
        });
        assert_eq!(
            Problem::from_value(&value),
            Err(ProblemError::DuplicateFile("a.py".to_string()))
        );
    }

    #[test]
    fn test_single_file_missing_field_rejected() {
        let value = json!({"task_id": "t", "prompt": "p"});
        assert_eq!(
            Problem::from_value(&value),
            Err(ProblemError::MissingField("canonical_solution"))
        );
    }

    #[test]
    fn test_files_as_object_map_accepted() {
        let value = json!({
            "task_id": "t",
            "files": {"main.py": "print(1)\n"},
        });
        let Problem::MultiFile(p) = Problem::from_value(&value).unwrap() else {
            panic!("expected multi-file problem");
        };
        assert_eq!(p.files, vec![FileEntry::new("main.py", "print(1)\n")]);
        assert_eq!(p.entry_file, "main.py");
    }

    #[test]
    fn test_script_filename_falls_back_when_id_has_no_alphanumerics() {
        let p = SingleFileProblem {
            task_id: "///".to_string(),
            prompt: String::new(),
            canonical_solution: String::new(),
            test: String::new(),
            entry_point: "f".to_string(),
        };
        assert_eq!(p.script_filename(), "solution.py");
    }
}
