pub mod extract;
pub mod prompt;
pub mod provider;
pub mod retry;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::playback::diff::{DiffAction, FileDiff};
use crate::problem::{MultiFileProblem, parse_files};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeneratorError {
    #[error("provider rejected the credential (HTTP {status})")]
    Auth { status: u16 },
    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("content generation unavailable: {0}")]
    Unavailable(String),
}

impl GeneratorError {
    pub fn is_auth(&self) -> bool {
        matches!(self, GeneratorError::Auth { .. })
    }

    /// Errors worth another attempt with the same settings.
    pub fn is_transient(&self) -> bool {
        match self {
            GeneratorError::Network(_) | GeneratorError::Malformed(_) => true,
            GeneratorError::Http { status, .. } => *status == 429 || *status >= 500,
            GeneratorError::Auth { .. } | GeneratorError::Unavailable(_) => false,
        }
    }
}

/// Remote text generation: prompt in, raw model text out.
pub trait ContentGenerator: Send {
    fn complete(&mut self, prompt: &str) -> Result<String, GeneratorError>;
}

/// Parse a model response into a multi-file project.
pub fn parse_project_response(response: &str) -> Result<MultiFileProblem, GeneratorError> {
    let mut last_error = String::from("no JSON object found");
    for candidate in extract::json_candidates(response) {
        match serde_json::from_str::<Value>(&candidate) {
            Ok(value) => match project_from_value(&value) {
                Ok(project) => return Ok(project),
                Err(e) => last_error = e,
            },
            Err(e) => last_error = e.to_string(),
        }
        debug!(error = %last_error, "project candidate rejected");
    }
    Err(GeneratorError::Malformed(last_error))
}

fn project_from_value(value: &Value) -> Result<MultiFileProblem, String> {
    let task_id = value
        .get("task_id")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or("missing task_id")?;
    let files = value.get("files").ok_or("missing files")?;
    let files = parse_files(files).map_err(|e| e.to_string())?;
    let description = value
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let entry_file = value
        .get("entry_file")
        .and_then(Value::as_str)
        .map(str::to_string);
    MultiFileProblem::new(task_id, description, files, entry_file).map_err(|e| e.to_string())
}

/// Parse an extension response: an ordered list of per-file changes.
pub fn parse_extension_response(response: &str) -> Result<Vec<FileDiff>, GeneratorError> {
    let mut last_error = String::from("no JSON object found");
    for candidate in extract::json_candidates(response) {
        match serde_json::from_str::<Value>(&candidate) {
            Ok(value) => match diffs_from_value(&value) {
                Ok(diffs) => return Ok(diffs),
                Err(e) => last_error = e,
            },
            Err(e) => last_error = e.to_string(),
        }
    }
    Err(GeneratorError::Malformed(last_error))
}

fn diffs_from_value(value: &Value) -> Result<Vec<FileDiff>, String> {
    let items = value
        .get("files")
        .or_else(|| value.get("changes"))
        .and_then(Value::as_array)
        .or_else(|| value.as_array())
        .ok_or("missing files list")?;
    if items.is_empty() {
        return Err("extension contains no file changes".to_string());
    }

    items
        .iter()
        .map(|item| -> Result<FileDiff, String> {
            let filename = item
                .get("filename")
                .or_else(|| item.get("path"))
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .ok_or("change without filename")?;
            let action = match item.get("action").and_then(Value::as_str) {
                Some(raw) => DiffAction::parse(raw).ok_or_else(|| format!("{filename}: unknown action `{raw}`"))?,
                None => DiffAction::Modify,
            };
            let content = item.get("content").and_then(Value::as_str);
            let content = match (action, content) {
                (DiffAction::Delete, _) => String::new(),
                (_, Some(c)) => c.to_string(),
                (_, None) => return Err(format!("{filename}: missing content")),
            };
            Ok(FileDiff {
                filename: filename.to_string(),
                action,
                content,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = r#"{"task_id": "todo-cli", "description": "todo list", "files": [{"filename": "todo.py", "content": "TODOS = []\n"}, {"filename": "main.py", "content": "import todo\n"}]}"#;

    #[test]
    fn test_raw_json_project() {
        let project = parse_project_response(PROJECT).unwrap();
        assert_eq!(project.task_id, "todo-cli");
        assert_eq!(project.files.len(), 2);
        assert_eq!(project.entry_file, "main.py");
    }

    #[test]
    fn test_fenced_project_parses_identically() {
        let wrapped = format!("```json\n{PROJECT}\n```");
        assert_eq!(
            parse_project_response(&wrapped).unwrap(),
            parse_project_response(PROJECT).unwrap()
        );
    }

    #[test]
    fn test_project_in_prose() {
        let response = format!("Here you go:\n\n{PROJECT}\n\nLet me know if you need changes.");
        assert_eq!(parse_project_response(&response).unwrap().task_id, "todo-cli");
    }

    #[test]
    fn test_first_bad_block_then_good_block() {
        let response = format!("```json\n{{\"oops\": true}}\n```\nfixed:\n```json\n{PROJECT}\n```");
        assert_eq!(parse_project_response(&response).unwrap().task_id, "todo-cli");
    }

    #[test]
    fn test_empty_task_id_rejected() {
        let response = r#"{"task_id": "  ", "files": [{"filename": "a.py", "content": ""}]}"#;
        assert!(matches!(
            parse_project_response(response),
            Err(GeneratorError::Malformed(_))
        ));
    }

    #[test]
    fn test_empty_files_rejected() {
        let response = r#"{"task_id": "x", "files": []}"#;
        assert!(parse_project_response(response).is_err());
    }

    #[test]
    fn test_duplicate_generated_files_rejected() {
        let response = r#"{"task_id": "x", "files": [{"filename": "a.py", "content": "one\n"}, {"filename": "a.py", "content": "two\n"}]}"#;
        let err = parse_project_response(response).unwrap_err();
        assert!(err.to_string().contains("more than once"), "{err}");
    }

    #[test]
    fn test_explicit_entry_file_kept() {
        let response = r#"{"task_id": "x", "entry_file": "a.py", "files": [{"filename": "a.py", "content": "1"}, {"filename": "b.py", "content": "2"}]}"#;
        assert_eq!(parse_project_response(response).unwrap().entry_file, "a.py");
    }

    #[test]
    fn test_extension_response() {
        let response = r#"```json
{"files": [
  {"filename": "todo.py", "action": "modify", "content": "TODOS = ['x']\n"},
  {"filename": "util.py", "action": "create", "content": "def f():\n    pass\n"},
  {"filename": "old.py", "action": "delete"}
]}
```"#;
        let diffs = parse_extension_response(response).unwrap();
        assert_eq!(diffs.len(), 3);
        assert_eq!(diffs[0].action, DiffAction::Modify);
        assert_eq!(diffs[1].action, DiffAction::Create);
        assert_eq!(diffs[2].action, DiffAction::Delete);
        assert!(diffs[2].content.is_empty());
    }

    #[test]
    fn test_extension_unknown_action_rejected() {
        let response = r#"{"files": [{"filename": "a.py", "action": "rename", "content": ""}]}"#;
        assert!(parse_extension_response(response).is_err());
    }

    #[test]
    fn test_transient_classification() {
        assert!(GeneratorError::Network("reset".into()).is_transient());
        assert!(GeneratorError::Http { status: 503, body: String::new() }.is_transient());
        assert!(!GeneratorError::Http { status: 400, body: String::new() }.is_transient());
        assert!(!GeneratorError::Auth { status: 401 }.is_transient());
    }
}
