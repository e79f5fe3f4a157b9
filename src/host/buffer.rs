use std::fs;
use std::io::Write;
use std::ops::Range;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::host::Editor;

#[derive(Clone, Debug, Default)]
struct Document {
    filename: String,
    chars: Vec<char>,
    cursor: usize,
}

/// In-memory multi-file workspace. Saving writes every document under the
/// workspace directory.
#[derive(Debug, Default)]
pub struct MemoryEditor {
    docs: Vec<Document>,
    active: Option<usize>,
    workspace: Option<PathBuf>,
}

impl MemoryEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workspace(workspace: PathBuf) -> Self {
        Self {
            workspace: Some(workspace),
            ..Self::default()
        }
    }

    fn active_doc(&self) -> Option<&Document> {
        self.docs.get(self.active?)
    }

    fn active_doc_mut(&mut self) -> Option<&mut Document> {
        self.docs.get_mut(self.active?)
    }
}

impl Editor for MemoryEditor {
    fn open(&mut self, filename: &str) {
        let idx = match self.docs.iter().position(|d| d.filename == filename) {
            Some(idx) => idx,
            None => {
                self.docs.push(Document {
                    filename: filename.to_string(),
                    ..Document::default()
                });
                self.docs.len() - 1
            }
        };
        self.active = Some(idx);
    }

    fn active_file(&self) -> Option<&str> {
        self.active_doc().map(|d| d.filename.as_str())
    }

    fn insert(&mut self, pos: usize, text: &str) {
        let Some(doc) = self.active_doc_mut() else {
            return;
        };
        let pos = pos.min(doc.chars.len());
        let inserted: Vec<char> = text.chars().collect();
        let n = inserted.len();
        doc.chars.splice(pos..pos, inserted);
        if doc.cursor >= pos {
            doc.cursor += n;
        }
    }

    fn delete(&mut self, range: Range<usize>) {
        let Some(doc) = self.active_doc_mut() else {
            return;
        };
        let end = range.end.min(doc.chars.len());
        let start = range.start.min(end);
        doc.chars.drain(start..end);
        if doc.cursor >= end {
            doc.cursor -= end - start;
        } else if doc.cursor > start {
            doc.cursor = start;
        }
    }

    fn text(&self) -> String {
        self.active_doc()
            .map(|d| d.chars.iter().collect())
            .unwrap_or_default()
    }

    fn text_of(&self, filename: &str) -> Option<String> {
        self.docs
            .iter()
            .find(|d| d.filename == filename)
            .map(|d| d.chars.iter().collect())
    }

    fn len(&self) -> usize {
        self.active_doc().map_or(0, |d| d.chars.len())
    }

    fn cursor(&self) -> usize {
        self.active_doc().map_or(0, |d| d.cursor)
    }

    fn set_cursor(&mut self, pos: usize) {
        if let Some(doc) = self.active_doc_mut() {
            doc.cursor = pos.min(doc.chars.len());
        }
    }

    fn files(&self) -> Vec<String> {
        self.docs.iter().map(|d| d.filename.clone()).collect()
    }

    fn save_all(&mut self) -> Result<()> {
        let Some(workspace) = self.workspace.clone() else {
            return Ok(());
        };
        fs::create_dir_all(&workspace)
            .with_context(|| format!("create workspace {}", workspace.display()))?;
        for doc in &self.docs {
            let path = workspace_path(&workspace, &doc.filename)?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            let tmp_path = path.with_extension("tmp");
            let text: String = doc.chars.iter().collect();
            let mut file = fs::File::create(&tmp_path)
                .with_context(|| format!("create {}", tmp_path.display()))?;
            file.write_all(text.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp_path, &path)
                .with_context(|| format!("write {}", path.display()))?;
        }
        debug!(files = self.docs.len(), workspace = %workspace.display(), "saved workspace");
        Ok(())
    }

    fn reset(&mut self) {
        self.docs.clear();
        self.active = None;
    }
}

/// Resolve a document name inside the workspace, refusing anything that
/// would escape it.
pub fn workspace_path(workspace: &Path, filename: &str) -> Result<PathBuf> {
    let relative = Path::new(filename);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        bail!("refusing to write `{filename}` outside the workspace");
    }
    Ok(workspace.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_moves_caret() {
        let mut editor = MemoryEditor::new();
        editor.open("a.py");
        editor.insert_at_cursor("ab");
        assert_eq!(editor.cursor(), 2);
        editor.set_cursor(1);
        editor.insert_at_cursor("X");
        assert_eq!(editor.text(), "aXb");
        assert_eq!(editor.cursor(), 2);
        // Inserting after the caret leaves it in place.
        editor.insert(3, "!");
        assert_eq!(editor.cursor(), 2);
    }

    #[test]
    fn test_delete_adjusts_caret() {
        let mut editor = MemoryEditor::new();
        editor.open("a.py");
        editor.insert_at_cursor("hello");
        editor.delete(0..2);
        assert_eq!(editor.text(), "llo");
        assert_eq!(editor.cursor(), 3);
        editor.set_cursor(1);
        editor.delete(0..3);
        assert_eq!(editor.cursor(), 0);
        editor.backspace();
        assert_eq!(editor.text(), "");
    }

    #[test]
    fn test_delete_first_line() {
        let mut editor = MemoryEditor::new();
        editor.open("a.py");
        editor.insert_at_cursor("one\ntwo");
        assert!(editor.delete_first_line());
        assert_eq!(editor.text(), "two");
        assert!(editor.delete_first_line());
        assert_eq!(editor.text(), "");
        assert!(!editor.delete_first_line());
    }

    #[test]
    fn test_open_keeps_each_caret() {
        let mut editor = MemoryEditor::new();
        editor.open("a.py");
        editor.insert_at_cursor("aaa");
        editor.open("b.py");
        assert_eq!(editor.cursor(), 0);
        editor.open("a.py");
        assert_eq!(editor.cursor(), 3);
        assert_eq!(editor.files(), vec!["a.py", "b.py"]);
    }

    #[test]
    fn test_save_all_writes_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let mut editor = MemoryEditor::with_workspace(dir.path().to_path_buf());
        editor.open("pkg/mod.py");
        editor.insert_at_cursor("x = 1\n");
        editor.save_all().unwrap();
        let saved = std::fs::read_to_string(dir.path().join("pkg/mod.py")).unwrap();
        assert_eq!(saved, "x = 1\n");
    }

    #[test]
    fn test_workspace_path_rejects_escapes() {
        let root = Path::new("/tmp/ws");
        assert!(workspace_path(root, "../evil.py").is_err());
        assert!(workspace_path(root, "/etc/passwd").is_err());
        assert_eq!(workspace_path(root, "a/b.py").unwrap(), root.join("a/b.py"));
    }
}
