//! Capabilities the playback core drives: the document, the terminal, the
//! chat panel and child processes. The TUI implements them in memory; tests
//! use the same implementations without a terminal.

pub mod buffer;
pub mod chat;
pub mod process;
pub mod terminal;

use std::ops::Range;

use anyhow::Result;

/// Multi-file document surface. Positions are char offsets into the active
/// file.
pub trait Editor {
    /// Focus `filename`, creating an empty document if it is not open yet.
    fn open(&mut self, filename: &str);
    fn active_file(&self) -> Option<&str>;
    /// Insert at `pos` (clamped to the document). A caret at or after `pos`
    /// moves right with the text.
    fn insert(&mut self, pos: usize, text: &str);
    fn delete(&mut self, range: Range<usize>);
    fn text(&self) -> String;
    fn text_of(&self, filename: &str) -> Option<String>;
    fn len(&self) -> usize;
    fn cursor(&self) -> usize;
    fn set_cursor(&mut self, pos: usize);
    fn files(&self) -> Vec<String>;
    fn save_all(&mut self) -> Result<()>;
    /// Close every document.
    fn reset(&mut self);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_at_cursor(&mut self, text: &str) {
        let pos = self.cursor();
        self.insert(pos, text);
    }

    fn backspace(&mut self) {
        let pos = self.cursor();
        if pos > 0 {
            self.delete(pos - 1..pos);
        }
    }

    /// Remove the first line, newline included. Returns false on an empty
    /// document.
    fn delete_first_line(&mut self) -> bool {
        let text = self.text();
        if text.is_empty() {
            return false;
        }
        let end = text
            .chars()
            .position(|c| c == '\n')
            .map_or(text.chars().count(), |i| i + 1);
        self.delete(0..end);
        true
    }
}
