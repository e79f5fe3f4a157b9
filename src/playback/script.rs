use crate::problem::{FileEntry, Problem};

/// One file's content as the char sequence playback replays.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileScript {
    pub filename: String,
    content: Vec<char>,
}

impl FileScript {
    pub fn new(filename: &str, content: &str) -> Self {
        Self {
            filename: filename.to_string(),
            content: content.chars().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn char_at(&self, idx: usize) -> Option<char> {
        self.content.get(idx).copied()
    }

    pub fn chars(&self) -> &[char] {
        &self.content
    }

    pub fn text(&self) -> String {
        self.content.iter().collect()
    }

    /// True when `cursor` sits where a file switch looks natural: the start of
    /// the file or just after a newline.
    pub fn is_line_boundary(&self, cursor: usize) -> bool {
        cursor == 0 || self.char_at(cursor - 1) == Some('\n')
    }
}

impl From<&FileEntry> for FileScript {
    fn from(entry: &FileEntry) -> Self {
        FileScript::new(&entry.filename, &entry.content)
    }
}

pub fn scripts_for(problem: &Problem) -> Vec<FileScript> {
    problem.file_entries().iter().map(FileScript::from).collect()
}

/// Number of lines a document holds, counting a final unterminated line.
pub fn line_count(text: &[char]) -> usize {
    if text.is_empty() {
        return 0;
    }
    let newlines = text.iter().filter(|&&c| c == '\n').count();
    if text.last() == Some(&'\n') {
        newlines
    } else {
        newlines + 1
    }
}
