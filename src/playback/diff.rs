use serde::{Deserialize, Serialize};

use crate::playback::script::{FileScript, line_count};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffAction {
    Create,
    Modify,
    Delete,
}

impl DiffAction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "create" | "add" | "new" => Some(DiffAction::Create),
            "modify" | "update" | "edit" | "replace" => Some(DiffAction::Modify),
            "delete" | "remove" => Some(DiffAction::Delete),
            _ => None,
        }
    }
}

/// A whole-file change produced by an extension request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub filename: String,
    pub action: DiffAction,
    pub content: String,
}

/// Playback progress through one file's change: enter the file, delete its
/// old lines one at a time from the top, then type the new content.
#[derive(Clone, Debug)]
pub struct DiffTrack {
    pub filename: String,
    pub action: DiffAction,
    lines_to_delete: usize,
    new_content: Vec<char>,
    /// Absolute offset in the file where the next char is written.
    write_pos: usize,
    entered: bool,
}

impl DiffTrack {
    /// `on_screen` is what the document holds now, which can differ from
    /// the script once the user has typed into a finished scene. Deletion
    /// counts its lines so nothing old survives. Creating over an existing
    /// file clears it first as well.
    fn new(
        diff: &FileDiff,
        existing: Option<&FileScript>,
        on_screen: Option<&FileScript>,
    ) -> Self {
        let lines_to_delete = on_screen
            .or(existing)
            .map(|s| line_count(s.chars()))
            .unwrap_or(0);
        let new_content = match diff.action {
            DiffAction::Delete => Vec::new(),
            DiffAction::Create | DiffAction::Modify => diff.content.chars().collect(),
        };
        Self {
            filename: diff.filename.clone(),
            action: diff.action,
            lines_to_delete,
            new_content,
            write_pos: 0,
            entered: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.entered && self.lines_to_delete == 0 && self.write_pos >= self.new_content.len()
    }

    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    pub fn lines_to_delete(&self) -> usize {
        self.lines_to_delete
    }

    /// Deletion always works on whole lines, so only typing can be mid-line.
    pub fn at_line_boundary(&self) -> bool {
        self.lines_to_delete > 0
            || self.write_pos == 0
            || self.new_content.get(self.write_pos - 1) == Some(&'\n')
    }
}

/// The diff-apply phase: ordered tracks plus the scripts they produce.
#[derive(Clone, Debug)]
pub struct DiffApplyState {
    pub(crate) tracks: Vec<DiffTrack>,
    pub(crate) current: usize,
    pub(crate) result: Vec<FileScript>,
}

/// The next thing a track wants done, or `None` if it has finished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum TrackStep {
    Enter(String),
    DeleteLine,
    Write(char),
}

impl DiffApplyState {
    /// Build tracks for `diffs` against the current scripts. Later diffs for
    /// the same file replace earlier ones. Deleting a file that does not
    /// exist is dropped. Returns `None` when nothing would change or the
    /// result would contain no files.
    pub fn plan(scripts: &[FileScript], diffs: &[FileDiff]) -> Option<Self> {
        Self::plan_over(scripts, &[], diffs)
    }

    /// Like [`plan`](Self::plan), but old lines are counted from
    /// `documents` (the editor's current text) for every file found there.
    pub fn plan_over(
        scripts: &[FileScript],
        documents: &[FileScript],
        diffs: &[FileDiff],
    ) -> Option<Self> {
        let mut deduped: Vec<&FileDiff> = Vec::new();
        for diff in diffs {
            deduped.retain(|d| d.filename != diff.filename);
            deduped.push(diff);
        }

        let tracks: Vec<DiffTrack> = deduped
            .iter()
            .filter_map(|diff| {
                let existing = scripts.iter().find(|s| s.filename == diff.filename);
                if diff.action == DiffAction::Delete && existing.is_none() {
                    return None;
                }
                let on_screen = documents.iter().find(|d| d.filename == diff.filename);
                Some(DiffTrack::new(diff, existing, on_screen))
            })
            .collect();
        if tracks.is_empty() {
            return None;
        }

        let mut result: Vec<FileScript> = Vec::new();
        for script in scripts {
            match deduped.iter().find(|d| d.filename == script.filename) {
                Some(d) if d.action == DiffAction::Delete => {}
                Some(d) => result.push(FileScript::new(&d.filename, &d.content)),
                None => result.push(script.clone()),
            }
        }
        for diff in &deduped {
            if diff.action != DiffAction::Delete
                && !scripts.iter().any(|s| s.filename == diff.filename)
            {
                result.push(FileScript::new(&diff.filename, &diff.content));
            }
        }
        if result.is_empty() {
            return None;
        }

        Some(Self {
            tracks,
            current: 0,
            result,
        })
    }

    pub fn tracks(&self) -> &[DiffTrack] {
        &self.tracks
    }

    pub fn current_track(&self) -> Option<&DiffTrack> {
        self.tracks.get(self.current)
    }

    pub fn result(&self) -> &[FileScript] {
        &self.result
    }

    pub(crate) fn unfinished(&self) -> Vec<usize> {
        (0..self.tracks.len())
            .filter(|&i| !self.tracks[i].is_done())
            .collect()
    }

    /// Move to another track. The track being left must announce itself
    /// again when it is resumed.
    pub(crate) fn move_to(&mut self, idx: usize) {
        if idx != self.current {
            if let Some(track) = self.tracks.get_mut(self.current)
                && !track.is_done()
            {
                track.entered = false;
            }
            self.current = idx;
        }
    }

    /// First unfinished track in declaration order after the current one,
    /// wrapping around.
    pub(crate) fn next_unfinished(&self) -> Option<usize> {
        let n = self.tracks.len();
        (1..=n)
            .map(|offset| (self.current + offset) % n)
            .find(|&i| !self.tracks[i].is_done())
    }

    pub(crate) fn step(&mut self) -> Option<TrackStep> {
        let track = self.tracks.get_mut(self.current)?;
        if !track.entered {
            track.entered = true;
            return Some(TrackStep::Enter(track.filename.clone()));
        }
        if track.lines_to_delete > 0 {
            track.lines_to_delete -= 1;
            return Some(TrackStep::DeleteLine);
        }
        let ch = *track.new_content.get(track.write_pos)?;
        track.write_pos += 1;
        Some(TrackStep::Write(ch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff(filename: &str, action: DiffAction, content: &str) -> FileDiff {
        FileDiff {
            filename: filename.to_string(),
            action,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_action_parse_aliases() {
        assert_eq!(DiffAction::parse("Update"), Some(DiffAction::Modify));
        assert_eq!(DiffAction::parse("add"), Some(DiffAction::Create));
        assert_eq!(DiffAction::parse("remove"), Some(DiffAction::Delete));
        assert_eq!(DiffAction::parse("rename"), None);
    }

    #[test]
    fn test_plan_builds_result_scripts() {
        let scripts = vec![
            FileScript::new("a.py", "a\n"),
            FileScript::new("b.py", "b\nb\n"),
            FileScript::new("c.py", "c\n"),
        ];
        let diffs = vec![
            diff("b.py", DiffAction::Modify, "B\n"),
            diff("c.py", DiffAction::Delete, ""),
            diff("d.py", DiffAction::Create, "d\n"),
        ];
        let plan = DiffApplyState::plan(&scripts, &diffs).unwrap();
        let names: Vec<&str> = plan.result().iter().map(|s| s.filename.as_str()).collect();
        assert_eq!(names, vec!["a.py", "b.py", "d.py"]);
        assert_eq!(plan.result()[1].text(), "B\n");
        assert_eq!(plan.tracks()[0].lines_to_delete(), 2);
        assert_eq!(plan.tracks()[1].lines_to_delete(), 1);
        assert_eq!(plan.tracks()[2].lines_to_delete(), 0);
    }

    #[test]
    fn test_plan_drops_delete_of_missing_file() {
        let scripts = vec![FileScript::new("a.py", "a\n")];
        let diffs = vec![diff("ghost.py", DiffAction::Delete, "")];
        assert!(DiffApplyState::plan(&scripts, &diffs).is_none());
    }

    #[test]
    fn test_plan_refuses_to_delete_everything() {
        let scripts = vec![FileScript::new("a.py", "a\n")];
        let diffs = vec![diff("a.py", DiffAction::Delete, "")];
        assert!(DiffApplyState::plan(&scripts, &diffs).is_none());
    }

    #[test]
    fn test_later_diff_for_same_file_wins() {
        let scripts = vec![FileScript::new("a.py", "a\n")];
        let diffs = vec![
            diff("a.py", DiffAction::Modify, "first\n"),
            diff("a.py", DiffAction::Modify, "second\n"),
        ];
        let plan = DiffApplyState::plan(&scripts, &diffs).unwrap();
        assert_eq!(plan.tracks().len(), 1);
        assert_eq!(plan.result()[0].text(), "second\n");
    }

    #[test]
    fn test_deletion_counts_document_lines() {
        let scripts = vec![FileScript::new("a.py", "a\n"), FileScript::new("b.py", "b\n")];
        let documents = vec![FileScript::new("a.py", "a\nextra\nmore")];
        let diffs = vec![
            diff("a.py", DiffAction::Modify, "A\n"),
            diff("b.py", DiffAction::Modify, "B\n"),
        ];
        let plan = DiffApplyState::plan_over(&scripts, &documents, &diffs).unwrap();
        assert_eq!(plan.tracks()[0].lines_to_delete(), 3);
        // No document text for b.py: fall back to its script.
        assert_eq!(plan.tracks()[1].lines_to_delete(), 1);
        assert_eq!(plan.result()[0].text(), "A\n");
    }

    #[test]
    fn test_track_steps_enter_delete_write() {
        let scripts = vec![FileScript::new("a.py", "old\nold\n")];
        let mut plan =
            DiffApplyState::plan(&scripts, &[diff("a.py", DiffAction::Modify, "hi")]).unwrap();
        assert_eq!(plan.step(), Some(TrackStep::Enter("a.py".to_string())));
        assert_eq!(plan.step(), Some(TrackStep::DeleteLine));
        assert_eq!(plan.step(), Some(TrackStep::DeleteLine));
        assert_eq!(plan.step(), Some(TrackStep::Write('h')));
        assert!(!plan.tracks()[0].is_done());
        assert_eq!(plan.step(), Some(TrackStep::Write('i')));
        assert!(plan.tracks()[0].is_done());
        assert_eq!(plan.step(), None);
    }
}
