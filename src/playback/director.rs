use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::{error, info};

use crate::playback::Unit;
use crate::playback::diff::{DiffApplyState, FileDiff, TrackStep};
use crate::playback::script::{FileScript, scripts_for};
use crate::problem::{MultiFileProblem, Problem};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Typing,
    FileBoundary,
    SceneComplete,
    DiffApply,
}

#[derive(Clone, Debug)]
enum Mode {
    Normal,
    DiffApply(DiffApplyState),
}

#[derive(Clone, Debug)]
struct PlaybackState {
    scripts: Vec<FileScript>,
    cursors: Vec<usize>,
    current: usize,
    mode: Mode,
    active: bool,
    pending_switch: bool,
    entry_file: String,
    task_id: String,
}

impl PlaybackState {
    fn is_file_complete(&self, idx: usize) -> bool {
        match (self.scripts.get(idx), self.cursors.get(idx)) {
            (Some(script), Some(&cursor)) => cursor >= script.len(),
            _ => true,
        }
    }

    fn all_complete(&self) -> bool {
        (0..self.scripts.len()).all(|i| self.is_file_complete(i))
    }

    fn incomplete(&self) -> Vec<usize> {
        (0..self.scripts.len())
            .filter(|&i| !self.is_file_complete(i))
            .collect()
    }

    fn at_line_boundary(&self) -> bool {
        let cursor = self.cursors.get(self.current).copied().unwrap_or(0);
        self.scripts
            .get(self.current)
            .is_none_or(|s| s.is_line_boundary(cursor))
    }
}

/// Owns the playback state for the loaded scene and hands out one unit per
/// trigger. Everything else only reads from it.
pub struct Director {
    state: Option<PlaybackState>,
    rng: SmallRng,
    diff_switch_at_line_boundary: bool,
}

impl Director {
    pub fn new(diff_switch_at_line_boundary: bool) -> Self {
        Self::with_rng(SmallRng::from_entropy(), diff_switch_at_line_boundary)
    }

    pub fn with_rng(rng: SmallRng, diff_switch_at_line_boundary: bool) -> Self {
        Self {
            state: None,
            rng,
            diff_switch_at_line_boundary,
        }
    }

    pub fn set_diff_switch_at_line_boundary(&mut self, enabled: bool) {
        self.diff_switch_at_line_boundary = enabled;
    }

    /// Replace the whole playback state with a fresh scene for `problem`.
    /// Playback starts inactive. Returns false (and keeps the old scene) if
    /// the problem has nothing to type.
    pub fn start_new_scene(&mut self, problem: &Problem) -> bool {
        let scripts = scripts_for(problem);
        if scripts.is_empty() {
            error!(task_id = problem.task_id(), "refusing scene with no files");
            return false;
        }
        let entry_file = problem.entry_file();
        if !scripts.iter().any(|s| s.filename == entry_file) {
            error!(
                task_id = problem.task_id(),
                entry_file, "refusing scene whose entry file is not among its files"
            );
            return false;
        }

        info!(
            task_id = problem.task_id(),
            files = scripts.len(),
            chars = scripts.iter().map(FileScript::len).sum::<usize>(),
            "scene loaded"
        );
        self.state = Some(PlaybackState {
            cursors: vec![0; scripts.len()],
            scripts,
            current: 0,
            mode: Mode::Normal,
            active: false,
            pending_switch: false,
            entry_file,
            task_id: problem.task_id().to_string(),
        });
        true
    }

    pub fn set_generated_problem(&mut self, problem: MultiFileProblem) -> bool {
        self.start_new_scene(&Problem::MultiFile(problem))
    }

    /// Switch the loaded scene into diff-apply. Needs a scene and at least
    /// one diff that changes something.
    pub fn begin_diff_apply(&mut self, diffs: Vec<FileDiff>) -> bool {
        self.begin_diff_apply_on(diffs, &[])
    }

    /// Diff-apply against what the editor actually shows. Old lines are
    /// counted from `documents` so edits made after the scene finished are
    /// removed along with the typed content.
    pub fn begin_diff_apply_on(
        &mut self,
        diffs: Vec<FileDiff>,
        documents: &[FileScript],
    ) -> bool {
        let Some(state) = self.state.as_mut() else {
            error!("extension requested with no scene loaded");
            return false;
        };
        if matches!(state.mode, Mode::DiffApply(_)) {
            error!(task_id = %state.task_id, "extension requested while one is still applying");
            return false;
        }
        let Some(plan) = DiffApplyState::plan_over(&state.scripts, documents, &diffs) else {
            error!(task_id = %state.task_id, diffs = diffs.len(), "extension has no applicable changes");
            return false;
        };
        info!(task_id = %state.task_id, tracks = plan.tracks().len(), "applying extension");
        state.mode = Mode::DiffApply(plan);
        state.pending_switch = false;
        true
    }

    pub fn emit_next(&mut self) -> Unit {
        let Some(state) = self.state.as_mut() else {
            return Unit::Idle;
        };
        if matches!(state.mode, Mode::DiffApply(_)) {
            return self.emit_diff();
        }

        if state.pending_switch && state.at_line_boundary() {
            state.pending_switch = false;
            if let Some(idx) = pick_incomplete(state, &mut self.rng)
                && idx != state.current
            {
                state.current = idx;
                return Unit::SwitchToFile(state.scripts[idx].filename.clone());
            }
        }

        let current = state.current;
        let cursor = state.cursors[current];
        match state.scripts[current].char_at(cursor) {
            Some(ch) => {
                state.cursors[current] = cursor + 1;
                Unit::Char(ch)
            }
            None if state.all_complete() => {
                state.pending_switch = false;
                Unit::ExecuteScene
            }
            None => Unit::NextFile,
        }
    }

    fn emit_diff(&mut self) -> Unit {
        let Some(state) = self.state.as_mut() else {
            return Unit::Idle;
        };
        let Mode::DiffApply(diff) = &mut state.mode else {
            return Unit::Idle;
        };

        if state.pending_switch {
            let ready = !self.diff_switch_at_line_boundary
                || diff.current_track().is_none_or(|t| t.at_line_boundary());
            if ready {
                state.pending_switch = false;
                let others: Vec<usize> = diff
                    .unfinished()
                    .into_iter()
                    .filter(|&i| i != diff.current)
                    .collect();
                if !others.is_empty() {
                    let idx = others[self.rng.gen_range(0..others.len())];
                    diff.move_to(idx);
                }
            }
        }

        loop {
            match diff.step() {
                Some(TrackStep::Enter(name)) => return Unit::SwitchToFile(name),
                Some(TrackStep::DeleteLine) => return Unit::DeleteLine,
                Some(TrackStep::Write(ch)) => return Unit::Char(ch),
                None => match diff.next_unfinished() {
                    Some(idx) => diff.move_to(idx),
                    None => break,
                },
            }
        }

        let last_touched = diff.current_track().map(|t| t.filename.clone());
        let scripts = std::mem::take(&mut diff.result);
        state.current = last_touched
            .and_then(|name| scripts.iter().position(|s| s.filename == name))
            .unwrap_or(0);
        state.cursors = scripts.iter().map(FileScript::len).collect();
        if !scripts.iter().any(|s| s.filename == state.entry_file)
            && let Some(last) = scripts.last()
        {
            state.entry_file = last.filename.clone();
        }
        state.scripts = scripts;
        state.mode = Mode::Normal;
        state.pending_switch = false;
        info!(task_id = %state.task_id, files = state.scripts.len(), "extension applied");
        Unit::ExecuteScene
    }

    /// Move to the next incomplete file after the current one, wrapping.
    pub fn advance_sequential(&mut self) -> Option<&str> {
        let state = self.state.as_mut()?;
        if matches!(state.mode, Mode::DiffApply(_)) {
            return None;
        }
        state.pending_switch = false;
        let n = state.scripts.len();
        let next = (1..=n)
            .map(|offset| (state.current + offset) % n)
            .find(|&i| !state.is_file_complete(i))?;
        state.current = next;
        Some(state.scripts[next].filename.as_str())
    }

    /// Jump to a random incomplete file, preferring one other than the
    /// current file. Returns the new current index.
    pub fn advance_to_random_incomplete(&mut self) -> Option<usize> {
        let state = self.state.as_mut()?;
        if matches!(state.mode, Mode::DiffApply(_)) {
            return None;
        }
        let idx = pick_incomplete(state, &mut self.rng)?;
        state.current = idx;
        Some(idx)
    }

    /// Latch a file switch. It is taken at the next line boundary.
    pub fn request_file_switch(&mut self) {
        if let Some(state) = self.state.as_mut() {
            state.pending_switch = true;
        }
    }

    pub fn has_pending_switch(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.pending_switch)
    }

    pub fn set_active(&mut self, active: bool) {
        if let Some(state) = self.state.as_mut() {
            state.active = active;
        }
    }

    /// Flip playback on or off. Returns the new flag; always false with no scene.
    pub fn toggle_active(&mut self) -> bool {
        match self.state.as_mut() {
            Some(state) => {
                state.active = !state.active;
                state.active
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.active)
    }

    pub fn has_scene(&self) -> bool {
        self.state.is_some()
    }

    pub fn phase(&self) -> Phase {
        let Some(state) = self.state.as_ref() else {
            return Phase::Idle;
        };
        if matches!(state.mode, Mode::DiffApply(_)) {
            Phase::DiffApply
        } else if state.all_complete() {
            Phase::SceneComplete
        } else if state.is_file_complete(state.current) {
            Phase::FileBoundary
        } else {
            Phase::Typing
        }
    }

    pub fn cursor_of(&self, idx: usize) -> Option<usize> {
        self.state.as_ref()?.cursors.get(idx).copied()
    }

    /// The file the next unit targets. During diff-apply this is the
    /// current track's file.
    pub fn current_file(&self) -> Option<&str> {
        let state = self.state.as_ref()?;
        match &state.mode {
            Mode::DiffApply(diff) => diff.current_track().map(|t| t.filename.as_str()),
            Mode::Normal => state.scripts.get(state.current).map(|s| s.filename.as_str()),
        }
    }

    pub fn current_index(&self) -> Option<usize> {
        self.state.as_ref().map(|s| s.current)
    }

    pub fn scripts(&self) -> &[FileScript] {
        self.state.as_ref().map_or(&[], |s| s.scripts.as_slice())
    }

    /// Fraction of the scene written, 0.0..=1.0.
    pub fn progress(&self) -> f64 {
        let Some(state) = self.state.as_ref() else {
            return 0.0;
        };
        match &state.mode {
            Mode::DiffApply(diff) => {
                let total = diff.tracks().len();
                if total == 0 {
                    return 1.0;
                }
                let done = total - diff.unfinished().len();
                done as f64 / total as f64
            }
            Mode::Normal => {
                let total: usize = state.scripts.iter().map(FileScript::len).sum();
                if total == 0 {
                    return 1.0;
                }
                let written: usize = state.cursors.iter().sum();
                written as f64 / total as f64
            }
        }
    }

    pub fn entry_file(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.entry_file.as_str())
    }

    pub fn task_id(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.task_id.as_str())
    }

    /// Offset in the current document where the next char is written.
    pub fn write_position(&self) -> usize {
        let Some(state) = self.state.as_ref() else {
            return 0;
        };
        match &state.mode {
            Mode::DiffApply(diff) => diff.current_track().map_or(0, |t| t.write_pos()),
            Mode::Normal => state.cursors.get(state.current).copied().unwrap_or(0),
        }
    }
}

fn pick_incomplete(state: &PlaybackState, rng: &mut SmallRng) -> Option<usize> {
    let incomplete = state.incomplete();
    let others: Vec<usize> = incomplete
        .iter()
        .copied()
        .filter(|&i| i != state.current)
        .collect();
    if !others.is_empty() {
        return Some(others[rng.gen_range(0..others.len())]);
    }
    incomplete.first().copied()
}
