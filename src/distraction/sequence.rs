//! Scripted side-quests played against the host while playback is blocked.
//!
//! A run is a queue of small steps paced by deadlines. It snapshots the
//! editor when built and puts everything back when the queue is empty, so
//! the director's cursor bookkeeping still matches the visible caret.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::error;

use crate::distraction::DistractionKind;
use crate::host::Editor;
use crate::host::chat::{ChatPanel, ChatRole};
use crate::host::terminal::TerminalPane;

/// Upper bound on steps executed by one `advance` call when catching up.
const MAX_STEPS_PER_ADVANCE: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    TypeAtCaret(char),
    EraseBeforeCaret,
    OpenChat,
    CloseChat,
    BeginChatMessage(ChatRole),
    ChatChar(char),
    FocusTerminal,
    TerminalChar(char),
    /// Submit the prompt line and wait for the host to run it.
    RunCommand,
    UnfocusTerminal,
    Pause(Duration),
}

/// Everything a distraction may touch.
pub struct Surfaces<'a> {
    pub editor: &'a mut dyn Editor,
    pub chat: &'a mut ChatPanel,
    pub terminal: &'a mut TerminalPane,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditorSnapshot {
    pub file: Option<String>,
    pub cursor: usize,
    pub text: String,
    pub chat_open: bool,
    pub terminal_focused: bool,
}

impl EditorSnapshot {
    pub fn capture(surfaces: &Surfaces<'_>) -> Self {
        Self {
            file: surfaces.editor.active_file().map(str::to_string),
            cursor: surfaces.editor.cursor(),
            text: surfaces.editor.text(),
            chat_open: surfaces.chat.is_open(),
            terminal_focused: surfaces.terminal.is_focused(),
        }
    }

    /// Put the host back. Returns false when the text had diverged and had
    /// to be rewritten.
    pub fn restore(&self, surfaces: &mut Surfaces<'_>) -> bool {
        if let Some(file) = &self.file {
            surfaces.editor.open(file);
        }
        let intact = surfaces.editor.text() == self.text;
        if !intact {
            error!(
                file = ?self.file,
                expected_len = self.text.chars().count(),
                found_len = surfaces.editor.len(),
                "document changed during distraction, restoring"
            );
            let len = surfaces.editor.len();
            surfaces.editor.delete(0..len);
            surfaces.editor.insert(0, &self.text);
        }
        surfaces.editor.set_cursor(self.cursor);
        if self.chat_open {
            surfaces.chat.open();
        } else {
            surfaces.chat.close();
        }
        if self.terminal_focused {
            surfaces.terminal.focus();
        } else {
            surfaces.terminal.unfocus();
        }
        intact
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    /// The host should run this command and call `command_finished`.
    NeedsCommand(String),
    /// Steps are exhausted and the host has been restored.
    Finished { intact: bool },
}

#[derive(Debug)]
pub struct DistractionRun {
    kind: DistractionKind,
    steps: VecDeque<Step>,
    snapshot: EditorSnapshot,
    char_delay: Duration,
    next_at: Instant,
    awaiting_command: bool,
}

impl DistractionRun {
    pub fn new(
        kind: DistractionKind,
        steps: Vec<Step>,
        surfaces: &Surfaces<'_>,
        char_delay: Duration,
        now: Instant,
    ) -> Self {
        Self {
            kind,
            steps: steps.into(),
            snapshot: EditorSnapshot::capture(surfaces),
            char_delay,
            next_at: now,
            awaiting_command: false,
        }
    }

    pub fn kind(&self) -> DistractionKind {
        self.kind
    }

    pub fn command_finished(&mut self, now: Instant) {
        self.awaiting_command = false;
        self.next_at = now;
    }

    /// Execute every step that is due at `now`.
    pub fn advance(&mut self, now: Instant, surfaces: &mut Surfaces<'_>) -> RunStatus {
        if self.awaiting_command {
            return RunStatus::Running;
        }
        for _ in 0..MAX_STEPS_PER_ADVANCE {
            if now < self.next_at {
                return RunStatus::Running;
            }
            let Some(step) = self.steps.pop_front() else {
                let intact = self.snapshot.restore(surfaces);
                return RunStatus::Finished { intact };
            };
            let delay = match step {
                Step::TypeAtCaret(ch) => {
                    surfaces.editor.insert_at_cursor(&ch.to_string());
                    self.char_delay
                }
                Step::EraseBeforeCaret => {
                    surfaces.editor.backspace();
                    self.char_delay / 2
                }
                Step::OpenChat => {
                    surfaces.chat.open();
                    self.char_delay
                }
                Step::CloseChat => {
                    surfaces.chat.close();
                    Duration::ZERO
                }
                Step::BeginChatMessage(role) => {
                    surfaces.chat.begin_message(role);
                    Duration::ZERO
                }
                Step::ChatChar(ch) => {
                    surfaces.chat.push_char(ch);
                    self.char_delay / 2
                }
                Step::FocusTerminal => {
                    surfaces.terminal.focus();
                    self.char_delay
                }
                Step::TerminalChar(ch) => {
                    surfaces.terminal.type_char(ch);
                    self.char_delay
                }
                Step::RunCommand => {
                    let command = surfaces.terminal.submit();
                    self.awaiting_command = true;
                    return RunStatus::NeedsCommand(command);
                }
                Step::UnfocusTerminal => {
                    surfaces.terminal.unfocus();
                    Duration::ZERO
                }
                Step::Pause(pause) => pause,
            };
            self.next_at += delay;
        }
        RunStatus::Running
    }
}

/// Type `text` at the caret, hold it on screen, then erase it.
pub fn aside_steps(text: &str, hold: Duration) -> Vec<Step> {
    let chars: Vec<char> = text.chars().collect();
    let mut steps: Vec<Step> = chars.iter().map(|&c| Step::TypeAtCaret(c)).collect();
    steps.push(Step::Pause(hold));
    steps.extend(std::iter::repeat_n(Step::EraseBeforeCaret, chars.len()));
    steps
}

pub fn chat_steps(question: &str, answer: &str, hold: Duration) -> Vec<Step> {
    let mut steps = vec![Step::OpenChat, Step::BeginChatMessage(ChatRole::User)];
    steps.extend(question.chars().map(Step::ChatChar));
    steps.push(Step::Pause(hold / 2));
    steps.push(Step::BeginChatMessage(ChatRole::Assistant));
    steps.extend(answer.chars().map(Step::ChatChar));
    steps.push(Step::Pause(hold));
    steps.push(Step::CloseChat);
    steps
}

pub fn terminal_steps(command: &str, hold: Duration) -> Vec<Step> {
    let mut steps = vec![Step::FocusTerminal];
    steps.extend(command.chars().map(Step::TerminalChar));
    steps.push(Step::RunCommand);
    steps.push(Step::Pause(hold));
    steps.push(Step::UnfocusTerminal);
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::buffer::MemoryEditor;

    fn drive(run: &mut DistractionRun, surfaces: &mut Surfaces<'_>, start: Instant) -> RunStatus {
        let mut now = start;
        for _ in 0..10_000 {
            now += Duration::from_millis(50);
            match run.advance(now, surfaces) {
                RunStatus::Running => {}
                other => return other,
            }
        }
        panic!("distraction never finished");
    }

    #[test]
    fn test_aside_restores_text_and_caret() {
        let mut editor = MemoryEditor::new();
        editor.open("a.py");
        editor.insert_at_cursor("def f():\n    return 1\n");
        editor.set_cursor(9);
        let mut chat = ChatPanel::new();
        let mut terminal = TerminalPane::new();
        let mut surfaces = Surfaces {
            editor: &mut editor,
            chat: &mut chat,
            terminal: &mut terminal,
        };
        let start = Instant::now();
        let mut run = DistractionRun::new(
            DistractionKind::Aside,
            aside_steps("# hmm", Duration::from_millis(200)),
            &surfaces,
            Duration::from_millis(30),
            start,
        );

        // Mid-run the aside is visible at the caret.
        let mid = start + Duration::from_millis(100);
        run.advance(mid, &mut surfaces);
        assert_eq!(surfaces.editor.text(), "def f():\n# hm    return 1\n");

        assert_eq!(
            drive(&mut run, &mut surfaces, mid),
            RunStatus::Finished { intact: true }
        );
        assert_eq!(editor.text(), "def f():\n    return 1\n");
        assert_eq!(editor.cursor(), 9);
    }

    #[test]
    fn test_steps_wait_for_deadline() {
        let mut editor = MemoryEditor::new();
        editor.open("a.py");
        let mut chat = ChatPanel::new();
        let mut terminal = TerminalPane::new();
        let mut surfaces = Surfaces {
            editor: &mut editor,
            chat: &mut chat,
            terminal: &mut terminal,
        };
        let start = Instant::now();
        let mut run = DistractionRun::new(
            DistractionKind::Aside,
            aside_steps("ab", Duration::ZERO),
            &surfaces,
            Duration::from_millis(100),
            start,
        );
        run.advance(start, &mut surfaces);
        assert_eq!(surfaces.editor.text(), "a");
        run.advance(start + Duration::from_millis(50), &mut surfaces);
        assert_eq!(surfaces.editor.text(), "a");
        run.advance(start + Duration::from_millis(100), &mut surfaces);
        assert_eq!(surfaces.editor.text(), "ab");
    }

    #[test]
    fn test_chat_opens_and_closes_panel() {
        let mut editor = MemoryEditor::new();
        editor.open("a.py");
        let mut chat = ChatPanel::new();
        let mut terminal = TerminalPane::new();
        let mut surfaces = Surfaces {
            editor: &mut editor,
            chat: &mut chat,
            terminal: &mut terminal,
        };
        let start = Instant::now();
        let mut run = DistractionRun::new(
            DistractionKind::Chat,
            chat_steps("why?", "because.", Duration::from_millis(100)),
            &surfaces,
            Duration::from_millis(10),
            start,
        );
        run.advance(start, &mut surfaces);
        assert!(surfaces.chat.is_open());
        drive(&mut run, &mut surfaces, start);
        assert!(!chat.is_open());
        assert_eq!(chat.messages()[0].text, "why?");
        assert_eq!(chat.messages()[1].text, "because.");
    }

    #[test]
    fn test_terminal_waits_for_command() {
        let mut editor = MemoryEditor::new();
        editor.open("a.py");
        let mut chat = ChatPanel::new();
        let mut terminal = TerminalPane::new();
        let mut surfaces = Surfaces {
            editor: &mut editor,
            chat: &mut chat,
            terminal: &mut terminal,
        };
        let start = Instant::now();
        let mut run = DistractionRun::new(
            DistractionKind::TerminalNoise,
            terminal_steps("ls", Duration::from_millis(10)),
            &surfaces,
            Duration::from_millis(10),
            start,
        );
        assert_eq!(
            drive(&mut run, &mut surfaces, start),
            RunStatus::NeedsCommand("ls".to_string())
        );
        assert!(surfaces.terminal.is_focused());
        let later = start + Duration::from_secs(60);
        assert_eq!(run.advance(later, &mut surfaces), RunStatus::Running);
        run.command_finished(later);
        assert_eq!(
            drive(&mut run, &mut surfaces, later),
            RunStatus::Finished { intact: true }
        );
        assert!(!terminal.is_focused());
        assert_eq!(terminal.lines(), ["$ ls"]);
    }

    #[test]
    fn test_restore_repairs_diverged_text() {
        let mut editor = MemoryEditor::new();
        editor.open("a.py");
        editor.insert_at_cursor("keep\n");
        let mut chat = ChatPanel::new();
        let mut terminal = TerminalPane::new();
        let mut surfaces = Surfaces {
            editor: &mut editor,
            chat: &mut chat,
            terminal: &mut terminal,
        };
        let snapshot = EditorSnapshot::capture(&surfaces);
        surfaces.editor.open("b.py");
        surfaces.editor.insert_at_cursor("elsewhere");
        surfaces.editor.open("a.py");
        surfaces.editor.insert(0, "junk");
        assert!(!snapshot.restore(&mut surfaces));
        assert_eq!(editor.active_file(), Some("a.py"));
        assert_eq!(editor.text(), "keep\n");
        assert_eq!(editor.cursor(), 5);
    }
}
