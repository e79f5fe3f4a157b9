use std::path::PathBuf;
use std::time::Instant;

use crossterm::event::{KeyCode, KeyEvent};
use tracing::info;

use crate::generator::retry::AuthChoice;
use crate::session::{CommandOutcome, KeyInput, Session};
use crate::ui::line_input::{InputResult, LineInput};
use crate::ui::theme::Theme;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptKind {
    /// Topic for a freshly generated project; empty means "anything".
    Topic,
    Extension,
    ApiKey,
}

impl PromptKind {
    pub fn title(self) -> &'static str {
        match self {
            PromptKind::Topic => "New project topic (blank for any)",
            PromptKind::Extension => "Extend the project with",
            PromptKind::ApiKey => "API key",
        }
    }
}

pub enum Modal {
    Prompt { kind: PromptKind, input: LineInput },
    /// The provider rejected the credential.
    AuthChoice,
    Help,
}

pub struct App {
    pub session: Session,
    pub theme: Theme,
    pub modal: Option<Modal>,
    pub should_quit: bool,
    pub log_path: Option<PathBuf>,
}

impl App {
    pub fn new(session: Session, theme: Theme, log_path: Option<PathBuf>) -> Self {
        Self {
            session,
            theme,
            modal: None,
            should_quit: false,
            log_path,
        }
    }

    pub fn on_tick(&mut self, now: Instant) {
        self.session.tick(now);
        if self.session.pending_auth().is_some() && self.modal.is_none() {
            self.modal = Some(Modal::AuthChoice);
        }
    }

    pub fn toggle_playback(&mut self, now: Instant) {
        let outcome = self.session.toggle_playback(now);
        self.follow_up(outcome);
    }

    pub fn toggle_autoplay(&mut self, now: Instant) {
        let outcome = self.session.toggle_autoplay(now);
        self.follow_up(outcome);
    }

    pub fn speed_up(&mut self) {
        self.session.speed_up();
    }

    pub fn slow_down(&mut self) {
        self.session.slow_down();
    }

    pub fn load_catalog_scene(&mut self, now: Instant) {
        self.session.load_random_scene(now);
    }

    pub fn new_problem(&mut self) {
        if !self.session.is_generating() {
            self.open_prompt(PromptKind::Topic);
        }
    }

    pub fn extend(&mut self) {
        if self.session.is_generating() {
            return;
        }
        if self.session.director().has_scene() {
            self.open_prompt(PromptKind::Extension);
        } else {
            self.open_prompt(PromptKind::Topic);
        }
    }

    pub fn show_help(&mut self) {
        self.modal = Some(Modal::Help);
    }

    pub fn type_key(&mut self, input: KeyInput, now: Instant) {
        self.session.handle_key_input(input, now);
    }

    /// Pasted text counts as one keystroke per char.
    pub fn paste(&mut self, text: &str, now: Instant) {
        for ch in text.chars() {
            let input = match ch {
                '\n' | '\r' => KeyInput::Enter,
                '\t' => KeyInput::Tab,
                c => KeyInput::Char(c),
            };
            self.session.handle_key_input(input, now);
        }
    }

    fn follow_up(&mut self, outcome: CommandOutcome) {
        if outcome == CommandOutcome::NeedsProblem {
            self.new_problem();
        }
    }

    fn open_prompt(&mut self, kind: PromptKind) {
        let input = if kind == PromptKind::ApiKey {
            LineInput::masked()
        } else {
            LineInput::new("")
        };
        self.modal = Some(Modal::Prompt { kind, input });
    }

    /// Route a key to the open modal. Returns false when no modal is open.
    pub fn handle_modal_key(&mut self, key: KeyEvent) -> bool {
        let Some(modal) = self.modal.as_mut() else {
            return false;
        };
        match modal {
            Modal::Help => {
                self.modal = None;
            }
            Modal::AuthChoice => match key.code {
                KeyCode::Char('k') | KeyCode::Enter => self.open_prompt(PromptKind::ApiKey),
                KeyCode::Char('s') => self.choose_auth(AuthChoice::SwitchProvider),
                KeyCode::Char('c') | KeyCode::Esc => self.choose_auth(AuthChoice::Cancel),
                _ => {}
            },
            Modal::Prompt { kind, input } => {
                let kind = *kind;
                match input.handle(key) {
                    InputResult::Continue => {}
                    InputResult::Submit => {
                        let value = input.value().trim().to_string();
                        self.submit_prompt(kind, value);
                    }
                    InputResult::Cancel => {
                        self.modal = if kind == PromptKind::ApiKey {
                            Some(Modal::AuthChoice)
                        } else {
                            None
                        };
                    }
                }
            }
        }
        true
    }

    fn submit_prompt(&mut self, kind: PromptKind, value: String) {
        self.modal = None;
        match kind {
            PromptKind::Topic => {
                let topic = (!value.is_empty()).then_some(value);
                info!(?topic, "new problem requested");
                self.session.request_new_problem(topic);
            }
            PromptKind::Extension => {
                if value.is_empty() {
                    return;
                }
                if self.session.request_extension(value) == CommandOutcome::NeedsProblem {
                    self.open_prompt(PromptKind::Topic);
                }
            }
            PromptKind::ApiKey => self.choose_auth(AuthChoice::NewCredential(value)),
        }
    }

    fn choose_auth(&mut self, choice: AuthChoice) {
        self.modal = None;
        self.session.resolve_auth(choice);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crossterm::event::KeyModifiers;

    use super::*;
    use crate::config::Config;
    use crate::host::buffer::MemoryEditor;
    use crate::host::process::ShellRunner;
    use crate::problem::store::ProblemStore;
    use crate::session::http_generators;

    fn app() -> App {
        let mut config = Config::default();
        config.distractions.enabled = false;
        let session = Session::with_seed(
            config,
            ProblemStore::bundled(),
            Box::new(MemoryEditor::new()),
            Arc::new(ShellRunner),
            http_generators(),
            3,
        );
        App::new(session, Theme::default(), None)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_playback_without_scene_opens_topic_prompt() {
        let mut app = app();
        app.toggle_playback(Instant::now());
        assert!(matches!(
            app.modal,
            Some(Modal::Prompt {
                kind: PromptKind::Topic,
                ..
            })
        ));
        assert!(app.handle_modal_key(key(KeyCode::Esc)));
        assert!(app.modal.is_none());
        assert!(!app.handle_modal_key(key(KeyCode::Esc)));
    }

    #[test]
    fn test_extend_asks_for_instruction_once_loaded() {
        let mut app = app();
        app.extend();
        assert!(matches!(app.modal, Some(Modal::Prompt { kind: PromptKind::Topic, .. })));
        app.modal = None;

        app.load_catalog_scene(Instant::now());
        assert!(app.session.director().has_scene());
        app.extend();
        assert!(matches!(app.modal, Some(Modal::Prompt { kind: PromptKind::Extension, .. })));
        // Blank instructions are dropped without a request.
        app.handle_modal_key(key(KeyCode::Enter));
        assert!(app.modal.is_none());
        assert!(!app.session.is_generating());
    }

    #[test]
    fn test_paste_types_into_idle_editor() {
        let mut app = app();
        let now = Instant::now();
        app.load_catalog_scene(now);
        let before = app.session.editor().len();
        app.paste("ab\n", now);
        assert_eq!(app.session.editor().len(), before + 3);
    }

    #[test]
    fn test_help_closes_on_any_key() {
        let mut app = app();
        app.show_help();
        assert!(app.handle_modal_key(key(KeyCode::Char('x'))));
        assert!(app.modal.is_none());
    }
}
