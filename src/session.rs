//! The controller that ties playback together.
//!
//! A `Session` owns the director, arbiter and scheduler along with the host
//! surfaces and background jobs. The UI feeds it keys, commands and ticks;
//! everything that touches the document goes through here, one trigger or
//! one distraction step at a time.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Local;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::{debug, error, info, instrument, warn};

use crate::arbiter::{Arbiter, BlockingOp, Trigger};
use crate::config::Config;
use crate::distraction::sequence::{
    DistractionRun, RunStatus, Surfaces, aside_steps, chat_steps, terminal_steps,
};
use crate::distraction::{DistractionKind, Scheduler};
use crate::generator::prompt::{extension_prompt, new_project_prompt};
use crate::generator::provider::{HttpGenerator, ProviderSettings};
use crate::generator::retry::{AuthChoice, AuthRecovery, AuthStep, RetryOutcome, with_retries};
use crate::generator::{
    ContentGenerator, GeneratorError, parse_extension_response, parse_project_response,
};
use crate::host::Editor;
use crate::host::chat::ChatPanel;
use crate::host::process::{ProcessOutcome, ProcessRunner};
use crate::host::terminal::TerminalPane;
use crate::job::{Job, JobPoll};
use crate::playback::{Director, FileDiff, FileScript, Phase, Unit};
use crate::problem::store::ProblemStore;
use crate::problem::{MultiFileProblem, Problem};

pub const SUMMARY_FILE: &str = "RUN_SUMMARY.md";
const MAX_NOTICES: usize = 50;

/// Builds a generator for the given provider inside a job thread.
pub type GeneratorFactory =
    Arc<dyn Fn(ProviderSettings) -> Box<dyn ContentGenerator> + Send + Sync>;

pub fn http_generators() -> GeneratorFactory {
    Arc::new(|settings| Box::new(HttpGenerator::new(settings)) as Box<dyn ContentGenerator>)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    Done,
    /// Nothing is loaded; the caller should start the generation flow.
    NeedsProblem,
    Ignored,
}

/// A raw key the user typed in the editor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyInput {
    Char(char),
    Enter,
    Tab,
    Backspace,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warn,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenerationRequest {
    NewProject { topic: Option<String> },
    Extension { instruction: String, task_id: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenerationResult {
    Project(MultiFileProblem),
    Extension { diffs: Vec<FileDiff>, task_id: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ResponseShape {
    Project,
    Extension,
}

struct Generation {
    job: Job<RetryOutcome<GenerationResult>>,
    request: GenerationRequest,
    settings: ProviderSettings,
    recovery: AuthRecovery,
}

/// An authentication failure waiting for the user's decision.
#[derive(Clone, Debug)]
pub struct PendingAuth {
    pub request: GenerationRequest,
    pub settings: ProviderSettings,
    pub error: GeneratorError,
    recovery: AuthRecovery,
}

impl PendingAuth {
    pub fn attempts(&self) -> u32 {
        self.recovery.attempts()
    }
}

pub struct Session {
    config: Config,
    director: Director,
    arbiter: Arbiter,
    scheduler: Scheduler,
    store: ProblemStore,
    editor: Box<dyn Editor>,
    chat: ChatPanel,
    terminal: TerminalPane,
    runner: Arc<dyn ProcessRunner>,
    generators: GeneratorFactory,
    provider: ProviderSettings,
    fallback: Option<ProviderSettings>,
    distraction: Option<DistractionRun>,
    distraction_job: Option<Job<Result<ProcessOutcome>>>,
    scene_job: Option<Job<Result<ProcessOutcome>>>,
    generation: Option<Generation>,
    pending_auth: Option<PendingAuth>,
    ready: Option<GenerationResult>,
    autoplay: bool,
    next_autoplay_at: Option<Instant>,
    interval: Duration,
    last_run: Option<ProcessOutcome>,
    notices: VecDeque<Notice>,
    rng: SmallRng,
}

impl Session {
    pub fn new(
        config: Config,
        store: ProblemStore,
        editor: Box<dyn Editor>,
        runner: Arc<dyn ProcessRunner>,
        generators: GeneratorFactory,
    ) -> Self {
        let director = Director::new(config.playback.diff_switch_at_line_boundary);
        let scheduler = scheduler_for(&config, SmallRng::from_entropy());
        let rng = SmallRng::from_entropy();
        Self::assemble(config, store, editor, runner, generators, director, scheduler, rng)
    }

    /// Same as `new` with every random choice seeded.
    pub fn with_seed(
        config: Config,
        store: ProblemStore,
        editor: Box<dyn Editor>,
        runner: Arc<dyn ProcessRunner>,
        generators: GeneratorFactory,
        seed: u64,
    ) -> Self {
        let director = Director::with_rng(
            SmallRng::seed_from_u64(seed),
            config.playback.diff_switch_at_line_boundary,
        );
        let scheduler = scheduler_for(&config, SmallRng::seed_from_u64(seed.wrapping_add(1)));
        let rng = SmallRng::seed_from_u64(seed.wrapping_add(2));
        Self::assemble(config, store, editor, runner, generators, director, scheduler, rng)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        config: Config,
        store: ProblemStore,
        editor: Box<dyn Editor>,
        runner: Arc<dyn ProcessRunner>,
        generators: GeneratorFactory,
        director: Director,
        scheduler: Scheduler,
        rng: SmallRng,
    ) -> Self {
        let provider = config.provider_settings();
        let fallback = config.fallback_settings();
        Self {
            interval: config.interval(),
            autoplay: config.playback.autoplay,
            provider,
            fallback,
            director,
            arbiter: Arbiter::new(),
            scheduler,
            store,
            editor,
            chat: ChatPanel::new(),
            terminal: TerminalPane::new(),
            runner,
            generators,
            distraction: None,
            distraction_job: None,
            scene_job: None,
            generation: None,
            pending_auth: None,
            ready: None,
            next_autoplay_at: None,
            last_run: None,
            notices: VecDeque::new(),
            rng,
            config,
        }
    }

    // --- Accessors -------------------------------------------------------

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn director(&self) -> &Director {
        &self.director
    }

    pub fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn editor(&self) -> &dyn Editor {
        self.editor.as_ref()
    }

    pub fn chat(&self) -> &ChatPanel {
        &self.chat
    }

    pub fn terminal(&self) -> &TerminalPane {
        &self.terminal
    }

    pub fn store(&self) -> &ProblemStore {
        &self.store
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn autoplay(&self) -> bool {
        self.autoplay
    }

    pub fn is_generating(&self) -> bool {
        self.generation.is_some()
    }

    pub fn is_running_scene(&self) -> bool {
        self.scene_job.is_some()
    }

    pub fn active_distraction(&self) -> Option<DistractionKind> {
        self.distraction.as_ref().map(DistractionRun::kind)
    }

    pub fn pending_auth(&self) -> Option<&PendingAuth> {
        self.pending_auth.as_ref()
    }

    pub fn provider(&self) -> &ProviderSettings {
        &self.provider
    }

    pub fn last_run(&self) -> Option<&ProcessOutcome> {
        self.last_run.as_ref()
    }

    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }

    pub fn latest_notice(&self) -> Option<&Notice> {
        self.notices.back()
    }

    fn notify(&mut self, level: NoticeLevel, text: impl Into<String>) {
        self.notices.push_back(Notice {
            level,
            text: text.into(),
        });
        while self.notices.len() > MAX_NOTICES {
            self.notices.pop_front();
        }
    }

    // --- Command surface --------------------------------------------------

    pub fn toggle_playback(&mut self, now: Instant) -> CommandOutcome {
        if !self.director.has_scene() {
            return CommandOutcome::NeedsProblem;
        }
        if self.director.toggle_active() {
            info!(task_id = ?self.director.task_id(), "playback on");
            self.sync_caret();
            self.rearm_autoplay(now);
            self.drain(now);
        } else {
            self.stop_playback();
            info!(task_id = ?self.director.task_id(), "playback off");
        }
        CommandOutcome::Done
    }

    pub fn toggle_autoplay(&mut self, now: Instant) -> CommandOutcome {
        if !self.director.has_scene() {
            return CommandOutcome::NeedsProblem;
        }
        self.autoplay = !self.autoplay;
        info!(autoplay = self.autoplay, "autoplay toggled");
        if self.autoplay && !self.director.is_active() {
            self.director.set_active(true);
            self.sync_caret();
        }
        self.rearm_autoplay(now);
        CommandOutcome::Done
    }

    pub fn speed_up(&mut self) -> CommandOutcome {
        let step = Duration::from_millis(self.config.playback.speed_step_ms);
        let min = Duration::from_millis(self.config.playback.min_interval_ms);
        self.interval = self.interval.saturating_sub(step).max(min);
        CommandOutcome::Done
    }

    pub fn slow_down(&mut self) -> CommandOutcome {
        let step = Duration::from_millis(self.config.playback.speed_step_ms);
        let max = Duration::from_millis(self.config.playback.max_interval_ms);
        self.interval = (self.interval + step).min(max);
        CommandOutcome::Done
    }

    /// Load a random problem from the catalog.
    pub fn load_random_scene(&mut self, now: Instant) -> CommandOutcome {
        if self.arbiter.is_blocked() {
            self.notify(NoticeLevel::Warn, "busy, try again in a moment");
            return CommandOutcome::Ignored;
        }
        let Some(problem) = self.store.pick_random() else {
            self.notify(NoticeLevel::Warn, "the problem catalog is empty");
            return CommandOutcome::Ignored;
        };
        if self.load_scene(&problem, now) {
            CommandOutcome::Done
        } else {
            CommandOutcome::Ignored
        }
    }

    /// Load a specific problem. Returns false when it was refused.
    pub fn load_problem(&mut self, problem: &Problem, now: Instant) -> bool {
        if self.arbiter.is_blocked() {
            self.notify(NoticeLevel::Warn, "busy, try again in a moment");
            return false;
        }
        self.load_scene(problem, now)
    }

    pub fn request_new_problem(&mut self, topic: Option<String>) -> CommandOutcome {
        if self.generation.is_some() || self.pending_auth.is_some() {
            return CommandOutcome::Ignored;
        }
        let settings = self.provider.clone();
        let recovery = AuthRecovery::new(self.config.generator.auth_attempts);
        self.spawn_generation(GenerationRequest::NewProject { topic }, settings, recovery);
        CommandOutcome::Done
    }

    pub fn request_extension(&mut self, instruction: String) -> CommandOutcome {
        let Some(task_id) = self.director.task_id().map(str::to_string) else {
            return CommandOutcome::NeedsProblem;
        };
        if self.generation.is_some() || self.pending_auth.is_some() {
            return CommandOutcome::Ignored;
        }
        if self.director.phase() != Phase::SceneComplete {
            self.notify(NoticeLevel::Warn, "finish the scene before extending it");
            return CommandOutcome::Ignored;
        }
        let settings = self.provider.clone();
        let recovery = AuthRecovery::new(self.config.generator.auth_attempts);
        self.spawn_generation(
            GenerationRequest::Extension {
                instruction,
                task_id,
            },
            settings,
            recovery,
        );
        CommandOutcome::Done
    }

    /// Answer a pending authentication failure.
    pub fn resolve_auth(&mut self, choice: AuthChoice) -> CommandOutcome {
        let Some(pending) = self.pending_auth.take() else {
            return CommandOutcome::Ignored;
        };
        let PendingAuth {
            request,
            settings,
            mut recovery,
            ..
        } = pending;
        match recovery.decide(&settings, self.fallback.as_ref(), choice) {
            AuthStep::Retry(next) => {
                info!(provider = next.kind.as_str(), attempt = recovery.attempts(), "retrying generation");
                self.spawn_generation(request, next, recovery);
            }
            AuthStep::Exhausted => {
                warn!(attempts = recovery.attempts(), "credential attempts exhausted");
                self.notify(NoticeLevel::Error, "too many credential attempts, giving up");
            }
            AuthStep::Cancelled => {
                info!("generation cancelled by user");
                self.notify(NoticeLevel::Info, "generation cancelled");
            }
        }
        CommandOutcome::Done
    }

    // --- Triggers ---------------------------------------------------------

    /// A key typed into the editor. While playback runs it only advances
    /// the scene; otherwise it edits the document directly, unless a
    /// distraction, layout change or scene run owns the editor.
    pub fn handle_key_input(&mut self, input: KeyInput, now: Instant) {
        if self.director.is_active() {
            self.arbiter.enqueue(Trigger::Keystroke);
            self.drain(now);
            return;
        }
        if self.arbiter.is_blocked() || self.editor.active_file().is_none() {
            debug!(blocking = ?self.arbiter.blocking(), "key dropped");
            return;
        }
        match input {
            KeyInput::Char(ch) => self.editor.insert_at_cursor(&ch.to_string()),
            KeyInput::Enter => self.editor.insert_at_cursor("\n"),
            KeyInput::Tab => self.editor.insert_at_cursor("    "),
            KeyInput::Backspace => self.editor.backspace(),
        }
    }

    /// Advance timers and background work.
    pub fn tick(&mut self, now: Instant) {
        self.poll_scene_job();
        self.poll_distraction_job(now);
        self.advance_distraction(now);
        self.poll_generation();
        self.apply_ready(now);
        self.autoplay_tick(now);
    }

    fn drain(&mut self, now: Instant) {
        while let Some(trigger) = self.arbiter.next_ready() {
            self.process_trigger(trigger, now);
            self.arbiter.finish();
            if !self.director.is_active() {
                self.arbiter.clear();
                break;
            }
        }
    }

    fn autoplay_tick(&mut self, now: Instant) {
        if !self.autoplay || !self.director.is_active() {
            self.next_autoplay_at = None;
            return;
        }
        let due = *self.next_autoplay_at.get_or_insert(now + self.interval);
        if now < due {
            return;
        }
        self.next_autoplay_at = Some(now + self.interval);
        if self.arbiter.begin_tick() {
            self.process_trigger(Trigger::Tick, now);
            self.arbiter.finish();
        }
    }

    fn rearm_autoplay(&mut self, now: Instant) {
        self.next_autoplay_at = if self.autoplay && self.director.is_active() {
            Some(now + self.interval)
        } else {
            None
        };
    }

    fn stop_playback(&mut self) {
        self.director.set_active(false);
        let dropped = self.arbiter.clear();
        if dropped > 0 {
            info!(dropped, "dropped queued triggers");
        }
        self.next_autoplay_at = None;
    }

    fn process_trigger(&mut self, trigger: Trigger, now: Instant) {
        let unit = self.director.emit_next();
        match unit {
            Unit::Idle => {}
            Unit::Char(ch) => {
                self.write_char(ch);
                if let Some(kind) = self.scheduler.on_character_emitted() {
                    self.start_distraction(kind, now);
                }
            }
            Unit::NextFile => {
                if let Some(next) = self.director.advance_sequential().map(str::to_string) {
                    self.editor.open(&next);
                    self.editor.set_cursor(self.director.write_position());
                }
            }
            Unit::SwitchToFile(name) => {
                self.editor.open(&name);
                self.editor.set_cursor(self.director.write_position());
            }
            Unit::DeleteLine => {
                self.focus_director_file();
                self.editor.delete_first_line();
                self.editor.set_cursor(0);
            }
            Unit::ExecuteScene => {
                info!(?trigger, task_id = ?self.director.task_id(), "scene complete");
                self.execute_scene();
            }
        }
    }

    fn write_char(&mut self, ch: char) {
        self.focus_director_file();
        let pos = self.director.write_position().saturating_sub(1);
        if self.editor.cursor() != pos {
            warn!(
                expected = pos,
                caret = self.editor.cursor(),
                file = ?self.editor.active_file(),
                "caret out of step with playback"
            );
            self.editor.set_cursor(pos);
        }
        self.editor.insert(pos, &ch.to_string());
    }

    fn focus_director_file(&mut self) {
        if let Some(file) = self.director.current_file()
            && self.editor.active_file() != Some(file)
        {
            let file = file.to_string();
            self.editor.open(&file);
        }
    }

    /// Put the caret where playback will write next.
    fn sync_caret(&mut self) {
        self.focus_director_file();
        self.editor.set_cursor(self.director.write_position());
    }

    fn load_scene(&mut self, problem: &Problem, now: Instant) -> bool {
        if !self.director.start_new_scene(problem) {
            self.notify(
                NoticeLevel::Error,
                format!("could not start `{}`: it has no playable files", problem.task_id()),
            );
            return false;
        }
        self.arbiter.clear();
        self.arbiter.begin_blocking(BlockingOp::Layout);
        self.editor.reset();
        for script in self.director.scripts() {
            self.editor.open(&script.filename);
        }
        self.sync_caret();
        self.chat.close();
        self.chat.clear();
        self.terminal.unfocus();
        self.arbiter.end_blocking();

        self.scheduler.reset();
        self.last_run = None;
        self.notify(NoticeLevel::Info, format!("loaded {}", problem.task_id()));
        if self.autoplay {
            self.director.set_active(true);
        }
        self.rearm_autoplay(now);
        true
    }

    // --- Scene execution --------------------------------------------------

    fn execute_scene(&mut self) {
        self.stop_playback();
        if let Err(e) = self.editor.save_all() {
            error!(error = %e, "saving workspace failed");
            self.notify(NoticeLevel::Error, format!("could not save files: {e:#}"));
            return;
        }
        let Some(entry) = self.director.entry_file().map(str::to_string) else {
            return;
        };
        let Some(command) = self.config.run_command_for(&entry) else {
            warn!(entry = %entry, "no run command configured for entry file");
            self.notify(NoticeLevel::Warn, format!("don't know how to run {entry}"));
            return;
        };

        let runner = Arc::clone(&self.runner);
        let cwd = self.config.workspace_path();
        let timeout = Duration::from_secs(self.config.run.timeout_secs);
        let job_command = command.clone();
        let spawned = Job::spawn("scene-run", move || {
            fs::create_dir_all(&cwd).with_context(|| format!("create workspace {}", cwd.display()))?;
            runner.run(&job_command, &cwd, timeout)
        });
        match spawned {
            Ok(job) => {
                self.terminal.push_line(format!("$ {command}"));
                self.arbiter.begin_blocking(BlockingOp::SceneExecution);
                self.scene_job = Some(job);
            }
            Err(e) => {
                error!(error = %e, "could not start scene run");
                self.notify(NoticeLevel::Error, format!("could not run {entry}: {e:#}"));
            }
        }
    }

    fn poll_scene_job(&mut self) {
        let Some(job) = self.scene_job.as_ref() else {
            return;
        };
        let result = match job.poll() {
            JobPoll::Pending => return,
            JobPoll::Done(result) => result,
            JobPoll::Lost => Err(anyhow::anyhow!("scene run worker exited")),
        };
        self.scene_job = None;
        self.arbiter.end_blocking();
        // The scene is over; whatever arrived meanwhile is stale.
        self.stop_playback();

        match result {
            Ok(outcome) => self.finish_run(outcome),
            Err(e) => {
                error!(error = %e, "scene run failed to execute");
                self.notify(NoticeLevel::Error, format!("run failed: {e:#}"));
            }
        }
    }

    fn finish_run(&mut self, outcome: ProcessOutcome) {
        self.terminal.show_outcome(&outcome);
        if outcome.succeeded() {
            info!(command = %outcome.command, "scene run passed");
            self.notify(NoticeLevel::Info, "run finished cleanly");
            if self.config.run.summary {
                let files = self.editor.files();
                let task_id = self.director.task_id().unwrap_or_default().to_string();
                match write_run_summary(&self.config.workspace_path(), &task_id, &files, &outcome) {
                    Ok(path) => info!(path = %path.display(), "wrote run summary"),
                    Err(e) => {
                        warn!(error = %e, "could not write run summary");
                        self.notify(NoticeLevel::Warn, format!("summary not written: {e:#}"));
                    }
                }
            }
        } else if outcome.timed_out {
            warn!(command = %outcome.command, "scene run timed out; summary skipped");
            self.notify(NoticeLevel::Error, "run timed out");
        } else {
            warn!(command = %outcome.command, exit_code = ?outcome.exit_code, "scene run failed; summary skipped");
            self.notify(
                NoticeLevel::Error,
                match outcome.exit_code {
                    Some(code) => format!("run failed with exit code {code}"),
                    None => "run was killed".to_string(),
                },
            );
        }
        self.last_run = Some(outcome);
    }

    // --- Distractions -----------------------------------------------------

    fn start_distraction(&mut self, kind: DistractionKind, now: Instant) {
        let hold = Duration::from_millis(self.config.distractions.hold_ms);
        let steps = match kind {
            DistractionKind::FileHop => {
                self.director.request_file_switch();
                return;
            }
            DistractionKind::Aside => {
                let Some(text) = pick(&mut self.rng, &self.config.distractions.asides) else {
                    return;
                };
                aside_steps(&text, hold)
            }
            DistractionKind::Chat => {
                let Some(exchange) = pick(&mut self.rng, &self.config.distractions.chat) else {
                    return;
                };
                chat_steps(&exchange.question, &exchange.answer, hold)
            }
            DistractionKind::TerminalNoise => {
                let Some(command) = pick(&mut self.rng, &self.config.distractions.terminal_commands)
                else {
                    return;
                };
                terminal_steps(&command, hold)
            }
        };

        info!(kind = kind.as_str(), "distraction started");
        let char_delay = Duration::from_millis(self.config.distractions.char_delay_ms);
        let surfaces = Surfaces {
            editor: self.editor.as_mut(),
            chat: &mut self.chat,
            terminal: &mut self.terminal,
        };
        let run = DistractionRun::new(kind, steps, &surfaces, char_delay, now);
        self.arbiter.begin_blocking(BlockingOp::Distraction);
        self.distraction = Some(run);
    }

    fn advance_distraction(&mut self, now: Instant) {
        let Some(run) = self.distraction.as_mut() else {
            return;
        };
        let mut surfaces = Surfaces {
            editor: self.editor.as_mut(),
            chat: &mut self.chat,
            terminal: &mut self.terminal,
        };
        let kind = run.kind();
        match run.advance(now, &mut surfaces) {
            RunStatus::Running => {}
            RunStatus::NeedsCommand(command) => self.spawn_noise_command(command, now),
            RunStatus::Finished { intact } => {
                self.distraction = None;
                self.distraction_job = None;
                self.arbiter.end_blocking();
                info!(kind = kind.as_str(), intact, "distraction finished");
                if !intact {
                    self.notify(NoticeLevel::Warn, "the document changed during a distraction and was restored");
                }
                if self.director.is_active() {
                    self.drain(now);
                    self.rearm_autoplay(now);
                } else {
                    self.arbiter.clear();
                }
            }
        }
    }

    fn spawn_noise_command(&mut self, command: String, now: Instant) {
        let runner = Arc::clone(&self.runner);
        let cwd = self.config.workspace_path();
        let timeout = Duration::from_secs(self.config.distractions.terminal_timeout_secs);
        let spawned = Job::spawn("terminal-noise", move || {
            fs::create_dir_all(&cwd).with_context(|| format!("create workspace {}", cwd.display()))?;
            runner.run(&command, &cwd, timeout)
        });
        match spawned {
            Ok(job) => self.distraction_job = Some(job),
            Err(e) => {
                warn!(error = %e, "could not run terminal noise");
                self.terminal.push_line(format!("[{e:#}]"));
                if let Some(run) = self.distraction.as_mut() {
                    run.command_finished(now);
                }
            }
        }
    }

    fn poll_distraction_job(&mut self, now: Instant) {
        let Some(job) = self.distraction_job.as_ref() else {
            return;
        };
        let result = match job.poll() {
            JobPoll::Pending => return,
            JobPoll::Done(result) => result,
            JobPoll::Lost => Err(anyhow::anyhow!("terminal worker exited")),
        };
        self.distraction_job = None;
        match result {
            Ok(outcome) => self.terminal.show_outcome(&outcome),
            Err(e) => {
                warn!(error = %e, "terminal noise command failed");
                self.terminal.push_line(format!("[{e:#}]"));
            }
        }
        if let Some(run) = self.distraction.as_mut() {
            run.command_finished(now);
        }
    }

    // --- Generation -------------------------------------------------------

    fn spawn_generation(
        &mut self,
        request: GenerationRequest,
        settings: ProviderSettings,
        recovery: AuthRecovery,
    ) {
        let (prompt, shape, task_id) = match &request {
            GenerationRequest::NewProject { topic } => (
                new_project_prompt(topic.as_deref(), &self.config.generator.language),
                ResponseShape::Project,
                String::new(),
            ),
            GenerationRequest::Extension {
                instruction,
                task_id,
            } => (
                extension_prompt(
                    instruction,
                    self.director.scripts(),
                    self.director.entry_file().unwrap_or_default(),
                ),
                ResponseShape::Extension,
                task_id.clone(),
            ),
        };
        let factory = Arc::clone(&self.generators);
        let job_settings = settings.clone();
        let max_attempts = self.config.generator.max_attempts;
        let spawned = Job::spawn("generator", move || {
            let mut generator = factory(job_settings);
            generate(generator.as_mut(), &prompt, shape, &task_id, max_attempts)
        });
        match spawned {
            Ok(job) => {
                info!(provider = settings.kind.as_str(), ?shape, "generation requested");
                self.notify(NoticeLevel::Info, "asking the model...");
                self.generation = Some(Generation {
                    job,
                    request,
                    settings,
                    recovery,
                });
            }
            Err(e) => {
                error!(error = %e, "could not start generation");
                self.notify(NoticeLevel::Error, format!("could not start generation: {e:#}"));
            }
        }
    }

    fn poll_generation(&mut self) {
        let Some(generation) = self.generation.as_ref() else {
            return;
        };
        let outcome = match generation.job.poll() {
            JobPoll::Pending => return,
            JobPoll::Done(outcome) => outcome,
            JobPoll::Lost => RetryOutcome::ExhaustedRetries {
                attempts: 0,
                last_error: GeneratorError::Unavailable("generator worker exited".to_string()),
            },
        };
        let Some(generation) = self.generation.take() else {
            return;
        };
        match outcome {
            RetryOutcome::Succeeded(result) => {
                info!(provider = generation.settings.kind.as_str(), "generation succeeded");
                self.provider = generation.settings;
                self.ready = Some(result);
            }
            RetryOutcome::ExhaustedRetries {
                attempts,
                last_error,
            } => {
                error!(attempts, error = %last_error, "generation failed");
                self.notify(
                    NoticeLevel::Error,
                    format!("generation failed after {attempts} attempt(s): {last_error}"),
                );
            }
            RetryOutcome::AuthRejected(error) => {
                warn!(provider = generation.settings.kind.as_str(), error = %error, "credential rejected");
                self.notify(NoticeLevel::Warn, format!("{error}"));
                self.pending_auth = Some(PendingAuth {
                    request: generation.request,
                    settings: generation.settings,
                    error,
                    recovery: generation.recovery,
                });
            }
        }
    }

    fn apply_ready(&mut self, now: Instant) {
        if self.arbiter.is_blocked() {
            return;
        }
        let Some(result) = self.ready.take() else {
            return;
        };
        match result {
            GenerationResult::Project(project) => {
                let problem = Problem::MultiFile(project);
                self.load_scene(&problem, now);
            }
            GenerationResult::Extension { diffs, task_id } => {
                if self.director.task_id() != Some(task_id.as_str()) {
                    warn!(task_id = %task_id, "extension arrived for a scene that is no longer loaded");
                    self.notify(NoticeLevel::Warn, "extension discarded: the scene changed");
                    return;
                }
                let documents: Vec<FileScript> = self
                    .director
                    .scripts()
                    .iter()
                    .filter_map(|script| {
                        self.editor
                            .text_of(&script.filename)
                            .map(|text| FileScript::new(&script.filename, &text))
                    })
                    .collect();
                if self.director.begin_diff_apply_on(diffs, &documents) {
                    self.notify(NoticeLevel::Info, "extension ready, resume playback to apply it");
                    if self.autoplay {
                        self.director.set_active(true);
                        self.rearm_autoplay(now);
                    }
                } else {
                    self.notify(NoticeLevel::Warn, "the extension had no usable changes");
                }
            }
        }
    }
}

fn scheduler_for(config: &Config, rng: SmallRng) -> Scheduler {
    let d = &config.distractions;
    let mut scheduler = Scheduler::with_rng(d.kinds.clone(), d.threshold_min, d.threshold_max, rng);
    scheduler.set_enabled(d.enabled);
    scheduler
}

fn pick<T: Clone>(rng: &mut SmallRng, items: &[T]) -> Option<T> {
    if items.is_empty() {
        return None;
    }
    Some(items[rng.gen_range(0..items.len())].clone())
}

/// Ask the model and parse its answer, retrying transient failures.
#[instrument(skip(generator, prompt), fields(prompt_len = prompt.len()))]
fn generate(
    generator: &mut dyn ContentGenerator,
    prompt: &str,
    shape: ResponseShape,
    task_id: &str,
    max_attempts: u32,
) -> RetryOutcome<GenerationResult> {
    with_retries(max_attempts, |_| {
        let text = generator.complete(prompt)?;
        match shape {
            ResponseShape::Project => parse_project_response(&text).map(GenerationResult::Project),
            ResponseShape::Extension => {
                parse_extension_response(&text).map(|diffs| GenerationResult::Extension {
                    diffs,
                    task_id: task_id.to_string(),
                })
            }
        }
    })
}

/// Record a successful run next to the project.
pub fn write_run_summary(
    workspace: &Path,
    task_id: &str,
    files: &[String],
    outcome: &ProcessOutcome,
) -> Result<PathBuf> {
    let mut summary = format!(
        "# Run summary: {task_id}\n\n- finished: {}\n- command: `{}`\n- exit code: {}\n\n## Files\n\n",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        outcome.command,
        outcome.exit_code.map_or("none".to_string(), |c| c.to_string()),
    );
    for file in files {
        summary.push_str(&format!("- {file}\n"));
    }
    summary.push_str("\n## Output\n\n```\n");
    summary.push_str(outcome.stdout.trim_end());
    summary.push_str("\n```\n");

    fs::create_dir_all(workspace)
        .with_context(|| format!("create workspace {}", workspace.display()))?;
    let path = workspace.join(SUMMARY_FILE);
    fs::write(&path, summary).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}
