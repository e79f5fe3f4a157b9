use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use crossterm::event::{
    EnableBracketedPaste, DisableBracketedPaste, KeyCode, KeyEvent, KeyEventKind, KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Clear, Paragraph, Wrap};
use tracing::{info, warn};

use stagehand::app::{App, Modal};
use stagehand::config::Config;
use stagehand::event::{AppEvent, EventHandler};
use stagehand::host::buffer::MemoryEditor;
use stagehand::host::process::ShellRunner;
use stagehand::logging;
use stagehand::playback::Phase;
use stagehand::problem::store::ProblemStore;
use stagehand::session::{KeyInput, NoticeLevel, Session, http_generators};
use stagehand::ui::components::chat_panel::ChatView;
use stagehand::ui::components::editor_pane::{EditorPane, line_col};
use stagehand::ui::components::file_tabs::FileTabs;
use stagehand::ui::components::progress_bar::{ProgressBar, file_marks};
use stagehand::ui::components::terminal_pane::TerminalView;
use stagehand::ui::layout::{AppLayout, centered_rect, pack_hint_lines};
use stagehand::ui::theme::Theme;

const TICK_RATE: Duration = Duration::from_millis(20);

#[derive(Parser)]
#[command(
    name = "stagehand",
    version,
    about = "Replays coding projects into a terminal editor, one keystroke at a time"
)]
struct Cli {
    #[arg(short, long, help = "Problem dataset (JSON array or NDJSON)")]
    dataset: Option<PathBuf>,

    #[arg(short, long, help = "Directory scene files are written to and run in")]
    workspace: Option<PathBuf>,

    #[arg(short, long, help = "Theme name")]
    theme: Option<String>,

    #[arg(long, help = "Start with auto-play on")]
    autoplay: bool,

    #[arg(long, help = "Auto-play interval in milliseconds")]
    interval: Option<u64>,

    #[arg(long, help = "Disable distractions")]
    no_distractions: bool,

    #[arg(short, long, help = "Config file (default: <config_dir>/stagehand/config.toml)")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_path = match logging::init() {
        Ok(path) => Some(path),
        Err(e) => {
            eprintln!("warning: logging disabled: {e:#}");
            None
        }
    };

    let loaded = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let mut config = loaded.unwrap_or_else(|e| {
        warn!(error = %e, "config unreadable, using defaults");
        eprintln!("warning: {e:#}; using default settings");
        Config::default()
    });
    apply_cli(&mut config, &cli);

    let store = match config.dataset_path() {
        Some(path) => ProblemStore::load(&path).unwrap_or_else(|e| {
            warn!(error = %e, "dataset unreadable, using the bundled catalog");
            ProblemStore::bundled()
        }),
        None => ProblemStore::bundled(),
    };
    info!(problems = store.len(), "starting");

    let theme = Theme::load_or_default(&config.theme);
    let editor = MemoryEditor::with_workspace(config.workspace_path());
    let session = Session::new(
        config,
        store,
        Box::new(editor),
        Arc::new(ShellRunner),
        http_generators(),
    );
    let mut app = App::new(session, theme, log_path);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = EventHandler::new(TICK_RATE).and_then(|events| run_app(&mut terminal, &mut app, &events));

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableBracketedPaste, LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = result {
        tracing::error!(error = %err, "event loop failed");
        eprintln!("Error: {err:?}");
    }

    Ok(())
}

fn apply_cli(config: &mut Config, cli: &Cli) {
    if let Some(dataset) = &cli.dataset {
        config.dataset_path = Some(dataset.to_string_lossy().to_string());
    }
    if let Some(workspace) = &cli.workspace {
        config.workspace_dir = workspace.to_string_lossy().to_string();
    }
    if let Some(theme) = &cli.theme {
        config.theme = theme.clone();
    }
    if cli.autoplay {
        config.playback.autoplay = true;
    }
    if let Some(interval) = cli.interval {
        config.playback.interval_ms = interval;
    }
    if cli.no_distractions {
        config.distractions.enabled = false;
    }
    config.normalize();
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    events: &EventHandler,
) -> Result<()> {
    loop {
        terminal.draw(|frame| render(frame, app))?;

        match events.next()? {
            AppEvent::Key(key) => handle_key(app, key),
            AppEvent::Paste(text) => {
                if app.modal.is_none() {
                    app.paste(&text, Instant::now());
                }
            }
            AppEvent::Tick | AppEvent::Resize => {}
        }
        app.on_tick(Instant::now());

        if app.should_quit {
            info!("quit");
            return Ok(());
        }
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Only process Press events; Repeat would double-type.
    if key.kind != KeyEventKind::Press {
        return;
    }
    let now = Instant::now();
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    if ctrl && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q')) {
        app.should_quit = true;
        return;
    }
    if app.handle_modal_key(key) {
        return;
    }

    match key.code {
        KeyCode::F(1) => app.show_help(),
        KeyCode::F(2) => app.toggle_playback(now),
        KeyCode::Char('p') if ctrl => app.toggle_playback(now),
        KeyCode::F(3) => app.toggle_autoplay(now),
        KeyCode::Char('t') if ctrl => app.toggle_autoplay(now),
        KeyCode::F(4) => app.new_problem(),
        KeyCode::Char('n') if ctrl => app.new_problem(),
        KeyCode::F(5) => app.load_catalog_scene(now),
        KeyCode::Char('r') if ctrl => app.load_catalog_scene(now),
        KeyCode::F(6) => app.extend(),
        KeyCode::Char('e') if ctrl => app.extend(),
        KeyCode::F(7) => app.slow_down(),
        KeyCode::F(8) => app.speed_up(),
        KeyCode::Char(ch) if !ctrl => app.type_key(KeyInput::Char(ch), now),
        KeyCode::Enter => app.type_key(KeyInput::Enter, now),
        KeyCode::Tab => app.type_key(KeyInput::Tab, now),
        KeyCode::Backspace => app.type_key(KeyInput::Backspace, now),
        _ => {}
    }
}

fn render(frame: &mut ratatui::Frame, app: &App) {
    let area = frame.area();
    let colors = &app.theme.colors;
    let session = &app.session;
    let director = session.director();

    frame.render_widget(Block::default().style(Style::default().bg(colors.bg())), area);

    let layout = AppLayout::new(area, session.chat().is_open());

    // Header
    let phase = match director.phase() {
        Phase::Idle => "idle",
        Phase::Typing => "typing",
        Phase::FileBoundary => "next file",
        Phase::SceneComplete => "complete",
        Phase::DiffApply => "extending",
    };
    let mut header = vec![
        Span::styled(
            " stagehand ",
            Style::default()
                .fg(colors.header_fg())
                .bg(colors.accent_dim())
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(
                " {}  {}  {}  {}ms ",
                director.task_id().unwrap_or("no scene"),
                phase,
                if director.is_active() { "playing" } else { "paused" },
                session.interval().as_millis(),
            ),
            Style::default().fg(colors.header_fg()),
        ),
    ];
    if session.autoplay() {
        header.push(Span::styled(" auto ", Style::default().fg(colors.accent())));
    }
    if session.is_generating() {
        header.push(Span::styled(" generating... ", Style::default().fg(colors.warning())));
    }
    if session.is_running_scene() {
        header.push(Span::styled(" running ", Style::default().fg(colors.warning())));
    }
    if let Some(kind) = session.active_distraction() {
        header.push(Span::styled(
            format!(" {} ", kind.as_str()),
            Style::default().fg(colors.text_muted()),
        ));
    }
    frame.render_widget(
        Paragraph::new(Line::from(header)).style(Style::default().bg(colors.header_bg())),
        layout.header,
    );

    // Tabs
    let editor = session.editor();
    let files = editor.files();
    let complete: Vec<bool> = files
        .iter()
        .map(|name| {
            director
                .scripts()
                .iter()
                .position(|s| &s.filename == name)
                .and_then(|idx| Some(director.cursor_of(idx)? >= director.scripts()[idx].len()))
                .unwrap_or(false)
        })
        .collect();
    frame.render_widget(
        FileTabs::new(&files, editor.active_file(), &complete, &app.theme),
        layout.tabs,
    );

    // Editor
    let text = editor.text();
    let (line, col) = line_col(&text, editor.cursor());
    let title = format!(
        "{}  {}:{}",
        editor.active_file().unwrap_or("untitled"),
        line + 1,
        col + 1
    );
    let focused = !session.terminal().is_focused();
    frame.render_widget(
        EditorPane::new(&text, editor.cursor(), &title, &app.theme).focused(focused),
        layout.editor,
    );

    if let Some(rect) = layout.terminal {
        frame.render_widget(TerminalView::new(session.terminal(), &app.theme), rect);
    }
    if let Some(rect) = layout.chat {
        frame.render_widget(ChatView::new(session.chat(), &app.theme), rect);
    }

    // Progress
    let lengths: Vec<usize> = director.scripts().iter().map(|s| s.len()).collect();
    let label = match director.current_file() {
        Some(file) => format!("Scene: {file}"),
        None => "Scene".to_string(),
    };
    frame.render_widget(
        ProgressBar::new(label, director.progress(), &app.theme).with_marks(file_marks(&lengths)),
        layout.progress,
    );

    // Footer: latest notice, else key hints
    let footer = match session.latest_notice() {
        Some(notice) => {
            let color = match notice.level {
                NoticeLevel::Info => colors.text_muted(),
                NoticeLevel::Warn => colors.warning(),
                NoticeLevel::Error => colors.error(),
            };
            Line::from(Span::styled(format!(" {}", notice.text), Style::default().fg(color)))
        }
        None => {
            let hints = pack_hint_lines(
                &["[F1] help", "[F2] play/pause", "[F5] catalog", "[Ctrl+Q] quit"],
                layout.footer.width as usize,
            );
            Line::from(Span::styled(
                hints.into_iter().next().unwrap_or_default(),
                Style::default().fg(colors.text_muted()),
            ))
        }
    };
    frame.render_widget(Paragraph::new(footer), layout.footer);

    if let Some(modal) = &app.modal {
        render_modal(frame, app, modal, area);
    }
}

fn render_modal(frame: &mut ratatui::Frame, app: &App, modal: &Modal, area: Rect) {
    let colors = &app.theme.colors;
    let popup = centered_rect(60, 30, area);
    frame.render_widget(Clear, popup);

    let muted = Style::default().fg(colors.text_muted());
    let (title, lines): (&str, Vec<Line>) = match modal {
        Modal::Prompt { kind, input } => {
            let (before, at, after) = input.render_parts();
            let cursor = Style::default().fg(colors.cursor_fg()).bg(colors.cursor_bg());
            (
                kind.title(),
                vec![
                    Line::from(vec![
                        Span::styled(before, Style::default().fg(colors.fg())),
                        Span::styled(at.map_or(" ".to_string(), |c| c.to_string()), cursor),
                        Span::styled(after, Style::default().fg(colors.fg())),
                    ]),
                    Line::default(),
                    Line::from(Span::styled("[Enter] submit  [Esc] cancel", muted)),
                ],
            )
        }
        Modal::AuthChoice => {
            let detail = app
                .session
                .pending_auth()
                .map(|p| format!("{} ({} attempt(s) used)", p.error, p.attempts()))
                .unwrap_or_default();
            (
                "Credential rejected",
                vec![
                    Line::from(Span::styled(detail, Style::default().fg(colors.error()))),
                    Line::default(),
                    Line::from(Span::styled(
                        "[k] enter a new key  [s] switch provider  [c] cancel",
                        Style::default().fg(colors.fg()),
                    )),
                ],
            )
        }
        Modal::Help => {
            let rows = [
                ("F2 / Ctrl+P", "start or pause playback"),
                ("F3 / Ctrl+T", "toggle auto-play"),
                ("F4 / Ctrl+N", "generate a new project"),
                ("F5 / Ctrl+R", "random project from the catalog"),
                ("F6 / Ctrl+E", "extend the finished project"),
                ("F7 / F8", "slower / faster"),
                ("Ctrl+Q", "quit"),
            ];
            let mut lines: Vec<Line> = rows
                .iter()
                .map(|(keys, what)| {
                    Line::from(vec![
                        Span::styled(format!("{keys:<14}"), Style::default().fg(colors.accent())),
                        Span::styled(*what, Style::default().fg(colors.fg())),
                    ])
                })
                .collect();
            if let Some(path) = &app.log_path {
                lines.push(Line::default());
                lines.push(Line::from(Span::styled(format!("log: {}", path.display()), muted)));
            }
            ("Keys", lines)
        }
    };

    let block = Block::bordered()
        .title(format!(" {title} "))
        .border_style(Style::default().fg(colors.border_focused()))
        .style(Style::default().bg(colors.bg()));
    frame.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
        popup,
    );
}
