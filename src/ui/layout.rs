use ratatui::layout::{Constraint, Direction, Layout, Rect};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutTier {
    Wide,   // ≥100 cols: editor + chat column
    Medium, // 60-99 cols: chat replaces the terminal strip while open
    Narrow, // <60 cols: editor and status only
}

impl LayoutTier {
    pub fn from_area(area: Rect) -> Self {
        if area.width >= 100 {
            LayoutTier::Wide
        } else if area.width >= 60 {
            LayoutTier::Medium
        } else {
            LayoutTier::Narrow
        }
    }

    pub fn show_terminal(&self, height: u16) -> bool {
        height >= 16 && *self != LayoutTier::Narrow
    }
}

pub struct AppLayout {
    pub header: Rect,
    pub tabs: Rect,
    pub editor: Rect,
    pub chat: Option<Rect>,
    pub terminal: Option<Rect>,
    pub progress: Rect,
    pub footer: Rect,
    pub tier: LayoutTier,
}

impl AppLayout {
    pub fn new(area: Rect, chat_open: bool) -> Self {
        let tier = LayoutTier::from_area(area);
        let terminal_rows = if tier.show_terminal(area.height) { 8 } else { 0 };

        let vertical = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(5),
                Constraint::Length(terminal_rows),
                Constraint::Length(3),
                Constraint::Length(1),
            ])
            .split(area);

        let mut editor = vertical[2];
        let mut chat = None;
        let mut terminal = (terminal_rows > 0).then_some(vertical[3]);

        if chat_open {
            match tier {
                LayoutTier::Wide => {
                    let horizontal = Layout::default()
                        .direction(Direction::Horizontal)
                        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
                        .split(vertical[2]);
                    editor = horizontal[0];
                    chat = Some(horizontal[1]);
                }
                LayoutTier::Medium => {
                    chat = terminal.take();
                }
                LayoutTier::Narrow => {
                    chat = Some(centered_rect(90, 60, area));
                }
            }
        }

        Self {
            header: vertical[0],
            tabs: vertical[1],
            editor,
            chat,
            terminal,
            progress: vertical[4],
            footer: vertical[5],
            tier,
        }
    }
}

pub fn pack_hint_lines(hints: &[&str], width: usize) -> Vec<String> {
    if width == 0 || hints.is_empty() {
        return Vec::new();
    }

    let prefix = " ";
    let separator = "  ";
    let mut out: Vec<String> = Vec::new();
    let mut current = prefix.to_string();
    let mut has_hint = false;

    for hint in hints.iter().filter(|h| !h.is_empty()) {
        let candidate = if has_hint {
            format!("{current}{separator}{hint}")
        } else {
            format!("{current}{hint}")
        };
        if candidate.chars().count() <= width {
            current = candidate;
        } else {
            if has_hint {
                out.push(current);
            }
            current = format!("{prefix}{hint}");
        }
        has_hint = true;
    }

    if has_hint {
        out.push(current);
    }
    out
}

pub fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    const MIN_POPUP_WIDTH: u16 = 40;
    const MIN_POPUP_HEIGHT: u16 = 7;

    let requested_w = area.width.saturating_mul(percent_x.min(100)) / 100;
    let requested_h = area.height.saturating_mul(percent_y.min(100)) / 100;

    let target_w = requested_w.max(MIN_POPUP_WIDTH).min(area.width);
    let target_h = requested_h.max(MIN_POPUP_HEIGHT).min(area.height);

    let left = area
        .x
        .saturating_add((area.width.saturating_sub(target_w)) / 2);
    let top = area
        .y
        .saturating_add((area.height.saturating_sub(target_h)) / 2);

    Rect::new(left, top, target_w, target_h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_chat_takes_a_column() {
        let layout = AppLayout::new(Rect::new(0, 0, 120, 40), true);
        assert_eq!(layout.tier, LayoutTier::Wide);
        let chat = layout.chat.unwrap();
        assert_eq!(chat.y, layout.editor.y);
        assert!(layout.editor.width > chat.width);
        assert!(layout.terminal.is_some());
    }

    #[test]
    fn test_medium_chat_replaces_terminal() {
        let layout = AppLayout::new(Rect::new(0, 0, 80, 30), true);
        assert!(layout.chat.is_some());
        assert!(layout.terminal.is_none());
        let closed = AppLayout::new(Rect::new(0, 0, 80, 30), false);
        assert!(closed.chat.is_none());
        assert!(closed.terminal.is_some());
    }

    #[test]
    fn test_pack_hint_lines_wraps() {
        let lines = pack_hint_lines(&["[F2] play", "[F3] auto", "[F4] new"], 22);
        assert_eq!(lines, vec![" [F2] play  [F3] auto", " [F4] new"]);
    }

    #[test]
    fn test_centered_rect_clamps_to_area() {
        let area = Rect::new(0, 0, 30, 5);
        assert_eq!(centered_rect(50, 50, area), area);
    }
}
