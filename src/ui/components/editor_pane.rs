use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Paragraph, Widget};

use crate::ui::theme::Theme;

/// The active document with line numbers and a block caret. Scrolls so the
/// caret line stays in view.
pub struct EditorPane<'a> {
    text: &'a str,
    cursor: usize,
    title: &'a str,
    focused: bool,
    theme: &'a Theme,
}

impl<'a> EditorPane<'a> {
    pub fn new(text: &'a str, cursor: usize, title: &'a str, theme: &'a Theme) -> Self {
        Self {
            text,
            cursor,
            title,
            focused: true,
            theme,
        }
    }

    pub fn focused(mut self, focused: bool) -> Self {
        self.focused = focused;
        self
    }
}

/// Zero-based (line, column) of a char offset.
pub fn line_col(text: &str, cursor: usize) -> (usize, usize) {
    let mut line = 0;
    let mut col = 0;
    for ch in text.chars().take(cursor) {
        if ch == '\n' {
            line += 1;
            col = 0;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// First line to draw so that `caret_line` is visible in `height` rows.
pub fn scroll_offset(caret_line: usize, height: usize) -> usize {
    if height == 0 {
        return 0;
    }
    caret_line.saturating_sub(height - 1)
}

/// Expand tabs to the next 4-column stop.
fn display_char(ch: char, col: usize) -> String {
    match ch {
        '\t' => " ".repeat(4 - (col % 4)),
        _ => ch.to_string(),
    }
}

impl Widget for EditorPane<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let colors = &self.theme.colors;
        let border = if self.focused {
            colors.border_focused()
        } else {
            colors.border()
        };
        let block = Block::bordered()
            .title(format!(" {} ", self.title))
            .border_style(Style::default().fg(border))
            .style(Style::default().bg(colors.bg()));
        let inner = block.inner(area);
        block.render(area, buf);
        if inner.height == 0 {
            return;
        }

        let (caret_line, _) = line_col(self.text, self.cursor);
        let first = scroll_offset(caret_line, inner.height as usize);
        let gutter = (self.text.lines().count().max(1).to_string().len()).max(3);
        let text_style = Style::default().fg(colors.fg());
        let caret_style = Style::default()
            .fg(colors.cursor_fg())
            .bg(colors.cursor_bg());
        let gutter_style = Style::default().fg(colors.text_muted());

        let mut lines: Vec<Line> = Vec::new();
        let mut offset = 0usize;
        for (idx, raw) in self.text.split('\n').enumerate() {
            let len = raw.chars().count();
            if idx >= first && lines.len() < inner.height as usize {
                let mut spans = vec![Span::styled(
                    format!("{:>gutter$} ", idx + 1),
                    gutter_style,
                )];
                let mut col = 0;
                for (i, ch) in raw.chars().enumerate() {
                    let shown = display_char(ch, col);
                    col += shown.chars().count();
                    let style = if offset + i == self.cursor {
                        caret_style
                    } else {
                        text_style
                    };
                    spans.push(Span::styled(shown, style));
                }
                if self.cursor == offset + len {
                    spans.push(Span::styled(" ", caret_style));
                }
                lines.push(Line::from(spans));
            }
            offset += len + 1;
        }

        if self.text.is_empty() {
            lines = vec![Line::from(vec![
                Span::styled(format!("{:>gutter$} ", 1), gutter_style),
                Span::styled(" ", caret_style.add_modifier(Modifier::SLOW_BLINK)),
            ])];
        }

        Paragraph::new(lines).render(inner, buf);
    }
}
