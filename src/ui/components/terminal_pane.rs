use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Paragraph, Widget};

use crate::host::terminal::TerminalPane;
use crate::ui::theme::Theme;

pub struct TerminalView<'a> {
    terminal: &'a TerminalPane,
    theme: &'a Theme,
}

impl<'a> TerminalView<'a> {
    pub fn new(terminal: &'a TerminalPane, theme: &'a Theme) -> Self {
        Self { terminal, theme }
    }
}

impl Widget for TerminalView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let colors = &self.theme.colors;
        let border = if self.terminal.is_focused() {
            colors.border_focused()
        } else {
            colors.border()
        };
        let block = Block::bordered()
            .title(" Terminal ")
            .border_style(Style::default().fg(border))
            .style(Style::default().bg(colors.bg()));
        let inner_height = area.height.saturating_sub(2) as usize;

        let output = self.terminal.lines();
        let prompt_rows = usize::from(self.terminal.is_focused());
        let shown = inner_height.saturating_sub(prompt_rows);
        let mut lines: Vec<Line> = output[output.len().saturating_sub(shown)..]
            .iter()
            .map(|l| {
                let color = if l.starts_with('[') {
                    colors.warning()
                } else {
                    colors.fg()
                };
                Line::from(Span::styled(l.clone(), Style::default().fg(color)))
            })
            .collect();
        if self.terminal.is_focused() {
            lines.push(Line::from(vec![
                Span::styled("$ ", Style::default().fg(colors.accent())),
                Span::styled(self.terminal.input().to_string(), Style::default().fg(colors.fg())),
                Span::styled(
                    " ",
                    Style::default().bg(colors.cursor_bg()).fg(colors.cursor_fg()),
                ),
            ]));
        }

        Paragraph::new(lines).block(block).render(area, buf);
    }
}
