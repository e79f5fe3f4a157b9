use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Clear, Paragraph, Widget, Wrap};

use crate::host::chat::{ChatPanel, ChatRole};
use crate::ui::theme::Theme;

pub struct ChatView<'a> {
    chat: &'a ChatPanel,
    theme: &'a Theme,
}

impl<'a> ChatView<'a> {
    pub fn new(chat: &'a ChatPanel, theme: &'a Theme) -> Self {
        Self { chat, theme }
    }
}

impl Widget for ChatView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let colors = &self.theme.colors;
        Clear.render(area, buf);
        let block = Block::bordered()
            .title(" Chat ")
            .border_style(Style::default().fg(colors.border_focused()))
            .style(Style::default().bg(colors.bg()));

        let mut lines: Vec<Line> = Vec::new();
        for message in self.chat.messages() {
            let (label, color) = match message.role {
                ChatRole::User => ("you", colors.chat_user()),
                ChatRole::Assistant => ("assistant", colors.chat_assistant()),
            };
            lines.push(Line::from(Span::styled(
                label,
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )));
            for text_line in message.text.lines() {
                lines.push(Line::from(Span::styled(
                    text_line.to_string(),
                    Style::default().fg(colors.fg()),
                )));
            }
            lines.push(Line::default());
        }

        // Keep the newest messages in view.
        let inner_height = area.height.saturating_sub(2) as usize;
        let skip = lines.len().saturating_sub(inner_height);
        let lines: Vec<Line> = lines.into_iter().skip(skip).collect();

        Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: false })
            .render(area, buf);
    }
}
