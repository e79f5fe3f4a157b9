use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Paragraph, Widget};

use crate::ui::theme::Theme;

/// One tab per open document. Files playback has finished get a check mark.
pub struct FileTabs<'a> {
    files: &'a [String],
    active: Option<&'a str>,
    complete: &'a [bool],
    theme: &'a Theme,
}

impl<'a> FileTabs<'a> {
    pub fn new(
        files: &'a [String],
        active: Option<&'a str>,
        complete: &'a [bool],
        theme: &'a Theme,
    ) -> Self {
        Self {
            files,
            active,
            complete,
            theme,
        }
    }
}

impl Widget for FileTabs<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let colors = &self.theme.colors;
        let mut spans = Vec::new();
        for (idx, name) in self.files.iter().enumerate() {
            let mark = if self.complete.get(idx).copied().unwrap_or(false) {
                " \u{2713}"
            } else {
                ""
            };
            let style = if Some(name.as_str()) == self.active {
                Style::default()
                    .fg(colors.header_fg())
                    .bg(colors.accent_dim())
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(colors.text_muted())
            };
            spans.push(Span::styled(format!(" {name}{mark} "), style));
            spans.push(Span::raw(" "));
        }
        Paragraph::new(Line::from(spans))
            .style(Style::default().bg(colors.bg()))
            .render(area, buf);
    }
}
