use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::widgets::{Block, Widget};

use crate::ui::theme::Theme;

/// Scene progress. `marks` are file boundaries as fractions of the whole
/// scene, drawn as separators on the bar.
pub struct ProgressBar<'a> {
    label: String,
    ratio: f64,
    marks: Vec<f64>,
    theme: &'a Theme,
}

impl<'a> ProgressBar<'a> {
    pub fn new(label: impl Into<String>, ratio: f64, theme: &'a Theme) -> Self {
        Self {
            label: label.into(),
            ratio: ratio.clamp(0.0, 1.0),
            marks: Vec::new(),
            theme,
        }
    }

    pub fn with_marks(mut self, marks: Vec<f64>) -> Self {
        self.marks = marks;
        self
    }
}

/// Boundary fractions for files of the given lengths (excluding 0 and 1).
pub fn file_marks(lengths: &[usize]) -> Vec<f64> {
    let total: usize = lengths.iter().sum();
    if total == 0 {
        return Vec::new();
    }
    let mut acc = 0;
    lengths
        .iter()
        .take(lengths.len().saturating_sub(1))
        .map(|len| {
            acc += len;
            acc as f64 / total as f64
        })
        .collect()
}

impl Widget for ProgressBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let colors = &self.theme.colors;

        let block = Block::bordered()
            .title(format!(" {} ", self.label))
            .border_style(Style::default().fg(colors.border()));
        let inner = block.inner(area);
        block.render(area, buf);

        if inner.width == 0 || inner.height == 0 {
            return;
        }

        let filled_width = (self.ratio * inner.width as f64) as u16;
        for x in inner.x..inner.x + inner.width {
            let style = if x < inner.x + filled_width {
                Style::default().fg(colors.bg()).bg(colors.bar_filled())
            } else {
                Style::default().fg(colors.fg()).bg(colors.bar_empty())
            };
            buf[(x, inner.y)].set_style(style);
        }
        for mark in &self.marks {
            let x = inner.x + (mark * inner.width as f64) as u16;
            if x > inner.x && x < inner.x + inner.width {
                buf[(x, inner.y)].set_symbol("\u{2502}");
            }
        }

        let percent = format!("{:.0}%", self.ratio * 100.0);
        let label_x = inner.x + (inner.width.saturating_sub(percent.len() as u16)) / 2;
        buf.set_string(label_x, inner.y, &percent, Style::default().fg(colors.fg()));
    }
}
