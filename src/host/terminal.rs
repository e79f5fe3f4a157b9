use crate::host::process::ProcessOutcome;

const DEFAULT_MAX_LINES: usize = 500;

/// Scrollback plus a prompt line. Long-running commands are never executed
/// here; their results are appended once a job reports back.
#[derive(Debug)]
pub struct TerminalPane {
    lines: Vec<String>,
    input: String,
    focused: bool,
    max_lines: usize,
}

impl Default for TerminalPane {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            input: String::new(),
            focused: false,
            max_lines: DEFAULT_MAX_LINES,
        }
    }
}

impl TerminalPane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn focus(&mut self) {
        self.focused = true;
    }

    pub fn unfocus(&mut self) {
        self.focused = false;
    }

    pub fn type_char(&mut self, ch: char) {
        self.input.push(ch);
    }

    /// Commit the prompt line to the scrollback and return the command.
    pub fn submit(&mut self) -> String {
        let command = std::mem::take(&mut self.input);
        self.push_line(format!("$ {command}"));
        command
    }

    pub fn push_line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
        if self.lines.len() > self.max_lines {
            let excess = self.lines.len() - self.max_lines;
            self.lines.drain(..excess);
        }
    }

    pub fn push_output(&mut self, text: &str) {
        for line in text.lines() {
            self.push_line(line);
        }
    }

    pub fn show_outcome(&mut self, outcome: &ProcessOutcome) {
        self.push_output(&outcome.stdout);
        self.push_output(&outcome.stderr);
        if outcome.timed_out {
            self.push_line("[timed out]");
        } else if let Some(code) = outcome.exit_code
            && code != 0
        {
            self.push_line(format!("[exit {code}]"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_moves_input_to_scrollback() {
        let mut term = TerminalPane::new();
        "ls".chars().for_each(|c| term.type_char(c));
        assert_eq!(term.submit(), "ls");
        assert_eq!(term.input(), "");
        assert_eq!(term.lines(), ["$ ls"]);
    }

    #[test]
    fn test_scrollback_is_bounded() {
        let mut term = TerminalPane::new();
        for i in 0..DEFAULT_MAX_LINES + 10 {
            term.push_line(i.to_string());
        }
        assert_eq!(term.lines().len(), DEFAULT_MAX_LINES);
        assert_eq!(term.lines()[0], "10");
    }

    #[test]
    fn test_show_outcome_marks_failures() {
        let mut term = TerminalPane::new();
        term.show_outcome(&ProcessOutcome {
            command: "python3 main.py".to_string(),
            exit_code: Some(1),
            stdout: "partial\n".to_string(),
            stderr: "Traceback\n".to_string(),
            timed_out: false,
        });
        assert_eq!(term.lines(), ["partial", "Traceback", "[exit 1]"]);
    }
}
