#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

/// The side chat panel. Messages are built up one char at a time so the
/// panel can show them being typed or streamed.
#[derive(Debug, Default)]
pub struct ChatPanel {
    open: bool,
    messages: Vec<ChatMessage>,
}

impl ChatPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self) {
        self.open = true;
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn begin_message(&mut self, role: ChatRole) {
        self.messages.push(ChatMessage {
            role,
            text: String::new(),
        });
    }

    /// Append to the last message, starting an assistant message if the
    /// panel is empty.
    pub fn push_char(&mut self, ch: char) {
        if self.messages.is_empty() {
            self.begin_message(ChatRole::Assistant);
        }
        if let Some(last) = self.messages.last_mut() {
            last.text.push(ch);
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_build_incrementally() {
        let mut chat = ChatPanel::new();
        chat.open();
        chat.begin_message(ChatRole::User);
        "hi".chars().for_each(|c| chat.push_char(c));
        chat.begin_message(ChatRole::Assistant);
        chat.push_char('!');
        assert!(chat.is_open());
        assert_eq!(chat.messages().len(), 2);
        assert_eq!(chat.messages()[0].text, "hi");
        assert_eq!(chat.messages()[1].role, ChatRole::Assistant);
        chat.close();
        assert!(!chat.is_open());
    }
}
