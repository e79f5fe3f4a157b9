pub mod chat_panel;
pub mod editor_pane;
pub mod file_tabs;
pub mod progress_bar;
pub mod terminal_pane;
