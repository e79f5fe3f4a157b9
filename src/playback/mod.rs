pub mod diff;
pub mod director;
pub mod script;

pub use diff::{DiffAction, FileDiff};
pub use director::{Director, Phase};
pub use script::FileScript;

/// One step of playback, pulled from the director per trigger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Unit {
    /// Insert this char at the caret.
    Char(char),
    /// The current file is exhausted but others remain.
    NextFile,
    /// Every file is fully written; run the project.
    ExecuteScene,
    /// Remove the first remaining line of the current file.
    DeleteLine,
    /// Focus this file, creating it if needed, and put the caret at the
    /// director's write position.
    SwitchToFile(String),
    /// No scene is loaded.
    Idle,
}
