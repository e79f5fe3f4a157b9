use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use anyhow::{Context, Result};
use tracing::error;

/// Work running on a background thread, polled from the tick loop. The
/// worker never sees the editor; it only hands a value back.
pub struct Job<T> {
    name: String,
    rx: Receiver<T>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum JobPoll<T> {
    Pending,
    Done(T),
    /// The worker exited without reporting (it panicked).
    Lost,
}

impl<T: Send + 'static> Job<T> {
    pub fn spawn(name: &str, work: impl FnOnce() -> T + Send + 'static) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                // The receiver is gone when the job was abandoned.
                let _ = tx.send(work());
            })
            .with_context(|| format!("spawn {name} thread"))?;
        Ok(Self {
            name: name.to_string(),
            rx,
        })
    }
}

impl<T> Job<T> {
    pub fn poll(&self) -> JobPoll<T> {
        match self.rx.try_recv() {
            Ok(value) => JobPoll::Done(value),
            Err(TryRecvError::Empty) => JobPoll::Pending,
            Err(TryRecvError::Disconnected) => {
                error!(job = %self.name, "background job exited without a result");
                JobPoll::Lost
            }
        }
    }
}
