use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEvent};
use tracing::warn;

pub enum AppEvent {
    Key(KeyEvent),
    Paste(String),
    /// No input within the tick rate; drives timers and job polling.
    Tick,
    Resize,
}

/// Reads terminal input on its own thread and forwards it, interleaved with
/// ticks, over a channel.
pub struct EventHandler {
    rx: mpsc::Receiver<AppEvent>,
}

impl EventHandler {
    pub fn new(tick_rate: Duration) -> Result<Self> {
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name("input".to_string())
            .spawn(move || {
                loop {
                    let forwarded = match event::poll(tick_rate) {
                        Ok(true) => match event::read() {
                            Ok(Event::Key(key)) => Some(AppEvent::Key(key)),
                            Ok(Event::Paste(text)) => Some(AppEvent::Paste(text)),
                            Ok(Event::Resize(_, _)) => Some(AppEvent::Resize),
                            Ok(_) => None,
                            Err(e) => {
                                warn!(error = %e, "reading terminal input failed");
                                None
                            }
                        },
                        Ok(false) => Some(AppEvent::Tick),
                        Err(e) => {
                            warn!(error = %e, "polling terminal input failed");
                            Some(AppEvent::Tick)
                        }
                    };
                    if let Some(ev) = forwarded
                        && tx.send(ev).is_err()
                    {
                        return;
                    }
                }
            })
            .context("spawn input thread")?;

        Ok(Self { rx })
    }

    pub fn next(&self) -> Result<AppEvent> {
        Ok(self.rx.recv()?)
    }
}
