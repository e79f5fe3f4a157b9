use std::collections::VecDeque;

use tracing::debug;

/// A request to advance playback by one unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    Keystroke,
    Tick,
}

/// Long-running work during which no trigger may touch the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockingOp {
    Distraction,
    SceneExecution,
    Layout,
}

/// Serializes triggers from keystrokes and the auto-play timer so that at
/// most one of them mutates the document at a time.
#[derive(Debug, Default)]
pub struct Arbiter {
    queue: VecDeque<Trigger>,
    in_flight: bool,
    blocking: Option<BlockingOp>,
}

impl Arbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, trigger: Trigger) {
        self.queue.push_back(trigger);
    }

    /// Hand out the oldest queued trigger and mark it in flight. Returns
    /// `None` while another trigger is in flight or a blocking op runs.
    pub fn next_ready(&mut self) -> Option<Trigger> {
        if self.in_flight || self.blocking.is_some() {
            return None;
        }
        let trigger = self.queue.pop_front()?;
        self.in_flight = true;
        Some(trigger)
    }

    /// Claim the writer slot for an auto-play tick, bypassing the queue.
    pub fn begin_tick(&mut self) -> bool {
        if !self.can_autoplay_tick() {
            return false;
        }
        self.in_flight = true;
        true
    }

    pub fn finish(&mut self) {
        self.in_flight = false;
    }

    pub fn begin_blocking(&mut self, op: BlockingOp) {
        debug!(?op, queued = self.queue.len(), "blocking");
        self.blocking = Some(op);
    }

    pub fn end_blocking(&mut self) -> Option<BlockingOp> {
        let op = self.blocking.take();
        debug!(?op, queued = self.queue.len(), "unblocked");
        op
    }

    pub fn blocking(&self) -> Option<BlockingOp> {
        self.blocking
    }

    pub fn is_blocked(&self) -> bool {
        self.blocking.is_some()
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Auto-play skips its tick whenever any other writer is busy or manual
    /// triggers are still waiting.
    pub fn can_autoplay_tick(&self) -> bool {
        self.blocking.is_none() && !self.in_flight && self.queue.is_empty()
    }

    /// Drop every queued trigger. A running blocking op is left alone.
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }
}
