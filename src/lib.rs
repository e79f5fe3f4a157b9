//! stagehand: replays pre-fetched coding projects into a terminal editor one
//! keystroke at a time, with scripted distractions and a final run.
//!
//! The binary in `main.rs` wires these modules to a ratatui terminal; the
//! `check_catalog` tool and the benchmarks use them directly.

pub mod app;
pub mod arbiter;
pub mod config;
pub mod distraction;
pub mod event;
pub mod generator;
pub mod host;
pub mod job;
pub mod logging;
pub mod playback;
pub mod problem;
pub mod session;
pub mod ui;
