//! Ratatui UI loop.
//!
//! Keys:
//! - 1-4 / Tab: switch between Records, Files, Converts and Subscriptions
//! - Up/Down: move selection
//! - r: refresh the current view
//! - Records: a add room, s start/stop
//! - Files: Enter open, Left/Backspace parent dir, Space mark, d download,
//!   D download to a path, S share, c convert, x delete
//! - Converts: x cancel task
//! - Subscriptions: a subscribe, x unsubscribe, s start recording
//! - Esc: cancel the running download
//! - l: logs, h: help, q: quit

mod app;
mod poller;
mod render;
mod view_model;
mod widgets;

pub(crate) use app::run_tui;
