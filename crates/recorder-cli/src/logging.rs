//! Tracing setup.
//!
//! One-shot commands log to stderr. The TUI owns the terminal, so its log
//! lines go through a channel and are shown in the logs modal instead.

use std::io::{self, Write};

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,recorder_api=info,recorder_cli=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

pub(crate) fn init_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .init();
}

/// Route log lines to the returned receiver.
pub(crate) fn init_channel() -> Receiver<String> {
    let (tx, rx) = unbounded();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_target(false)
        .with_writer(move || LineWriter::new(tx.clone()))
        .init();
    rx
}

/// Splits written bytes into lines and forwards each one.
pub(crate) struct LineWriter {
    tx: Sender<String>,
    buf: Vec<u8>,
}

impl LineWriter {
    pub(crate) fn new(tx: Sender<String>) -> Self {
        Self { tx, buf: Vec::new() }
    }

    fn send_line(&mut self, line: &[u8]) {
        let text = String::from_utf8_lossy(line).trim_end().to_string();
        if !text.is_empty() {
            let _ = self.tx.send(text);
        }
    }
}

impl Write for LineWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            self.send_line(&line);
        }
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            let rest = std::mem::take(&mut self.buf);
            self.send_line(&rest);
        }
        Ok(())
    }
}

impl Drop for LineWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
