//! `recorder-cli`: terminal client for a livestream recording server.
//!
//! Without a subcommand it opens the TUI:
//! - Records: tracked rooms with status, size and elapsed time; start/stop
//! - Files: browse recordings, download with progress, share, convert, delete
//! - Converts: conversion queue; cancel
//! - Subscriptions: subscribed rooms; subscribe/unsubscribe, start recording
//!
//! Subcommands expose the same operations for scripting.

mod cli;
mod commands;
mod config;
mod format;
mod logging;
mod state;
mod ui;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use recorder_api::{ApiClient, ApiClientConfig};

use crate::cli::Command;
use crate::config::{ClientConfig, Overrides, Settings};
use crate::state::ClientState;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    let tui = matches!(args.cmd, None | Some(Command::Tui { .. }));
    let log_rx = if tui {
        Some(logging::init_channel())
    } else {
        logging::init_stderr();
        None
    };

    let cfg = ClientConfig::load_or_default(args.config.as_deref())?;
    let mut state = ClientState::load();
    let (poll_interval_ms, download_dir) = match &args.cmd {
        Some(Command::Tui {
            poll_interval_ms,
            download_dir,
        }) => (*poll_interval_ms, download_dir.clone()),
        _ => (None, None),
    };
    let settings = Settings::resolve(
        &cfg,
        Overrides {
            server: args.server.clone(),
            timeout_secs: args.timeout_secs,
            poll_interval_ms,
            download_dir,
        },
        &state,
    )?;
    tracing::debug!(server = %settings.server, "settings resolved");

    let api = Arc::new(ApiClient::new(ApiClientConfig {
        base_url: settings.server.clone(),
        timeout: settings.timeout,
        room_info_ttl: settings.room_info_ttl,
    }));

    match (args.cmd, log_rx) {
        (None | Some(Command::Tui { .. }), Some(log_rx)) => {
            ui::run_tui(api, settings, state, args.user, log_rx)
        }
        (Some(cmd), _) => {
            let mut ctx = commands::Context {
                api: &api,
                settings: &settings,
                state: &mut state,
                user: args.user,
                json: args.json,
            };
            commands::run(cmd, &mut ctx)
        }
        (None, None) => anyhow::bail!("logging was not set up for the TUI"),
    }
}
