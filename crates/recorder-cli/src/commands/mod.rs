//! One-shot subcommands.
//!
//! Each command runs against a fresh agent. When the server rejects the
//! session, the user is asked for credentials once and the call is retried.

mod files;
mod prompt;
mod records;
mod rooms;

use anyhow::{Context as _, Result};
use recorder_api::ApiClient;
use serde::Serialize;

use crate::cli::Command;
use crate::config::Settings;
use crate::state::ClientState;

pub(crate) struct Context<'a> {
    pub(crate) api: &'a ApiClient,
    pub(crate) settings: &'a Settings,
    pub(crate) state: &'a mut ClientState,
    pub(crate) user: Option<String>,
    pub(crate) json: bool,
}

pub(crate) fn run(cmd: Command, ctx: &mut Context<'_>) -> Result<()> {
    match cmd {
        Command::Tui { .. } => anyhow::bail!("the TUI is not a one-shot command"),
        Command::Login => login(ctx),
        Command::Logout => logout(ctx),
        Command::Records => records::list(ctx),
        Command::Start { room_id } => records::start(ctx, room_id),
        Command::Stop { room_id } => records::stop(ctx, room_id),
        Command::Files { path } => files::list(ctx, &path),
        Command::Download { path, output } => files::download(ctx, &path, output),
        Command::Delete { paths, yes } => files::delete(ctx, &paths, yes),
        Command::Share { path } => files::share(ctx, &path),
        Command::Convert {
            path,
            format,
            delete_source,
            yes,
        } => files::convert(ctx, &path, &format, delete_source, yes),
        Command::Converts => files::list_converts(ctx),
        Command::CancelConvert { task_id, yes } => files::cancel_convert(ctx, &task_id, yes),
        Command::Subscriptions => rooms::list(ctx),
        Command::Subscribe { room_id } => rooms::subscribe(ctx, room_id),
        Command::Unsubscribe { room_id, yes } => rooms::unsubscribe(ctx, room_id, yes),
    }
}

/// Run `op`, logging in and retrying once if the session is rejected.
pub(crate) fn with_session<T>(
    ctx: &mut Context<'_>,
    mut op: impl FnMut(&ApiClient) -> recorder_api::Result<T>,
) -> Result<T> {
    match op(ctx.api) {
        Err(err) if err.is_unauthorized() => {
            tracing::debug!(error = %err, "session required");
            login(ctx)?;
            Ok(op(ctx.api)?)
        }
        other => Ok(other?),
    }
}

fn login(ctx: &mut Context<'_>) -> Result<()> {
    let user = match ctx.user.clone().or_else(|| ctx.state.user.clone()) {
        Some(user) => user,
        None => prompt::line("user: ")?,
    };
    let pass = prompt::password(&format!("password for {user}: "))?;
    ctx.api
        .login(&user, &pass)
        .with_context(|| format!("login as {user}"))?;
    ctx.state.remember(&ctx.settings.server, Some(&user));
    ctx.state.save();
    ctx.user = Some(user.clone());
    eprintln!("logged in as {user}");
    Ok(())
}

fn logout(ctx: &mut Context<'_>) -> Result<()> {
    ctx.api.logout();
    ctx.state.user = None;
    ctx.state.save();
    eprintln!("logged out");
    Ok(())
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("encode json output")?;
    println!("{out}");
    Ok(())
}
