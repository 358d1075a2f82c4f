use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use recorder_api::{
    ApiError, CancelToken, DownloadOutcome, FixedPicker, SavePicker, Strategies, StreamWorker, SystemHandoff,
};
use recorder_types::{ConvertTask, FileEntry};

use super::{Context, print_json, prompt, with_session};
use crate::format::{format_bytes, format_progress};

const PROGRESS_REDRAW: Duration = Duration::from_millis(200);

pub(super) fn list(ctx: &mut Context<'_>, path: &str) -> Result<()> {
    let entries = with_session(ctx, |api| api.browse(path))?;
    if ctx.json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("empty directory");
        return Ok(());
    }
    for entry in &entries {
        println!("{}", entry_row(entry));
    }
    Ok(())
}

fn entry_row(entry: &FileEntry) -> String {
    match entry {
        FileEntry::Directory { name, modified, .. } => {
            format!("{:>10}  {:<20}  {name}/", "dir", modified.as_deref().unwrap_or("-"))
        }
        FileEntry::MediaFile {
            name,
            size,
            modified,
            ..
        } => format!(
            "{:>10}  {:<20}  {name}",
            format_bytes(*size),
            modified.as_deref().unwrap_or("-")
        ),
    }
}

/// With `--output` the file goes exactly there; otherwise the stream worker
/// writes into the download directory, or the system handler takes over.
pub(super) fn download(ctx: &mut Context<'_>, path: &str, output: Option<PathBuf>) -> Result<()> {
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel()).context("install Ctrl-C handler")?;
    }

    let picker = output.map(FixedPicker::new);
    let worker = StreamWorker::new(ctx.settings.download_dir.clone());
    let handoff = SystemHandoff;
    let strategies = Strategies {
        picker: picker.as_ref().map(|p| p as &dyn SavePicker),
        worker: Some(&worker),
        handoff: &handoff,
    };

    let mut last_draw: Option<Instant> = None;
    let mut progress = |received: u64, total: Option<u64>| {
        if last_draw.is_some_and(|at| at.elapsed() < PROGRESS_REDRAW) {
            return;
        }
        last_draw = Some(Instant::now());
        eprint!("\r{:<40}", format_progress(received, total));
        io::stderr().flush().ok();
    };

    let result = with_session(ctx, |api| {
        api.download_to_disk(path, &strategies, &mut progress, &cancel)
    });
    eprint!("\r{:<40}\r", "");

    match result {
        Ok(DownloadOutcome::Saved { path, bytes }) | Ok(DownloadOutcome::Streamed { path, bytes }) => {
            println!("saved {} ({})", path.display(), format_bytes(bytes));
            Ok(())
        }
        Ok(DownloadOutcome::HandedOff { url }) => {
            println!("handed {url} to the system download handler");
            Ok(())
        }
        Err(err) if err.downcast_ref::<ApiError>().is_some_and(ApiError::is_cancelled) => {
            anyhow::bail!("download cancelled")
        }
        Err(err) => Err(err),
    }
}

/// A single path is removed directly; several go in one batch call.
pub(super) fn delete(ctx: &mut Context<'_>, paths: &[String], yes: bool) -> Result<()> {
    let question = match paths {
        [single] => format!("delete {single}?"),
        _ => format!("delete {} paths ({})?", paths.len(), paths.join(", ")),
    };
    if !prompt::confirm(&question, yes)? {
        println!("aborted");
        return Ok(());
    }
    match paths {
        [single] => with_session(ctx, |api| api.delete_path(single))?,
        _ => with_session(ctx, |api| api.delete_files(paths))?,
    }
    println!("deleted {} path(s)", paths.len());
    Ok(())
}

pub(super) fn share(ctx: &mut Context<'_>, path: &str) -> Result<()> {
    let link = with_session(ctx, |api| api.presign(path))?;
    if ctx.json {
        return print_json(&link);
    }
    match link.expires_at.as_deref() {
        Some(expires) => println!("{} (expires {expires})", link.url),
        None => println!("{}", link.url),
    }
    Ok(())
}

pub(super) fn convert(
    ctx: &mut Context<'_>,
    path: &str,
    format: &str,
    delete_source: bool,
    yes: bool,
) -> Result<()> {
    let question = if delete_source {
        format!("convert {path} to {format} and delete the source afterwards?")
    } else {
        format!("convert {path} to {format}?")
    };
    if !prompt::confirm(&question, yes)? {
        println!("aborted");
        return Ok(());
    }
    with_session(ctx, |api| api.enqueue_convert(path, format, delete_source))?;
    println!("conversion queued");
    Ok(())
}

pub(super) fn list_converts(ctx: &mut Context<'_>) -> Result<()> {
    let tasks = with_session(ctx, |api| api.convert_tasks())?;
    if ctx.json {
        return print_json(&tasks);
    }
    if tasks.is_empty() {
        println!("no conversion tasks");
        return Ok(());
    }
    for task in &tasks {
        println!("{}", convert_row(task));
    }
    Ok(())
}

fn convert_row(task: &ConvertTask) -> String {
    let delete = if task.delete_source { "  [delete source]" } else { "" };
    format!(
        "{}  {} ({}) -> {} ({}){delete}",
        task.task_id, task.input_path, task.input_format, task.output_path, task.output_format
    )
}

pub(super) fn cancel_convert(ctx: &mut Context<'_>, task_id: &str, yes: bool) -> Result<()> {
    if !prompt::confirm(&format!("cancel conversion task {task_id}?"), yes)? {
        println!("aborted");
        return Ok(());
    }
    with_session(ctx, |api| api.cancel_convert(task_id))?;
    println!("conversion task {task_id} cancelled");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_distinguish_directories_and_media() {
        let dir = FileEntry::Directory {
            path: "2024".into(),
            name: "2024".into(),
            modified: None,
        };
        assert!(entry_row(&dir).ends_with("2024/"));
        let file = FileEntry::MediaFile {
            path: "2024/a.flv".into(),
            name: "a.flv".into(),
            size: 1536,
            modified: Some("2024-05-01".into()),
            format: Some("flv".into()),
        };
        let row = entry_row(&file);
        assert!(row.contains("1.5 KiB"));
        assert!(row.contains("2024-05-01"));
        assert!(row.ends_with("a.flv"));
    }

    #[test]
    fn convert_row_flags_source_deletion() {
        let task = ConvertTask {
            task_id: "t1".into(),
            input_path: "a.flv".into(),
            output_path: "a.mp4".into(),
            input_format: "flv".into(),
            output_format: "mp4".into(),
            delete_source: true,
        };
        assert_eq!(convert_row(&task), "t1  a.flv (flv) -> a.mp4 (mp4)  [delete source]");
    }
}
