use anyhow::Result;
use recorder_types::RecordTask;

use super::{Context, print_json, with_session};
use crate::format::{format_bytes, format_elapsed};

pub(super) fn list(ctx: &mut Context<'_>) -> Result<()> {
    let tasks = with_session(ctx, |api| api.record_tasks())?;
    if ctx.json {
        return print_json(&tasks);
    }
    if tasks.is_empty() {
        println!("no recording tasks");
        return Ok(());
    }
    println!("{:<12} {:<11} {:>10} {:>9}  {}", "ROOM", "STATUS", "SIZE", "ELAPSED", "STREAMER");
    for task in &tasks {
        println!("{}", task_row(task));
    }
    Ok(())
}

fn task_row(task: &RecordTask) -> String {
    let size = task.file_size.map(format_bytes).unwrap_or_else(|| "-".into());
    let elapsed = task
        .recorded_time
        .map(format_elapsed)
        .unwrap_or_else(|| "-".into());
    let title = task
        .room_info
        .as_ref()
        .and_then(|info| info.title.as_deref())
        .map(|title| format!("  {title}"))
        .unwrap_or_default();
    format!(
        "{:<12} {:<11} {:>10} {:>9}  {}{}",
        task.room_id,
        task.status.as_str(),
        size,
        elapsed,
        task.display_name(),
        title
    )
}

pub(super) fn start(ctx: &mut Context<'_>, room_id: u64) -> Result<()> {
    with_session(ctx, |api| api.start_record(room_id))?;
    println!("recording started for room {room_id}");
    Ok(())
}

pub(super) fn stop(ctx: &mut Context<'_>, room_id: u64) -> Result<()> {
    with_session(ctx, |api| api.stop_record(room_id))?;
    println!("recording stopped for room {room_id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use recorder_types::{RecordState, RoomInfo};

    use super::*;

    #[test]
    fn row_shows_size_elapsed_and_streamer() {
        let task = RecordTask {
            room_id: 1002,
            status: RecordState::Recording,
            file_size: Some(2048),
            recorded_time: Some(61),
            start_time: None,
            room_info: Some(RoomInfo {
                room_id: 1002,
                uname: Some("streamer".into()),
                title: Some("late show".into()),
                ..RoomInfo::default()
            }),
        };
        let row = task_row(&task);
        assert!(row.starts_with("1002"));
        assert!(row.contains("recording"));
        assert!(row.contains("2.0 KiB"));
        assert!(row.contains("1:01"));
        assert!(row.ends_with("streamer  late show"));
    }

    #[test]
    fn idle_row_uses_placeholders() {
        let task = RecordTask {
            room_id: 1001,
            status: RecordState::Idle,
            file_size: None,
            recorded_time: None,
            start_time: None,
            room_info: None,
        };
        let row = task_row(&task);
        assert!(row.contains("idle"));
        assert!(row.ends_with("room 1001"));
    }
}
