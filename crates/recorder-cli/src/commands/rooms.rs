use anyhow::Result;
use recorder_api::SubscribedRoom;

use super::{Context, print_json, prompt, with_session};
use crate::format::{subscribe_error, unsubscribe_error};

pub(super) fn list(ctx: &mut Context<'_>) -> Result<()> {
    let rooms = with_session(ctx, |api| api.subscriptions())?;
    if ctx.json {
        return print_json(&rooms);
    }
    if rooms.is_empty() {
        println!("no subscribed rooms");
        return Ok(());
    }
    for room in &rooms {
        println!("{}", room_row(room));
    }
    Ok(())
}

fn room_row(room: &SubscribedRoom) -> String {
    let mut flags = Vec::new();
    if room.info.is_live() {
        flags.push("live");
    }
    if room.recording {
        flags.push("rec");
    }
    if room.info.is_locked() {
        flags.push("locked");
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(","))
    };
    let title = room.info.title.as_deref().unwrap_or("-");
    format!("{:<12} {}{flags}  {title}", room.info.room_id, room.info.display_name())
}

pub(super) fn subscribe(ctx: &mut Context<'_>, room_id: u64) -> Result<()> {
    match with_session(ctx, |api| api.subscribe_room(room_id)) {
        Ok(()) => {
            println!("subscribed to room {room_id}");
            Ok(())
        }
        Err(err) => match err.downcast_ref::<recorder_api::ApiError>() {
            Some(api_err) => anyhow::bail!(subscribe_error(room_id, api_err)),
            None => Err(err),
        },
    }
}

pub(super) fn unsubscribe(ctx: &mut Context<'_>, room_id: u64, yes: bool) -> Result<()> {
    if !prompt::confirm(&format!("unsubscribe from room {room_id}?"), yes)? {
        println!("aborted");
        return Ok(());
    }
    match with_session(ctx, |api| api.unsubscribe_room(room_id)) {
        Ok(()) => {
            println!("unsubscribed from room {room_id}");
            Ok(())
        }
        Err(err) => match err.downcast_ref::<recorder_api::ApiError>() {
            Some(api_err) => anyhow::bail!(unsubscribe_error(room_id, api_err)),
            None => Err(err),
        },
    }
}

#[cfg(test)]
mod tests {
    use recorder_types::RoomInfo;

    use super::*;

    #[test]
    fn row_lists_state_flags() {
        let room = SubscribedRoom {
            info: RoomInfo {
                room_id: 1002,
                uname: Some("streamer".into()),
                title: Some("late show".into()),
                live_status: Some(1),
                ..RoomInfo::default()
            },
            recording: true,
        };
        assert_eq!(room_row(&room), format!("{:<12} streamer [live,rec]  late show", 1002));
    }

    #[test]
    fn quiet_room_has_no_flags() {
        let room = SubscribedRoom {
            info: RoomInfo {
                room_id: 7,
                ..RoomInfo::default()
            },
            recording: false,
        };
        assert_eq!(room_row(&room), format!("{:<12} room 7  -", 7));
    }
}
