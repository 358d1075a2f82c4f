//! Human-readable labels shared by the tables and the TUI.

use recorder_api::ApiError;

pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

pub(crate) fn format_elapsed(secs: u64) -> String {
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;
    if hours > 0 {
        format!("{hours}:{mins:02}:{secs:02}")
    } else {
        format!("{mins}:{secs:02}")
    }
}

pub(crate) fn format_progress(received: u64, total: Option<u64>) -> String {
    match total {
        Some(total) if total > 0 => {
            let pct = (received as f64 / total as f64 * 100.0).clamp(0.0, 100.0);
            format!("{} / {} ({pct:.0}%)", format_bytes(received), format_bytes(total))
        }
        _ => format_bytes(received),
    }
}

pub(crate) fn truncate_label(label: &str, max: usize) -> String {
    if max == 0 || label.chars().count() <= max {
        return label.to_string();
    }
    if max <= 3 {
        return label.chars().take(max).collect();
    }
    let head: String = label.chars().take(max - 3).collect();
    format!("{head}...")
}

/// Message for a failed subscribe, with the server's common refusals spelled out.
pub(crate) fn subscribe_error(room_id: u64, err: &ApiError) -> String {
    match err.status_code() {
        Some(409) => format!("already subscribed to room {room_id}"),
        Some(400) => format!("invalid room id {room_id}"),
        _ => format!("subscribe failed: {}", error_text(err)),
    }
}

pub(crate) fn unsubscribe_error(room_id: u64, err: &ApiError) -> String {
    match err.status_code() {
        Some(404) => format!("not subscribed to room {room_id}"),
        _ => format!("unsubscribe failed: {}", error_text(err)),
    }
}

/// Server text when the server answered, otherwise the error itself.
pub(crate) fn error_text(err: &ApiError) -> String {
    err.server_message()
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string())
}

/// Room id typed by the user.
pub(crate) fn parse_room_id(input: &str) -> Option<u64> {
    input.trim().parse::<u64>().ok().filter(|id| *id > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_scale_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }

    #[test]
    fn elapsed_switches_to_hours() {
        assert_eq!(format_elapsed(61), "1:01");
        assert_eq!(format_elapsed(3725), "1:02:05");
    }

    #[test]
    fn progress_with_and_without_total() {
        assert_eq!(format_progress(512, Some(1024)), "512 B / 1.0 KiB (50%)");
        assert_eq!(format_progress(512, None), "512 B");
    }

    #[test]
    fn truncation_is_char_aware() {
        assert_eq!(truncate_label("直播錄影檔案名稱", 5), "直播...");
        assert_eq!(truncate_label("short", 10), "short");
    }

    #[test]
    fn subscribe_refusals_are_named() {
        let conflict = ApiError::Status { code: 409, message: "dup".into() };
        assert_eq!(subscribe_error(7, &conflict), "already subscribed to room 7");
        let bad = ApiError::Status { code: 400, message: "bad".into() };
        assert_eq!(subscribe_error(7, &bad), "invalid room id 7");
        let other = ApiError::Status { code: 500, message: "boom".into() };
        assert_eq!(subscribe_error(7, &other), "subscribe failed: boom");
        let missing = ApiError::Status { code: 404, message: "x".into() };
        assert_eq!(unsubscribe_error(7, &missing), "not subscribed to room 7");
    }

    #[test]
    fn room_ids_must_be_positive_numbers() {
        assert_eq!(parse_room_id(" 1002 "), Some(1002));
        assert_eq!(parse_room_id("0"), None);
        assert_eq!(parse_room_id("abc"), None);
    }
}
