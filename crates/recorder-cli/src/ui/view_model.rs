//! UI view-models for the TUI.
//!
//! This module converts `App` state into render-ready strings, labels,
//! and modal payloads so `render.rs` stays layout-focused.

use recorder_api::SubscribedRoom;
use recorder_types::{ConvertTask, FileEntry, RecordState, RecordTask};

use crate::format::{format_bytes, format_elapsed, format_progress};
use crate::ui::app::{App, LoginField, Modal, PromptKind, Tab};

pub(crate) struct UiView {
    pub(crate) header_lines: Vec<String>,
    pub(crate) tab_titles: Vec<String>,
    pub(crate) tab_index: usize,
    pub(crate) list: ListView,
    pub(crate) status_line: String,
    pub(crate) gauge: Option<(f64, String)>,
    pub(crate) keys_line: String,
    pub(crate) active_modal: Option<UiModal>,
}

pub(crate) struct ListView {
    pub(crate) title: String,
    pub(crate) rows: Vec<Row>,
    pub(crate) empty_text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Row {
    pub(crate) label: String,
    pub(crate) tone: Tone,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Tone {
    Normal,
    Live,
    Warn,
    Dim,
    Marked,
}

pub(crate) enum UiModal {
    Help { title: String, body: String, layout: ModalLayout },
    Logs { title: String, empty: bool, layout: ModalLayout },
    Login { title: String, lines: Vec<String>, error: Option<String>, layout: ModalLayout },
    Prompt { title: String, label: String, input: String, layout: ModalLayout },
    Confirm { title: String, body: String, layout: ModalLayout },
}

pub(crate) struct ModalLayout {
    pub(crate) width_pct: u16,
    pub(crate) height_pct: u16,
}

impl UiView {
    pub(crate) fn from_app(app: &App) -> Self {
        let user = app.user().unwrap_or("-");
        let header_lines = vec![
            format!("recorder-cli  →  {}", app.server()),
            format!("user: {user}    download dir: {}", app.settings.download_dir.display()),
        ];
        let tab_titles = Tab::ALL
            .iter()
            .map(|tab| format!("{} {}", tab.index() + 1, tab.title()))
            .collect();
        let list = build_list(app);
        let status_line = format!("status: {}", app.status);
        let gauge = app.download.as_ref().map(|job| {
            let ratio = match job.total {
                Some(total) if total > 0 => (job.received as f64 / total as f64).clamp(0.0, 1.0),
                _ => 0.0,
            };
            (ratio, format!("{}  {}", job.name, format_progress(job.received, job.total)))
        });
        let keys_line = keys_line(app.tab).to_string();
        let active_modal = build_active_modal(app);

        Self {
            header_lines,
            tab_titles,
            tab_index: app.tab.index(),
            list,
            status_line,
            gauge,
            keys_line,
            active_modal,
        }
    }
}

fn build_list(app: &App) -> ListView {
    let tab = app.tab;
    let loaded = app.loaded[tab.index()];
    let error = app.view_errors.get(&tab);
    let (title, rows, empty) = match tab {
        Tab::Records => (
            format!("Records ({})", app.records.len()),
            app.records.iter().map(record_row).collect(),
            "no rooms are being tracked (a to add)",
        ),
        Tab::Files => {
            let marked = if app.marked.is_empty() {
                String::new()
            } else {
                format!(", {} marked", app.marked.len())
            };
            (
                format!("Files  /{}  ({}{marked})", app.dir, app.entries.len()),
                app.entries
                    .iter()
                    .map(|entry| file_row(entry, app.marked.contains(entry.path())))
                    .collect(),
                "empty directory",
            )
        }
        Tab::Converts => (
            format!("Converts ({})", app.converts.len()),
            app.converts.iter().map(convert_row).collect(),
            "no conversion tasks",
        ),
        Tab::Subscriptions => (
            format!("Subscriptions ({})", app.rooms.len()),
            app.rooms.iter().map(room_row).collect(),
            "no subscribed rooms (a to subscribe)",
        ),
    };
    let empty_text = match (loaded, error) {
        (_, Some(err)) => format!("<error: {err}>"),
        (false, None) => "<loading...>".to_string(),
        (true, None) => format!("<{empty}>"),
    };
    ListView {
        title,
        rows,
        empty_text,
    }
}

pub(crate) fn record_row(task: &RecordTask) -> Row {
    let size = task.file_size.map(format_bytes).unwrap_or_else(|| "-".into());
    let elapsed = task
        .recorded_time
        .map(format_elapsed)
        .unwrap_or_else(|| "-".into());
    let title = task
        .room_info
        .as_ref()
        .and_then(|info| info.title.as_deref())
        .unwrap_or("");
    let tone = match task.status {
        RecordState::Recording => Tone::Live,
        RecordState::Recovering => Tone::Warn,
        RecordState::Idle => Tone::Dim,
    };
    Row {
        label: format!(
            "{:<10} {:<20} {:<10} {:>10} {:>9}  {title}",
            task.room_id,
            task.display_name(),
            task.status.as_str(),
            size,
            elapsed
        ),
        tone,
    }
}

pub(crate) fn file_row(entry: &FileEntry, marked: bool) -> Row {
    let mark = if marked { "[*] " } else { "    " };
    match entry {
        FileEntry::Directory { name, modified, .. } => Row {
            label: format!("{mark}{:<40} {:>10}  {}", format!("{name}/"), "dir", modified.as_deref().unwrap_or("")),
            tone: if marked { Tone::Marked } else { Tone::Normal },
        },
        FileEntry::MediaFile {
            name,
            size,
            modified,
            ..
        } => Row {
            label: format!(
                "{mark}{name:<40} {:>10}  {}",
                format_bytes(*size),
                modified.as_deref().unwrap_or("")
            ),
            tone: if marked { Tone::Marked } else { Tone::Normal },
        },
    }
}

pub(crate) fn convert_row(task: &ConvertTask) -> Row {
    let delete = if task.delete_source { "  [delete source]" } else { "" };
    Row {
        label: format!(
            "{}  {} → {}  ({} → {}){delete}",
            task.task_id, task.input_path, task.output_path, task.input_format, task.output_format
        ),
        tone: Tone::Normal,
    }
}

pub(crate) fn room_row(room: &SubscribedRoom) -> Row {
    let live = if room.info.is_live() { "live" } else { "offline" };
    let rec = if room.recording { "rec" } else { "" };
    let locked = if room.info.is_locked() { "locked" } else { "" };
    let tone = if room.info.is_locked() {
        Tone::Warn
    } else if room.recording {
        Tone::Live
    } else if room.info.is_live() {
        Tone::Normal
    } else {
        Tone::Dim
    };
    Row {
        label: format!(
            "{:<10} {:<20} {live:<8}{rec:<4}{locked:<7} {}",
            room.info.room_id,
            room.info.display_name(),
            room.info.title.as_deref().unwrap_or("")
        ),
        tone,
    }
}

fn keys_line(tab: Tab) -> &'static str {
    match tab {
        Tab::Records => "keys: a add | s start/stop | r refresh | Tab view | l logs | h help | q quit",
        Tab::Files => {
            "keys: Enter open | ← up | Space mark | d download | D save as | S share | c convert | x delete | h help | q quit"
        }
        Tab::Converts => "keys: x cancel task | r refresh | Tab view | l logs | h help | q quit",
        Tab::Subscriptions => {
            "keys: a subscribe | x unsubscribe | s record | r refresh | Tab view | l logs | h help | q quit"
        }
    }
}

fn build_help_lines() -> String {
    [
        "Views",
        "  1-4 / Tab    switch view",
        "  ↑/↓          select",
        "  PgUp/PgDn    page",
        "  Home/End     first/last",
        "  r            refresh now",
        "",
        "Records",
        "  a            record a room by id",
        "  s / Enter    start or stop recording",
        "",
        "Files",
        "  Enter / →    open directory or download file",
        "  ← / Bksp     parent directory",
        "  Space        mark for batch delete",
        "  d            download",
        "  D            download to a chosen path",
        "  S            create share link",
        "  c            convert",
        "  x            delete marked or selected",
        "",
        "Converts",
        "  x            cancel task",
        "",
        "Subscriptions",
        "  a            subscribe to a room",
        "  x            unsubscribe",
        "  s            start recording",
        "",
        "Other",
        "  Esc          cancel download / close modal",
        "  L / O        log in / log out",
        "  l            logs",
        "  h or ?       help",
        "  q            quit",
    ]
    .join("\n")
}

fn build_active_modal(app: &App) -> Option<UiModal> {
    let modal = app.modal.as_ref()?;
    Some(match modal {
        Modal::Help => UiModal::Help {
            title: "Help".to_string(),
            body: build_help_lines(),
            layout: ModalLayout {
                width_pct: 70,
                height_pct: 80,
            },
        },
        Modal::Logs => UiModal::Logs {
            title: "Logs (Esc to close, ↑/↓ scroll)".to_string(),
            empty: app.logs.is_empty(),
            layout: ModalLayout {
                width_pct: 90,
                height_pct: 80,
            },
        },
        Modal::Login(form) => {
            let cursor = |field: LoginField| if form.focus == field { "▶" } else { " " };
            let masked = "*".repeat(form.pass.chars().count());
            UiModal::Login {
                title: format!("Log in to {} (Enter to submit, Esc to close)", app.server()),
                lines: vec![
                    format!("{} user:     {}", cursor(LoginField::User), form.user),
                    format!("{} password: {masked}", cursor(LoginField::Pass)),
                ],
                error: form.error.clone(),
                layout: ModalLayout {
                    width_pct: 50,
                    height_pct: 30,
                },
            }
        }
        Modal::Prompt(form) => {
            let (title, label) = match &form.kind {
                PromptKind::AddRecord => ("Record room".to_string(), "room id:".to_string()),
                PromptKind::Subscribe => ("Subscribe".to_string(), "room id:".to_string()),
                PromptKind::ConvertFormat { path } => ("Convert".to_string(), format!("target format for {path}:")),
                PromptKind::SavePath { path } => ("Download".to_string(), format!("save {path} to:")),
            };
            UiModal::Prompt {
                title: format!("{title} (Enter to confirm, Esc to cancel)"),
                label,
                input: form.input.clone(),
                layout: ModalLayout {
                    width_pct: 60,
                    height_pct: 25,
                },
            }
        }
        Modal::Confirm(dialog) => UiModal::Confirm {
            title: format!("{} (y/n)", dialog.title),
            body: dialog.body.clone(),
            layout: ModalLayout {
                width_pct: 60,
                height_pct: 40,
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use recorder_types::RoomInfo;

    use super::*;
    use crate::ui::app::tests::app_for;

    #[test]
    fn record_row_reflects_status() {
        let task = RecordTask {
            room_id: 42,
            status: RecordState::Recovering,
            file_size: Some(2048),
            recorded_time: Some(65),
            start_time: None,
            room_info: Some(RoomInfo {
                room_id: 42,
                uname: Some("streamer".into()),
                title: Some("night".into()),
                ..RoomInfo::default()
            }),
        };
        let row = record_row(&task);
        assert_eq!(row.tone, Tone::Warn);
        assert!(row.label.contains("streamer"));
        assert!(row.label.contains("recovering"));
        assert!(row.label.contains("2.0 KiB"));
        assert!(row.label.ends_with("night"));
    }

    #[test]
    fn marked_files_are_flagged() {
        let entry = FileEntry::MediaFile {
            path: "a.flv".into(),
            name: "a.flv".into(),
            size: 1,
            modified: None,
            format: Some("flv".into()),
        };
        let row = file_row(&entry, true);
        assert!(row.label.starts_with("[*] a.flv"));
        assert_eq!(row.tone, Tone::Marked);
        assert!(file_row(&entry, false).label.starts_with("    a.flv"));
    }

    #[test]
    fn recording_room_is_highlighted() {
        let room = SubscribedRoom {
            info: RoomInfo {
                room_id: 3,
                live_status: Some(1),
                ..RoomInfo::default()
            },
            recording: true,
        };
        assert_eq!(room_row(&room).tone, Tone::Live);
    }

    #[test]
    fn empty_text_tracks_loading_and_errors() {
        let mut app = app_for("http://127.0.0.1:9");
        assert_eq!(UiView::from_app(&app).list.empty_text, "<loading...>");
        app.loaded[Tab::Records.index()] = true;
        assert_eq!(
            UiView::from_app(&app).list.empty_text,
            "<no rooms are being tracked (a to add)>"
        );
        app.view_errors.insert(Tab::Records, "HTTP 500".into());
        assert_eq!(UiView::from_app(&app).list.empty_text, "<error: HTTP 500>");
    }

    #[test]
    fn login_modal_masks_password() {
        let mut app = app_for("http://127.0.0.1:9");
        app.open_login(None);
        if let Some(Modal::Login(form)) = app.modal.as_mut() {
            form.user = "admin".into();
            form.pass = "secret".into();
        }
        match UiView::from_app(&app).active_modal {
            Some(UiModal::Login { lines, .. }) => {
                assert!(lines[0].ends_with("admin"));
                assert!(lines[1].ends_with("******"));
                assert!(!lines[1].contains("secret"));
            }
            _ => panic!("expected login modal"),
        }
    }

    #[test]
    fn download_gauge_uses_known_total() {
        let mut app = app_for("http://127.0.0.1:9");
        assert!(UiView::from_app(&app).gauge.is_none());
        app.download = Some(crate::ui::app::DownloadJob::for_test("a.flv", 50, Some(200)));
        let (ratio, label) = UiView::from_app(&app).gauge.unwrap();
        assert!((ratio - 0.25).abs() < f64::EPSILON);
        assert!(label.starts_with("a.flv"));
    }
}
