//! Wire types exchanged with the recording server.
//!
//! Field names follow the server's JSON (snake_case for record/room/convert
//! payloads, camelCase for file listings).

use serde::{Deserialize, Serialize};

/// Recording state of a room as reported by `/record/{id}/status`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    /// Stream is being captured.
    Recording,
    /// Capture dropped and the server is reconnecting.
    Recovering,
    /// Room is tracked but not capturing.
    Idle,
}

impl RecordState {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordState::Recording => "recording",
            RecordState::Recovering => "recovering",
            RecordState::Idle => "idle",
        }
    }

    pub fn is_recording(self) -> bool {
        matches!(self, RecordState::Recording)
    }
}

/// Payload of `GET /record/{id}/status`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordStatus {
    /// Not every server echoes the id back.
    #[serde(default)]
    pub room_id: u64,
    pub status: RecordState,
}

/// Payload of `GET /record/{id}/stats`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordStats {
    /// Bytes written to the current output file.
    #[serde(default)]
    pub bytes_written: Option<u64>,
    /// Seconds since the capture started.
    #[serde(default)]
    pub elapsed_seconds: Option<u64>,
    /// Server-formatted start timestamp.
    #[serde(default)]
    pub start_time: Option<String>,
}

/// Room metadata from `/room/{id}/info` and `/room/infos`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomInfo {
    pub room_id: u64,
    #[serde(default)]
    pub uid: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
    /// Streamer display name.
    #[serde(default)]
    pub uname: Option<String>,
    /// Avatar URL.
    #[serde(default)]
    pub face: Option<String>,
    #[serde(default)]
    pub cover: Option<String>,
    /// `1` while the room is live.
    #[serde(default)]
    pub live_status: Option<i32>,
    /// `1` when the room is locked by the platform.
    #[serde(default)]
    pub lock_status: Option<i32>,
    /// Viewer count.
    #[serde(default)]
    pub online: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
}

impl RoomInfo {
    pub fn is_live(&self) -> bool {
        self.live_status == Some(1)
    }

    pub fn is_locked(&self) -> bool {
        self.lock_status == Some(1)
    }

    /// Streamer name, or a generic room label when metadata is missing.
    pub fn display_name(&self) -> String {
        self.uname
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("room {}", self.room_id))
    }
}

/// Aggregated view of one recorded room, assembled client-side from the
/// status, stats and room info endpoints.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordTask {
    pub room_id: u64,
    pub status: RecordState,
    pub file_size: Option<u64>,
    pub recorded_time: Option<u64>,
    pub start_time: Option<String>,
    pub room_info: Option<RoomInfo>,
}

impl RecordTask {
    pub fn display_name(&self) -> String {
        match self.room_info.as_ref() {
            Some(info) => info.display_name(),
            None => format!("room {}", self.room_id),
        }
    }
}

/// One row of `GET /files/browse`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordFile {
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, rename = "modTime")]
    pub mod_time: Option<String>,
    #[serde(default, rename = "isDir")]
    pub is_dir: bool,
}

/// A browsed entry, split by kind so each kind carries only its own actions.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileEntry {
    Directory {
        path: String,
        name: String,
        modified: Option<String>,
    },
    MediaFile {
        path: String,
        name: String,
        size: u64,
        modified: Option<String>,
        /// Lowercased extension, e.g. `flv` or `mp4`.
        format: Option<String>,
    },
}

impl FileEntry {
    pub fn path(&self) -> &str {
        match self {
            FileEntry::Directory { path, .. } | FileEntry::MediaFile { path, .. } => path,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FileEntry::Directory { name, .. } | FileEntry::MediaFile { name, .. } => name,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, FileEntry::Directory { .. })
    }

    /// `..` rows the server emits for navigation.
    pub fn is_parent_link(&self) -> bool {
        self.is_dir() && self.name() == ".."
    }
}

impl From<RecordFile> for FileEntry {
    fn from(file: RecordFile) -> Self {
        if file.is_dir {
            return FileEntry::Directory {
                path: file.path,
                name: file.name,
                modified: file.mod_time,
            };
        }
        let format = file
            .name
            .rsplit_once('.')
            .map(|(_, ext)| ext.trim().to_ascii_lowercase())
            .filter(|ext| !ext.is_empty());
        FileEntry::MediaFile {
            path: file.path,
            name: file.name,
            size: file.size,
            modified: file.mod_time,
            format,
        }
    }
}

/// A queued or running conversion job from `GET /convert/tasks`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConvertTask {
    pub task_id: String,
    pub input_path: String,
    pub output_path: String,
    pub input_format: String,
    pub output_format: String,
    #[serde(default)]
    pub delete_source: bool,
}

/// Body of `POST /login`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginRequest {
    pub user: String,
    pub pass: String,
}

/// Share link issued by `POST /files/presigned/{path}`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresignedLink {
    pub url: String,
    #[serde(default, alias = "expires", alias = "expire_at")]
    pub expires_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_file_parses_camel_case_fields() {
        let raw = r#"[
            {"path":"2024/a.flv","name":"a.flv","size":1024,"modTime":"2024-05-01T10:00:00Z","isDir":false},
            {"path":"2024/sub","name":"sub","size":0,"modTime":null,"isDir":true}
        ]"#;
        let files: Vec<RecordFile> = serde_json::from_str(raw).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].mod_time.as_deref(), Some("2024-05-01T10:00:00Z"));
        assert!(files[1].is_dir);
    }

    #[test]
    fn file_entry_splits_directories_and_media() {
        let dir = FileEntry::from(RecordFile {
            path: "sub".into(),
            name: "sub".into(),
            size: 0,
            mod_time: None,
            is_dir: true,
        });
        assert!(dir.is_dir());

        let media = FileEntry::from(RecordFile {
            path: "sub/b.MP4".into(),
            name: "b.MP4".into(),
            size: 42,
            mod_time: None,
            is_dir: false,
        });
        match media {
            FileEntry::MediaFile { size, format, .. } => {
                assert_eq!(size, 42);
                assert_eq!(format.as_deref(), Some("mp4"));
            }
            FileEntry::Directory { .. } => panic!("expected media file"),
        }
    }

    #[test]
    fn parent_link_detected() {
        let up = FileEntry::Directory {
            path: "".into(),
            name: "..".into(),
            modified: None,
        };
        assert!(up.is_parent_link());
    }

    #[test]
    fn record_state_rejects_unknown_values() {
        let ok: RecordStatus =
            serde_json::from_str(r#"{"room_id":7,"status":"recovering"}"#).unwrap();
        assert_eq!(ok.status, RecordState::Recovering);
        assert!(serde_json::from_str::<RecordStatus>(r#"{"room_id":7,"status":"paused"}"#).is_err());
    }

    #[test]
    fn record_status_without_room_id() {
        let status: RecordStatus = serde_json::from_str(r#"{"status":"recording"}"#).unwrap();
        assert_eq!(status.status, RecordState::Recording);
        assert_eq!(status.room_id, 0);
    }

    #[test]
    fn room_display_name_falls_back_to_id() {
        let info = RoomInfo {
            room_id: 5,
            uname: Some("  ".into()),
            ..RoomInfo::default()
        };
        assert_eq!(info.display_name(), "room 5");
    }

    #[test]
    fn stats_tolerate_missing_fields() {
        let stats: RecordStats = serde_json::from_str("{}").unwrap();
        assert_eq!(stats, RecordStats::default());
    }
}
