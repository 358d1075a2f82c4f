//! Configuration loading and resolution.
//!
//! An optional TOML file supplies defaults; command-line flags override it;
//! the last server recorded in client state is the final fallback.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::state::ClientState;

pub(crate) const APP_DIR_NAME: &str = "recorder-hub";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
const MIN_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_ROOM_INFO_TTL_SECS: u64 = 300;

/// Client configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ClientConfig {
    /// Server API root, e.g. `https://rec.example.com/api`.
    pub(crate) server: Option<String>,
    /// Connect/response timeout for API calls.
    pub(crate) timeout_secs: Option<u64>,
    /// Refresh interval for the TUI views.
    pub(crate) poll_interval_ms: Option<u64>,
    /// Lifetime of cached room metadata.
    pub(crate) room_info_ttl_secs: Option<u64>,
    /// Where downloads land when no explicit output is given.
    pub(crate) download_dir: Option<String>,
}

impl ClientConfig {
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<ClientConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }

    /// Explicit path must exist; the default location is optional.
    pub(crate) fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}

/// Values given on the command line.
#[derive(Debug, Default)]
pub(crate) struct Overrides {
    pub(crate) server: Option<String>,
    pub(crate) timeout_secs: Option<u64>,
    pub(crate) poll_interval_ms: Option<u64>,
    pub(crate) download_dir: Option<PathBuf>,
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) server: String,
    pub(crate) timeout: Duration,
    pub(crate) poll_interval: Duration,
    pub(crate) room_info_ttl: Duration,
    pub(crate) download_dir: PathBuf,
}

impl Settings {
    pub(crate) fn resolve(cfg: &ClientConfig, overrides: Overrides, state: &ClientState) -> Result<Self> {
        let server = overrides
            .server
            .or_else(|| cfg.server.clone())
            .or_else(|| state.server.clone())
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("no server configured; use --server or set `server` in the config file")
            })?;
        if !(server.starts_with("http://") || server.starts_with("https://")) {
            anyhow::bail!("server must be an http:// or https:// URL, got {server}");
        }

        let timeout_secs = overrides
            .timeout_secs
            .or(cfg.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .max(1);
        let poll_interval_ms = overrides
            .poll_interval_ms
            .or(cfg.poll_interval_ms)
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
            .max(MIN_POLL_INTERVAL_MS);
        let room_info_ttl_secs = cfg.room_info_ttl_secs.unwrap_or(DEFAULT_ROOM_INFO_TTL_SECS);
        let download_dir = overrides
            .download_dir
            .or_else(|| {
                cfg.download_dir
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(expand_home)
            })
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            server,
            timeout: Duration::from_secs(timeout_secs),
            poll_interval: Duration::from_millis(poll_interval_ms),
            room_info_ttl: Duration::from_secs(room_info_ttl_secs),
            download_dir,
        })
    }
}

pub(crate) fn app_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME))
}

pub(crate) fn default_config_path() -> Option<PathBuf> {
    app_dir().map(|dir| dir.join("config.toml"))
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(raw: &str) -> ClientConfig {
        toml::from_str(raw).unwrap()
    }

    #[test]
    fn flags_override_file_values() {
        let file = cfg(r#"
            server = "http://file:8080/api"
            timeout_secs = 10
            poll_interval_ms = 2000
            download_dir = "/srv/dl"
        "#);
        let overrides = Overrides {
            server: Some("https://flag/api/".into()),
            timeout_secs: Some(3),
            ..Overrides::default()
        };
        let settings = Settings::resolve(&file, overrides, &ClientState::default()).unwrap();
        assert_eq!(settings.server, "https://flag/api");
        assert_eq!(settings.timeout, Duration::from_secs(3));
        assert_eq!(settings.poll_interval, Duration::from_millis(2000));
        assert_eq!(settings.download_dir, PathBuf::from("/srv/dl"));
    }

    #[test]
    fn state_server_is_last_fallback() {
        let state = ClientState {
            server: Some("http://remembered".into()),
            user: None,
        };
        let settings = Settings::resolve(&ClientConfig::default(), Overrides::default(), &state).unwrap();
        assert_eq!(settings.server, "http://remembered");
        assert_eq!(settings.poll_interval, Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));
        assert_eq!(settings.room_info_ttl, Duration::from_secs(300));
    }

    #[test]
    fn missing_or_bad_server_is_rejected() {
        let err = Settings::resolve(&ClientConfig::default(), Overrides::default(), &ClientState::default())
            .unwrap_err();
        assert!(err.to_string().contains("no server configured"));

        let bad = cfg(r#"server = "ftp://nope""#);
        assert!(Settings::resolve(&bad, Overrides::default(), &ClientState::default()).is_err());
    }

    #[test]
    fn poll_interval_has_floor() {
        let file = cfg(r#"
            server = "http://x"
            poll_interval_ms = 10
        "#);
        let settings = Settings::resolve(&file, Overrides::default(), &ClientState::default()).unwrap();
        assert_eq!(settings.poll_interval, Duration::from_millis(MIN_POLL_INTERVAL_MS));
    }

    #[test]
    fn unknown_keys_are_errors() {
        assert!(toml::from_str::<ClientConfig>("serverr = \"x\"").is_err());
    }

    #[test]
    fn load_reports_path_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "timeout_secs = \"soon\"").unwrap();
        let err = ClientConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parse config"));
    }
}
