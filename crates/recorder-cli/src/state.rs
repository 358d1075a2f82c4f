//! Client state remembered between runs (last server and user).
//!
//! Session cookies are never written here.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ClientState {
    pub(crate) server: Option<String>,
    pub(crate) user: Option<String>,
}

impl ClientState {
    pub(crate) fn default_path() -> Option<PathBuf> {
        config::app_dir().map(|dir| dir.join("state.toml"))
    }

    /// Unreadable state is treated as empty.
    pub(crate) fn load_from(path: &Path) -> Self {
        let Ok(raw) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match toml::from_str(&raw) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable client state");
                Self::default()
            }
        }
    }

    pub(crate) fn load() -> Self {
        Self::default_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    pub(crate) fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create state dir {:?}", parent))?;
        }
        let raw = toml::to_string_pretty(self).context("serialize client state")?;
        std::fs::write(path, raw).with_context(|| format!("write state {:?}", path))?;
        Ok(())
    }

    /// Persist to the default location; failures are logged only.
    pub(crate) fn save(&self) {
        let Some(path) = Self::default_path() else {
            return;
        };
        if let Err(err) = self.save_to(&path) {
            tracing::warn!(error = %format!("{err:#}"), "failed to save client state");
        }
    }

    pub(crate) fn remember(&mut self, server: &str, user: Option<&str>) {
        self.server = Some(server.to_string());
        if let Some(user) = user {
            self.user = Some(user.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.toml");
        let mut state = ClientState::default();
        state.remember("https://rec.lan/api", Some("admin"));
        state.save_to(&path).unwrap();
        assert_eq!(ClientState::load_from(&path), state);
    }

    #[test]
    fn missing_or_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        assert_eq!(ClientState::load_from(&path), ClientState::default());
        std::fs::write(&path, "server = [").unwrap();
        assert_eq!(ClientState::load_from(&path), ClientState::default());
    }

    #[test]
    fn remember_keeps_user_when_not_given() {
        let mut state = ClientState {
            server: None,
            user: Some("admin".into()),
        };
        state.remember("http://a", None);
        assert_eq!(state.user.as_deref(), Some("admin"));
        assert_eq!(state.server.as_deref(), Some("http://a"));
    }
}
