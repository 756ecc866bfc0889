//! The settings file the front-ends edit.
//!
//! Lives at `$XDG_CONFIG_HOME/everyfind/settings.json` (falling back to
//! `~/.config/everyfind`). Keys missing from the file take the defaults below.
//! The core never reads this file itself: front-ends load it here and pass
//! the resulting [`IndexConfig`] in.

use std::fs;
use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};

use crate::config::{IndexConfig, DEFAULT_REINDEX_INTERVAL_MINUTES};
use crate::error::{Error, Result};

const APP_NAME: &str = "everyfind";
const SETTINGS_FILE: &str = "settings.json";
const INDEX_FILE: &str = "index.db";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub indexed_paths: Vec<PathBuf>,
    pub file_filters: Vec<String>,
    pub excluded_paths: Vec<PathBuf>,
    pub auto_reindex: bool,
    pub reindex_interval_minutes: u32,
    pub index_directories: bool,
    pub respect_gitignore: bool,
    /// UI language; carried through untouched.
    pub language: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            indexed_paths: Vec::new(),
            file_filters: vec!["*".to_string()],
            excluded_paths: vec![PathBuf::from("/media"), PathBuf::from("/mnt")],
            auto_reindex: false,
            reindex_interval_minutes: DEFAULT_REINDEX_INTERVAL_MINUTES,
            index_directories: false,
            respect_gitignore: false,
            language: "system".to_string(),
        }
    }
}

impl Settings {
    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            indexed_paths: self.indexed_paths.clone(),
            file_filters: self.file_filters.clone(),
            excluded_paths: self.excluded_paths.clone(),
            auto_reindex: self.auto_reindex,
            reindex_interval_minutes: self.reindex_interval_minutes,
            index_directories: self.index_directories,
            respect_gitignore: self.respect_gitignore,
        }
    }
}

/// `$XDG_CONFIG_HOME/everyfind` or `~/.config/everyfind`.
pub fn config_dir() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", APP_NAME) {
        return dirs.config_dir().to_path_buf();
    }
    BaseDirs::new()
        .map(|b| b.home_dir().join(".config").join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from(".").join(APP_NAME))
}

pub fn settings_path() -> PathBuf {
    config_dir().join(SETTINGS_FILE)
}

pub fn default_index_path() -> PathBuf {
    config_dir().join(INDEX_FILE)
}

pub fn home_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|b| b.home_dir().to_path_buf())
}

/// Missing file yields the defaults; a malformed one is an error so the
/// caller can decide whether to fall back.
pub fn load_from(path: &Path) -> Result<Settings> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
        Err(err) => {
            return Err(Error::Settings {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })
        }
    };
    serde_json::from_str(&raw).map_err(|e| Error::Settings {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

pub fn save_to(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(|e| Error::Settings {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    fs::write(path, json)?;
    Ok(())
}

/// Removes the file so the next load returns defaults.
pub fn reset_at(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

pub fn load() -> Result<Settings> {
    load_from(&settings_path())
}

pub fn save(settings: &Settings) -> Result<()> {
    save_to(&settings_path(), settings)
}

pub fn reset() -> Result<()> {
    reset_at(&settings_path())
}
