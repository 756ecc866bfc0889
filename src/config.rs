use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_REINDEX_INTERVAL_MINUTES: u32 = 60;

/// What to index and when. Owned by the settings layer and handed to the core
/// read-only; the core never writes it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub indexed_paths: Vec<PathBuf>,
    pub file_filters: Vec<String>,
    pub excluded_paths: Vec<PathBuf>,
    pub auto_reindex: bool,
    pub reindex_interval_minutes: u32,
    /// Store rows for directories too (`is_directory = true`, size 0).
    pub index_directories: bool,
    /// Skip whatever a repository's `.gitignore` ignores.
    pub respect_gitignore: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            indexed_paths: Vec::new(),
            file_filters: Vec::new(),
            excluded_paths: Vec::new(),
            auto_reindex: false,
            reindex_interval_minutes: DEFAULT_REINDEX_INTERVAL_MINUTES,
            index_directories: false,
            respect_gitignore: false,
        }
    }
}

impl IndexConfig {
    pub fn with_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            indexed_paths: paths.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Rejects a config before anything is scanned, so an invalid config is
    /// never partially applied.
    pub fn validate(&self) -> Result<()> {
        if self.reindex_interval_minutes == 0 {
            return Err(Error::ConfigInvalid(
                "reindex_interval_minutes must be a positive integer".to_string(),
            ));
        }
        for path in &self.indexed_paths {
            check_absolute("indexed_paths", path)?;
        }
        for path in &self.excluded_paths {
            check_absolute("excluded_paths", path)?;
        }
        if let Some(pos) = self.file_filters.iter().position(|f| f.trim().is_empty()) {
            return Err(Error::ConfigInvalid(format!(
                "file_filters[{pos}] is an empty pattern"
            )));
        }
        Ok(())
    }

    pub fn reindex_interval_secs(&self) -> i64 {
        i64::from(self.reindex_interval_minutes) * 60
    }
}

fn check_absolute(field: &str, path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::ConfigInvalid(format!("{field} contains an empty path")));
    }
    if !path.is_absolute() {
        return Err(Error::ConfigInvalid(format!(
            "{field} entry `{}` is not an absolute path",
            path.display()
        )));
    }
    Ok(())
}
