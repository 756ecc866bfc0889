use std::fs::Metadata;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// One filesystem object known to the index. `path` is the unique key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    pub path: String,
    pub name: String,
    pub size: u64,
    pub modified_time: i64,
    pub is_directory: bool,
}

pub(crate) fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn mtime_secs(metadata: &Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

impl IndexEntry {
    pub fn from_metadata(path: &Path, metadata: &Metadata) -> Option<Self> {
        let name = path
            .file_name()
            .map(|v| v.to_string_lossy().to_string())
            .or_else(|| (path == Path::new("/")).then(|| "/".to_string()))?;
        let is_directory = metadata.is_dir();

        Some(Self {
            path: path.to_string_lossy().to_string(),
            name,
            size: if is_directory { 0 } else { metadata.len() },
            modified_time: mtime_secs(metadata),
            is_directory,
        })
    }

    /// Follows symlinks, so a link to a file is indexed with the target's size.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Self::from_metadata(path, &metadata)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))
    }

    pub(crate) fn from_walkdir_entry(entry: &walkdir::DirEntry) -> io::Result<Self> {
        let metadata = entry.metadata().map_err(io::Error::from)?;
        Self::from_metadata(entry.path(), &metadata)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))
    }

    pub fn dir(&self) -> String {
        Path::new(&self.path)
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| "/".to_string())
    }

    pub fn ext(&self) -> Option<String> {
        if self.is_directory {
            return None;
        }
        Path::new(&self.path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
    }
}
