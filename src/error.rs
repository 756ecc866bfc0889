use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures that cross a component boundary.
///
/// Per-entry traversal problems never show up here: the walker absorbs them
/// as [`crate::walker::SkipEvent`]s. An empty index is not an error either.
#[derive(Error, Debug)]
pub enum Error {
    /// A write batch was rolled back; the previously committed index is intact.
    #[error("index write failed: {0}")]
    StoreWriteFailed(#[source] rusqlite::Error),

    #[error("index read failed: {0}")]
    Store(#[source] rusqlite::Error),

    #[error("matching backend `{backend}` is unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    #[error("matching backend `{backend}` failed: {reason}")]
    Backend { backend: String, reason: String },

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("settings file {path}: {reason}")]
    Settings { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A scan error the scheduler also keeps as its last outcome.
    #[error(transparent)]
    Scan(Arc<Error>),
}

impl Error {
    pub(crate) fn write(err: rusqlite::Error) -> Self {
        Self::StoreWriteFailed(err)
    }

    pub(crate) fn read(err: rusqlite::Error) -> Self {
        Self::Store(err)
    }

    /// Takes the error back out of a shared scan outcome when nobody else
    /// holds it.
    pub fn from_shared(err: Arc<Error>) -> Self {
        Arc::try_unwrap(err).unwrap_or_else(Self::Scan)
    }

    /// The underlying error, looking through [`Error::Scan`].
    pub fn cause(&self) -> &Error {
        match self {
            Self::Scan(inner) => inner.cause(),
            other => other,
        }
    }

    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self.cause(), Self::BackendUnavailable { .. })
    }
}
