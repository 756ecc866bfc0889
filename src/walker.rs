//! Recursive enumeration of the indexed roots.
//!
//! A [`Scan`] is a lazy iterator over [`IndexEntry`] values. Unreadable,
//! vanished or looping entries never end the walk: they are recorded as
//! [`SkipEvent`]s and the iterator moves on. Cancellation is cooperative and
//! checked before every entry.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use walkdir::{DirEntry, WalkDir};

use crate::config::IndexConfig;
use crate::entry::IndexEntry;
use crate::error::Result;
use crate::filter::PathFilter;

const MAX_RETAINED_SKIPS: usize = 1_000;

const RUNNING: u8 = 0;
const STOPPED: u8 = 1;
const SUPERSEDED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Keep what was collected so far.
    Stopped,
    /// A newer scan replaces this one; collected entries are discarded.
    Superseded,
}

/// Shared stop flag for one scan.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicU8>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let _ = self
            .0
            .compare_exchange(RUNNING, STOPPED, Ordering::AcqRel, Ordering::Acquire);
    }

    pub fn supersede(&self) {
        self.0.store(SUPERSEDED, Ordering::Release);
    }

    /// Turns a superseded scan back into a stopped one, so its rows are kept.
    pub(crate) fn keep_partial(&self) {
        let _ = self
            .0
            .compare_exchange(SUPERSEDED, STOPPED, Ordering::AcqRel, Ordering::Acquire);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire) != RUNNING
    }

    pub fn reason(&self) -> Option<CancelReason> {
        match self.0.load(Ordering::Acquire) {
            STOPPED => Some(CancelReason::Stopped),
            SUPERSEDED => Some(CancelReason::Superseded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    PermissionDenied,
    NotFound,
    BrokenSymlink,
    SymlinkLoop,
    NotADirectory,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipEvent {
    pub path: PathBuf,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub scanned: u64,
    pub yielded: u64,
    pub skipped: u64,
}

type EntryIter = Box<dyn Iterator<Item = walkdir::Result<DirEntry>> + Send>;

#[derive(Debug, Clone)]
pub struct Walker {
    roots: Vec<PathBuf>,
    filter: Arc<PathFilter>,
    include_directories: bool,
}

impl Walker {
    pub fn new(roots: Vec<PathBuf>, filter: Arc<PathFilter>) -> Self {
        Self {
            roots,
            filter,
            include_directories: false,
        }
    }

    /// Walks `config.indexed_paths` with a filter built from the same config.
    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        Self::for_roots(config, config.indexed_paths.clone())
    }

    pub fn for_roots(config: &IndexConfig, roots: Vec<PathBuf>) -> Result<Self> {
        config.validate()?;
        let filter = PathFilter::for_roots(config, &roots)?;
        Ok(Self::new(roots, Arc::new(filter)).include_directories(config.index_directories))
    }

    pub fn include_directories(mut self, yes: bool) -> Self {
        self.include_directories = yes;
        self
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Starts a fresh pass. Nothing carries over between calls.
    pub fn scan(&self, cancel: &CancelToken) -> Scan {
        Scan {
            roots: self.roots.clone().into_iter(),
            current: None,
            filter: self.filter.clone(),
            visited: Arc::new(Mutex::new(HashSet::new())),
            cancel: cancel.clone(),
            include_directories: self.include_directories,
            stats: ScanStats::default(),
            skips: Vec::new(),
            walked_roots: Vec::new(),
            cancel_logged: false,
        }
    }
}

pub struct Scan {
    roots: std::vec::IntoIter<PathBuf>,
    current: Option<EntryIter>,
    filter: Arc<PathFilter>,
    /// Real paths of directories entered during this pass.
    visited: Arc<Mutex<HashSet<PathBuf>>>,
    cancel: CancelToken,
    include_directories: bool,
    stats: ScanStats,
    skips: Vec<SkipEvent>,
    walked_roots: Vec<PathBuf>,
    cancel_logged: bool,
}

impl std::fmt::Debug for Scan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scan")
            .field("stats", &self.stats)
            .field("walked_roots", &self.walked_roots)
            .finish()
    }
}

impl Scan {
    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// The first skip events of the pass; `stats().skipped` has the full count.
    pub fn skips(&self) -> &[SkipEvent] {
        &self.skips
    }

    /// Canonical roots that were actually walked so far.
    pub fn walked_roots(&self) -> &[PathBuf] {
        &self.walked_roots
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn record_skip(&mut self, path: PathBuf, reason: SkipReason) {
        tracing::debug!(path = %path.display(), reason = ?reason, "skipped");
        self.stats.skipped += 1;
        if self.skips.len() < MAX_RETAINED_SKIPS {
            self.skips.push(SkipEvent { path, reason });
        }
    }

    fn open_root(&mut self, root: PathBuf) -> Option<EntryIter> {
        let real = match fs::canonicalize(&root) {
            Ok(real) => real,
            Err(err) => {
                tracing::warn!(root = %root.display(), error = %err, "index root is not accessible");
                let reason = io_skip_reason(&root, &err);
                self.record_skip(root, reason);
                return None;
            }
        };
        if !real.is_dir() {
            tracing::warn!(root = %root.display(), "index root is not a directory");
            self.record_skip(root, SkipReason::NotADirectory);
            return None;
        }
        if self.filter.is_excluded(&real, true) {
            tracing::info!(root = %real.display(), "index root is excluded");
            return None;
        }
        if !self.visited.lock().insert(real.clone()) {
            tracing::debug!(root = %real.display(), "index root already walked");
            return None;
        }

        tracing::debug!(root = %real.display(), "walking root");
        self.walked_roots.push(real.clone());

        let filter = self.filter.clone();
        let visited = self.visited.clone();
        let iter = WalkDir::new(&real)
            .follow_links(true)
            .into_iter()
            .filter_entry(move |entry| keep_entry(entry, &filter, &visited));
        Some(Box::new(iter))
    }

    fn record_walk_error(&mut self, err: walkdir::Error) {
        let path = err.path().map(Path::to_path_buf).unwrap_or_default();
        let reason = if err.loop_ancestor().is_some() {
            SkipReason::SymlinkLoop
        } else if let Some(io_err) = err.io_error() {
            io_skip_reason(&path, io_err)
        } else {
            SkipReason::Other(err.to_string())
        };
        self.stats.scanned += 1;
        self.record_skip(path, reason);
    }
}

/// Prunes excluded subtrees and directories whose real path was already
/// entered (symlink cycles, two links to one directory).
fn keep_entry(entry: &DirEntry, filter: &PathFilter, visited: &Mutex<HashSet<PathBuf>>) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let is_dir = entry.file_type().is_dir();
    if filter.is_excluded(entry.path(), is_dir) {
        return false;
    }
    if !is_dir {
        return true;
    }
    match fs::canonicalize(entry.path()) {
        Ok(real) => {
            if real.as_path() != entry.path() && filter.is_excluded(&real, true) {
                return false;
            }
            visited.lock().insert(real)
        }
        Err(_) => false,
    }
}

fn io_skip_reason(path: &Path, err: &io::Error) -> SkipReason {
    match err.kind() {
        io::ErrorKind::PermissionDenied => SkipReason::PermissionDenied,
        io::ErrorKind::NotFound => {
            let is_link = fs::symlink_metadata(path)
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false);
            if is_link {
                SkipReason::BrokenSymlink
            } else {
                SkipReason::NotFound
            }
        }
        _ => SkipReason::Other(err.to_string()),
    }
}

impl Iterator for Scan {
    type Item = IndexEntry;

    fn next(&mut self) -> Option<IndexEntry> {
        loop {
            if self.cancel.is_cancelled() {
                if !self.cancel_logged {
                    self.cancel_logged = true;
                    self.current = None;
                    tracing::info!(
                        scanned = self.stats.scanned,
                        yielded = self.stats.yielded,
                        "scan cancelled"
                    );
                }
                return None;
            }

            let Some(iter) = self.current.as_mut() else {
                let root = self.roots.next()?;
                self.current = self.open_root(root);
                continue;
            };

            let entry = match iter.next() {
                None => {
                    self.current = None;
                    continue;
                }
                Some(Err(err)) => {
                    self.record_walk_error(err);
                    continue;
                }
                Some(Ok(entry)) => entry,
            };

            if entry.depth() == 0 {
                continue;
            }
            self.stats.scanned += 1;

            let is_dir = entry.file_type().is_dir();
            if is_dir && !self.include_directories {
                continue;
            }
            if !is_dir && !self.filter.accepts_file(entry.path()) {
                continue;
            }

            match IndexEntry::from_walkdir_entry(&entry) {
                Ok(index_entry) => {
                    self.stats.yielded += 1;
                    return Some(index_entry);
                }
                Err(err) => {
                    let path = entry.path().to_path_buf();
                    let reason = io_skip_reason(&path, &err);
                    self.record_skip(path, reason);
                }
            }
        }
    }
}
