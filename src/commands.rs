//! The operations a front-end drives: `index`, `reindex`, `search`, `stats`,
//! `clear`. Holds no presentation state; the CLI is one caller of many.
//!
//! Every scan a `Core` (or any clone of it) starts goes through the one
//! [`Scheduler`] it owns, so two scans of the same core never overlap.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use crate::config::IndexConfig;
use crate::dispatch::{QueryDispatcher, Selection};
use crate::error::{Error, Result};
use crate::matcher::SelectOptions;
use crate::reindex::{ProgressFn, ReindexReport};
use crate::scheduler::{ScanOutcome, ScanScope, Scheduler};
use crate::settings;
use crate::store::{IndexStats, IndexStore};

/// Program handed a selected path by `open_path`.
pub const OPENER: &str = "xdg-open";

#[derive(Debug, Clone)]
pub struct Core {
    store: IndexStore,
    config: IndexConfig,
    scheduler: Scheduler,
}

impl Core {
    /// Rejects an invalid config before the store is touched.
    pub fn open(db_path: impl Into<PathBuf>, config: IndexConfig) -> Result<Self> {
        config.validate()?;
        let store = IndexStore::open(db_path)?;
        Self::with_store(store, config)
    }

    pub fn with_store(store: IndexStore, config: IndexConfig) -> Result<Self> {
        let scheduler = Scheduler::new(store.clone(), config.clone())?;
        Ok(Self {
            store,
            config,
            scheduler,
        })
    }

    /// Replaces the scheduler with one reporting progress to `progress`.
    /// Call before any scan has been started.
    pub fn with_progress(mut self, progress: Arc<ProgressFn>) -> Result<Self> {
        self.scheduler =
            Scheduler::with_progress(self.store.clone(), self.config.clone(), progress)?;
        Ok(self)
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Roots `index` walks when none are given: the configured paths, else
    /// the home directory.
    pub fn default_roots(&self) -> Vec<PathBuf> {
        if !self.config.indexed_paths.is_empty() {
            return self.config.indexed_paths.clone();
        }
        settings::home_dir().into_iter().collect()
    }

    /// Scans `roots` and merges the result into the store, pruning rows for
    /// files that disappeared below them. Waits for a scan already running.
    pub fn index(&self, roots: &[PathBuf]) -> Result<ReindexReport> {
        let roots = if roots.is_empty() {
            self.default_roots()
        } else {
            roots.to_vec()
        };
        if roots.is_empty() {
            return Err(Error::ConfigInvalid(
                "no paths to index and no home directory".to_string(),
            ));
        }
        let roots = roots
            .iter()
            .map(|root| absolutize(root))
            .collect::<Result<Vec<_>>>()?;
        into_result(self.scheduler.run_blocking(ScanScope::Roots(roots)))
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Full reindex of the configured roots. Waits for a scan already
    /// running instead of overlapping it.
    pub fn reindex(&self) -> Result<ReindexReport> {
        if self.config.indexed_paths.is_empty() {
            return Err(Error::ConfigInvalid("indexed_paths is empty".to_string()));
        }
        into_result(self.scheduler.run_blocking(ScanScope::All))
    }

    pub fn search(&self, dispatcher: &QueryDispatcher, opts: &SelectOptions) -> Result<Selection> {
        dispatcher.query_interactive(&self.store, opts)
    }

    pub fn filter(&self, dispatcher: &QueryDispatcher, pattern: &str) -> Result<Vec<String>> {
        dispatcher.query(&self.store, pattern)
    }

    pub fn stats(&self) -> Result<IndexStats> {
        self.store.stats()
    }

    pub fn clear(&self) -> Result<()> {
        self.store.clear()
    }
}

fn into_result(outcome: ScanOutcome) -> Result<ReindexReport> {
    outcome.map_err(Error::from_shared)
}

/// Hands `path` to the desktop's default application.
pub fn open_path(path: &Path) -> Result<()> {
    open_with(OPENER, path)
}

/// Starts `program path` without waiting for it. Fails when the path is
/// gone or the program cannot be started.
pub fn open_with(program: &str, path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} no longer exists", path.display()),
        )));
    }
    let child = Command::new(program).arg(path).spawn()?;
    tracing::info!(program, path = %path.display(), pid = child.id(), "opened");
    Ok(())
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}
