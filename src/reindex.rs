//! Scan passes that refresh the index from the live filesystem.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;

use crate::config::IndexConfig;
use crate::error::Result;
use crate::store::IndexStore;
use crate::walker::{CancelReason, CancelToken, Scan, Walker};

const UPSERT_BATCH_SIZE: usize = 10_000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanProgress {
    pub scanned: u64,
    pub indexed: u64,
    pub skipped: u64,
    pub current_path: String,
}

/// Called after every indexed entry. `Break` stops the scan; whatever was
/// collected up to then is still committed.
pub type ProgressFn = dyn Fn(&ScanProgress) -> ControlFlow<()> + Send + Sync;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    pub scanned: u64,
    pub indexed: u64,
    pub skipped: u64,
    pub removed: u64,
    pub cancelled: bool,
    /// False when a superseded scan threw its results away.
    pub committed: bool,
    pub elapsed_ms: u64,
}

fn report_progress(
    scan: &Scan,
    current_path: &str,
    cancel: &CancelToken,
    progress: Option<&ProgressFn>,
) {
    let Some(hook) = progress else {
        return;
    };
    let stats = scan.stats();
    let snapshot = ScanProgress {
        scanned: stats.scanned,
        indexed: stats.yielded,
        skipped: stats.skipped,
        current_path: current_path.to_string(),
    };
    if hook(&snapshot).is_break() {
        cancel.cancel();
    }
}

fn finish_report(scan: &Scan, started: Instant, committed: bool, removed: u64) -> ReindexReport {
    let stats = scan.stats();
    ReindexReport {
        scanned: stats.scanned,
        indexed: stats.yielded,
        skipped: stats.skipped,
        removed,
        cancelled: scan.was_cancelled(),
        committed,
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

/// Rescans every configured root and replaces the index with the result.
///
/// A stopped scan merges what it collected without pruning anything; a
/// superseded one leaves the index exactly as it was.
pub fn full_reindex(
    store: &IndexStore,
    config: &IndexConfig,
    cancel: &CancelToken,
    progress: Option<&ProgressFn>,
) -> Result<ReindexReport> {
    let started = Instant::now();
    let walker = Walker::from_config(config)?;
    tracing::info!(roots = walker.roots().len(), "full reindex started");

    let mut staged = store.begin_replace()?;
    let mut scan = walker.scan(cancel);
    while let Some(entry) = scan.next() {
        let current_path = entry.path.clone();
        staged.push(entry)?;
        report_progress(&scan, &current_path, cancel, progress);
    }

    let committed = match cancel.reason() {
        None => {
            staged.commit()?;
            true
        }
        Some(CancelReason::Stopped) => {
            staged.merge()?;
            true
        }
        Some(CancelReason::Superseded) => {
            drop(staged);
            false
        }
    };

    let report = finish_report(&scan, started, committed, 0);
    tracing::info!(
        scanned = report.scanned,
        indexed = report.indexed,
        skipped = report.skipped,
        cancelled = report.cancelled,
        committed = report.committed,
        elapsed_ms = report.elapsed_ms,
        "full reindex finished"
    );
    Ok(report)
}

/// Rescans `roots` only: upserts what is there and, unless cancelled, prunes
/// rows below those roots that no longer exist.
pub fn incremental_reindex(
    store: &IndexStore,
    config: &IndexConfig,
    roots: &[PathBuf],
    cancel: &CancelToken,
    progress: Option<&ProgressFn>,
) -> Result<ReindexReport> {
    let started = Instant::now();
    let walker = Walker::for_roots(config, roots.to_vec())?;
    tracing::info!(roots = roots.len(), "incremental reindex started");

    let mut seen: HashSet<String> = HashSet::new();
    let mut batch = Vec::with_capacity(UPSERT_BATCH_SIZE);
    let mut scan = walker.scan(cancel);
    while let Some(entry) = scan.next() {
        let current_path = entry.path.clone();
        seen.insert(entry.path.clone());
        batch.push(entry);
        if batch.len() >= UPSERT_BATCH_SIZE {
            store.upsert(&batch)?;
            batch.clear();
        }
        report_progress(&scan, &current_path, cancel, progress);
    }

    let reason = cancel.reason();
    let committed = reason != Some(CancelReason::Superseded);
    if committed {
        store.upsert(&batch)?;
    }

    let mut removed = 0;
    if reason.is_none() {
        let prune_roots = prune_roots(roots, scan.walked_roots());
        removed = store.remove_missing(&prune_roots, &seen)? as u64;
    }

    let report = finish_report(&scan, started, committed, removed);
    tracing::info!(
        scanned = report.scanned,
        indexed = report.indexed,
        skipped = report.skipped,
        removed = report.removed,
        cancelled = report.cancelled,
        elapsed_ms = report.elapsed_ms,
        "incremental reindex finished"
    );
    Ok(report)
}

/// Roots whose stored rows may be pruned: the ones actually walked, plus
/// roots that have disappeared altogether.
fn prune_roots(requested: &[PathBuf], walked: &[PathBuf]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for root in requested {
        match fs::canonicalize(root) {
            Ok(real) => {
                if walked.contains(&real) && !out.contains(&real) {
                    out.push(real);
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                if root.is_absolute() && !out.contains(root) {
                    out.push(root.clone());
                }
            }
            Err(_) => {}
        }
    }
    out
}
