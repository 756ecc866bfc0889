//! Decides when a scan runs and guarantees that only one runs at a time.
//!
//! ```text
//!   Idle ──trigger──▶ Scanning ──done──▶ Idle
//!                        │  ▲
//!        manual trigger  ▼  │ superseded scan drained
//!                      Cooldown
//! ```
//!
//! A manual trigger during a scan supersedes it: the running walk is told to
//! stop and discard its rows, and the worker restarts with the new request
//! as soon as the old walk has drained. Startup and interval triggers that
//! arrive while busy are dropped. [`Scheduler::run_blocking`] instead waits
//! its turn, so callers that need a result never cut a scan short.

use std::io;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

use crate::config::IndexConfig;
use crate::entry::now_epoch;
use crate::error::{Error, Result};
use crate::reindex::{full_reindex, incremental_reindex, ProgressFn, ReindexReport};
use crate::store::IndexStore;
use crate::walker::CancelToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    Idle,
    Scanning,
    Cooldown,
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Scanning => "Scanning",
            Self::Cooldown => "Cooldown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanScope {
    /// Full reindex of every configured root.
    All,
    /// Incremental pass over the given roots only.
    Roots(Vec<PathBuf>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Manual(ScanScope),
    Startup,
    Interval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    /// The running scan was superseded; the new request runs next.
    Restarting,
    Ignored,
}

pub type ScanOutcome = std::result::Result<ReindexReport, Arc<Error>>;

struct Shared {
    state: SchedulerState,
    cancel: CancelToken,
    pending: Option<ScanScope>,
    last_outcome: Option<ScanOutcome>,
    completed_runs: u64,
    /// Callers of `run_blocking` waiting for the current run to end.
    waiters: Vec<mpsc::Sender<ScanOutcome>>,
}

struct Inner {
    store: IndexStore,
    config: IndexConfig,
    progress: Option<Arc<ProgressFn>>,
    shared: Mutex<Shared>,
    changed: Condvar,
    timer_stop: Mutex<bool>,
    timer_wake: Condvar,
    timer: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state())
            .field("db", &self.inner.store.path())
            .finish()
    }
}

impl Scheduler {
    pub fn new(store: IndexStore, config: IndexConfig) -> Result<Self> {
        Self::build(store, config, None)
    }

    pub fn with_progress(
        store: IndexStore,
        config: IndexConfig,
        progress: Arc<ProgressFn>,
    ) -> Result<Self> {
        Self::build(store, config, Some(progress))
    }

    fn build(
        store: IndexStore,
        config: IndexConfig,
        progress: Option<Arc<ProgressFn>>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                store,
                config,
                progress,
                shared: Mutex::new(Shared {
                    state: SchedulerState::Idle,
                    cancel: CancelToken::new(),
                    pending: None,
                    last_outcome: None,
                    completed_runs: 0,
                    waiters: Vec::new(),
                }),
                changed: Condvar::new(),
                timer_stop: Mutex::new(false),
                timer_wake: Condvar::new(),
                timer: Mutex::new(None),
            }),
        })
    }

    pub fn state(&self) -> SchedulerState {
        self.inner.shared.lock().state
    }

    pub fn config(&self) -> &IndexConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &IndexStore {
        &self.inner.store
    }

    pub fn last_outcome(&self) -> Option<ScanOutcome> {
        self.inner.shared.lock().last_outcome.clone()
    }

    /// Like [`last_outcome`](Self::last_outcome) but moves it out, leaving
    /// the error uniquely owned.
    pub fn take_last_outcome(&self) -> Option<ScanOutcome> {
        self.inner.shared.lock().last_outcome.take()
    }

    /// Number of scans that ran to an end (superseded ones excluded).
    pub fn completed_runs(&self) -> u64 {
        self.inner.shared.lock().completed_runs
    }

    pub fn trigger(&self, trigger: Trigger) -> TriggerOutcome {
        let scope = match trigger {
            Trigger::Manual(scope) => return self.manual(scope),
            Trigger::Startup if self.inner.config.auto_reindex => ScanScope::All,
            Trigger::Interval if self.inner.config.auto_reindex && self.is_due(now_epoch()) => {
                ScanScope::All
            }
            other => {
                tracing::debug!(trigger = ?other, "trigger ignored");
                return TriggerOutcome::Ignored;
            }
        };

        let mut shared = self.inner.shared.lock();
        if shared.state != SchedulerState::Idle {
            tracing::debug!(state = shared.state.as_str(), "scan already running, trigger dropped");
            return TriggerOutcome::Ignored;
        }
        self.start(&mut shared, scope);
        TriggerOutcome::Started
    }

    fn manual(&self, scope: ScanScope) -> TriggerOutcome {
        let mut shared = self.inner.shared.lock();
        match shared.state {
            SchedulerState::Idle => {
                self.start(&mut shared, scope);
                TriggerOutcome::Started
            }
            SchedulerState::Scanning | SchedulerState::Cooldown => {
                tracing::info!("manual reindex supersedes the running scan");
                shared.cancel.supersede();
                shared.pending = Some(scope);
                shared.state = SchedulerState::Cooldown;
                self.inner.changed.notify_all();
                TriggerOutcome::Restarting
            }
        }
    }

    fn start(&self, shared: &mut Shared, scope: ScanScope) {
        let cancel = CancelToken::new();
        shared.cancel = cancel.clone();
        shared.state = SchedulerState::Scanning;
        self.inner.changed.notify_all();

        let inner = self.inner.clone();
        std::thread::spawn(move || run_worker(inner, scope, cancel));
    }

    /// Waits until no scan is running, runs `scope` and returns its outcome.
    ///
    /// If a manual trigger supersedes the run, the outcome is that of the
    /// restart.
    pub fn run_blocking(&self, scope: ScanScope) -> ScanOutcome {
        let (tx, rx) = mpsc::channel();
        {
            let mut shared = self.inner.shared.lock();
            while shared.state != SchedulerState::Idle {
                self.inner.changed.wait(&mut shared);
            }
            shared.waiters.push(tx);
            self.start(&mut shared, scope);
        }
        rx.recv().unwrap_or_else(|_| {
            Err(Arc::new(Error::Io(io::Error::other(
                "scan worker exited without an outcome",
            ))))
        })
    }

    /// Stops the running scan; what it collected so far is kept. In
    /// `Cooldown` the queued restart is dropped and the draining scan keeps
    /// its rows instead of discarding them.
    pub fn cancel(&self) {
        let mut shared = self.inner.shared.lock();
        if shared.state == SchedulerState::Cooldown {
            shared.pending = None;
            shared.cancel.keep_partial();
        } else {
            shared.cancel.cancel();
        }
    }

    /// Blocks until no scan is running and returns the last outcome.
    pub fn wait_idle(&self) -> Option<ScanOutcome> {
        let mut shared = self.inner.shared.lock();
        while shared.state != SchedulerState::Idle {
            self.inner.changed.wait(&mut shared);
        }
        shared.last_outcome.clone()
    }

    /// Like [`wait_idle`](Self::wait_idle) but gives up after `timeout`;
    /// returns whether the scheduler is idle.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let mut shared = self.inner.shared.lock();
        let deadline = std::time::Instant::now() + timeout;
        while shared.state != SchedulerState::Idle {
            if self
                .inner
                .changed
                .wait_until(&mut shared, deadline)
                .timed_out()
            {
                return shared.state == SchedulerState::Idle;
            }
        }
        true
    }

    /// True when the configured interval has elapsed since the last index
    /// write, or when nothing was ever indexed.
    pub fn is_due(&self, now: i64) -> bool {
        match self.inner.store.last_indexed_time() {
            Ok(Some(last)) => now - last >= self.inner.config.reindex_interval_secs(),
            Ok(None) => true,
            Err(err) => {
                tracing::warn!(error = %err, "cannot read last index time");
                false
            }
        }
    }

    /// One timer step: fires an interval trigger when due.
    pub fn tick(&self, now: i64) -> TriggerOutcome {
        if !self.inner.config.auto_reindex || !self.is_due(now) {
            return TriggerOutcome::Ignored;
        }
        let mut shared = self.inner.shared.lock();
        if shared.state != SchedulerState::Idle {
            return TriggerOutcome::Ignored;
        }
        tracing::info!("reindex interval elapsed");
        self.start(&mut shared, ScanScope::All);
        TriggerOutcome::Started
    }

    /// Background thread calling [`tick`](Self::tick) every `poll` until
    /// [`shutdown`](Self::shutdown).
    pub fn start_timer(&self, poll: Duration) {
        let mut timer = self.inner.timer.lock();
        if timer.is_some() {
            return;
        }
        *self.inner.timer_stop.lock() = false;

        let scheduler = self.clone();
        *timer = Some(std::thread::spawn(move || loop {
            {
                let mut stop = scheduler.inner.timer_stop.lock();
                if *stop {
                    break;
                }
                scheduler.inner.timer_wake.wait_for(&mut stop, poll);
                if *stop {
                    break;
                }
            }
            scheduler.tick(now_epoch());
        }));
        tracing::debug!(poll_secs = poll.as_secs(), "reindex timer started");
    }

    /// Stops the timer, stops any running scan and waits for it to drain.
    pub fn shutdown(&self) {
        {
            *self.inner.timer_stop.lock() = true;
            self.inner.timer_wake.notify_all();
        }
        if let Some(handle) = self.inner.timer.lock().take() {
            let _ = handle.join();
        }
        self.cancel();
        self.wait_idle();
    }
}

fn run_scan(inner: &Inner, scope: &ScanScope, cancel: &CancelToken) -> Result<ReindexReport> {
    let progress = inner.progress.as_deref();
    match scope {
        ScanScope::All => full_reindex(&inner.store, &inner.config, cancel, progress),
        ScanScope::Roots(roots) => {
            incremental_reindex(&inner.store, &inner.config, roots, cancel, progress)
        }
    }
}

fn run_worker(inner: Arc<Inner>, mut scope: ScanScope, mut cancel: CancelToken) {
    loop {
        let result = run_scan(&inner, &scope, &cancel);
        if let Err(err) = &result {
            tracing::error!(error = %err, "reindex failed");
        }

        let mut shared = inner.shared.lock();
        if let Some(next) = shared.pending.take() {
            cancel = CancelToken::new();
            shared.cancel = cancel.clone();
            shared.state = SchedulerState::Scanning;
            inner.changed.notify_all();
            scope = next;
            continue;
        }

        let outcome = result.map_err(Arc::new);
        for waiter in shared.waiters.drain(..) {
            let _ = waiter.send(outcome.clone());
        }
        shared.last_outcome = Some(outcome);
        shared.completed_runs += 1;
        shared.state = SchedulerState::Idle;
        inner.changed.notify_all();
        break;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reindex::ScanProgress;
    use std::fs;
    use std::ops::ControlFlow;
    use std::path::Path;

    fn setup(files: usize) -> (tempfile::TempDir, PathBuf, IndexStore) {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap().join("tree");
        fs::create_dir_all(&root).unwrap();
        for i in 0..files {
            fs::write(root.join(format!("f{i:05}.txt")), "x").unwrap();
        }
        let store = IndexStore::open(dir.path().join("index.db")).unwrap();
        (dir, root, store)
    }

    fn auto_config(root: &Path) -> IndexConfig {
        IndexConfig {
            auto_reindex: true,
            reindex_interval_minutes: 1,
            ..IndexConfig::with_paths([root.to_path_buf()])
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let (_dir, _root, store) = setup(0);
        let config = IndexConfig {
            reindex_interval_minutes: 0,
            ..IndexConfig::default()
        };
        assert!(matches!(
            Scheduler::new(store, config),
            Err(Error::ConfigInvalid(_))
        ));
    }

    #[test]
    fn manual_trigger_runs_and_returns_to_idle() {
        let (_dir, root, store) = setup(5);
        let scheduler =
            Scheduler::new(store.clone(), IndexConfig::with_paths([root.clone()])).unwrap();

        assert_eq!(
            scheduler.trigger(Trigger::Manual(ScanScope::All)),
            TriggerOutcome::Started
        );
        let report = scheduler.wait_idle().unwrap().unwrap();
        assert_eq!(report.indexed, 5);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(store.count().unwrap(), 5);
    }

    #[test]
    fn startup_requires_auto_reindex() {
        let (_dir, root, store) = setup(1);
        let scheduler =
            Scheduler::new(store.clone(), IndexConfig::with_paths([root.clone()])).unwrap();
        assert_eq!(scheduler.trigger(Trigger::Startup), TriggerOutcome::Ignored);

        let scheduler = Scheduler::new(store, auto_config(&root)).unwrap();
        assert_eq!(scheduler.trigger(Trigger::Startup), TriggerOutcome::Started);
        scheduler.wait_idle();
    }

    #[test]
    fn interval_fires_only_when_due() {
        let (_dir, root, store) = setup(2);
        let scheduler = Scheduler::new(store.clone(), auto_config(&root)).unwrap();
        let now = now_epoch();

        // Never indexed: due immediately.
        assert_eq!(scheduler.tick(now), TriggerOutcome::Started);
        scheduler.wait_idle().unwrap().unwrap();

        let last = store.last_indexed_time().unwrap().unwrap();
        assert_eq!(scheduler.tick(last + 30), TriggerOutcome::Ignored);
        assert_eq!(scheduler.tick(last + 60), TriggerOutcome::Started);
        scheduler.wait_idle();
        assert_eq!(scheduler.completed_runs(), 2);
    }

    #[test]
    fn progress_break_leaves_partial_index_and_idle_state() {
        let (_dir, root, store) = setup(300);
        let hook: Arc<ProgressFn> = Arc::new(|p: &ScanProgress| {
            if p.indexed >= 10 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        let scheduler = Scheduler::with_progress(
            store.clone(),
            IndexConfig::with_paths([root.clone()]),
            hook,
        )
        .unwrap();

        scheduler.trigger(Trigger::Manual(ScanScope::All));
        let report = scheduler.wait_idle().unwrap().unwrap();
        assert!(report.cancelled);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(store.count().unwrap(), 10);
    }

    #[test]
    fn manual_trigger_supersedes_running_scan() {
        let (_dir, root, store) = setup(50);
        let (started_tx, started_rx) = std::sync::mpsc::channel::<()>();
        let (go_tx, go_rx) = std::sync::mpsc::channel::<()>();
        let started_tx = Mutex::new(Some(started_tx));
        let go_rx = Mutex::new(go_rx);

        let hook: Arc<ProgressFn> = Arc::new(move |_: &ScanProgress| {
            // Hold the first scan on its first entry until the test says go.
            if let Some(tx) = started_tx.lock().take() {
                let _ = tx.send(());
                let _ = go_rx.lock().recv();
            }
            ControlFlow::Continue(())
        });
        let scheduler = Scheduler::with_progress(
            store.clone(),
            IndexConfig::with_paths([root.clone()]),
            hook,
        )
        .unwrap();

        assert_eq!(
            scheduler.trigger(Trigger::Manual(ScanScope::All)),
            TriggerOutcome::Started
        );
        started_rx.recv().unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Scanning);

        // Non-manual triggers never start a second scan.
        assert_eq!(scheduler.trigger(Trigger::Startup), TriggerOutcome::Ignored);

        assert_eq!(
            scheduler.trigger(Trigger::Manual(ScanScope::All)),
            TriggerOutcome::Restarting
        );
        assert_eq!(scheduler.state(), SchedulerState::Cooldown);
        go_tx.send(()).unwrap();

        let report = scheduler.wait_idle().unwrap().unwrap();
        assert!(!report.cancelled);
        assert_eq!(report.indexed, 50);
        assert_eq!(scheduler.completed_runs(), 1);
        assert_eq!(store.count().unwrap(), 50);
    }

    #[test]
    fn cancel_during_cooldown_keeps_drained_rows() {
        let (_dir, root, store) = setup(50);
        let (started_tx, started_rx) = std::sync::mpsc::channel::<()>();
        let (go_tx, go_rx) = std::sync::mpsc::channel::<()>();
        let started_tx = Mutex::new(Some(started_tx));
        let go_rx = Mutex::new(go_rx);

        let hook: Arc<ProgressFn> = Arc::new(move |_: &ScanProgress| {
            if let Some(tx) = started_tx.lock().take() {
                let _ = tx.send(());
                let _ = go_rx.lock().recv();
            }
            ControlFlow::Continue(())
        });
        let scheduler = Scheduler::with_progress(
            store.clone(),
            IndexConfig::with_paths([root.clone()]),
            hook,
        )
        .unwrap();

        scheduler.trigger(Trigger::Manual(ScanScope::All));
        started_rx.recv().unwrap();
        assert_eq!(
            scheduler.trigger(Trigger::Manual(ScanScope::All)),
            TriggerOutcome::Restarting
        );
        scheduler.cancel();
        assert_eq!(scheduler.state(), SchedulerState::Cooldown);
        go_tx.send(()).unwrap();

        let report = scheduler.wait_idle().unwrap().unwrap();
        assert!(report.cancelled);
        assert!(report.committed);
        assert_eq!(report.indexed, 1);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.completed_runs(), 1);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn run_blocking_waits_for_running_scan() {
        let (_dir, root, store) = setup(20);
        let (started_tx, started_rx) = std::sync::mpsc::channel::<()>();
        let (go_tx, go_rx) = std::sync::mpsc::channel::<()>();
        let started_tx = Mutex::new(Some(started_tx));
        let go_rx = Mutex::new(go_rx);

        let hook: Arc<ProgressFn> = Arc::new(move |_: &ScanProgress| {
            if let Some(tx) = started_tx.lock().take() {
                let _ = tx.send(());
                let _ = go_rx.lock().recv();
            }
            ControlFlow::Continue(())
        });
        let scheduler = Scheduler::with_progress(
            store.clone(),
            IndexConfig::with_paths([root.clone()]),
            hook,
        )
        .unwrap();

        scheduler.trigger(Trigger::Manual(ScanScope::All));
        started_rx.recv().unwrap();

        let blocked = scheduler.clone();
        let second = std::thread::spawn(move || blocked.run_blocking(ScanScope::All));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(scheduler.state(), SchedulerState::Scanning);
        go_tx.send(()).unwrap();

        let report = second.join().unwrap().unwrap();
        assert!(!report.cancelled);
        assert_eq!(report.indexed, 20);
        scheduler.wait_idle();
        assert_eq!(scheduler.completed_runs(), 2);
        assert_eq!(store.count().unwrap(), 20);
    }

    #[test]
    fn scoped_trigger_runs_incremental_pass() {
        let (_dir, root, store) = setup(3);
        let scheduler = Scheduler::new(store.clone(), IndexConfig::default()).unwrap();
        scheduler.trigger(Trigger::Manual(ScanScope::Roots(vec![root.clone()])));
        scheduler.wait_idle().unwrap().unwrap();
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn timer_can_be_started_and_shut_down() {
        let (_dir, root, store) = setup(2);
        let scheduler = Scheduler::new(store.clone(), auto_config(&root)).unwrap();
        scheduler.start_timer(Duration::from_millis(10));
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while scheduler.completed_runs() == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        scheduler.shutdown();
        assert!(scheduler.completed_runs() >= 1);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(store.count().unwrap(), 2);
    }
}
