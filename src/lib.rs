//! Indexing and query core of everyfind: walks configured roots into a
//! SQLite index, keeps it fresh, and hands its contents to a fuzzy finder.

pub mod commands;
pub mod config;
pub mod dispatch;
pub mod entry;
pub mod error;
pub mod filter;
pub mod gitignore;
pub mod matcher;
pub mod reindex;
pub mod scheduler;
pub mod settings;
pub mod store;
pub mod walker;

pub use commands::Core;
pub use config::IndexConfig;
pub use dispatch::{QueryDispatcher, Selection};
pub use entry::IndexEntry;
pub use error::{Error, Result};
pub use filter::{should_index, PathFilter};
pub use matcher::{BuiltinMatcher, FzfBackend, MatchBackend, SelectOptions};
pub use reindex::{full_reindex, incremental_reindex, ProgressFn, ReindexReport, ScanProgress};
pub use scheduler::{ScanScope, Scheduler, SchedulerState, Trigger, TriggerOutcome};
pub use store::{IndexStats, IndexStore};
pub use walker::{CancelToken, SkipEvent, SkipReason, Walker};
