use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use everyfind::reindex::ScanProgress;
use everyfind::settings::{self, Settings};
use everyfind::commands::open_path;
use everyfind::{
    BuiltinMatcher, Core, FzfBackend, IndexConfig, IndexStats, ProgressFn, QueryDispatcher,
    ReindexReport, SelectOptions, Trigger,
};

const PROGRESS_LOG_EVERY: u64 = 10_000;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    Fzf,
    Builtin,
}

#[derive(Parser, Debug)]
#[command(name = "everyfind", version, about = "Fast file search for Linux")]
struct Cli {
    /// Index database (default: index.db in the config directory)
    #[arg(long, env = "EVERYFIND_DB", global = true)]
    db: Option<PathBuf>,

    /// Settings file (default: settings.json in the config directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Debug logging unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan paths and merge them into the index
    Index {
        /// Roots to scan (default: configured paths, else $HOME)
        paths: Vec<PathBuf>,
        /// Extra paths to leave out of this scan
        #[arg(long)]
        exclude: Vec<PathBuf>,
    },
    /// Rebuild the index from the configured paths
    Reindex,
    /// Search the index
    Search {
        /// Initial query
        #[arg(short, long)]
        query: Option<String>,
        /// Allow selecting several paths
        #[arg(short, long)]
        multi: bool,
        /// Open the selected file with the default application
        #[arg(short, long)]
        open: bool,
        /// Print every match for PATTERN instead of opening the finder
        #[arg(long, value_name = "PATTERN")]
        filter: Option<String>,
        #[arg(long, value_enum, default_value = "fzf")]
        backend: Backend,
    },
    /// Show index statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Remove every entry from the index
    Clear,
    /// Keep the index fresh in the foreground
    Watch {
        /// How often to check whether the reindex interval has elapsed
        #[arg(long, default_value_t = 30)]
        poll_secs: u64,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            let unavailable = err
                .downcast_ref::<everyfind::Error>()
                .is_some_and(|e| e.is_backend_unavailable());
            if unavailable {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(path: Option<&Path>) -> Settings {
    let loaded = match path {
        Some(path) => settings::load_from(path),
        None => settings::load(),
    };
    loaded.unwrap_or_else(|err| {
        tracing::warn!(error = %err, "falling back to default settings");
        Settings::default()
    })
}

fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(cli.settings.as_deref());
    let mut config = settings.index_config();
    let db_path = cli.db.unwrap_or_else(settings::default_index_path);
    tracing::debug!(db = %db_path.display(), "using index");

    match cli.command {
        Command::Index { paths, exclude } => {
            let cwd = std::env::current_dir().context("cannot resolve current directory")?;
            config
                .excluded_paths
                .extend(exclude.into_iter().map(|p| cwd.join(p)));
            let core = Core::open(&db_path, config)?;
            let roots: Vec<PathBuf> = paths.into_iter().map(|p| cwd.join(p)).collect();
            let roots = if roots.is_empty() { core.default_roots() } else { roots };

            let mut total = 0;
            for root in &roots {
                let report = core.index(std::slice::from_ref(root))?;
                println!("Indexed {} files from {}", report.indexed, root.display());
                total += report.indexed;
            }
            println!("\nTotal: {total} files indexed");
        }
        Command::Reindex => {
            let core = Core::open(&db_path, config)?;
            let report = core.reindex()?;
            print_report(&report);
        }
        Command::Search {
            query,
            multi,
            open,
            filter,
            backend,
        } => {
            let core = Core::open(&db_path, config)?;
            let dispatcher = match backend {
                Backend::Fzf => QueryDispatcher::new(FzfBackend::new()),
                Backend::Builtin => QueryDispatcher::new(BuiltinMatcher::new()),
            };

            let hits = match filter {
                Some(pattern) => core.filter(&dispatcher, &pattern)?,
                None => {
                    let opts = SelectOptions {
                        multi,
                        query: query.unwrap_or_default(),
                        ..SelectOptions::default()
                    };
                    core.search(&dispatcher, &opts)?.into_paths()
                }
            };
            if hits.is_empty() && core.store().is_empty()? {
                eprintln!("No files in index. Run 'everyfind index' first.");
            }
            for path in &hits {
                println!("{path}");
            }
            if open {
                match hits.as_slice() {
                    [] => {}
                    [single] => {
                        if let Err(err) = open_path(Path::new(single)) {
                            tracing::warn!(path = %single, error = %err, "cannot open file");
                        }
                    }
                    _ => tracing::warn!(selected = hits.len(), "--open needs a single selection"),
                }
            }
        }
        Command::Stats { json } => {
            let core = Core::open(&db_path, config)?;
            let stats = core.stats()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_stats(&stats, &db_path);
            }
        }
        Command::Clear => {
            let core = Core::open(&db_path, config)?;
            core.clear()?;
            println!("Index cleared");
        }
        Command::Watch { poll_secs } => watch(&db_path, config, poll_secs)?,
    }
    Ok(())
}

fn watch(db_path: &Path, mut config: IndexConfig, poll_secs: u64) -> Result<()> {
    anyhow::ensure!(
        !config.indexed_paths.is_empty(),
        "no indexed_paths configured; add some to the settings file"
    );
    // Watching is an explicit request for automatic reindexing.
    config.auto_reindex = true;

    let progress: Arc<ProgressFn> = Arc::new(|p: &ScanProgress| {
        if p.indexed > 0 && p.indexed % PROGRESS_LOG_EVERY == 0 {
            tracing::info!(indexed = p.indexed, current = %p.current_path, "indexing");
        }
        std::ops::ControlFlow::Continue(())
    });
    let core = Core::open(db_path, config)?.with_progress(progress)?;
    let scheduler = core.scheduler();

    scheduler.trigger(Trigger::Startup);
    scheduler.start_timer(Duration::from_secs(poll_secs.max(1)));
    tracing::info!(
        interval_minutes = core.config().reindex_interval_minutes,
        "watching; press Ctrl-C to stop"
    );
    loop {
        std::thread::park();
    }
}

fn print_report(report: &ReindexReport) {
    println!(
        "Scanned {} entries, indexed {}, skipped {} in {} ms{}",
        report.scanned,
        report.indexed,
        report.skipped,
        report.elapsed_ms,
        if report.cancelled { " (cancelled)" } else { "" }
    );
}

fn print_stats(stats: &IndexStats, db_path: &Path) {
    println!("Entries:       {}", stats.count);
    println!("Total size:    {}", human_size(stats.total_size));
    match stats.last_indexed_time {
        Some(ts) => println!("Last indexed:  {ts} (unix time)"),
        None => println!("Last indexed:  never"),
    }
    println!("Database:      {}", db_path.display());
    println!("Database size: {}", human_size(stats.db_size_bytes));
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
