use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use log::{error, info, warn};

use region_rollup::config::{RollupConfig, RootPolicy};
use region_rollup::repl::{self, Repl};
use region_rollup::rollup::{self, Rollup};
use region_rollup::store::{CsvStore, StoreError};

/// Log file that starts over in a fresh file once it grows past `max_size`,
/// keeping up to `keep` older files as `<path>.1`, `<path>.2`, ...
struct RotatingLog {
    path: PathBuf,
    max_size: u64,
    keep: u32,
    file: File,
    written: u64,
}

impl RotatingLog {
    fn open(path: impl Into<PathBuf>, max_size: u64, keep: u32) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            path,
            max_size,
            keep,
            file,
            written,
        })
    }

    fn backup(&self, n: u32) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.keep > 0 {
            for n in (1..self.keep).rev() {
                let _ = std::fs::rename(self.backup(n), self.backup(n + 1));
            }
            let _ = std::fs::rename(&self.path, self.backup(1));
        }

        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn env_number<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn init_logging() {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    if let Ok(path) = std::env::var("ROLLUP_LOG_FILE") {
        let max_size_mb: u64 = env_number("ROLLUP_LOG_MAX_SIZE_MB", 10);
        let max_files: u32 = env_number("ROLLUP_LOG_MAX_FILES", 3);

        match RotatingLog::open(&path, max_size_mb * 1024 * 1024, max_files) {
            Ok(log_file) => {
                builder.target(env_logger::Target::Pipe(Box::new(log_file)));
            }
            Err(e) => eprintln!("Cannot open log file {path}: {e}; logging to stderr"),
        }
    }

    builder.init();
}

#[derive(Parser)]
#[command(name = "region-rollup")]
#[command(about = "Recomputes channel and device counters up a region hierarchy")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct StoreArgs {
    /// Directory holding the region, channel and device CSV tables
    #[arg(short, long, default_value = "data")]
    data_dir: String,

    /// JSON config file with table names, column names and status codes
    #[arg(short, long)]
    config: Option<String>,
}

impl StoreArgs {
    fn load_config(&self) -> anyhow::Result<RollupConfig> {
        match &self.config {
            Some(path) => RollupConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {path}")),
            None => Ok(RollupConfig::default()),
        }
    }

    fn open_store(&self) -> anyhow::Result<CsvStore> {
        CsvStore::open(&self.data_dir)
            .with_context(|| format!("Failed to open data directory {}", self.data_dir))
    }
}

#[derive(Subcommand)]
enum Command {
    /// Create empty region, channel and device tables
    Init {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Run one rollup pass and write the totals back
    Rollup {
        #[command(flatten)]
        store: StoreArgs,

        /// Parent id marking a top-level region
        #[arg(long)]
        root_sentinel: Option<String>,

        /// Process every root instead of only the first
        #[arg(long)]
        all_roots: bool,

        /// Write all totals in one transaction
        #[arg(long)]
        transactional: bool,
    },

    /// Start the interactive console
    Console {
        #[command(flatten)]
        store: StoreArgs,
    },
}

fn init_tables(data_dir: &Path, config: &RollupConfig) -> anyhow::Result<()> {
    let mut store = CsvStore::open(data_dir)?;
    for (table, columns) in rollup::table_layouts(config) {
        match store.create_table(&table, columns) {
            Ok(()) => info!("Created table '{}' in {:?}", table, data_dir),
            Err(StoreError::TableAlreadyExists(_)) => {
                warn!("Table '{}' already exists, leaving it as is", table)
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to create table {table}")),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Init { store } => {
            let config = store.load_config()?;
            init_tables(Path::new(&store.data_dir), &config)?;
        }
        Command::Rollup {
            store,
            root_sentinel,
            all_roots,
            transactional,
        } => {
            let mut config = store.load_config()?;
            if let Some(sentinel) = root_sentinel {
                config.root_sentinel = sentinel;
            }
            if all_roots {
                config.root_policy = RootPolicy::All;
            }
            config.transactional |= transactional;
            config.validate()?;

            let mut csv = store.open_store()?;
            info!("Starting rollup pass over {}", store.data_dir);
            let report = match Rollup::new(&mut csv, config).run_pass().await {
                Ok(report) => report,
                Err(e) => {
                    if !e.updates().is_empty() {
                        repl::print_updates(e.updates());
                    }
                    error!("Rollup pass aborted: {}", e);
                    return Err(e.into());
                }
            };

            repl::print_report(&report);
            if !report.is_clean() {
                bail!(
                    "{} region update(s) failed",
                    report.failed_updates().count()
                );
            }
        }
        Command::Console { store } => {
            let config = store.load_config()?;
            let csv = store.open_store()?;
            let mut console = Repl::new(csv, config).context("Failed to start line editor")?;
            console.run().await;
        }
    }

    Ok(())
}
