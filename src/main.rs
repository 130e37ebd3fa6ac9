//! `logtree` command-line tool.
//!
//! - `check <file>`: load and validate a logging configuration, then print the
//!   resolved directive for every configured logger
//! - `watch <file>`: install the configuration, reload it on change, and emit
//!   a heartbeat record through every configured logger until Ctrl-C

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::time;

use logtree::config::watcher::{apply_updates, ConfigWatcher};
use logtree::config::{load_config, ConfigurationSnapshot};
use logtree::observability::logging;
use logtree::{Level, LevelTable, LogManager, RegistrySettings, Shutdown};

#[derive(Parser)]
#[command(name = "logtree")]
#[command(about = "Inspect and exercise hierarchical logging configurations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file and print its resolved directives
    Check { file: PathBuf },
    /// Apply a configuration file and hot-reload it on change
    Watch {
        file: PathBuf,
        /// Seconds between heartbeat records
        #[arg(short, long, default_value_t = 5)]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init(logging::DEFAULT_FILTER);
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { file } => check(&file),
        Commands::Watch { file, interval } => watch(&file, interval).await,
    }
}

fn check(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = load_config(file, &LevelTable::standard())?;
    print_snapshot(&snapshot);
    Ok(())
}

fn print_snapshot(snapshot: &ConfigurationSnapshot) {
    for (name, directive) in snapshot.directives() {
        let label = if name.is_empty() { "<root>" } else { name };
        let level = directive
            .level
            .as_ref()
            .map_or_else(|| "-".to_string(), Level::to_string);
        let handlers = directive
            .handlers
            .as_ref()
            .map_or_else(|| "-".to_string(), |ids| ids.join(","));
        let parents = directive
            .use_parent_handlers
            .map_or_else(|| "-".to_string(), |flag| flag.to_string());
        println!("{label:<30} level={level:<8} handlers={handlers:<20} useParentHandlers={parents}");
    }
    for (id, spec) in snapshot.handler_specs() {
        println!("handler {id}: kind={} options={:?}", spec.kind, spec.options);
    }
}

async fn watch(file: &Path, interval: u64) -> Result<(), Box<dyn std::error::Error>> {
    let levels = LevelTable::standard();
    let initial = load_config(file, &levels)?;
    let manager = Arc::new(LogManager::new(RegistrySettings {
        initial,
        ..RegistrySettings::default()
    }));
    tracing::info!(path = %file.display(), loggers = manager.logger_names().len(), "Configuration loaded");

    let shutdown = Shutdown::new();
    let (watcher, updates) = ConfigWatcher::new(file, levels);
    let _watcher = watcher.run()?;

    let updater = tokio::spawn(apply_updates(Arc::clone(manager.store()), updates, shutdown.subscribe()));

    let mut ticker = time::interval(Duration::from_secs(interval.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => heartbeat(&manager),
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl-C received, shutting down");
                break;
            }
        }
    }

    shutdown.trigger();
    let reloads = updater.await?;
    manager.reset();
    tracing::info!(reloads, "Shutdown complete");
    Ok(())
}

fn heartbeat(manager: &LogManager) {
    let snapshot = manager.registry().snapshot();
    for (name, _) in snapshot.directives() {
        match manager.logger(name) {
            Ok(logger) => logger.info(format!("heartbeat (generation {})", snapshot.generation())),
            Err(e) => tracing::warn!(logger = %name, error = %e, "Skipping logger"),
        }
    }
}
