//! Command-line front end over the `seek` library. Installs the process-wide
//! tracing subscriber; the library itself never does this.

use clap::{Parser, Subcommand};
use seek::config::Config;
use seek::{default_progress_callback, default_store_path, SeekApp};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "seek-cli", about = "Desktop-local file search index")]
struct Cli {
    /// Path to the index database. Defaults to the platform app-data location.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Path to a TOML config file overriding default tuning.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a full index of the given roots.
    Index {
        #[arg(required = true)]
        roots: Vec<PathBuf>,
    },
    /// Run a query against the index and print matching paths.
    Search {
        query: String,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Start live monitoring on the given roots and block until Enter is pressed.
    Watch {
        #[arg(required = true)]
        roots: Vec<PathBuf>,
    },
    /// Print index status (indexed?, file count, size on disk).
    Status,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let db_path = match &cli.db {
        Some(path) => path.clone(),
        None => default_store_path()?,
    };
    let app = SeekApp::open(&db_path, config)?;

    match cli.command {
        Command::Index { roots } => {
            let stats = app.perform_full_indexing(roots, default_progress_callback())?;
            println!(
                "indexed {} entries ({:.1}/s)",
                stats.total_processed.load(std::sync::atomic::Ordering::Relaxed),
                stats.processed_per_second()
            );
        }
        Command::Search { query, limit } => {
            let result = app.search(&query, limit)?;
            for entry in &result.entries {
                println!("{}", entry.full_path);
            }
            eprintln!(
                "{} results in {:.4}s",
                result.entries.len(),
                result.search_time_seconds
            );
        }
        Command::Watch { roots } => {
            app.start_monitoring_with_recovery(roots)?;
            println!("watching for changes, press Enter to stop");
            wait_for_enter();
            app.stop_monitoring();
        }
        Command::Status => {
            let status = app.indexing_status()?;
            let stats = app.search_stats()?;
            println!("indexed: {}", status.is_indexed);
            println!("file_count: {}", stats.total_files);
            println!("index_size_bytes: {}", stats.index_size_bytes);
        }
    }

    Ok(())
}

fn wait_for_enter() {
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);
}
