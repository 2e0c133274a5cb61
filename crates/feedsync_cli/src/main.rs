//! FeedSync CLI
//!
//! Command-line tools for FeedSync cache directories.
//!
//! # Commands
//!
//! - `inspect` - Display record counts, queue and tombstone statistics
//! - `dump-pending` - List queued operations in replay order
//! - `tombstones` - List deleted IDs
//! - `compact-tombstones` - Drop confirmed tombstones past a retention period

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// FeedSync command-line cache tools.
#[derive(Parser)]
#[command(name = "feedsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the cache directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display cache statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List queued operations in replay order
    DumpPending {
        /// Maximum number of entries to list
        #[arg(short, long)]
        limit: Option<usize>,

        /// Include the queued payloads
        #[arg(long)]
        payloads: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List tombstoned IDs
    Tombstones {
        /// Only list tombstones of this collection (posts, comments, ...)
        #[arg(short, long)]
        collection: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Drop remote-confirmed tombstones older than the retention period
    CompactTombstones {
        /// Retention period in days
        #[arg(short, long)]
        retention_days: u64,

        /// Dry run - show what would be removed
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Cache path required for inspect")?;
            commands::inspect::run(&path, &format).await?;
        }
        Commands::DumpPending {
            limit,
            payloads,
            format,
        } => {
            let path = cli.path.ok_or("Cache path required for dump-pending")?;
            commands::dump_pending::run(&path, limit, payloads, &format).await?;
        }
        Commands::Tombstones { collection, format } => {
            let path = cli.path.ok_or("Cache path required for tombstones")?;
            commands::tombstones::run(&path, collection.as_deref(), &format).await?;
        }
        Commands::CompactTombstones {
            retention_days,
            dry_run,
        } => {
            let path = cli.path.ok_or("Cache path required for compact-tombstones")?;
            commands::compact_tombstones::run(&path, retention_days, dry_run).await?;
        }
        Commands::Version => {
            println!("FeedSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("FeedSync Engine v{}", feedsync_engine::VERSION);
        }
    }

    Ok(())
}
