//! Tankobon CLI - Command-line front end for the manga reading engine

mod commands;
mod dump;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tankobon_core::{NoVolumePlacement, ReadingDirection};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Parse and validate chapters per page (must be at least 1)
fn parse_per_page(s: &str) -> Result<usize, String> {
    let n: usize = s.parse().map_err(|_| format!("'{}' is not a valid number", s))?;
    if n < 1 {
        Err("chapters per page must be at least 1".to_string())
    } else {
        Ok(n)
    }
}

#[derive(Parser)]
#[command(name = "tankobon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Reader configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display information about a work dump
    Info {
        /// Work dump file
        dump: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a work's chapter list split into pages
    Paginate {
        /// Work dump file
        dump: PathBuf,

        /// Chapters per page (must be at least 1)
        #[arg(short = 'n', long, value_parser = parse_per_page)]
        per_page: Option<usize>,

        /// Where chapters without a volume go (first, last)
        #[arg(long)]
        no_volume: Option<NoVolumePlacement>,

        /// Only show this page (zero-based)
        #[arg(short, long)]
        page: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Walk through a chapter with navigation steps
    Read {
        /// Work dump file
        dump: PathBuf,

        /// Chapter to open
        #[arg(short, long)]
        chapter: String,

        /// Reading direction (ltr, rtl, vertical)
        #[arg(short, long)]
        direction: Option<ReadingDirection>,

        /// Comma-separated steps: next, prev, page:N, jump:N, close
        #[arg(short, long, value_delimiter = ',')]
        steps: Vec<String>,

        /// Read only pages already in the cache
        #[arg(long)]
        offline: bool,

        /// Cache directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },

    /// Download a chapter's pages into the cache
    Prefetch {
        /// Work dump file
        dump: PathBuf,

        /// Chapter to download
        #[arg(short, long)]
        chapter: String,

        /// Cache directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },

    /// Inspect and maintain the content cache
    Cache {
        /// Cache directory
        #[arg(long, global = true)]
        cache_dir: Option<PathBuf>,

        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show entry count and total size
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List cached keys
    List,

    /// Remove one key
    Evict {
        /// Cache key
        key: String,
    },

    /// Remove every cached page of a chapter
    EvictChapter {
        /// Chapter id
        chapter: String,
    },

    /// Evict oldest entries until the cache fits
    Prune {
        /// Size limit in bytes (defaults to the configured limit)
        max_bytes: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "tankobon_cli=debug,tankobon_core=debug"
    } else {
        "tankobon_cli=info"
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Info { dump, json } => commands::info(&dump, json),

        Commands::Paginate {
            dump,
            per_page,
            no_volume,
            page,
            json,
        } => {
            let mut config = config;
            if let Some(per_page) = per_page {
                config.chapters_per_page = per_page;
            }
            if let Some(placement) = no_volume {
                config.no_volume_placement = placement;
            }
            commands::paginate(&dump, &config, page, json).await
        }

        Commands::Read {
            dump,
            chapter,
            direction,
            steps,
            offline,
            cache_dir,
        } => {
            let mut config = config;
            if let Some(direction) = direction {
                config.direction = direction;
            }
            if let Some(dir) = cache_dir {
                config.cache_dir = dir;
            }
            commands::read(&dump, &chapter, &steps, offline, &config).await
        }

        Commands::Prefetch {
            dump,
            chapter,
            cache_dir,
        } => {
            let mut config = config;
            if let Some(dir) = cache_dir {
                config.cache_dir = dir;
            }
            commands::prefetch(&dump, &chapter, &config).await
        }

        Commands::Cache { cache_dir, action } => {
            let mut config = config;
            if let Some(dir) = cache_dir {
                config.cache_dir = dir;
            }
            let action = match action {
                CacheAction::Stats { json } => commands::CacheCommand::Stats { json },
                CacheAction::List => commands::CacheCommand::List,
                CacheAction::Evict { key } => commands::CacheCommand::Evict(key),
                CacheAction::EvictChapter { chapter } => {
                    commands::CacheCommand::EvictChapter(chapter)
                }
                CacheAction::Prune { max_bytes } => commands::CacheCommand::Prune(max_bytes),
            };
            commands::cache(action, &config).await
        }
    }
}
