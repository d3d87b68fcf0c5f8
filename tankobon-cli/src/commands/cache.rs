//! Cache maintenance command implementation

use super::{format_bytes, open_cache};
use anyhow::{Context, Result};
use tankobon_core::{ChapterId, ReaderConfig};

/// A cache maintenance action
pub enum CacheCommand {
    Stats { json: bool },
    List,
    Evict(String),
    EvictChapter(String),
    Prune(Option<u64>),
}

/// Run a cache maintenance action against the configured cache directory
pub async fn cache(command: CacheCommand, config: &ReaderConfig) -> Result<()> {
    let cache = open_cache(config).await?;

    match command {
        CacheCommand::Stats { json } => {
            let stats = cache.stats().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Directory: {}", config.cache_dir.display());
                println!("Entries:   {}", stats.entries);
                println!("Size:      {}", format_bytes(stats.bytes));
            }
        }
        CacheCommand::List => {
            for entry in cache.entries() {
                println!(
                    "{}\t{}\t{}",
                    entry.key,
                    entry.size,
                    entry.stored_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        CacheCommand::Evict(key) => {
            let present = cache.is_cached(&key);
            cache.evict(&key).await?;
            if present {
                println!("Evicted {}", key);
            } else {
                println!("Not cached: {}", key);
            }
        }
        CacheCommand::EvictChapter(chapter) => {
            let count = cache.evict_chapter(&ChapterId::from(chapter.as_str())).await?;
            println!("Evicted {} pages of chapter {}", count, chapter);
        }
        CacheCommand::Prune(max_bytes) => {
            let max_bytes = max_bytes
                .or(config.max_cache_bytes)
                .context("No size limit given and TANKOBON_MAX_CACHE_BYTES is not set")?;
            let evicted = cache.prune_to(max_bytes).await?;
            for key in &evicted {
                println!("Evicted {}", key);
            }
            println!(
                "Pruned {} entries, {} remaining",
                evicted.len(),
                format_bytes(cache.total_size().await)
            );
        }
    }

    Ok(())
}
