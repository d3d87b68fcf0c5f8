//! CLI command implementations

mod cache;
mod info;
mod paginate;
mod prefetch;
mod read;

pub use cache::{cache, CacheCommand};
pub use info::info;
pub use paginate::paginate;
pub use prefetch::prefetch;
pub use read::read;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tankobon_core::storage::LocalStorage;
use tankobon_core::{ContentCache, ReaderConfig};

/// Configuration file (if any) overlaid with `TANKOBON_*` variables
pub fn load_config(path: Option<&Path>) -> Result<ReaderConfig> {
    let config = match path {
        Some(path) => ReaderConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => ReaderConfig::default(),
    };
    config
        .with_env(|name| std::env::var(name).ok())
        .context("Invalid TANKOBON_* environment")
}

/// Open the content cache in the configured directory
async fn open_cache(config: &ReaderConfig) -> Result<Arc<ContentCache>> {
    let storage = LocalStorage::new(&config.cache_dir);
    let cache = ContentCache::open(Arc::new(storage))
        .await
        .with_context(|| format!("Failed to open cache at {}", config.cache_dir.display()))?;
    Ok(Arc::new(cache))
}

/// Human-readable byte count
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
