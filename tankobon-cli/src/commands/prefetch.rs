//! Prefetch command implementation

use super::{format_bytes, open_cache};
use crate::dump::{DumpCatalog, WorkDump};
use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tankobon_core::source::ContentSource;
use tankobon_core::{ChapterId, ReaderConfig, RemoteSource, WorkCatalog};

/// Fill the cache with every page of a chapter, plus the work's cover
pub async fn prefetch(input: &Path, chapter: &str, config: &ReaderConfig) -> Result<()> {
    let dump = WorkDump::load(input)?;
    let work_id = dump.work_id.clone();
    let cache = open_cache(config).await?;
    let client = Arc::new(DumpCatalog::new(dump));
    let catalog = WorkCatalog::new(client.clone(), cache.clone(), config.no_volume_placement);

    let detail = catalog
        .chapter_detail(&ChapterId::from(chapter))
        .await
        .with_context(|| format!("Unknown chapter: {}", chapter))?;
    if let Some(url) = &detail.external_url {
        bail!("Chapter {} is hosted externally at {}", chapter, url);
    }

    let source = RemoteSource::new(client, cache.clone());
    let pb = ProgressBar::new(u64::from(detail.page_count));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>4}/{len:4} {msg}")
            .unwrap()
            .progress_chars("##-"),
    );
    pb.set_message(detail.id.to_string());

    for page in 0..detail.page_count as usize {
        if let Err(e) = source.fetch_page(&detail, page).await {
            pb.abandon_with_message("failed");
            return Err(e).with_context(|| format!("Failed to fetch page {} of {}", page, chapter));
        }
        pb.inc(1);
    }
    pb.finish_with_message("done");

    if let Err(e) = catalog.cover(&work_id).await {
        tracing::debug!(work = %work_id, "No cover art cached: {}", e);
    }

    if let Some(max_bytes) = config.max_cache_bytes {
        let evicted = cache.prune_to(max_bytes).await?;
        if !evicted.is_empty() {
            println!("Pruned {} entries to stay under {}", evicted.len(), format_bytes(max_bytes));
        }
    }

    let stats = cache.stats().await;
    println!(
        "Cached {} pages of chapter {} ({} entries, {} total)",
        detail.page_count,
        detail.id,
        stats.entries,
        format_bytes(stats.bytes)
    );
    Ok(())
}
