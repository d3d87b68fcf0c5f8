//! Paginate command implementation

use crate::dump::{DumpCatalog, WorkDump};
use anyhow::{bail, Result};
use std::path::Path;
use std::sync::Arc;
use tankobon_core::storage::MemoryStorage;
use tankobon_core::{ContentCache, Page, ReaderConfig, WorkCatalog};

/// Print a work's chapter list as pages
pub async fn paginate(
    input: &Path,
    config: &ReaderConfig,
    page: Option<usize>,
    json: bool,
) -> Result<()> {
    let dump = WorkDump::load(input)?;
    let work_id = dump.work_id.clone();

    // Layout only; nothing is fetched, so the cache never touches disk
    let cache = ContentCache::open(Arc::new(MemoryStorage::new())).await?;
    let catalog = WorkCatalog::new(
        Arc::new(DumpCatalog::new(dump)),
        Arc::new(cache),
        config.no_volume_placement,
    );
    let pages = catalog.pages(&work_id, config.chapters_per_page).await?;

    let shown: Vec<&Page> = match page {
        Some(index) => match pages.get(index) {
            Some(p) => vec![p],
            None => bail!("Page {} out of range ({} pages)", index, pages.len()),
        },
        None => pages.iter().collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&shown)?);
        return Ok(());
    }

    for p in shown {
        println!("Page {}/{}", p.index + 1, pages.len());
        for volume in &p.volumes {
            match volume.number {
                Some(number) => println!("  Volume {}", number),
                None => println!("  No volume"),
            }
            for chapter in &volume.chapters {
                let number = chapter
                    .number
                    .map(|n| format!("Ch. {}", n))
                    .unwrap_or_else(|| "Extra".to_string());
                if chapter.alternate_ids.is_empty() {
                    println!("    {:<10} {}", number, chapter.primary_id);
                } else {
                    println!(
                        "    {:<10} {} (+{} more)",
                        number,
                        chapter.primary_id,
                        chapter.alternate_ids.len()
                    );
                }
            }
        }
    }

    Ok(())
}
