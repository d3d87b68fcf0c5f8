//! Read command implementation

use super::open_cache;
use crate::dump::{DumpCatalog, WorkDump};
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tankobon_core::source::ContentSource;
use tankobon_core::{
    ChapterId, ChapterNumber, NavOutcome, NavState, OfflineSource, ReaderConfig,
    ReadingNavigator, RemoteSource,
};

/// One navigation step from the command line
#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    Next,
    Previous,
    Page(i64),
    Jump(ChapterNumber),
    Close,
}

fn parse_step(raw: &str) -> Result<Step> {
    let raw = raw.trim();
    let step = match raw.split_once(':') {
        None => match raw {
            "next" => Step::Next,
            "prev" | "previous" => Step::Previous,
            "close" => Step::Close,
            _ => bail!("Unknown step '{}'", raw),
        },
        Some(("page", index)) => Step::Page(
            index
                .parse()
                .with_context(|| format!("Invalid page in step '{}'", raw))?,
        ),
        Some(("jump", number)) => Step::Jump(
            ChapterNumber::parse(number)
                .with_context(|| format!("Invalid chapter number in step '{}'", raw))?,
        ),
        Some(_) => bail!("Unknown step '{}'", raw),
    };
    Ok(step)
}

/// Open a chapter and replay navigation steps, printing each state
pub async fn read(
    input: &Path,
    chapter: &str,
    steps: &[String],
    offline: bool,
    config: &ReaderConfig,
) -> Result<()> {
    let steps = steps
        .iter()
        .map(|s| parse_step(s))
        .collect::<Result<Vec<_>>>()?;

    let dump = WorkDump::load(input)?;
    let cache = open_cache(config).await?;
    let catalog = Arc::new(DumpCatalog::new(dump));
    let source: Arc<dyn ContentSource> = if offline {
        Arc::new(OfflineSource::new(catalog, cache))
    } else {
        Arc::new(RemoteSource::new(catalog, cache))
    };

    let navigator = ReadingNavigator::new(source, config.prefetch_ahead);
    let outcome = navigator
        .open(&ChapterId::from(chapter), config.direction)
        .await
        .with_context(|| format!("Failed to open chapter {}", chapter))?;
    print_state("open", &outcome.state);

    for step in steps {
        if let Err(e) = navigator.siblings_ready().await {
            tracing::debug!("Sibling chapters unavailable: {}", e);
        }
        let result: tankobon_core::Result<NavOutcome> = match step {
            Step::Next => navigator.next_chapter().await,
            Step::Previous => navigator.previous_chapter().await,
            Step::Page(index) => navigator.change_page(index).await,
            Step::Jump(number) => navigator.jump_to_chapter(number).await,
            Step::Close => navigator.close().await,
        };
        let label = match step {
            Step::Next => "next".to_string(),
            Step::Previous => "prev".to_string(),
            Step::Page(index) => format!("page:{}", index),
            Step::Jump(number) => format!("jump:{}", number),
            Step::Close => "close".to_string(),
        };
        match result {
            Ok(outcome) => print_state(&label, &outcome.state),
            Err(e) => println!("{:<8} error: {}", label, e),
        }
    }

    // A sibling fetch can end the session between steps
    match navigator.snapshot().await {
        Some(NavState::Ended(end)) if end.is_error() => {
            bail!("Reading session failed: {}", end.reason)
        }
        _ => Ok(()),
    }
}

fn print_state(label: &str, state: &NavState) {
    match state {
        NavState::Reading(session) => {
            let chapter = session.current_chapter();
            let number = chapter
                .number
                .map(|n| format!("ch. {}", n))
                .unwrap_or_else(|| "extra".to_string());
            match session.logical_page(session.current_page_index()) {
                Some(page) => println!(
                    "{:<8} {} ({}) page {}/{}",
                    label,
                    chapter.id,
                    number,
                    page + 1,
                    chapter.page_count
                ),
                None => println!("{:<8} {} ({}) no pages", label, chapter.id, number),
            }
        }
        NavState::Ended(end) => println!("{:<8} ended: {}", label, end.reason),
    }
}
