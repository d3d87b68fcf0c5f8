//! Cache key construction
//!
//! Every subsystem that touches the cache (prefetch, deletion, thumbnails)
//! builds keys through these functions so they agree on membership.

use crate::types::{ChapterId, WorkId};

/// Key of a work's cover art: `cover-{work_id}`
pub fn cover_key(work_id: &WorkId) -> String {
    format!("cover-{}", work_id)
}

/// Key of one reading page: `{chapter_id}-{page_index}`
pub fn page_key(chapter_id: &ChapterId, page_index: usize) -> String {
    format!("{}-{}", chapter_id, page_index)
}

/// Keys of every page of a chapter
pub fn chapter_page_keys(chapter_id: &ChapterId, page_count: u32) -> Vec<String> {
    (0..page_count as usize)
        .map(|index| page_key(chapter_id, index))
        .collect()
}

/// Whether `key` is a page key owned by `chapter_id`
pub fn is_page_of(key: &str, chapter_id: &ChapterId) -> bool {
    key.strip_prefix(chapter_id.as_str())
        .and_then(|rest| rest.strip_prefix('-'))
        .map(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}
