//! Volume/page layout of a work's chapter list
//!
//! [`Paginator::paginate`] sorts volumes and chapters, flattens them into one
//! list, cuts it into fixed-size pages and regroups each page into volume
//! fragments. A volume cut by a page boundary appears on both pages.

use crate::error::{Result, TankobonError};
use crate::types::{
    cmp_desc_absent_first, cmp_desc_absent_last, Chapter, ChapterId, ChapterNumber, Page,
    RawVolume, Volume, WorkId,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// Where the "no volume" bucket goes relative to numbered volumes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum NoVolumePlacement {
    /// Uncollected chapters lead the list, ahead of the highest volume
    #[default]
    First,

    /// Uncollected chapters trail the lowest volume
    Last,
}

impl NoVolumePlacement {
    fn compare(self, a: Option<ChapterNumber>, b: Option<ChapterNumber>) -> Ordering {
        match self {
            NoVolumePlacement::First => cmp_desc_absent_first(a, b),
            NoVolumePlacement::Last => cmp_desc_absent_last(a, b),
        }
    }
}

impl FromStr for NoVolumePlacement {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "first" => Ok(NoVolumePlacement::First),
            "last" => Ok(NoVolumePlacement::Last),
            other => Err(format!("unknown no-volume placement '{}'", other)),
        }
    }
}

/// Where a chapter sits inside a page list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLocation {
    pub page: usize,
    pub volume: usize,
    pub chapter: usize,
}

/// Splits volume listings into display pages
#[derive(Debug, Clone, Copy, Default)]
pub struct Paginator {
    placement: NoVolumePlacement,
}

impl Paginator {
    pub fn new(placement: NoVolumePlacement) -> Self {
        Self { placement }
    }

    pub fn placement(&self) -> NoVolumePlacement {
        self.placement
    }

    /// Lay out `volumes` as pages of `chapters_per_page` chapters.
    ///
    /// Empty input yields no pages. `chapters_per_page == 0` is a
    /// configuration error.
    pub fn paginate(&self, volumes: &[RawVolume], chapters_per_page: usize) -> Result<Vec<Page>> {
        if chapters_per_page == 0 {
            return Err(TankobonError::Configuration(
                "chapters_per_page must be at least 1".to_string(),
            ));
        }

        let flat = self.flatten(volumes);
        let pages = flat
            .chunks(chapters_per_page)
            .enumerate()
            .map(|(index, chunk)| Page {
                index,
                volumes: segment(chunk),
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            chapters = flat.len(),
            pages = pages.len(),
            chapters_per_page,
            "Paginated chapter list"
        );
        Ok(pages)
    }

    /// Sorted `(chapter, volume number)` pairs in display order.
    ///
    /// One stable sort over the whole listing, so input volumes that parse to
    /// the same number (`"2"` and `"2.0"`, absent and malformed) merge into
    /// one correctly ordered run.
    fn flatten<'a>(&self, volumes: &'a [RawVolume]) -> Vec<(&'a Chapter, Option<ChapterNumber>)> {
        let mut flat: Vec<(&Chapter, Option<ChapterNumber>)> = volumes
            .iter()
            .flat_map(|volume| volume.chapters.iter().map(move |c| (c, volume.number)))
            .collect();
        flat.sort_by(|(a, a_volume), (b, b_volume)| {
            self.placement
                .compare(*a_volume, *b_volume)
                .then_with(|| cmp_desc_absent_first(a.number, b.number))
        });
        flat
    }

    /// Find a chapter (by any of its ids) in a page list
    pub fn locate(pages: &[Page], id: &ChapterId) -> Option<PageLocation> {
        pages.iter().enumerate().find_map(|(page, p)| {
            p.volumes.iter().enumerate().find_map(|(volume, v)| {
                v.chapters
                    .iter()
                    .position(|c| c.contains(id))
                    .map(|chapter| PageLocation {
                        page,
                        volume,
                        chapter,
                    })
            })
        })
    }
}

/// Regroup one chunk into runs of equal volume number
fn segment(chunk: &[(&Chapter, Option<ChapterNumber>)]) -> Vec<Volume> {
    let mut volumes: Vec<Volume> = Vec::new();
    for (chapter, number) in chunk {
        match volumes.last_mut() {
            Some(current) if current.number == *number => current.chapters.push((*chapter).clone()),
            _ => {
                let mut volume = Volume::new(*number);
                volume.chapters.push((*chapter).clone());
                volumes.push(volume);
            }
        }
    }
    volumes
}

/// SHA-256 over the sorted set of every chapter id in the listing
pub fn fingerprint(volumes: &[RawVolume]) -> String {
    let mut ids: Vec<&str> = volumes
        .iter()
        .flat_map(|v| v.chapters.iter())
        .flat_map(|c| c.ids())
        .map(ChapterId::as_str)
        .collect();
    ids.sort_unstable();
    ids.dedup();

    let mut hasher = Sha256::new();
    for id in ids {
        hasher.update(id.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoKey {
    work_id: WorkId,
    chapters_per_page: usize,
    placement: NoVolumePlacement,
    fingerprint: String,
}

/// Memoized pagination keyed by work, page size and chapter-set fingerprint
#[derive(Debug, Default)]
pub struct PaginationCache {
    pages: RwLock<HashMap<MemoKey, Arc<Vec<Page>>>>,
}

impl PaginationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paginate, reusing the previous layout when the chapter set is unchanged
    pub fn get_or_paginate(
        &self,
        paginator: &Paginator,
        work_id: &WorkId,
        volumes: &[RawVolume],
        chapters_per_page: usize,
    ) -> Result<Arc<Vec<Page>>> {
        let key = MemoKey {
            work_id: work_id.clone(),
            chapters_per_page,
            placement: paginator.placement(),
            fingerprint: fingerprint(volumes),
        };

        if let Some(pages) = self.pages.read().get(&key) {
            tracing::debug!(work = %work_id, "Pagination memo hit");
            return Ok(Arc::clone(pages));
        }

        let pages = Arc::new(paginator.paginate(volumes, chapters_per_page)?);
        let mut memo = self.pages.write();
        // One layout per work: a changed chapter set replaces the stale one
        memo.retain(|k, _| k.work_id != *work_id);
        memo.insert(key, Arc::clone(&pages));
        Ok(pages)
    }

    /// Drop the memoized layouts of a work
    pub fn invalidate(&self, work_id: &WorkId) {
        self.pages.write().retain(|k, _| k.work_id != *work_id);
    }

    pub fn len(&self) -> usize {
        self.pages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(id: &str, number: u32) -> Chapter {
        Chapter::new(id, Some(ChapterNumber::from(number)))
    }

    fn volume(number: Option<u32>, chapters: Vec<Chapter>) -> RawVolume {
        RawVolume::new(number.map(ChapterNumber::from), chapters)
    }

    #[test]
    fn test_zero_page_size_is_configuration_error() {
        let err = Paginator::default().paginate(&[], 0).unwrap_err();
        assert!(matches!(err, TankobonError::Configuration(_)));
    }

    #[test]
    fn test_empty_input_yields_no_pages() {
        assert!(Paginator::default().paginate(&[], 5).unwrap().is_empty());
    }

    #[test]
    fn test_straddling_volume_is_split() {
        let volumes = vec![
            volume(Some(2), vec![chapter("c4", 4), chapter("c3", 3)]),
            volume(Some(1), vec![chapter("c1", 1), chapter("c2", 2)]),
        ];
        let pages = Paginator::default().paginate(&volumes, 3).unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].volumes.len(), 2);
        assert_eq!(pages[0].volumes[1].number, Some(ChapterNumber::from(1)));
        assert_eq!(pages[0].volumes[1].chapters[0].primary_id.as_str(), "c2");
        assert_eq!(pages[1].index, 1);
        assert_eq!(pages[1].volumes[0].number, Some(ChapterNumber::from(1)));
        assert_eq!(pages[1].volumes[0].chapters[0].primary_id.as_str(), "c1");
    }

    #[test]
    fn test_volumes_with_equal_numbers_merge_sorted() {
        let volumes = vec![
            volume(None, vec![chapter("c5", 5)]),
            volume(Some(2), vec![chapter("c3", 3)]),
            volume(None, vec![chapter("c9", 9)]),
            volume(Some(2), vec![chapter("c4", 4)]),
        ];
        let pages = Paginator::default().paginate(&volumes, 10).unwrap();

        assert_eq!(pages[0].volumes.len(), 2);
        let ids: Vec<Vec<&str>> = pages[0]
            .volumes
            .iter()
            .map(|v| v.chapters.iter().map(|c| c.primary_id.as_str()).collect())
            .collect();
        assert_eq!(ids, vec![vec!["c9", "c5"], vec!["c4", "c3"]]);
    }

    #[test]
    fn test_locate_by_alternate_id() {
        let volumes = vec![volume(
            Some(1),
            vec![chapter("c2", 2), chapter("c1", 1).with_alternates(["c1-alt"])],
        )];
        let pages = Paginator::default().paginate(&volumes, 1).unwrap();

        let location = Paginator::locate(&pages, &"c1-alt".into()).unwrap();
        assert_eq!(location.page, 1);
        assert_eq!(location.chapter, 0);
        assert!(Paginator::locate(&pages, &"nope".into()).is_none());
    }

    #[test]
    fn test_fingerprint_ignores_order() {
        let a = vec![volume(Some(1), vec![chapter("x", 1), chapter("y", 2)])];
        let b = vec![volume(None, vec![chapter("y", 2)]), volume(Some(1), vec![chapter("x", 1)])];
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&[]));
    }

    #[test]
    fn test_memo_reuses_and_replaces() {
        let cache = PaginationCache::new();
        let paginator = Paginator::default();
        let work = WorkId::from("w");
        let volumes = vec![volume(Some(1), vec![chapter("x", 1)])];

        let first = cache.get_or_paginate(&paginator, &work, &volumes, 10).unwrap();
        let second = cache.get_or_paginate(&paginator, &work, &volumes, 10).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let grown = vec![volume(Some(1), vec![chapter("x", 1), chapter("y", 2)])];
        let third = cache.get_or_paginate(&paginator, &work, &grown, 10).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(cache.len(), 1);

        cache.invalidate(&work);
        assert!(cache.is_empty());
    }
}
