//! Chapter types: raw catalog records, logical chapters and per-translation detail

use super::{ChapterId, ChapterNumber, GroupId, WorkId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A chapter record as the catalog lists it, before deduplication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawChapterRecord {
    /// Id of this translated instance
    pub id: ChapterId,

    /// Chapter number as the catalog spells it (may use `,` as decimal separator)
    #[serde(default)]
    pub number: Option<String>,
}

impl RawChapterRecord {
    pub fn new(id: impl Into<ChapterId>, number: Option<&str>) -> Self {
        Self {
            id: id.into(),
            number: number.map(str::to_string),
        }
    }
}

/// A logical chapter: every translation sharing one chapter number
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Chapter {
    /// The id used when one id must stand for the whole chapter
    pub primary_id: ChapterId,

    /// Other translations of the same numbered chapter
    pub alternate_ids: BTreeSet<ChapterId>,

    /// Chapter ordinal; `None` for oneshots and unnumbered extras
    pub number: Option<ChapterNumber>,
}

impl Chapter {
    /// Create a chapter with no alternates
    pub fn new(primary_id: impl Into<ChapterId>, number: Option<ChapterNumber>) -> Self {
        Self {
            primary_id: primary_id.into(),
            alternate_ids: BTreeSet::new(),
            number,
        }
    }

    /// Add alternate translation ids
    pub fn with_alternates<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ChapterId>,
    {
        self.alternate_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Primary id followed by the alternates
    pub fn ids(&self) -> impl Iterator<Item = &ChapterId> {
        std::iter::once(&self.primary_id).chain(self.alternate_ids.iter())
    }

    /// Whether `id` names any translation of this chapter
    pub fn contains(&self, id: &ChapterId) -> bool {
        self.primary_id == *id || self.alternate_ids.contains(id)
    }

    /// Express this chapter as raw records again, one per id
    pub fn to_records(&self) -> Vec<RawChapterRecord> {
        let number = self.number.map(|n| n.to_string());
        self.ids()
            .map(|id| RawChapterRecord {
                id: id.clone(),
                number: number.clone(),
            })
            .collect()
    }
}

/// Full metadata for one translated instance of a chapter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChapterDetail {
    pub id: ChapterId,

    /// Work this chapter belongs to
    pub work_id: WorkId,

    #[serde(default)]
    pub number: Option<ChapterNumber>,

    #[serde(default)]
    pub volume_number: Option<ChapterNumber>,

    /// Group that produced this translation
    #[serde(default)]
    pub translator_group_id: Option<GroupId>,

    /// Translation language code
    #[serde(default = "default_language")]
    pub language: String,

    /// Number of reading pages (images)
    #[serde(default)]
    pub page_count: u32,

    /// Set when the chapter is only readable on an external site
    #[serde(default)]
    pub external_url: Option<String>,
}

fn default_language() -> String {
    "en".to_string()
}

impl ChapterDetail {
    pub fn new(id: impl Into<ChapterId>, work_id: impl Into<WorkId>) -> Self {
        Self {
            id: id.into(),
            work_id: work_id.into(),
            number: None,
            volume_number: None,
            translator_group_id: None,
            language: default_language(),
            page_count: 0,
            external_url: None,
        }
    }

    pub fn with_number(mut self, number: impl Into<ChapterNumber>) -> Self {
        self.number = Some(number.into());
        self
    }

    pub fn with_volume(mut self, volume: impl Into<ChapterNumber>) -> Self {
        self.volume_number = Some(volume.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<GroupId>) -> Self {
        self.translator_group_id = Some(group.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_pages(mut self, page_count: u32) -> Self {
        self.page_count = page_count;
        self
    }

    pub fn with_external_url(mut self, url: impl Into<String>) -> Self {
        self.external_url = Some(url.into());
        self
    }

    /// Whether the pages can be read in-app
    pub fn is_readable(&self) -> bool {
        self.external_url.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chapter_ids_and_records() {
        let chapter = Chapter::new("b", ChapterNumber::parse("4,5")).with_alternates(["a"]);

        let ids: Vec<&str> = chapter.ids().map(ChapterId::as_str).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(chapter.contains(&"a".into()));
        assert!(!chapter.contains(&"c".into()));

        let records = chapter.to_records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.number.as_deref() == Some("4.5")));
    }

    #[test]
    fn test_detail_readability() {
        let detail = ChapterDetail::new("c1", "w1").with_pages(20);
        assert!(detail.is_readable());
        assert!(!detail.with_external_url("https://example.com/c1").is_readable());
    }
}
