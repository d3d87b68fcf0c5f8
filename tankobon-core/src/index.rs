//! Chapter deduplication
//!
//! The catalog lists one record per translation, so a chapter translated by
//! three groups shows up three times. [`ChapterIndex::normalize`] folds those
//! records into one logical [`Chapter`] per chapter number.

use crate::types::{
    cmp_desc_absent_first, Chapter, ChapterId, ChapterNumber, RawChapterRecord, RawVolume,
    RawVolumeRecord,
};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Normalizes raw chapter records into logical chapters
#[derive(Debug, Default, Clone, Copy)]
pub struct ChapterIndex;

impl ChapterIndex {
    /// Group records by chapter number.
    ///
    /// Within a group the lexicographically last id becomes the primary id.
    /// Unnumbered records are never merged with each other. An id seen twice
    /// keeps its first placement. Output is sorted descending by number with
    /// unnumbered chapters first.
    pub fn normalize(records: &[RawChapterRecord]) -> Vec<Chapter> {
        let mut seen: HashSet<&ChapterId> = HashSet::with_capacity(records.len());
        let mut numbered: BTreeMap<ChapterNumber, BTreeSet<ChapterId>> = BTreeMap::new();
        let mut unnumbered: Vec<Chapter> = Vec::new();

        for record in records {
            if !seen.insert(&record.id) {
                tracing::debug!(id = %record.id, "Skipping duplicate chapter record");
                continue;
            }
            match ChapterNumber::parse_opt(record.number.as_deref()) {
                Some(number) => {
                    numbered.entry(number).or_default().insert(record.id.clone());
                }
                None => unnumbered.push(Chapter::new(record.id.clone(), None)),
            }
        }

        let mut chapters: Vec<Chapter> = numbered
            .into_iter()
            .filter_map(|(number, mut ids)| {
                let primary = ids.pop_last()?;
                Some(Chapter {
                    primary_id: primary,
                    alternate_ids: ids,
                    number: Some(number),
                })
            })
            .collect();

        unnumbered.sort_by(|a, b| a.primary_id.cmp(&b.primary_id));
        chapters.extend(unnumbered);
        chapters.sort_by(|a, b| cmp_desc_absent_first(a.number, b.number));
        chapters
    }

    /// Normalize every volume of a catalog listing
    pub fn normalize_volumes(records: &[RawVolumeRecord]) -> Vec<RawVolume> {
        records
            .iter()
            .map(|volume| {
                RawVolume::new(
                    ChapterNumber::parse_opt(volume.number.as_deref()),
                    Self::normalize(&volume.chapters),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, number: Option<&str>) -> RawChapterRecord {
        RawChapterRecord::new(id, number)
    }

    #[test]
    fn test_merges_translations_of_same_number() {
        let chapters = ChapterIndex::normalize(&[
            record("a", Some("1")),
            record("c", Some("1.0")),
            record("b", Some("1,0")),
            record("d", Some("2")),
        ]);

        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].primary_id.as_str(), "d");
        assert_eq!(chapters[1].primary_id.as_str(), "c");
        let alternates: Vec<&str> = chapters[1].alternate_ids.iter().map(|i| i.as_str()).collect();
        assert_eq!(alternates, vec!["a", "b"]);
    }

    #[test]
    fn test_unnumbered_never_merge_and_sort_first() {
        let chapters = ChapterIndex::normalize(&[
            record("x", Some("3")),
            record("oneshot-b", None),
            record("oneshot-a", Some("not a number")),
        ]);

        assert_eq!(chapters.len(), 3);
        assert!(chapters[0].number.is_none());
        assert!(chapters[1].number.is_none());
        assert_eq!(chapters[0].primary_id.as_str(), "oneshot-a");
        assert_eq!(chapters[2].primary_id.as_str(), "x");
    }

    #[test]
    fn test_duplicate_id_keeps_first_placement() {
        let chapters = ChapterIndex::normalize(&[record("a", Some("1")), record("a", Some("2"))]);

        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].number, ChapterNumber::parse("1"));
    }

    #[test]
    fn test_empty_input() {
        assert!(ChapterIndex::normalize(&[]).is_empty());
    }

    #[test]
    fn test_normalize_volumes_parses_numbers() {
        let volumes = ChapterIndex::normalize_volumes(&[
            RawVolumeRecord {
                number: Some("2".into()),
                chapters: vec![record("a", Some("5"))],
            },
            RawVolumeRecord {
                number: Some("none".into()),
                chapters: vec![record("b", Some("9"))],
            },
        ]);

        assert_eq!(volumes[0].number, ChapterNumber::parse("2"));
        assert_eq!(volumes[1].number, None);
        assert_eq!(volumes[1].chapters[0].primary_id.as_str(), "b");
    }
}
