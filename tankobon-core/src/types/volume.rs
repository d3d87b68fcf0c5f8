//! Volume and pagination page types

use super::{Chapter, ChapterNumber, RawChapterRecord};
use serde::{Deserialize, Serialize};

/// A volume as the catalog lists it, chapters not yet deduplicated
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawVolumeRecord {
    /// Volume number string; absent or malformed means "no volume"
    #[serde(default)]
    pub number: Option<String>,

    pub chapters: Vec<RawChapterRecord>,
}

/// Normalized chapters of one volume, in no particular order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawVolume {
    pub number: Option<ChapterNumber>,
    pub chapters: Vec<Chapter>,
}

impl RawVolume {
    pub fn new(number: Option<ChapterNumber>, chapters: Vec<Chapter>) -> Self {
        Self { number, chapters }
    }
}

/// A run of chapters sharing one volume number (or all lacking one)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Volume {
    /// `None` is the "no volume" bucket
    pub number: Option<ChapterNumber>,

    /// Chapters in descending number order, unnumbered first
    pub chapters: Vec<Chapter>,
}

impl Volume {
    pub fn new(number: Option<ChapterNumber>) -> Self {
        Self {
            number,
            chapters: Vec::new(),
        }
    }
}

/// One display page of the chapter list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Page {
    /// Position of this page, starting at zero
    pub index: usize,

    /// Volume fragments on this page, in display order
    pub volumes: Vec<Volume>,
}

impl Page {
    /// Chapters on this page in display order
    pub fn chapters(&self) -> impl Iterator<Item = &Chapter> {
        self.volumes.iter().flat_map(|v| v.chapters.iter())
    }

    pub fn chapter_count(&self) -> usize {
        self.volumes.iter().map(|v| v.chapters.len()).sum()
    }
}
