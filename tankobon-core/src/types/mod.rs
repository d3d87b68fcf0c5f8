//! Core data types shared by the index, paginator, navigator and cache

mod chapter;
mod direction;
mod ids;
mod number;
mod volume;

pub use chapter::{Chapter, ChapterDetail, RawChapterRecord};
pub use direction::ReadingDirection;
pub use ids::{ChapterId, GroupId, WorkId};
pub use number::{
    cmp_asc_absent_first, cmp_desc_absent_first, cmp_desc_absent_last, ChapterNumber,
};
pub use volume::{Page, RawVolume, RawVolumeRecord, Volume};
