//! Tankobon Core Library
//!
//! This crate provides the reading engine of the Tankobon manga reader:
//! chapter deduplication, volume/page layout of a work's chapter list, the
//! chapter-to-chapter reading navigator and the on-disk content cache for
//! cover art and page images. Networking and persistence of downloads are
//! left to implementations of [`CatalogClient`] and [`ChapterStore`].

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod index;
pub mod navigator;
pub mod paginate;
pub mod source;
pub mod storage;
pub mod types;

pub use cache::{CacheEntry, CacheStats, ContentCache};
pub use catalog::WorkCatalog;
pub use config::ReaderConfig;
pub use error::{FetchError, Result, StorageError, TankobonError};
pub use index::ChapterIndex;
pub use navigator::{EndReason, NavEvent, NavOutcome, NavState, ReadingNavigator, SessionEnd};
pub use paginate::{NoVolumePlacement, PaginationCache, Paginator};
pub use source::{
    CatalogClient, ChapterFilter, ChapterStore, ContentSource, OfflineSource, RemoteSource,
};
pub use types::{
    Chapter, ChapterDetail, ChapterId, ChapterNumber, GroupId, Page, RawChapterRecord, RawVolume,
    RawVolumeRecord, ReadingDirection, Volume, WorkId,
};
