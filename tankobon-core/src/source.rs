//! Where chapter metadata and page images come from
//!
//! [`CatalogClient`] and [`ChapterStore`] are implemented outside this crate
//! (HTTP client, local database). The navigator only sees a
//! [`ContentSource`]: [`RemoteSource`] reads through the catalog and the
//! content cache, [`OfflineSource`] reads downloaded chapters only.

use crate::cache::{page_key, ContentCache};
use crate::error::{FetchError, Result, TankobonError};
use crate::types::{ChapterDetail, ChapterId, GroupId, RawVolumeRecord, WorkId};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Result type for external fetches
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Restricts a chapter listing to one translation
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChapterFilter {
    pub translator_group_id: Option<GroupId>,
    pub language: Option<String>,
}

impl ChapterFilter {
    /// The filter selecting chapters translated like `detail`
    pub fn same_translation(detail: &ChapterDetail) -> Self {
        Self {
            translator_group_id: detail.translator_group_id.clone(),
            language: Some(detail.language.clone()),
        }
    }

    pub fn matches(&self, detail: &ChapterDetail) -> bool {
        self.translator_group_id
            .as_ref()
            .map_or(true, |group| detail.translator_group_id.as_ref() == Some(group))
            && self
                .language
                .as_ref()
                .map_or(true, |language| detail.language == *language)
    }
}

/// Remote catalog of works, chapters and images
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Volume listing of a work with its raw chapter records
    async fn volumes(
        &self,
        work_id: &WorkId,
        filter: Option<&ChapterFilter>,
    ) -> FetchResult<Vec<RawVolumeRecord>>;

    /// Chapter details of a work
    async fn chapters(
        &self,
        work_id: &WorkId,
        filter: Option<&ChapterFilter>,
    ) -> FetchResult<Vec<ChapterDetail>>;

    async fn chapter_detail(&self, id: &ChapterId) -> FetchResult<ChapterDetail>;

    /// Image bytes of one reading page (zero-based, reading order)
    async fn page_image(&self, chapter_id: &ChapterId, page_index: usize) -> FetchResult<Vec<u8>>;

    async fn cover_art(&self, work_id: &WorkId) -> FetchResult<Vec<u8>>;
}

/// Persistent record of downloaded chapters
#[async_trait]
pub trait ChapterStore: Send + Sync {
    async fn is_downloaded(&self, id: &ChapterId) -> Result<bool>;

    /// Page count recorded at download time
    async fn page_count(&self, id: &ChapterId) -> Result<Option<u32>>;

    async fn detail(&self, id: &ChapterId) -> Result<Option<ChapterDetail>>;

    /// Downloaded chapters of a work matching `filter`
    async fn chapters(&self, work_id: &WorkId, filter: &ChapterFilter)
        -> Result<Vec<ChapterDetail>>;
}

/// What a reading session needs from its backing content
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_detail(&self, id: &ChapterId) -> Result<ChapterDetail>;

    /// Chapters of `work_id` translated per `filter`, in any order
    async fn fetch_siblings(
        &self,
        work_id: &WorkId,
        filter: &ChapterFilter,
    ) -> Result<Vec<ChapterDetail>>;

    /// Bytes of one page, `page_index` in reading order
    async fn fetch_page(&self, chapter: &ChapterDetail, page_index: usize) -> Result<Vec<u8>>;
}

fn check_page(chapter: &ChapterDetail, page_index: usize) -> Result<()> {
    if let Some(url) = &chapter.external_url {
        return Err(TankobonError::NotReadable {
            id: chapter.id.to_string(),
            url: url.clone(),
        });
    }
    if page_index >= chapter.page_count as usize {
        return Err(TankobonError::NotFound(format!(
            "page {} of chapter {} ({} pages)",
            page_index, chapter.id, chapter.page_count
        )));
    }
    Ok(())
}

/// Online source: catalog for metadata, content cache in front of images
pub struct RemoteSource {
    catalog: Arc<dyn CatalogClient>,
    cache: Arc<ContentCache>,
    details: RwLock<HashMap<ChapterId, ChapterDetail>>,
}

impl RemoteSource {
    pub fn new(catalog: Arc<dyn CatalogClient>, cache: Arc<ContentCache>) -> Self {
        Self {
            catalog,
            cache,
            details: RwLock::new(HashMap::new()),
        }
    }

    fn remember(&self, detail: &ChapterDetail) {
        self.details
            .write()
            .entry(detail.id.clone())
            .or_insert_with(|| detail.clone());
    }
}

#[async_trait]
impl ContentSource for RemoteSource {
    async fn fetch_detail(&self, id: &ChapterId) -> Result<ChapterDetail> {
        let cached = self.details.read().get(id).cloned();
        if let Some(detail) = cached {
            return Ok(detail);
        }
        let detail = self.catalog.chapter_detail(id).await?;
        self.remember(&detail);
        Ok(detail)
    }

    async fn fetch_siblings(
        &self,
        work_id: &WorkId,
        filter: &ChapterFilter,
    ) -> Result<Vec<ChapterDetail>> {
        let chapters = self.catalog.chapters(work_id, Some(filter)).await?;
        let siblings: Vec<ChapterDetail> =
            chapters.into_iter().filter(|c| filter.matches(c)).collect();
        for sibling in &siblings {
            self.remember(sibling);
        }
        tracing::debug!(work = %work_id, count = siblings.len(), "Fetched sibling chapters");
        Ok(siblings)
    }

    async fn fetch_page(&self, chapter: &ChapterDetail, page_index: usize) -> Result<Vec<u8>> {
        check_page(chapter, page_index)?;
        let catalog = Arc::clone(&self.catalog);
        let chapter_id = chapter.id.clone();
        self.cache
            .get_or_fetch(&page_key(&chapter.id, page_index), move || async move {
                catalog.page_image(&chapter_id, page_index).await
            })
            .await
    }
}

/// Offline source: downloaded chapters and cached pages, never the network
pub struct OfflineSource {
    store: Arc<dyn ChapterStore>,
    cache: Arc<ContentCache>,
}

impl OfflineSource {
    pub fn new(store: Arc<dyn ChapterStore>, cache: Arc<ContentCache>) -> Self {
        Self { store, cache }
    }

    /// The store's page count wins over whatever the detail says
    async fn trusted(&self, mut detail: ChapterDetail) -> Result<ChapterDetail> {
        if let Some(page_count) = self.store.page_count(&detail.id).await? {
            if page_count != detail.page_count {
                tracing::debug!(
                    chapter = %detail.id,
                    listed = detail.page_count,
                    stored = page_count,
                    "Using stored page count"
                );
            }
            detail.page_count = page_count;
        }
        Ok(detail)
    }

    async fn downloaded(&self, detail: ChapterDetail) -> Result<Option<ChapterDetail>> {
        if self.store.is_downloaded(&detail.id).await? {
            self.trusted(detail).await.map(Some)
        } else {
            Ok(None)
        }
    }
}

#[async_trait]
impl ContentSource for OfflineSource {
    async fn fetch_detail(&self, id: &ChapterId) -> Result<ChapterDetail> {
        if !self.store.is_downloaded(id).await? {
            return Err(TankobonError::NotFound(format!("chapter {} is not downloaded", id)));
        }
        let detail = self
            .store
            .detail(id)
            .await?
            .ok_or_else(|| TankobonError::NotFound(format!("chapter {}", id)))?;
        self.trusted(detail).await
    }

    async fn fetch_siblings(
        &self,
        work_id: &WorkId,
        filter: &ChapterFilter,
    ) -> Result<Vec<ChapterDetail>> {
        let listed = self.store.chapters(work_id, filter).await?;
        let checked =
            futures::future::try_join_all(listed.into_iter().map(|detail| self.downloaded(detail)))
                .await?;
        Ok(checked.into_iter().flatten().collect())
    }

    async fn fetch_page(&self, chapter: &ChapterDetail, page_index: usize) -> Result<Vec<u8>> {
        check_page(chapter, page_index)?;
        let key = page_key(&chapter.id, page_index);
        self.cache
            .get(&key)
            .await?
            .ok_or_else(|| TankobonError::NotFound(format!("page {} is not downloaded", key)))
    }
}
