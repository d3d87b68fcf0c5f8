//! Work-level catalog service
//!
//! Puts the catalog client, chapter index, paginator and content cache
//! together for the screens that list a work's chapters.

use crate::cache::{cover_key, is_page_of, ContentCache};
use crate::error::Result;
use crate::index::ChapterIndex;
use crate::paginate::{NoVolumePlacement, PaginationCache, Paginator};
use crate::source::{CatalogClient, ChapterFilter};
use crate::types::{ChapterDetail, ChapterId, Page, RawVolume, WorkId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

pub struct WorkCatalog {
    client: Arc<dyn CatalogClient>,
    cache: Arc<ContentCache>,
    paginator: Paginator,
    layouts: PaginationCache,
    details: RwLock<HashMap<ChapterId, ChapterDetail>>,
}

impl WorkCatalog {
    pub fn new(
        client: Arc<dyn CatalogClient>,
        cache: Arc<ContentCache>,
        placement: NoVolumePlacement,
    ) -> Self {
        Self {
            client,
            cache,
            paginator: Paginator::new(placement),
            layouts: PaginationCache::new(),
            details: RwLock::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    /// Volumes of a work with duplicate chapter records merged
    pub async fn volumes(
        &self,
        work_id: &WorkId,
        filter: Option<&ChapterFilter>,
    ) -> Result<Vec<RawVolume>> {
        let records = self.client.volumes(work_id, filter).await?;
        Ok(ChapterIndex::normalize_volumes(&records))
    }

    /// Paginated chapter listing of a work.
    ///
    /// The volume listing is fetched on every call; the layout is reused as
    /// long as the set of chapter ids is unchanged.
    pub async fn pages(&self, work_id: &WorkId, chapters_per_page: usize) -> Result<Arc<Vec<Page>>> {
        let volumes = self.volumes(work_id, None).await?;
        self.layouts
            .get_or_paginate(&self.paginator, work_id, &volumes, chapters_per_page)
    }

    /// Cover art, served from the cache after the first fetch
    pub async fn cover(&self, work_id: &WorkId) -> Result<Vec<u8>> {
        let client = Arc::clone(&self.client);
        let id = work_id.clone();
        self.cache
            .get_or_fetch(&cover_key(work_id), move || async move {
                client.cover_art(&id).await
            })
            .await
    }

    pub async fn chapter_detail(&self, id: &ChapterId) -> Result<ChapterDetail> {
        let known = self.details.read().get(id).cloned();
        if let Some(detail) = known {
            return Ok(detail);
        }
        let detail = self.client.chapter_detail(id).await?;
        self.details.write().insert(id.clone(), detail.clone());
        Ok(detail)
    }

    /// Forget a work: evict its cover and every cached page of `chapters`.
    ///
    /// Returns the number of evicted cache entries.
    pub async fn delete_work(&self, work_id: &WorkId, chapters: &[ChapterDetail]) -> Result<usize> {
        let mut keys = vec![cover_key(work_id)];
        keys.extend(
            self.cache
                .keys()
                .into_iter()
                .filter(|key| chapters.iter().any(|c| is_page_of(key, &c.id))),
        );

        let evicted = self.cache.evict_all(&keys).await?;
        self.layouts.invalidate(work_id);
        {
            let mut details = self.details.write();
            for chapter in chapters {
                details.remove(&chapter.id);
            }
        }
        tracing::info!(work = %work_id, chapters = chapters.len(), evicted, "Deleted work");
        Ok(evicted)
    }
}
