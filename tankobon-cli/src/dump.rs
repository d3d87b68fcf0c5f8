//! Work dumps: a catalog listing saved as JSON
//!
//! A dump stands in for the remote catalog and the download store. Page
//! images, if any, live next to it as `<pages_dir>/<chapter_id>/<index>`,
//! with the cover art at `<pages_dir>/cover`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tankobon_core::source::{CatalogClient, ChapterStore, FetchResult};
use tankobon_core::{
    ChapterDetail, ChapterFilter, ChapterId, FetchError, RawVolumeRecord, WorkId,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkDump {
    pub work_id: WorkId,

    #[serde(default)]
    pub volumes: Vec<RawVolumeRecord>,

    #[serde(default)]
    pub chapters: Vec<ChapterDetail>,

    /// Image directory, relative to the dump file
    #[serde(default)]
    pub pages_dir: Option<PathBuf>,
}

impl WorkDump {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read work dump: {}", path.display()))?;
        let mut dump: WorkDump = serde_json::from_str(&data)
            .with_context(|| format!("Invalid work dump: {}", path.display()))?;

        if let Some(dir) = &dump.pages_dir {
            if dir.is_relative() {
                let base = path.parent().unwrap_or_else(|| Path::new("."));
                dump.pages_dir = Some(base.join(dir));
            }
        }
        Ok(dump)
    }

    pub fn detail(&self, id: &ChapterId) -> Option<&ChapterDetail> {
        self.chapters.iter().find(|c| c.id == *id)
    }

    fn chapter_dir(&self, id: &ChapterId) -> Option<PathBuf> {
        self.pages_dir.as_ref().map(|dir| dir.join(id.as_str()))
    }

    fn matching(&self, work_id: &WorkId, filter: Option<&ChapterFilter>) -> Vec<ChapterDetail> {
        if *work_id != self.work_id {
            return Vec::new();
        }
        self.chapters
            .iter()
            .filter(|c| filter.map_or(true, |f| f.matches(c)))
            .cloned()
            .collect()
    }
}

/// Serves a [`WorkDump`] through the catalog and store interfaces
pub struct DumpCatalog {
    dump: WorkDump,
}

impl DumpCatalog {
    pub fn new(dump: WorkDump) -> Self {
        Self { dump }
    }

    pub fn dump(&self) -> &WorkDump {
        &self.dump
    }
}

async fn read_image(path: PathBuf) -> FetchResult<Vec<u8>> {
    tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FetchError::Missing(path.display().to_string()),
        _ => FetchError::Other(format!("{}: {}", path.display(), e)),
    })
}

#[async_trait]
impl CatalogClient for DumpCatalog {
    async fn volumes(
        &self,
        work_id: &WorkId,
        filter: Option<&ChapterFilter>,
    ) -> FetchResult<Vec<RawVolumeRecord>> {
        if *work_id != self.dump.work_id {
            return Err(FetchError::Missing(format!("work {}", work_id)));
        }
        let Some(filter) = filter else {
            return Ok(self.dump.volumes.clone());
        };

        // Records without a detail can't be attributed to a translation
        let volumes = self
            .dump
            .volumes
            .iter()
            .map(|volume| RawVolumeRecord {
                number: volume.number.clone(),
                chapters: volume
                    .chapters
                    .iter()
                    .filter(|r| self.dump.detail(&r.id).is_some_and(|d| filter.matches(d)))
                    .cloned()
                    .collect(),
            })
            .filter(|volume| !volume.chapters.is_empty())
            .collect();
        Ok(volumes)
    }

    async fn chapters(
        &self,
        work_id: &WorkId,
        filter: Option<&ChapterFilter>,
    ) -> FetchResult<Vec<ChapterDetail>> {
        Ok(self.dump.matching(work_id, filter))
    }

    async fn chapter_detail(&self, id: &ChapterId) -> FetchResult<ChapterDetail> {
        self.dump
            .detail(id)
            .cloned()
            .ok_or_else(|| FetchError::Missing(format!("chapter {}", id)))
    }

    async fn page_image(&self, chapter_id: &ChapterId, page_index: usize) -> FetchResult<Vec<u8>> {
        let dir = self
            .dump
            .chapter_dir(chapter_id)
            .ok_or_else(|| FetchError::Missing("dump has no pages_dir".to_string()))?;
        read_image(dir.join(page_index.to_string())).await
    }

    async fn cover_art(&self, work_id: &WorkId) -> FetchResult<Vec<u8>> {
        match &self.dump.pages_dir {
            Some(dir) if *work_id == self.dump.work_id => read_image(dir.join("cover")).await,
            _ => Err(FetchError::Missing(format!("cover of {}", work_id))),
        }
    }
}

/// A chapter counts as downloaded when its image directory exists
#[async_trait]
impl ChapterStore for DumpCatalog {
    async fn is_downloaded(&self, id: &ChapterId) -> tankobon_core::Result<bool> {
        Ok(self.dump.detail(id).is_some()
            && self.dump.chapter_dir(id).is_some_and(|dir| dir.is_dir()))
    }

    async fn page_count(&self, id: &ChapterId) -> tankobon_core::Result<Option<u32>> {
        let Some(dir) = self.dump.chapter_dir(id) else {
            return Ok(None);
        };
        if !dir.is_dir() {
            return Ok(None);
        }

        let mut count = 0u32;
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let is_page = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.parse::<usize>().is_ok());
            if is_page {
                count += 1;
            }
        }
        Ok(Some(count))
    }

    async fn detail(&self, id: &ChapterId) -> tankobon_core::Result<Option<ChapterDetail>> {
        Ok(self.dump.detail(id).cloned())
    }

    async fn chapters(
        &self,
        work_id: &WorkId,
        filter: &ChapterFilter,
    ) -> tankobon_core::Result<Vec<ChapterDetail>> {
        Ok(self.dump.matching(work_id, Some(filter)))
    }
}
