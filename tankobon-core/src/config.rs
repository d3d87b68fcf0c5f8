//! Reader configuration
//!
//! Defaults, optionally overlaid by a JSON file and then by `TANKOBON_*`
//! environment variables.

use crate::error::{Result, TankobonError};
use crate::paginate::NoVolumePlacement;
use crate::types::ReadingDirection;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ENV_CACHE_DIR: &str = "TANKOBON_CACHE_DIR";
pub const ENV_CHAPTERS_PER_PAGE: &str = "TANKOBON_CHAPTERS_PER_PAGE";
pub const ENV_PREFETCH_AHEAD: &str = "TANKOBON_PREFETCH_AHEAD";
pub const ENV_MAX_CACHE_BYTES: &str = "TANKOBON_MAX_CACHE_BYTES";

/// Settings shared by the catalog service, navigator and cache
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReaderConfig {
    /// Directory holding cached covers and pages
    pub cache_dir: PathBuf,

    /// Chapters shown per pagination page
    #[serde(deserialize_with = "page_size")]
    pub chapters_per_page: usize,

    /// Reading pages to prefetch ahead of the current one
    pub prefetch_ahead: usize,

    /// Where chapters without a volume are listed
    pub no_volume_placement: NoVolumePlacement,

    /// Direction new sessions open in
    pub direction: ReadingDirection,

    /// Cache size ceiling enforced by pruning, if any
    pub max_cache_bytes: Option<u64>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./tankobon_cache"),
            chapters_per_page: 30,
            prefetch_ahead: 3,
            no_volume_placement: NoVolumePlacement::First,
            direction: ReadingDirection::LeftToRight,
            max_cache_bytes: None,
        }
    }
}

impl ReaderConfig {
    /// Load from a JSON file; missing fields take defaults
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with the process environment
    pub fn from_env() -> Result<Self> {
        Self::default().with_env(|name| std::env::var(name).ok())
    }

    /// Overlay values from an environment lookup
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_CACHE_DIR) {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup(ENV_CHAPTERS_PER_PAGE) {
            self.chapters_per_page = parse_var(ENV_CHAPTERS_PER_PAGE, &value)?;
        }
        if let Some(value) = lookup(ENV_PREFETCH_AHEAD) {
            self.prefetch_ahead = parse_var(ENV_PREFETCH_AHEAD, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_CACHE_BYTES) {
            self.max_cache_bytes = Some(parse_var(ENV_MAX_CACHE_BYTES, &value)?);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chapters_per_page == 0 {
            return Err(TankobonError::Configuration(
                "chapters_per_page must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reads any integer; non-positive sizes become 0 so `validate` rejects them
fn page_size<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let size = i64::deserialize(deserializer)?;
    Ok(usize::try_from(size).unwrap_or(0))
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        TankobonError::Configuration(format!("{} has invalid value '{}'", name, value))
    })
}
