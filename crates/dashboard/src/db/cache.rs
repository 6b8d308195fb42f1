use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::debug;
use tokio::sync::Mutex;

use crate::{Consolidation, Consolidator, Error};

/// Source of the consolidated table served by the API
#[async_trait]
pub trait AirQualityData: Send + Sync {
    async fn consolidated(&self) -> Result<Arc<Consolidation>, Error>;
}

struct CacheEntry {
    loaded_at: Instant,
    value: Arc<Consolidation>,
}

/// Keeps one consolidated year in memory for `ttl`. The lock is held during a
/// rebuild, so concurrent requests wait for the same load.
pub struct CachedDataset {
    consolidator: Consolidator,
    year: i32,
    ttl: Duration,
    entry: Mutex<Option<CacheEntry>>,
}

impl CachedDataset {
    pub fn new(consolidator: Consolidator, year: i32, ttl: Duration) -> Self {
        Self {
            consolidator,
            year,
            ttl,
            entry: Mutex::new(None),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }
}

#[async_trait]
impl AirQualityData for CachedDataset {
    async fn consolidated(&self) -> Result<Arc<Consolidation>, Error> {
        let mut entry = self.entry.lock().await;
        if let Some(cached) = entry.as_ref() {
            if cached.loaded_at.elapsed() < self.ttl {
                return Ok(cached.value.clone());
            }
            debug!("cached dataset for {} expired", self.year);
        }

        let value = Arc::new(self.consolidator.load(self.year).await?);
        *entry = Some(CacheEntry {
            loaded_at: Instant::now(),
            value: value.clone(),
        });
        Ok(value)
    }
}
