//! Local cache with age-based refresh
//!
//! A fresh cache entry is served without network access. A stale or missing
//! entry triggers a fetch; if that fails, a stale entry is still served
//! (marked as such). Only when neither exists does the caller see a miss.
//! After a failed fetch, non-forced reads skip the network for the failure
//! cooldown and go straight to the stale copy.

use crate::downloader::Downloader;
use crate::error::{RefDataError, RefDataResult};
use crate::models::{CacheEntry, FetchStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Staleness rule: strictly older than `max_age`
///
/// An entry whose age equals `max_age` exactly is still fresh.
pub fn is_stale(fetched_at: DateTime<Utc>, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
    now.signed_duration_since(fetched_at) > max_age
}

/// Where served content came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcedFrom {
    Cache,
    Network,
    StaleCache,
}

impl SourcedFrom {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourcedFrom::Cache => "cache",
            SourcedFrom::Network => "network",
            SourcedFrom::StaleCache => "stale_cache",
        }
    }
}

/// Content for one URL plus its provenance
#[derive(Debug, Clone)]
pub struct CachedContent {
    pub url: String,
    pub payload: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
    pub sourced_from: SourcedFrom,
}

/// Cache front for the downloader
#[derive(Clone)]
pub struct LocalCache {
    downloader: Arc<Downloader>,
    failure_cooldown: chrono::Duration,
}

impl LocalCache {
    /// Cache with no failure cooldown
    pub fn new(downloader: Arc<Downloader>) -> Self {
        Self {
            downloader,
            failure_cooldown: chrono::Duration::zero(),
        }
    }

    pub fn with_failure_cooldown(mut self, cooldown: chrono::Duration) -> Self {
        self.failure_cooldown = cooldown;
        self
    }

    pub fn downloader(&self) -> &Arc<Downloader> {
        &self.downloader
    }

    /// Read whatever is cached for `url`, treating corruption as a miss
    pub async fn read_cached(&self, url: &str, max_age: chrono::Duration) -> Option<CacheEntry> {
        match self.downloader.store().read_entry(url, max_age).await {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(url = %url, error = %err, kind = err.kind(), "Ignoring unusable cache entry");
                None
            }
        }
    }

    /// Serve `url` from cache if fresh, otherwise fetch
    ///
    /// # Errors
    /// Returns the fetch error only when no cached copy exists at all.
    pub async fn get_or_refresh(
        &self,
        url: &str,
        max_age: chrono::Duration,
    ) -> RefDataResult<CachedContent> {
        self.resolve(url, max_age, false).await
    }

    /// Fetch `url` regardless of cache age, falling back to any cached copy
    pub async fn force_refresh(
        &self,
        url: &str,
        max_age: chrono::Duration,
    ) -> RefDataResult<CachedContent> {
        self.resolve(url, max_age, true).await
    }

    async fn resolve(
        &self,
        url: &str,
        max_age: chrono::Duration,
        force: bool,
    ) -> RefDataResult<CachedContent> {
        let cached = self.read_cached(url, max_age).await;

        if !force {
            if let Some(entry) = &cached {
                if !entry.is_stale_at(tonewiki_common::time::now()) {
                    tracing::debug!(url = %url, fetched_at = %entry.fetched_at, "Serving fresh cache entry");
                    return Ok(CachedContent {
                        url: url.to_string(),
                        payload: entry.payload.clone(),
                        fetched_at: entry.fetched_at,
                        sourced_from: SourcedFrom::Cache,
                    });
                }
            }
        }

        if !force {
            if let Some(retry_at) = self.cooling_down_until(url).await {
                tracing::debug!(url = %url, retry_at = %retry_at, "Source failed recently, not refetching");
                let err = RefDataError::CoolingDown {
                    url: url.to_string(),
                    retry_at,
                };
                return Self::stale_or_miss(url, cached, err);
            }
        }

        match self.downloader.fetch(url).await {
            Ok(fetched) => Ok(CachedContent {
                url: url.to_string(),
                fetched_at: fetched.source.fetched_at.unwrap_or_else(tonewiki_common::time::now),
                payload: fetched.payload,
                sourced_from: SourcedFrom::Network,
            }),
            Err(err) => Self::stale_or_miss(url, cached, err),
        }
    }

    /// End of the cooldown if the last attempt for `url` failed within it
    async fn cooling_down_until(&self, url: &str) -> Option<DateTime<Utc>> {
        if self.failure_cooldown <= chrono::Duration::zero() {
            return None;
        }
        let meta = self.downloader.store().read_meta(url).await.ok().flatten()?;
        if meta.status != FetchStatus::Failed {
            return None;
        }
        let retry_at = meta
            .last_attempt_at
            .checked_add_signed(self.failure_cooldown)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        (tonewiki_common::time::now() < retry_at).then_some(retry_at)
    }

    /// Serve a stale copy after a failed or abandoned fetch
    pub fn stale_or_miss(
        url: &str,
        cached: Option<CacheEntry>,
        err: RefDataError,
    ) -> RefDataResult<CachedContent> {
        match cached {
            Some(entry) => {
                tracing::warn!(
                    url = %url,
                    error = %err,
                    fetched_at = %entry.fetched_at,
                    "Fetch failed, serving stale cache entry"
                );
                Ok(CachedContent {
                    url: url.to_string(),
                    payload: entry.payload,
                    fetched_at: entry.fetched_at,
                    sourced_from: SourcedFrom::StaleCache,
                })
            }
            None => {
                tracing::warn!(url = %url, error = %err, "Fetch failed and nothing cached");
                Err(err)
            }
        }
    }
}
