//! Refresh coordinator: the facade other components talk to
//!
//! Owns one pipeline and one provider chain per data type, the attribution
//! tracker and the matcher. Reads never fail; only `initialize` can return
//! an error, and only for configuration problems.

pub mod pipeline;
pub mod providers;

use crate::attribution::{self, AttributionTracker};
use crate::cache::LocalCache;
use crate::catalog::{CatalogSnapshot, CatalogStore};
use crate::config::RefDataConfig;
use crate::downloader::Downloader;
use crate::error::{RefDataError, RefDataResult};
use crate::fallback::FallbackEntry;
use crate::matcher::{MatchResult, Matcher, MATCH_THRESHOLD};
use crate::models::{normalize_name, CatalogEntry, CatalogItem, DataType, Genre, MetaTag, Technique};
use crate::parser::ContentParser;
use crate::storage::RawStore;
use chrono::{DateTime, Utc};
use pipeline::{Pipeline, TypeRefreshReport};
use providers::{ProviderChain, ProviderKind};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Where a read for one data type would be served from right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusOrigin {
    Memory,
    Cache,
    Fallback,
    Empty,
}

impl StatusOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusOrigin::Memory => "memory",
            StatusOrigin::Cache => "cache",
            StatusOrigin::Fallback => "fallback",
            StatusOrigin::Empty => "empty",
        }
    }
}

/// Per-type status, computed from local state only
#[derive(Debug, Clone, Serialize)]
pub struct TypeStatus {
    pub data_type: DataType,
    pub origin: StatusOrigin,
    pub entries: usize,
    /// Age of the oldest contributing source, if a snapshot is installed
    pub snapshot_age_seconds: Option<i64>,
    pub source_urls: Vec<String>,
    pub configured_urls: usize,
}

/// Result of one coordinator refresh
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Empty when wiki integration is disabled
    pub types: Vec<TypeRefreshReport>,
}

/// Pipeline and provider chain for one data type
struct TypeHandle<T> {
    pipeline: Arc<Pipeline<T>>,
    chain: ProviderChain<T>,
}

impl<T: ContentParser + FallbackEntry> TypeHandle<T> {
    fn new(config: &RefDataConfig, cache: &LocalCache, catalog_dir: &std::path::Path) -> Self {
        let pipeline = Arc::new(Pipeline::new(
            config.source_urls(T::DATA_TYPE).to_vec(),
            cache.clone(),
            Arc::new(CatalogStore::new(catalog_dir)),
            config.max_age(),
            config.refresh_timeout(),
        ));
        let chain = ProviderChain::build(&pipeline, config.enabled, config.fallback_to_hardcoded);
        Self { pipeline, chain }
    }

    /// Install the persisted snapshot if it still matches the configured sources
    async fn warm_start(&self) {
        let store = self.pipeline.store();
        match store.load_persisted().await {
            Ok(Some(snapshot)) if !snapshot.is_empty() && snapshot.is_backed_by(self.pipeline.urls()) => {
                tracing::info!(
                    data_type = %T::DATA_TYPE,
                    entries = snapshot.entries.len(),
                    built_at = %snapshot.built_at,
                    "Warm-started catalog from persisted snapshot"
                );
                store.swap(snapshot).await;
            }
            Ok(Some(_)) => {
                tracing::info!(
                    data_type = %T::DATA_TYPE,
                    path = %store.snapshot_path().display(),
                    "Discarding persisted snapshot that no longer matches configured sources"
                );
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(data_type = %T::DATA_TYPE, error = %err, "Ignoring unreadable catalog snapshot");
            }
        }
    }

    async fn source_urls(&self) -> Vec<String> {
        self.pipeline
            .store()
            .snapshot()
            .await
            .map(|s| s.source_urls())
            .unwrap_or_default()
    }

    async fn serve(&self) -> Option<Arc<CatalogSnapshot<T>>> {
        self.chain.resolve().await.map(|(_, snapshot)| snapshot)
    }

    async fn status(&self, config: &RefDataConfig) -> TypeStatus {
        let now = tonewiki_common::time::now();
        let snapshot = if config.enabled {
            self.pipeline.store().snapshot().await.filter(|s| !s.is_empty())
        } else {
            None
        };

        let origin = match &snapshot {
            Some(_) if self.pipeline.fresh_snapshot().await.is_some() => StatusOrigin::Memory,
            Some(_) => StatusOrigin::Cache,
            None if config.enabled && self.pipeline.has_cached_content().await => StatusOrigin::Cache,
            None if config.fallback_to_hardcoded => StatusOrigin::Fallback,
            None => StatusOrigin::Empty,
        };

        let entries = match (&snapshot, origin) {
            (Some(s), _) => s.entries.len(),
            (None, StatusOrigin::Fallback) => T::fallback_entries().len(),
            _ => 0,
        };

        TypeStatus {
            data_type: T::DATA_TYPE,
            origin,
            entries,
            snapshot_age_seconds: snapshot
                .as_ref()
                .and_then(|s| s.oldest_fetch())
                .map(|t| tonewiki_common::time::age(t, now).num_seconds()),
            source_urls: snapshot.map(|s| s.source_urls()).unwrap_or_default(),
            configured_urls: self.pipeline.urls().len(),
        }
    }
}

/// Newest source first, then name
fn order_by_recency<T: CatalogEntry>(snapshot: &CatalogSnapshot<T>, mut entries: Vec<T>) -> Vec<T> {
    let fetched = |e: &T| e.source_url().and_then(|url| snapshot.fetched_at_for(url));
    entries.sort_by(|a, b| {
        fetched(b)
            .cmp(&fetched(a))
            .then_with(|| a.name().to_lowercase().cmp(&b.name().to_lowercase()))
            .then_with(|| a.name().cmp(b.name()))
    });
    entries
}

/// Facade over the reference-data subsystem
pub struct RefreshCoordinator {
    config: RefDataConfig,
    genres: TypeHandle<Genre>,
    meta_tags: TypeHandle<MetaTag>,
    techniques: TypeHandle<Technique>,
    attribution: AttributionTracker,
    matcher: Matcher,
}

impl RefreshCoordinator {
    /// Validate configuration, prepare storage and warm-start from disk
    ///
    /// Makes no network request.
    ///
    /// # Errors
    /// `Configuration` for invalid settings or an unwritable storage path.
    pub async fn initialize(config: RefDataConfig) -> RefDataResult<Self> {
        config.validate()?;

        let store = RawStore::new(&config.local_storage_path);
        if config.enabled {
            for dir in [store.raw_dir(), store.catalog_dir()] {
                tonewiki_common::fs::ensure_writable_dir(&dir).map_err(|e| {
                    RefDataError::Configuration(format!(
                        "Storage path {} is not writable: {}",
                        dir.display(),
                        e
                    ))
                })?;
            }
        }

        let catalog_dir = store.catalog_dir();
        let cache = LocalCache::new(Arc::new(Downloader::new(&config, store)?))
            .with_failure_cooldown(config.failure_cooldown());

        let coordinator = Self {
            genres: TypeHandle::new(&config, &cache, &catalog_dir),
            meta_tags: TypeHandle::new(&config, &cache, &catalog_dir),
            techniques: TypeHandle::new(&config, &cache, &catalog_dir),
            attribution: AttributionTracker::new(),
            matcher: Matcher::new(),
            config,
        };

        if coordinator.config.enabled {
            tokio::join!(
                coordinator.genres.warm_start(),
                coordinator.meta_tags.warm_start(),
                coordinator.techniques.warm_start(),
            );
        }

        tracing::info!(
            enabled = coordinator.config.enabled,
            fallback = coordinator.config.fallback_to_hardcoded,
            storage = %coordinator.config.local_storage_path.display(),
            genre_sources = coordinator.config.sources.genre.len(),
            meta_tag_sources = coordinator.config.sources.meta_tag.len(),
            technique_sources = coordinator.config.sources.technique.len(),
            "Reference data coordinator initialized"
        );
        Ok(coordinator)
    }

    pub fn config(&self) -> &RefDataConfig {
        &self.config
    }

    /// Provider order for `data_type`, as tried on every read
    pub fn provider_chain(&self, data_type: DataType) -> Vec<ProviderKind> {
        match data_type {
            DataType::Genre => self.genres.chain.kinds(),
            DataType::MetaTag => self.meta_tags.chain.kinds(),
            DataType::Technique => self.techniques.chain.kinds(),
        }
    }

    /// All genres, newest source first
    pub async fn get_genres(&self) -> Vec<Genre> {
        self.serve_filtered(&self.genres, |_| true).await
    }

    /// Meta tags, optionally limited to one category (case-insensitive)
    pub async fn get_meta_tags(&self, category: Option<&str>) -> Vec<MetaTag> {
        let wanted = category.map(normalize_name);
        self.serve_filtered(&self.meta_tags, |tag| {
            wanted.as_deref().map_or(true, |c| normalize_name(&tag.category) == c)
        })
        .await
    }

    /// Techniques, optionally limited to one type (case-insensitive)
    pub async fn get_techniques(&self, technique_type: Option<&str>) -> Vec<Technique> {
        let wanted = technique_type.map(normalize_name);
        self.serve_filtered(&self.techniques, |t| {
            wanted.as_deref().map_or(true, |w| normalize_name(&t.technique_type) == w)
        })
        .await
    }

    async fn serve_filtered<T, F>(&self, handle: &TypeHandle<T>, keep: F) -> Vec<T>
    where
        T: ContentParser + FallbackEntry,
        F: Fn(&T) -> bool,
    {
        let Some(snapshot) = handle.serve().await else {
            return Vec::new();
        };
        let entries = snapshot.entries.iter().filter(|e| keep(e)).cloned().collect();
        let entries = order_by_recency(&snapshot, entries);
        self.attribution.record_served(&entries).await;
        entries
    }

    /// URLs backing the catalog currently installed for `data_type`
    ///
    /// Empty while the built-in table is what would be served.
    pub async fn get_source_urls(&self, data_type: DataType) -> Vec<String> {
        match data_type {
            DataType::Genre => self.genres.source_urls().await,
            DataType::MetaTag => self.meta_tags.source_urls().await,
            DataType::Technique => self.techniques.source_urls().await,
        }
    }

    /// Rank entries of `data_type` against caller traits
    ///
    /// Non-empty whenever any catalog (wiki or built-in) is available.
    pub async fn match_traits<S: AsRef<str>>(
        &self,
        traits: &[S],
        data_type: DataType,
    ) -> Vec<MatchResult<CatalogItem>> {
        match data_type {
            DataType::Genre => into_items(self.rank(&self.genres, traits).await),
            DataType::MetaTag => into_items(self.rank(&self.meta_tags, traits).await),
            DataType::Technique => into_items(self.rank(&self.techniques, traits).await),
        }
    }

    async fn rank<T, S>(&self, handle: &TypeHandle<T>, traits: &[S]) -> Vec<MatchResult<T>>
    where
        T: ContentParser + FallbackEntry,
        S: AsRef<str>,
    {
        let Some(snapshot) = handle.serve().await else {
            return Vec::new();
        };
        let results = self
            .matcher
            .rank(traits, &snapshot.entries, |url| snapshot.fetched_at_for(url));

        let matched: Vec<T> = results
            .iter()
            .filter(|r| r.confidence >= MATCH_THRESHOLD)
            .map(|r| r.entry.clone())
            .collect();
        self.attribution.record_served(&matched).await;
        results
    }

    /// Citation bundle for `items`, counting each wiki-derived item as used
    pub async fn build_context(&self, items: &[CatalogItem]) -> String {
        for item in items {
            if let Some(url) = item.source_url() {
                self.attribution.record_usage(&item.content_id(), url).await;
            }
        }
        attribution::build_context(items)
    }

    pub fn attribution(&self) -> &AttributionTracker {
        &self.attribution
    }

    /// Usage count per source URL
    pub async fn usage_stats(&self) -> BTreeMap<String, u64> {
        self.attribution.get_stats().await
    }

    /// Per-type status from local state; never touches the network
    pub async fn status(&self) -> Vec<TypeStatus> {
        let (genres, meta_tags, techniques) = tokio::join!(
            self.genres.status(&self.config),
            self.meta_tags.status(&self.config),
            self.techniques.status(&self.config),
        );
        vec![genres, meta_tags, techniques]
    }

    /// Refresh every data type concurrently
    ///
    /// Without `force`, types whose snapshot is fresh are skipped. Partial
    /// failures keep entries from sources that failed this time.
    pub async fn refresh(&self, force: bool) -> RefreshReport {
        let started_at = tonewiki_common::time::now();
        let started = std::time::Instant::now();

        if !self.config.enabled {
            tracing::info!("Wiki integration disabled, nothing to refresh");
            return RefreshReport {
                started_at,
                elapsed_ms: 0,
                types: Vec::new(),
            };
        }

        let (genres, meta_tags, techniques) = tokio::join!(
            self.genres.pipeline.refresh(force),
            self.meta_tags.pipeline.refresh(force),
            self.techniques.pipeline.refresh(force),
        );

        let report = RefreshReport {
            started_at,
            elapsed_ms: started.elapsed().as_millis() as u64,
            types: vec![genres, meta_tags, techniques],
        };
        tracing::info!(
            force,
            elapsed_ms = report.elapsed_ms,
            swapped = report.types.iter().filter(|t| t.swapped).count(),
            failed_sources = report.types.iter().map(|t| t.failed_sources()).sum::<usize>(),
            "Refresh cycle complete"
        );
        report
    }

    /// Refresh every `refresh_interval_hours` until `token` is cancelled
    ///
    /// The first tick fires immediately.
    pub fn spawn_refresh_loop(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(coordinator.config.refresh_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!("Background refresh stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        coordinator.refresh(false).await;
                    }
                }
            }
        })
    }
}

fn into_items<T: CatalogEntry>(results: Vec<MatchResult<T>>) -> Vec<MatchResult<CatalogItem>> {
    results
        .into_iter()
        .map(|r| MatchResult {
            entry: r.entry.into_item(),
            confidence: r.confidence,
        })
        .collect()
}
