//! Provider chain: memory → cache → fallback
//!
//! Each provider either yields a non-empty snapshot or passes. The chain is
//! built once at initialize from the configuration and tried in order on
//! every read.

use super::pipeline::Pipeline;
use crate::catalog::CatalogSnapshot;
use crate::fallback::FallbackEntry;
use crate::models::CatalogEntry;
use crate::parser::ContentParser;
use async_trait::async_trait;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// Which provider served a read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Memory,
    Cache,
    Fallback,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Memory => "memory",
            ProviderKind::Cache => "cache",
            ProviderKind::Fallback => "fallback",
        }
    }
}

/// One link in the provider chain
#[async_trait]
pub trait CatalogProvider<T: CatalogEntry>: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// A non-empty snapshot, or None to defer to the next provider
    async fn try_get(&self) -> Option<Arc<CatalogSnapshot<T>>>;
}

/// Current in-memory snapshot, if it is fresh
pub struct MemoryProvider<T> {
    pipeline: Arc<Pipeline<T>>,
}

impl<T> MemoryProvider<T> {
    pub fn new(pipeline: Arc<Pipeline<T>>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl<T: ContentParser> CatalogProvider<T> for MemoryProvider<T> {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Memory
    }

    async fn try_get(&self) -> Option<Arc<CatalogSnapshot<T>>> {
        self.pipeline.fresh_snapshot().await.filter(|s| !s.is_empty())
    }
}

/// Rebuild from the local cache, downloading stale or missing sources
pub struct CacheProvider<T> {
    pipeline: Arc<Pipeline<T>>,
}

impl<T> CacheProvider<T> {
    pub fn new(pipeline: Arc<Pipeline<T>>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl<T: ContentParser> CatalogProvider<T> for CacheProvider<T> {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Cache
    }

    async fn try_get(&self) -> Option<Arc<CatalogSnapshot<T>>> {
        let current = self.pipeline.store().snapshot().await.filter(|s| !s.is_empty());
        if current.is_some() && self.pipeline.is_refreshing() {
            tracing::debug!(data_type = %T::DATA_TYPE, "Refresh in progress, serving current snapshot");
            return current;
        }

        self.pipeline.refresh(false).await;
        // A stale snapshot still beats the built-in tables
        self.pipeline.store().snapshot().await.filter(|s| !s.is_empty())
    }
}

/// Built-in tables
pub struct FallbackProvider<T> {
    _entry: PhantomData<fn() -> T>,
}

impl<T> FallbackProvider<T> {
    pub fn new() -> Self {
        Self { _entry: PhantomData }
    }
}

impl<T> Default for FallbackProvider<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: FallbackEntry> CatalogProvider<T> for FallbackProvider<T> {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Fallback
    }

    async fn try_get(&self) -> Option<Arc<CatalogSnapshot<T>>> {
        let snapshot = CatalogSnapshot::unsourced(T::fallback_entries(), tonewiki_common::time::now());
        (!snapshot.is_empty()).then(|| Arc::new(snapshot))
    }
}

/// Ordered providers for one data type
pub struct ProviderChain<T> {
    providers: Vec<Box<dyn CatalogProvider<T>>>,
}

impl<T: ContentParser + FallbackEntry> ProviderChain<T> {
    /// Memory and cache when `enabled`, then fallback when `fallback` is set
    pub fn build(pipeline: &Arc<Pipeline<T>>, enabled: bool, fallback: bool) -> Self {
        let mut providers: Vec<Box<dyn CatalogProvider<T>>> = Vec::new();
        if enabled {
            providers.push(Box::new(MemoryProvider::new(Arc::clone(pipeline))));
            providers.push(Box::new(CacheProvider::new(Arc::clone(pipeline))));
        }
        if fallback {
            providers.push(Box::new(FallbackProvider::new()));
        }
        Self { providers }
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        self.providers.iter().map(|p| p.kind()).collect()
    }

    /// First snapshot any provider yields
    pub async fn resolve(&self) -> Option<(ProviderKind, Arc<CatalogSnapshot<T>>)> {
        for provider in &self.providers {
            if let Some(snapshot) = provider.try_get().await {
                let kind = provider.kind();
                match kind {
                    ProviderKind::Fallback => tracing::warn!(
                        data_type = %T::DATA_TYPE,
                        entries = snapshot.entries.len(),
                        "No wiki data available, serving built-in table"
                    ),
                    _ => tracing::trace!(
                        data_type = %T::DATA_TYPE,
                        provider = kind.as_str(),
                        entries = snapshot.entries.len(),
                        "Serving catalog"
                    ),
                }
                return Some((kind, snapshot));
            }
        }

        tracing::warn!(data_type = %T::DATA_TYPE, "No provider yielded data");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalCache;
    use crate::catalog::CatalogStore;
    use crate::config::RefDataConfig;
    use crate::downloader::Downloader;
    use crate::models::MetaTag;
    use crate::storage::RawStore;
    use std::time::Duration;
    use tempfile::TempDir;

    fn pipeline(dir: &TempDir, urls: Vec<String>) -> Arc<Pipeline<MetaTag>> {
        let mut config = RefDataConfig::default();
        config.local_storage_path = dir.path().to_path_buf();
        config.max_retries = 0;
        let store = RawStore::new(dir.path());
        let catalog = Arc::new(CatalogStore::new(&store.catalog_dir()));
        let downloader = Downloader::new(&config, store).unwrap();
        Arc::new(Pipeline::new(
            urls,
            LocalCache::new(Arc::new(downloader)),
            catalog,
            config.max_age(),
            Duration::from_secs(2),
        ))
    }

    #[test]
    fn test_chain_shape_follows_flags() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, Vec::new());

        let kinds = |enabled, fallback| ProviderChain::build(&pipeline, enabled, fallback).kinds();
        assert_eq!(
            kinds(true, true),
            vec![ProviderKind::Memory, ProviderKind::Cache, ProviderKind::Fallback]
        );
        assert_eq!(kinds(true, false), vec![ProviderKind::Memory, ProviderKind::Cache]);
        assert_eq!(kinds(false, true), vec![ProviderKind::Fallback]);
        assert!(kinds(false, false).is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_source_falls_through_to_fallback() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, vec!["http://127.0.0.1:9/tags".to_string()]);
        let chain = ProviderChain::build(&pipeline, true, true);

        let (kind, snapshot) = chain.resolve().await.unwrap();
        assert_eq!(kind, ProviderKind::Fallback);
        assert!(snapshot.sources.is_empty());
        assert!(snapshot.entries.iter().all(|t| t.source_url.is_none()));
    }

    #[tokio::test]
    async fn test_empty_chain_resolves_to_nothing() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, Vec::new());
        assert!(ProviderChain::build(&pipeline, false, false).resolve().await.is_none());
    }
}
