//! Refresh pipeline for one data type
//!
//! cache/download → parse → merge → swap. A source that fails to fetch or
//! parse keeps whatever it contributed to the previous snapshot; the other
//! sources are unaffected.

use crate::cache::{CachedContent, LocalCache, SourcedFrom};
use crate::catalog::{CatalogSnapshot, CatalogStore, SourceBatch};
use crate::error::{RefDataError, RefDataResult};
use crate::models::DataType;
use crate::parser::{self, ContentParser, ParseOutcome};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Outcome for one configured source
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub url: String,
    /// None when nothing could be read for this source
    pub sourced_from: Option<SourcedFrom>,
    /// Entries parsed from this refresh's content
    pub entries: usize,
    pub skipped: usize,
    /// Entries carried over from the previous snapshot
    pub retained: usize,
    pub error: Option<String>,
}

impl SourceReport {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            sourced_from: None,
            entries: 0,
            skipped: 0,
            retained: 0,
            error: None,
        }
    }
}

/// Outcome of refreshing one data type
#[derive(Debug, Clone, Serialize)]
pub struct TypeRefreshReport {
    pub data_type: DataType,
    pub sources: Vec<SourceReport>,
    /// Entries in the current snapshot after this refresh
    pub entries: usize,
    /// A new snapshot was installed
    pub swapped: bool,
    /// Skipped because the current snapshot was already fresh
    pub up_to_date: bool,
    pub elapsed_ms: u64,
}

impl TypeRefreshReport {
    fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            sources: Vec::new(),
            entries: 0,
            swapped: false,
            up_to_date: false,
            elapsed_ms: 0,
        }
    }

    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.error.is_some()).count()
    }
}

pub struct Pipeline<T> {
    urls: Vec<String>,
    cache: LocalCache,
    store: Arc<CatalogStore<T>>,
    max_age: chrono::Duration,
    refresh_timeout: Duration,
    /// Serializes refreshes of this type
    lock: Mutex<()>,
}

impl<T: ContentParser> Pipeline<T> {
    pub fn new(
        urls: Vec<String>,
        cache: LocalCache,
        store: Arc<CatalogStore<T>>,
        max_age: chrono::Duration,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            urls,
            cache,
            store,
            max_age,
            refresh_timeout,
            lock: Mutex::new(()),
        }
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn store(&self) -> &Arc<CatalogStore<T>> {
        &self.store
    }

    pub fn max_age(&self) -> chrono::Duration {
        self.max_age
    }

    /// Current snapshot, if every source it was built from is within `max_age`
    pub async fn fresh_snapshot(&self) -> Option<Arc<CatalogSnapshot<T>>> {
        let snapshot = self.store.snapshot().await?;
        snapshot
            .is_fresh(tonewiki_common::time::now(), self.max_age)
            .then_some(snapshot)
    }

    /// Fresh, and every configured source contributed
    fn covers_all_sources(&self, snapshot: &CatalogSnapshot<T>) -> bool {
        snapshot.is_fresh(tonewiki_common::time::now(), self.max_age)
            && self.urls.iter().all(|url| snapshot.fetched_at_for(url).is_some())
    }

    /// A refresh of this type is in progress
    pub fn is_refreshing(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    /// Whether any configured source has content on disk
    pub async fn has_cached_content(&self) -> bool {
        for url in &self.urls {
            if self.cache.read_cached(url, self.max_age).await.is_some() {
                return true;
            }
        }
        false
    }

    /// Refresh this data type
    ///
    /// Without `force`, a snapshot that is fresh for every source is left
    /// alone and fresh cache entries are reused. With `force`, every source is
    /// fetched again. Never fails: per-source errors land in the report.
    pub async fn refresh(&self, force: bool) -> TypeRefreshReport {
        let started = Instant::now();
        let _guard = self.lock.lock().await;
        let mut report = TypeRefreshReport::new(T::DATA_TYPE);

        let previous = self.store.snapshot().await;
        report.entries = previous.as_ref().map_or(0, |s| s.entries.len());

        if self.urls.is_empty() {
            tracing::debug!(data_type = %T::DATA_TYPE, "No sources configured, nothing to refresh");
            return report;
        }

        if !force && previous.as_deref().is_some_and(|s| self.covers_all_sources(s)) {
            tracing::debug!(data_type = %T::DATA_TYPE, "Catalog is fresh, skipping refresh");
            report.up_to_date = true;
            return report;
        }

        let deadline = started + self.refresh_timeout;
        let fetched =
            futures::future::join_all(self.urls.iter().map(|url| self.fetch_source(url, force, deadline)))
                .await;

        let mut batches = Vec::with_capacity(self.urls.len());
        for (url, result) in self.urls.iter().zip(fetched) {
            let mut source = SourceReport::new(url);

            let batch = match result {
                Ok(content) => {
                    source.sourced_from = Some(content.sourced_from);
                    self.parse_source(content, &mut source)
                }
                Err(err) => {
                    source.error = Some(err.to_string());
                    None
                }
            };

            let batch = batch.or_else(|| {
                let retained = previous.as_ref()?.retained_batch(url)?;
                tracing::info!(
                    data_type = %T::DATA_TYPE,
                    url = %url,
                    entries = retained.entries.len(),
                    "Keeping previous entries for failed source"
                );
                source.retained = retained.entries.len();
                Some(retained)
            });

            batches.extend(batch);
            report.sources.push(source);
        }

        let snapshot = CatalogSnapshot::merge(batches, tonewiki_common::time::now());
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        if snapshot.is_empty() {
            tracing::warn!(
                data_type = %T::DATA_TYPE,
                failed_sources = report.failed_sources(),
                "Refresh produced no entries, current catalog unchanged"
            );
            return report;
        }

        let unchanged = previous
            .as_deref()
            .is_some_and(|p| p.entries == snapshot.entries && p.sources == snapshot.sources);
        if unchanged {
            tracing::debug!(data_type = %T::DATA_TYPE, "Catalog unchanged, keeping current snapshot");
            return report;
        }

        if let Err(err) = self.store.persist(&snapshot).await {
            tracing::warn!(
                data_type = %T::DATA_TYPE,
                error = %err,
                "Failed to persist catalog snapshot"
            );
        }

        report.entries = snapshot.entries.len();
        report.swapped = true;
        let sources = snapshot.sources.len();
        self.store.swap(snapshot).await;

        tracing::info!(
            data_type = %T::DATA_TYPE,
            entries = report.entries,
            sources,
            failed_sources = report.failed_sources(),
            elapsed_ms = report.elapsed_ms,
            "Catalog snapshot swapped"
        );
        report
    }

    /// Fetch one source, abandoning the request at `deadline`
    async fn fetch_source(&self, url: &str, force: bool, deadline: Instant) -> RefDataResult<CachedContent> {
        let attempt = async {
            if force {
                self.cache.force_refresh(url, self.max_age).await
            } else {
                self.cache.get_or_refresh(url, self.max_age).await
            }
        };

        match tokio::time::timeout_at(deadline, attempt).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    url = %url,
                    timeout_secs = self.refresh_timeout.as_secs(),
                    "Refresh cycle timed out, abandoning fetch"
                );
                let cached = self.cache.read_cached(url, self.max_age).await;
                LocalCache::stale_or_miss(url, cached, RefDataError::Timeout { url: url.to_string() })
            }
        }
    }

    fn parse_source(&self, content: CachedContent, source: &mut SourceReport) -> Option<SourceBatch<T>> {
        let outcome = parser::parse::<T>(&content.payload, Some(&content.url));
        source.skipped = outcome.skipped();

        match outcome {
            ParseOutcome::Failed {
                skipped,
                reason,
                excerpts,
            } => {
                tracing::warn!(
                    data_type = %T::DATA_TYPE,
                    url = %content.url,
                    skipped,
                    excerpt = ?excerpts.first(),
                    reason = %reason,
                    "Source yielded no entries"
                );
                source.error = Some(
                    RefDataError::Parse {
                        url: content.url,
                        message: reason,
                    }
                    .to_string(),
                );
                None
            }
            outcome => {
                if outcome.skipped() > 0 {
                    tracing::warn!(
                        data_type = %T::DATA_TYPE,
                        url = %content.url,
                        skipped = outcome.skipped(),
                        excerpts = ?outcome.excerpts(),
                        "Skipped malformed fragments"
                    );
                }
                let entries = outcome.into_entries();
                source.entries = entries.len();
                Some(SourceBatch {
                    url: content.url,
                    fetched_at: content.fetched_at,
                    entries,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RefDataConfig;
    use crate::downloader::Downloader;
    use crate::models::Genre;
    use crate::storage::RawStore;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pipeline(dir: &TempDir, urls: Vec<String>) -> Pipeline<Genre> {
        pipeline_with_deadline(dir, urls, Duration::from_secs(5))
    }

    fn pipeline_with_deadline(dir: &TempDir, urls: Vec<String>, refresh_timeout: Duration) -> Pipeline<Genre> {
        let mut config = RefDataConfig::default();
        config.local_storage_path = dir.path().to_path_buf();
        config.max_retries = 0;
        config.retry_base_delay_ms = 1;
        config.requests_per_second = 1000;

        let store = RawStore::new(dir.path());
        let catalog = Arc::new(CatalogStore::new(&store.catalog_dir()));
        let downloader = Downloader::new(&config, store).unwrap();
        Pipeline::new(
            urls,
            LocalCache::new(Arc::new(downloader)),
            catalog,
            config.max_age(),
            refresh_timeout,
        )
    }

    #[tokio::test]
    async fn test_refresh_swaps_then_skips_when_fresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/genres"))
            .respond_with(ResponseTemplate::new(200).set_body_string("- Rock: loud\n- Jazz: swing\n"))
            .expect(1)
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();
        let url = format!("{}/genres", server.uri());
        let pipeline = pipeline(&dir, vec![url.clone()]);

        let first = pipeline.refresh(false).await;
        assert!(first.swapped);
        assert_eq!(first.entries, 2);
        assert_eq!(first.sources[0].sourced_from, Some(SourcedFrom::Network));

        let second = pipeline.refresh(false).await;
        assert!(second.up_to_date);
        assert!(!second.swapped);
        assert!(pipeline.store().snapshot_path().exists());
    }

    #[tokio::test]
    async fn test_failed_source_keeps_previous_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(200).set_body_string("- Rock\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(200).set_body_string("- Jazz\n"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let a = format!("{}/a", server.uri());
        let b = format!("{}/b", server.uri());
        let pipeline = pipeline(&dir, vec![a.clone(), b.clone()]);

        assert!(pipeline.refresh(true).await.swapped);
        let report = pipeline.refresh(true).await;

        // /b still answers from the stale cache copy written on the first pass
        let b_report = report.sources.iter().find(|s| s.url == b).unwrap();
        assert_eq!(b_report.sourced_from, Some(SourcedFrom::StaleCache));

        let snapshot = pipeline.store().snapshot().await.unwrap();
        assert_eq!(snapshot.entries.len(), 2);
        assert_eq!(snapshot.source_urls(), vec![a, b]);
    }

    #[tokio::test]
    async fn test_unparseable_source_reports_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/good"))
            .respond_with(ResponseTemplate::new(200).set_body_string("- Rock\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bad"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8, 159, 146, 150]))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let good = format!("{}/good", server.uri());
        let bad = format!("{}/bad", server.uri());
        let pipeline = pipeline(&dir, vec![good.clone(), bad.clone()]);

        let report = pipeline.refresh(false).await;
        assert!(report.swapped);
        assert_eq!(report.failed_sources(), 1);
        let snapshot = pipeline.store().snapshot().await.unwrap();
        assert_eq!(snapshot.source_urls(), vec![good]);
    }

    #[tokio::test]
    async fn test_all_sources_failing_leaves_store_empty() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir, vec!["http://127.0.0.1:9/genres".to_string()]);

        let report = pipeline.refresh(false).await;
        assert!(!report.swapped);
        assert_eq!(report.failed_sources(), 1);
        assert!(pipeline.store().snapshot().await.is_none());
    }

    #[tokio::test]
    async fn test_hung_fetch_falls_back_to_stale_cache_at_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/genres"))
            .respond_with(ResponseTemplate::new(200).set_body_string("- Rock\n"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/genres"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("- Jazz\n")
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let url = format!("{}/genres", server.uri());
        let pipeline = pipeline_with_deadline(&dir, vec![url.clone()], Duration::from_millis(300));
        assert!(pipeline.refresh(true).await.swapped);

        let started = Instant::now();
        let report = pipeline.refresh(true).await;

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(report.sources[0].sourced_from, Some(SourcedFrom::StaleCache));
        let snapshot = pipeline.store().snapshot().await.unwrap();
        assert_eq!(snapshot.entries[0].name, "Rock");
    }
}
