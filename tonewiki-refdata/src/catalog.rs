//! Catalog snapshots and the per-type catalog store
//!
//! A snapshot is immutable once built. The store holds one `Arc` to the
//! current snapshot and replaces it whole; a reader clones the `Arc` once and
//! works from that snapshot for the rest of its request.

use crate::cache::is_stale;
use crate::error::{RefDataError, RefDataResult};
use crate::models::{normalize_name, CatalogEntry, DataType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A source URL that contributed entries to a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSource {
    pub url: String,
    pub fetched_at: DateTime<Utc>,
    pub entry_count: usize,
}

/// Entries parsed from one source, tagged with when that source was fetched
#[derive(Debug, Clone)]
pub struct SourceBatch<T> {
    pub url: String,
    pub fetched_at: DateTime<Utc>,
    pub entries: Vec<T>,
}

/// Immutable catalog for one data type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot<T> {
    pub data_type: DataType,
    pub built_at: DateTime<Utc>,
    /// Contributing sources in configured order
    pub sources: Vec<SnapshotSource>,
    pub entries: Vec<T>,
}

impl<T: CatalogEntry> CatalogSnapshot<T> {
    /// Merge per-source batches, given in configured order
    ///
    /// When two sources define the same normalized name, the earlier source
    /// wins and the later entry is dropped. Sources left with no entries are
    /// not listed as contributors.
    pub fn merge(batches: Vec<SourceBatch<T>>, built_at: DateTime<Utc>) -> Self {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        let mut sources = Vec::new();

        for batch in batches {
            let mut kept = 0;
            for entry in batch.entries {
                if seen.insert(normalize_name(entry.match_name())) {
                    entries.push(entry);
                    kept += 1;
                } else {
                    tracing::debug!(
                        data_type = %T::DATA_TYPE,
                        url = %batch.url,
                        name = entry.name(),
                        "Dropping duplicate entry, earlier source wins"
                    );
                }
            }

            if kept > 0 {
                sources.push(SnapshotSource {
                    url: batch.url,
                    fetched_at: batch.fetched_at,
                    entry_count: kept,
                });
            }
        }

        Self {
            data_type: T::DATA_TYPE,
            built_at,
            sources,
            entries,
        }
    }

    /// Snapshot of built-in entries; it lists no sources
    pub fn unsourced(entries: Vec<T>, built_at: DateTime<Utc>) -> Self {
        Self {
            data_type: T::DATA_TYPE,
            built_at,
            sources: Vec::new(),
            entries,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn source_urls(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.url.clone()).collect()
    }

    pub fn fetched_at_for(&self, url: &str) -> Option<DateTime<Utc>> {
        self.sources.iter().find(|s| s.url == url).map(|s| s.fetched_at)
    }

    /// This snapshot's entries from `url`, for carrying over a failed source
    pub fn retained_batch(&self, url: &str) -> Option<SourceBatch<T>> {
        let fetched_at = self.fetched_at_for(url)?;
        let entries: Vec<T> = self
            .entries
            .iter()
            .filter(|e| e.source_url() == Some(url))
            .cloned()
            .collect();

        (!entries.is_empty()).then(|| SourceBatch {
            url: url.to_string(),
            fetched_at,
            entries,
        })
    }

    /// Fresh when every contributing source is within `max_age`
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        !self.sources.is_empty()
            && self
                .sources
                .iter()
                .all(|s| !is_stale(s.fetched_at, now, max_age))
    }

    /// Fetch time of the oldest contributing source
    pub fn oldest_fetch(&self) -> Option<DateTime<Utc>> {
        self.sources.iter().map(|s| s.fetched_at).min()
    }

    /// Every entry carries a source URL from `configured`
    pub fn is_backed_by(&self, configured: &[String]) -> bool {
        self.entries.iter().all(|e| {
            e.source_url()
                .is_some_and(|url| configured.iter().any(|c| c == url))
        })
    }
}

/// Current snapshot for one data type, plus its persisted copy
pub struct CatalogStore<T> {
    current: RwLock<Option<Arc<CatalogSnapshot<T>>>>,
    snapshot_path: PathBuf,
}

impl<T: CatalogEntry> CatalogStore<T> {
    /// Store persisting to `<catalog_dir>/<data_type>.json`
    pub fn new(catalog_dir: &Path) -> Self {
        Self {
            current: RwLock::new(None),
            snapshot_path: catalog_dir.join(format!("{}.json", T::DATA_TYPE)),
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Current snapshot, if one has been installed
    pub async fn snapshot(&self) -> Option<Arc<CatalogSnapshot<T>>> {
        self.current.read().await.clone()
    }

    /// Install `snapshot` as the current one, returning the previous one
    pub async fn swap(&self, snapshot: CatalogSnapshot<T>) -> Option<Arc<CatalogSnapshot<T>>> {
        let next = Arc::new(snapshot);
        let mut current = self.current.write().await;
        current.replace(next)
    }

    /// Write `snapshot` to disk via temp-then-rename
    pub async fn persist(&self, snapshot: &CatalogSnapshot<T>) -> RefDataResult<()> {
        let json = serde_json::to_vec_pretty(snapshot).map_err(tonewiki_common::Error::from)?;
        let path = self.snapshot_path.clone();

        tokio::task::spawn_blocking(move || tonewiki_common::fs::atomic_write(&path, &json))
            .await
            .map_err(|e| tonewiki_common::Error::Internal(format!("Write task failed: {}", e)))??;

        tracing::debug!(
            data_type = %T::DATA_TYPE,
            path = %self.snapshot_path.display(),
            entries = snapshot.entries.len(),
            "Persisted catalog snapshot"
        );
        Ok(())
    }

    /// Read the persisted snapshot, `Ok(None)` if there is none
    pub async fn load_persisted(&self) -> RefDataResult<Option<CatalogSnapshot<T>>> {
        let bytes = match tokio::fs::read(&self.snapshot_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RefDataError::CacheCorruption {
                    path: self.snapshot_path.clone(),
                    message: e.to_string(),
                })
            }
        };

        let snapshot: CatalogSnapshot<T> =
            serde_json::from_slice(&bytes).map_err(|e| RefDataError::CacheCorruption {
                path: self.snapshot_path.clone(),
                message: format!("Invalid snapshot: {}", e),
            })?;

        if snapshot.data_type != T::DATA_TYPE {
            return Err(RefDataError::CacheCorruption {
                path: self.snapshot_path.clone(),
                message: format!(
                    "Snapshot holds {} entries, expected {}",
                    snapshot.data_type,
                    T::DATA_TYPE
                ),
            });
        }

        Ok(Some(snapshot))
    }
}
