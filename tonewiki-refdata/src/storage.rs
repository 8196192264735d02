//! On-disk layout for raw source content
//!
//! ```text
//! <local_storage_path>/
//!   raw/<stem>.body        raw bytes of the last successful fetch
//!   raw/<stem>.meta.json   ContentSource record
//!   catalog/<type>.json    catalog snapshots (see catalog.rs)
//! ```
//!
//! `<stem>` is the hex SHA-256 of the canonicalized URL. Every write goes
//! through temp-then-rename so a concurrent reader never sees a partial file.

use crate::error::{RefDataError, RefDataResult};
use crate::models::{CacheEntry, ContentSource, FetchStatus};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Canonical cache key for a URL
///
/// Scheme and host are lowercased and default ports dropped by the URL parser;
/// the fragment is removed because it never reaches the server.
pub fn canonicalize_url(raw: &str) -> String {
    match url::Url::parse(raw.trim()) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => raw.trim().to_string(),
    }
}

/// Hex SHA-256 of arbitrary bytes
pub fn checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// File locations for one source URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePaths {
    pub key: String,
    pub body: PathBuf,
    pub meta: PathBuf,
}

/// Raw content store rooted at the configured storage path
#[derive(Debug, Clone)]
pub struct RawStore {
    root: PathBuf,
}

impl RawStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    pub fn catalog_dir(&self) -> PathBuf {
        self.root.join("catalog")
    }

    pub fn paths_for(&self, url: &str) -> SourcePaths {
        let key = canonicalize_url(url);
        let stem = checksum(key.as_bytes());
        let dir = self.raw_dir();
        SourcePaths {
            body: dir.join(format!("{}.body", stem)),
            meta: dir.join(format!("{}.meta.json", stem)),
            key,
        }
    }

    /// Persist a successful fetch: body first, then metadata
    ///
    /// Metadata is written last so a reader that finds it can rely on the body
    /// it describes being complete.
    pub async fn write_success(
        &self,
        url: &str,
        payload: &[u8],
        fetched_at: DateTime<Utc>,
    ) -> RefDataResult<ContentSource> {
        let paths = self.paths_for(url);
        let record = ContentSource {
            url: url.to_string(),
            local_path: paths.body.clone(),
            fetched_at: Some(fetched_at),
            checksum: Some(checksum(payload)),
            byte_size: payload.len() as u64,
            status: FetchStatus::Ok,
            last_attempt_at: fetched_at,
            last_error: None,
        };

        let meta_json = serde_json::to_vec_pretty(&record).map_err(tonewiki_common::Error::from)?;
        let body = payload.to_vec();
        let body_path = paths.body.clone();
        let meta_path = paths.meta.clone();

        tokio::task::spawn_blocking(move || -> tonewiki_common::Result<()> {
            tonewiki_common::fs::atomic_write(&body_path, &body)?;
            tonewiki_common::fs::atomic_write(&meta_path, &meta_json)
        })
        .await
        .map_err(|e| tonewiki_common::Error::Internal(format!("Write task failed: {}", e)))??;

        Ok(record)
    }

    /// Record a failed attempt without touching any stored body
    pub async fn record_failure(
        &self,
        url: &str,
        error: &RefDataError,
        attempted_at: DateTime<Utc>,
    ) -> RefDataResult<ContentSource> {
        let paths = self.paths_for(url);
        let previous = self.read_meta(url).await.ok().flatten();

        let record = match previous {
            Some(mut record) => {
                record.status = FetchStatus::Failed;
                record.last_attempt_at = attempted_at;
                record.last_error = Some(error.to_string());
                record
            }
            None => ContentSource {
                url: url.to_string(),
                local_path: paths.body.clone(),
                fetched_at: None,
                checksum: None,
                byte_size: 0,
                status: FetchStatus::Failed,
                last_attempt_at: attempted_at,
                last_error: Some(error.to_string()),
            },
        };

        let meta_json = serde_json::to_vec_pretty(&record).map_err(tonewiki_common::Error::from)?;
        let meta_path = paths.meta;
        tokio::task::spawn_blocking(move || tonewiki_common::fs::atomic_write(&meta_path, &meta_json))
            .await
            .map_err(|e| tonewiki_common::Error::Internal(format!("Write task failed: {}", e)))??;

        Ok(record)
    }

    /// Read the metadata record, `Ok(None)` if the source was never attempted
    pub async fn read_meta(&self, url: &str) -> RefDataResult<Option<ContentSource>> {
        let paths = self.paths_for(url);
        let bytes = match tokio::fs::read(&paths.meta).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RefDataError::CacheCorruption {
                    path: paths.meta,
                    message: e.to_string(),
                })
            }
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| RefDataError::CacheCorruption {
                path: paths.meta,
                message: format!("Invalid metadata: {}", e),
            })
    }

    /// Read the cached body for `url`
    ///
    /// Returns `Ok(None)` when nothing was ever fetched successfully. Missing
    /// bodies, size mismatches and checksum mismatches are cache corruption.
    pub async fn read_entry(
        &self,
        url: &str,
        ttl: chrono::Duration,
    ) -> RefDataResult<Option<CacheEntry>> {
        let paths = self.paths_for(url);
        let Some(meta) = self.read_meta(url).await? else {
            return Ok(None);
        };

        let (Some(fetched_at), Some(expected)) = (meta.fetched_at, meta.checksum.as_deref()) else {
            // Only failed attempts so far
            return Ok(None);
        };

        let payload = tokio::fs::read(&paths.body)
            .await
            .map_err(|e| RefDataError::CacheCorruption {
                path: paths.body.clone(),
                message: format!("Body unreadable: {}", e),
            })?;

        if payload.len() as u64 != meta.byte_size || checksum(&payload) != expected {
            return Err(RefDataError::CacheCorruption {
                path: paths.body,
                message: "Checksum mismatch".to_string(),
            });
        }

        Ok(Some(CacheEntry {
            key: paths.key,
            payload,
            fetched_at,
            ttl,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const URL: &str = "https://Wiki.Example:443/Genres#top";

    #[test]
    fn test_canonicalize_drops_fragment_and_default_port() {
        assert_eq!(canonicalize_url(URL), "https://wiki.example/Genres");
    }

    #[test]
    fn test_equivalent_urls_share_paths() {
        let store = RawStore::new("/tmp/store");
        assert_eq!(
            store.paths_for(URL),
            store.paths_for("https://wiki.example/Genres")
        );
    }

    #[tokio::test]
    async fn test_write_then_read_entry() {
        let dir = TempDir::new().unwrap();
        let store = RawStore::new(dir.path());
        let now = Utc::now();

        let record = store.write_success(URL, b"# Rock", now).await.unwrap();
        assert_eq!(record.status, FetchStatus::Ok);
        assert_eq!(record.byte_size, 6);

        let entry = store
            .read_entry(URL, chrono::Duration::hours(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.payload, b"# Rock");
        assert_eq!(entry.fetched_at, now);
    }

    #[tokio::test]
    async fn test_missing_source_is_none() {
        let dir = TempDir::new().unwrap();
        let store = RawStore::new(dir.path());
        let entry = store.read_entry(URL, chrono::Duration::hours(1)).await.unwrap();
        assert!(entry.is_none());
    }

    #[tokio::test]
    async fn test_tampered_body_is_corruption() {
        let dir = TempDir::new().unwrap();
        let store = RawStore::new(dir.path());
        store.write_success(URL, b"# Rock", Utc::now()).await.unwrap();

        std::fs::write(store.paths_for(URL).body, b"# Jazz").unwrap();

        let result = store.read_entry(URL, chrono::Duration::hours(1)).await;
        assert!(matches!(result, Err(RefDataError::CacheCorruption { .. })));
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_body() {
        let dir = TempDir::new().unwrap();
        let store = RawStore::new(dir.path());
        let fetched_at = Utc::now();
        store.write_success(URL, b"# Rock", fetched_at).await.unwrap();

        let err = RefDataError::Timeout { url: URL.to_string() };
        let record = store.record_failure(URL, &err, Utc::now()).await.unwrap();

        assert_eq!(record.status, FetchStatus::Failed);
        assert_eq!(record.fetched_at, Some(fetched_at));
        let entry = store.read_entry(URL, chrono::Duration::hours(1)).await.unwrap();
        assert_eq!(entry.unwrap().payload, b"# Rock");
    }

    #[tokio::test]
    async fn test_failure_without_history_has_no_entry() {
        let dir = TempDir::new().unwrap();
        let store = RawStore::new(dir.path());
        let err = RefDataError::Timeout { url: URL.to_string() };

        store.record_failure(URL, &err, Utc::now()).await.unwrap();

        assert!(store.read_meta(URL).await.unwrap().is_some());
        assert!(store.read_entry(URL, chrono::Duration::hours(1)).await.unwrap().is_none());
    }
}
