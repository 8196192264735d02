//! Wiki content downloader
//!
//! Fetches raw page content with a bounded number of in-flight requests,
//! retries transient failures with exponential backoff, and persists each
//! successful body (plus its ContentSource metadata) via temp-then-rename.
//! Nothing is persisted for a fetch that ultimately fails, apart from the
//! failure status in the metadata record.

use crate::config::{validate_url, RefDataConfig};
use crate::error::{RefDataError, RefDataResult};
use crate::models::ContentSource;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::storage::RawStore;
use futures::stream::{self, StreamExt};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Body and metadata of one successful fetch
#[derive(Debug, Clone)]
pub struct FetchedContent {
    pub url: String,
    pub payload: Vec<u8>,
    pub source: ContentSource,
}

type DirectLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// HTTP downloader shared by every refresh cycle
pub struct Downloader {
    /// HTTP client with configured timeouts
    client: Client,
    store: RawStore,
    /// Bounds in-flight requests across all callers
    permits: Arc<Semaphore>,
    concurrency_limit: usize,
    retry: RetryPolicy,
    request_timeout: Duration,
    /// Optional outbound quota
    rate_limiter: Option<DirectLimiter>,
}

impl Downloader {
    /// Create a downloader from configuration
    ///
    /// # Errors
    /// Returns a configuration error if the HTTP client cannot be built
    pub fn new(config: &RefDataConfig, store: RawStore) -> RefDataResult<Self> {
        let request_timeout = config.request_timeout();
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(request_timeout)
            .connect_timeout(request_timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|e| RefDataError::Configuration(format!("HTTP client build failed: {}", e)))?;

        let rate_limiter = NonZeroU32::new(config.requests_per_second)
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));

        let concurrency_limit = config.concurrency_limit.max(1);

        Ok(Self {
            client,
            store,
            permits: Arc::new(Semaphore::new(concurrency_limit)),
            concurrency_limit,
            retry: RetryPolicy::new(
                config.max_retries,
                Duration::from_millis(config.retry_base_delay_ms),
            ),
            request_timeout,
            rate_limiter,
        })
    }

    pub fn store(&self) -> &RawStore {
        &self.store
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Fetch one URL, retrying transient failures, and persist the result
    ///
    /// # Errors
    /// - `Configuration` for a malformed URL (no request is made)
    /// - `Network` / `Timeout` once retries are exhausted or on a permanent HTTP error
    pub async fn fetch(&self, url: &str) -> RefDataResult<FetchedContent> {
        validate_url(url)?;

        let result = retry_with_backoff(url, self.retry, |attempt| self.fetch_once(url, attempt)).await;

        match result {
            Ok(payload) => {
                let fetched_at = tonewiki_common::time::now();
                let source = self.store.write_success(url, &payload, fetched_at).await?;
                tracing::info!(
                    url = %url,
                    bytes = payload.len(),
                    checksum = %source.checksum.as_deref().unwrap_or_default(),
                    "Fetched source content"
                );
                Ok(FetchedContent {
                    url: url.to_string(),
                    payload,
                    source,
                })
            }
            Err(err) => {
                if let Err(meta_err) = self
                    .store
                    .record_failure(url, &err, tonewiki_common::time::now())
                    .await
                {
                    tracing::warn!(url = %url, error = %meta_err, "Could not record fetch failure");
                }
                Err(err)
            }
        }
    }

    /// Fetch many URLs concurrently, bounded by the concurrency limit
    ///
    /// Results come back in the same order as `urls`.
    pub async fn fetch_all(&self, urls: &[String]) -> Vec<(String, RefDataResult<FetchedContent>)> {
        stream::iter(urls.iter().cloned())
            .map(|url| async move {
                let result = self.fetch(&url).await;
                (url, result)
            })
            .buffered(self.concurrency_limit)
            .collect()
            .await
    }

    /// One HTTP attempt, holding a concurrency permit for its duration
    async fn fetch_once(&self, url: &str, attempt: u32) -> RefDataResult<Vec<u8>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| RefDataError::Network {
                url: url.to_string(),
                message: format!("Downloader closed: {}", e),
                status: None,
            })?;

        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        tracing::debug!(url = %url, attempt, "Requesting source content");

        let request = async {
            let response = self.client.get(url).send().await.map_err(|e| map_reqwest_error(url, e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(RefDataError::Network {
                    url: url.to_string(),
                    message: format!("HTTP {}", status),
                    status: Some(status.as_u16()),
                });
            }

            let body = response.bytes().await.map_err(|e| map_reqwest_error(url, e))?;
            Ok::<Vec<u8>, RefDataError>(body.to_vec())
        };

        match tokio::time::timeout(self.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(RefDataError::Timeout {
                url: url.to_string(),
            }),
        }
    }
}

fn map_reqwest_error(url: &str, err: reqwest::Error) -> RefDataError {
    if err.is_timeout() {
        RefDataError::Timeout {
            url: url.to_string(),
        }
    } else {
        RefDataError::Network {
            url: url.to_string(),
            message: err.to_string(),
            status: err.status().map(|s| s.as_u16()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn downloader(dir: &TempDir) -> Downloader {
        let config = RefDataConfig {
            local_storage_path: dir.path().to_path_buf(),
            retry_base_delay_ms: 1,
            ..RefDataConfig::default()
        };
        Downloader::new(&config, RawStore::new(dir.path())).unwrap()
    }

    #[test]
    fn test_downloader_creation() {
        let dir = TempDir::new().unwrap();
        let downloader = downloader(&dir);
        assert_eq!(downloader.concurrency_limit(), 5);
    }

    #[tokio::test]
    async fn test_malformed_url_fails_without_request() {
        let dir = TempDir::new().unwrap();
        let downloader = downloader(&dir);

        let result = downloader.fetch("wiki.example/genres").await;

        assert!(matches!(result, Err(RefDataError::Configuration(_))));
        // Nothing was attempted, so nothing was recorded
        assert!(!downloader.store().raw_dir().exists());
    }

    #[tokio::test]
    async fn test_unsupported_scheme_fails_without_request() {
        let dir = TempDir::new().unwrap();
        let downloader = downloader(&dir);

        let result = downloader.fetch("file:///etc/passwd").await;

        assert!(matches!(result, Err(RefDataError::Configuration(_))));
    }
}
