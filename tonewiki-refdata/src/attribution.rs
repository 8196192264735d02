//! Source attribution
//!
//! Counts how often each wiki-derived item was served and renders citation
//! bundles for downstream text generation. Fallback items have no source and
//! are never counted or cited.

use crate::models::{AttributionRecord, CatalogEntry, CatalogItem};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// Usage counters keyed by (content_id, source_url)
#[derive(Debug, Default)]
pub struct AttributionTracker {
    records: RwLock<HashMap<(String, String), AttributionRecord>>,
}

impl AttributionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one use of `content_id` backed by `source_url`
    pub async fn record_usage(&self, content_id: &str, source_url: &str) {
        let now = tonewiki_common::time::now();
        let mut records = self.records.write().await;
        bump(&mut records, content_id.to_string(), source_url, now);
    }

    /// Count one use of every wiki-derived entry in `entries`
    pub async fn record_served<T: CatalogEntry>(&self, entries: &[T]) {
        let now = tonewiki_common::time::now();
        let mut records = self.records.write().await;
        for entry in entries {
            if let Some(url) = entry.source_url() {
                bump(&mut records, entry.content_id(), url, now);
            }
        }
    }

    /// Total usage per source URL
    pub async fn get_stats(&self) -> BTreeMap<String, u64> {
        let records = self.records.read().await;
        let mut stats = BTreeMap::new();
        for record in records.values() {
            let count = stats.entry(record.source_url.clone()).or_insert(0u64);
            *count = count.saturating_add(record.usage_count);
        }
        stats
    }

    /// All records, most used first
    pub async fn records(&self) -> Vec<AttributionRecord> {
        let records = self.records.read().await;
        let mut list: Vec<AttributionRecord> = records.values().cloned().collect();
        list.sort_by(|a, b| {
            b.usage_count
                .cmp(&a.usage_count)
                .then_with(|| a.content_id.cmp(&b.content_id))
                .then_with(|| a.source_url.cmp(&b.source_url))
        });
        list
    }

    /// Usage record for one item, if it was ever served
    pub async fn record_for(&self, content_id: &str, source_url: &str) -> Option<AttributionRecord> {
        self.records
            .read()
            .await
            .get(&(content_id.to_string(), source_url.to_string()))
            .cloned()
    }
}

fn bump(
    records: &mut HashMap<(String, String), AttributionRecord>,
    content_id: String,
    source_url: &str,
    now: DateTime<Utc>,
) {
    let record = records
        .entry((content_id.clone(), source_url.to_string()))
        .or_insert_with(|| AttributionRecord {
            content_id,
            source_url: source_url.to_string(),
            usage_count: 0,
            last_used_at: now,
        });
    record.usage_count = record.usage_count.saturating_add(1);
    record.last_used_at = record.last_used_at.max(now);
}

/// Render items as a citation bundle
///
/// Each payload is followed by its citation marker; a `Sources:` list maps
/// markers to URLs. URLs are numbered in order of first appearance.
pub fn build_context(items: &[CatalogItem]) -> String {
    let mut sources: Vec<&str> = Vec::new();
    let mut blocks = Vec::with_capacity(items.len());

    for item in items {
        let mut block = item.payload();
        if let Some(url) = item.source_url() {
            let number = match sources.iter().position(|s| *s == url) {
                Some(pos) => pos + 1,
                None => {
                    sources.push(url);
                    sources.len()
                }
            };
            block.push_str(&format!("\nSource: [{}]", number));
        }
        blocks.push(block);
    }

    let mut out = blocks.join("\n\n");
    if !sources.is_empty() {
        out.push_str("\n\nSources:");
        for (i, url) in sources.iter().enumerate() {
            out.push_str(&format!("\n[{}] {}", i + 1, url));
        }
    }
    out
}
