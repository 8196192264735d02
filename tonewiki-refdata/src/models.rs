//! Catalog entry types and persisted records
//!
//! Every Genre/MetaTag/Technique either carries the `source_url` of the wiki
//! page it was parsed from, or belongs to the built-in fallback table and has
//! no `source_url` at all.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// The three kinds of reference data served by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Genre,
    MetaTag,
    Technique,
}

impl DataType {
    pub const ALL: [DataType; 3] = [DataType::Genre, DataType::MetaTag, DataType::Technique];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Genre => "genre",
            DataType::MetaTag => "meta_tag",
            DataType::Technique => "technique",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "genre" | "genres" => Ok(DataType::Genre),
            "meta_tag" | "meta_tags" | "metatag" | "metatags" | "tag" | "tags" => {
                Ok(DataType::MetaTag)
            }
            "technique" | "techniques" => Ok(DataType::Technique),
            other => Err(format!("Unknown data type: {}", other)),
        }
    }
}

/// Lowercase, trim and collapse internal whitespace
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Music genre with its subgenre hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Child genre names, in page order
    #[serde(default)]
    pub subgenres: Vec<String>,
    #[serde(default)]
    pub characteristics: BTreeSet<String>,
    #[serde(default)]
    pub typical_instruments: BTreeSet<String>,
    #[serde(default)]
    pub mood_associations: BTreeSet<String>,
    /// None for fallback-table entries
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence_score: f64,
}

fn default_confidence() -> f64 {
    1.0
}

impl Genre {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            subgenres: Vec::new(),
            characteristics: BTreeSet::new(),
            typical_instruments: BTreeSet::new(),
            mood_associations: BTreeSet::new(),
            source_url: None,
            confidence_score: 1.0,
        }
    }
}

/// Structural or stylistic tag understood by the music generator, e.g. `[Verse]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaTag {
    pub tag: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub usage_examples: Vec<String>,
    #[serde(default)]
    pub compatible_genres: BTreeSet<String>,
    #[serde(default)]
    pub source_url: Option<String>,
}

impl MetaTag {
    pub fn new(tag: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            category: category.into(),
            description: String::new(),
            usage_examples: Vec::new(),
            compatible_genres: BTreeSet::new(),
            source_url: None,
        }
    }

    /// Tag text without surrounding brackets
    pub fn bare_tag(&self) -> &str {
        self.tag.trim().trim_start_matches('[').trim_end_matches(']').trim()
    }
}

/// Production or performance technique
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technique {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub technique_type: String,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub applicable_scenarios: BTreeSet<String>,
    #[serde(default)]
    pub source_url: Option<String>,
}

impl Technique {
    pub fn new(name: impl Into<String>, technique_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            technique_type: technique_type.into(),
            examples: Vec::new(),
            applicable_scenarios: BTreeSet::new(),
            source_url: None,
        }
    }
}

/// Common view of catalog entries used by the catalog, matcher and attribution layers
pub trait CatalogEntry:
    Clone + fmt::Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    const DATA_TYPE: DataType;

    /// Display name (genre name, tag, technique name)
    fn name(&self) -> &str;

    /// Name used for exact/substring matching and deduplication
    fn match_name(&self) -> &str {
        self.name()
    }

    fn description(&self) -> &str;

    /// Short terms compared exactly and by substring (characteristics and the like)
    fn key_terms(&self) -> Vec<&str>;

    /// Longer descriptive text compared by token overlap
    fn descriptive_text(&self) -> String;

    /// Names of child entries (only genres have a hierarchy)
    fn children(&self) -> &[String] {
        &[]
    }

    fn source_url(&self) -> Option<&str>;

    fn set_source_url(&mut self, url: Option<String>);

    /// Stable identifier for attribution
    fn content_id(&self) -> String {
        format!("{}:{}", Self::DATA_TYPE.as_str(), normalize_name(self.match_name()))
    }

    /// Human-readable rendering for citation bundles
    fn payload(&self) -> String;

    fn into_item(self) -> CatalogItem;
}

fn join_set(set: &BTreeSet<String>) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

impl CatalogEntry for Genre {
    const DATA_TYPE: DataType = DataType::Genre;

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn key_terms(&self) -> Vec<&str> {
        self.characteristics.iter().map(String::as_str).collect()
    }

    fn descriptive_text(&self) -> String {
        let mut parts = vec![self.description.clone()];
        parts.extend(self.typical_instruments.iter().cloned());
        parts.extend(self.mood_associations.iter().cloned());
        parts.join(" ")
    }

    fn children(&self) -> &[String] {
        &self.subgenres
    }

    fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    fn set_source_url(&mut self, url: Option<String>) {
        self.source_url = url;
    }

    fn payload(&self) -> String {
        let mut out = format!("Genre: {}", self.name);
        if !self.description.is_empty() {
            out.push_str(&format!("\nDescription: {}", self.description));
        }
        if !self.characteristics.is_empty() {
            out.push_str(&format!("\nCharacteristics: {}", join_set(&self.characteristics)));
        }
        if !self.typical_instruments.is_empty() {
            out.push_str(&format!("\nInstruments: {}", join_set(&self.typical_instruments)));
        }
        if !self.mood_associations.is_empty() {
            out.push_str(&format!("\nMoods: {}", join_set(&self.mood_associations)));
        }
        if !self.subgenres.is_empty() {
            out.push_str(&format!("\nSubgenres: {}", self.subgenres.join(", ")));
        }
        out
    }

    fn into_item(self) -> CatalogItem {
        CatalogItem::Genre(self)
    }
}

impl CatalogEntry for MetaTag {
    const DATA_TYPE: DataType = DataType::MetaTag;

    fn name(&self) -> &str {
        &self.tag
    }

    fn match_name(&self) -> &str {
        self.bare_tag()
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn key_terms(&self) -> Vec<&str> {
        vec![self.category.as_str()]
    }

    fn descriptive_text(&self) -> String {
        let mut parts = vec![self.description.clone()];
        parts.extend(self.usage_examples.iter().cloned());
        parts.extend(self.compatible_genres.iter().cloned());
        parts.join(" ")
    }

    fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    fn set_source_url(&mut self, url: Option<String>) {
        self.source_url = url;
    }

    fn payload(&self) -> String {
        let mut out = format!("Meta tag: {} ({})", self.tag, self.category);
        if !self.description.is_empty() {
            out.push_str(&format!("\nDescription: {}", self.description));
        }
        if !self.usage_examples.is_empty() {
            out.push_str(&format!("\nExamples: {}", self.usage_examples.join("; ")));
        }
        if !self.compatible_genres.is_empty() {
            out.push_str(&format!("\nGenres: {}", join_set(&self.compatible_genres)));
        }
        out
    }

    fn into_item(self) -> CatalogItem {
        CatalogItem::MetaTag(self)
    }
}

impl CatalogEntry for Technique {
    const DATA_TYPE: DataType = DataType::Technique;

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn key_terms(&self) -> Vec<&str> {
        let mut terms = vec![self.technique_type.as_str()];
        terms.extend(self.applicable_scenarios.iter().map(String::as_str));
        terms
    }

    fn descriptive_text(&self) -> String {
        let mut parts = vec![self.description.clone()];
        parts.extend(self.examples.iter().cloned());
        parts.join(" ")
    }

    fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    fn set_source_url(&mut self, url: Option<String>) {
        self.source_url = url;
    }

    fn payload(&self) -> String {
        let mut out = format!("Technique: {} ({})", self.name, self.technique_type);
        if !self.description.is_empty() {
            out.push_str(&format!("\nDescription: {}", self.description));
        }
        if !self.applicable_scenarios.is_empty() {
            out.push_str(&format!("\nUse for: {}", join_set(&self.applicable_scenarios)));
        }
        if !self.examples.is_empty() {
            out.push_str(&format!("\nExamples: {}", self.examples.join("; ")));
        }
        out
    }

    fn into_item(self) -> CatalogItem {
        CatalogItem::Technique(self)
    }
}

/// Any catalog entry, as handed to external collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CatalogItem {
    Genre(Genre),
    MetaTag(MetaTag),
    Technique(Technique),
}

impl CatalogItem {
    pub fn data_type(&self) -> DataType {
        match self {
            CatalogItem::Genre(_) => DataType::Genre,
            CatalogItem::MetaTag(_) => DataType::MetaTag,
            CatalogItem::Technique(_) => DataType::Technique,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CatalogItem::Genre(g) => g.name(),
            CatalogItem::MetaTag(t) => t.name(),
            CatalogItem::Technique(t) => t.name(),
        }
    }

    pub fn source_url(&self) -> Option<&str> {
        match self {
            CatalogItem::Genre(g) => g.source_url(),
            CatalogItem::MetaTag(t) => t.source_url(),
            CatalogItem::Technique(t) => t.source_url(),
        }
    }

    pub fn content_id(&self) -> String {
        match self {
            CatalogItem::Genre(g) => g.content_id(),
            CatalogItem::MetaTag(t) => t.content_id(),
            CatalogItem::Technique(t) => t.content_id(),
        }
    }

    pub fn payload(&self) -> String {
        match self {
            CatalogItem::Genre(g) => g.payload(),
            CatalogItem::MetaTag(t) => t.payload(),
            CatalogItem::Technique(t) => t.payload(),
        }
    }
}

/// Outcome of the most recent fetch attempt for a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Ok,
    Failed,
}

/// Persisted metadata for one configured URL (`raw/<stem>.meta.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSource {
    pub url: String,
    /// Path of the raw body file
    pub local_path: std::path::PathBuf,
    /// Time of the last successful fetch; None until one succeeds
    pub fetched_at: Option<DateTime<Utc>>,
    /// Hex SHA-256 of the stored body
    pub checksum: Option<String>,
    pub byte_size: u64,
    pub status: FetchStatus,
    pub last_attempt_at: DateTime<Utc>,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Cached payload for one canonical URL
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Canonicalized URL
    pub key: String,
    pub payload: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
    /// Maximum age before the entry counts as stale
    pub ttl: chrono::Duration,
}

impl CacheEntry {
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        crate::cache::is_stale(self.fetched_at, now, self.ttl)
    }
}

/// Usage counter for one served content item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributionRecord {
    pub content_id: String,
    pub source_url: String,
    pub usage_count: u64,
    pub last_used_at: DateTime<Utc>,
}
