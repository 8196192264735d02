//! tonewiki-refdata: dynamic reference data for music generation
//!
//! Downloads genre, meta-tag and technique pages from configured wiki
//! sources, caches them on disk, parses them into typed catalogs and serves
//! them through [`RefreshCoordinator`]. When no wiki data is available the
//! built-in tables are served instead; entries without a `source_url` are
//! always fallback entries.

pub mod attribution;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod downloader;
pub mod error;
pub mod fallback;
pub mod matcher;
pub mod models;
pub mod parser;
pub mod retry;
pub mod storage;

pub use crate::config::RefDataConfig;
pub use crate::coordinator::pipeline::{SourceReport, TypeRefreshReport};
pub use crate::coordinator::providers::ProviderKind;
pub use crate::coordinator::{RefreshCoordinator, RefreshReport, StatusOrigin, TypeStatus};
pub use crate::error::{RefDataError, RefDataResult};
pub use crate::matcher::MatchResult;
pub use crate::models::{CatalogEntry, CatalogItem, DataType, Genre, MetaTag, Technique};
