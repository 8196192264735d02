//! tonewiki-refdata - reference data inspection and refresh tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tonewiki_refdata::{CatalogEntry, DataType, RefDataConfig, RefreshCoordinator};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "tonewiki-refdata", version, about = "Wiki-backed reference data for music generation")]
struct Cli {
    /// Config file (overrides TONEWIKI_REFDATA_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh every data type from its sources
    Refresh {
        /// Re-fetch even when cached content is fresh
        #[arg(long)]
        force: bool,
    },
    /// List genres
    Genres,
    /// List meta tags
    Tags {
        #[arg(long)]
        category: Option<String>,
    },
    /// List techniques
    Techniques {
        #[arg(long = "type")]
        technique_type: Option<String>,
    },
    /// Rank entries against traits
    Match {
        data_type: DataType,
        #[arg(required = true)]
        traits: Vec<String>,
    },
    /// URLs backing the current catalog
    Sources { data_type: DataType },
    /// Where each data type would be served from
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = RefDataConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    tonewiki_common::logging::init_tracing(&config.logging)?;

    info!("Starting tonewiki-refdata v{}", env!("CARGO_PKG_VERSION"));

    let coordinator = RefreshCoordinator::initialize(config)
        .await
        .context("Failed to initialize reference data")?;

    match cli.command {
        Command::Refresh { force } => {
            let report = coordinator.refresh(force).await;
            for t in &report.types {
                println!(
                    "{}: {} entries, swapped={}, up_to_date={}, failed sources={}",
                    t.data_type,
                    t.entries,
                    t.swapped,
                    t.up_to_date,
                    t.failed_sources()
                );
                for source in &t.sources {
                    let from = source.sourced_from.map_or("-", |s| s.as_str());
                    match &source.error {
                        Some(err) => println!("  {} [{}] error: {}", source.url, from, err),
                        None => println!(
                            "  {} [{}] {} entries, {} skipped",
                            source.url, from, source.entries, source.skipped
                        ),
                    }
                }
            }
            if report.types.is_empty() {
                println!("Wiki integration is disabled");
            }
        }
        Command::Genres => print_entries(&coordinator.get_genres().await),
        Command::Tags { category } => print_entries(&coordinator.get_meta_tags(category.as_deref()).await),
        Command::Techniques { technique_type } => {
            print_entries(&coordinator.get_techniques(technique_type.as_deref()).await)
        }
        Command::Match { data_type, traits } => {
            for result in coordinator.match_traits(traits.as_slice(), data_type).await {
                println!(
                    "{:.3}  {}  {}",
                    result.confidence,
                    result.entry.name(),
                    result.entry.source_url().unwrap_or("(built-in)")
                );
            }
        }
        Command::Sources { data_type } => {
            let urls = coordinator.get_source_urls(data_type).await;
            if urls.is_empty() {
                println!("No wiki sources back the {} catalog", data_type);
            }
            for url in urls {
                println!("{}", url);
            }
        }
        Command::Status => {
            for status in coordinator.status().await {
                let age = status
                    .snapshot_age_seconds
                    .map_or_else(|| "-".to_string(), |s| format!("{}s", s));
                println!(
                    "{}: origin={} entries={} age={} sources={}/{}",
                    status.data_type,
                    status.origin.as_str(),
                    status.entries,
                    age,
                    status.source_urls.len(),
                    status.configured_urls
                );
            }
        }
    }

    Ok(())
}

fn print_entries<T: CatalogEntry>(entries: &[T]) {
    for entry in entries {
        match entry.source_url() {
            Some(url) => println!("{}  ({})", entry.name(), url),
            None => println!("{}  (built-in)", entry.name()),
        }
    }
}
