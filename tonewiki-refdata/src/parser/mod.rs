//! Content parser: raw source bytes → typed catalog entries
//!
//! Parsing is a pure function of its input. Malformed fragments are skipped
//! and counted; they never fail the whole parse. The result says explicitly
//! whether everything parsed, part of it did, or nothing usable was found.

pub mod fields;
pub mod genres;
pub mod markup;
pub mod meta_tags;
pub mod techniques;

use crate::models::CatalogEntry;
use markup::Block;

const MAX_EXCERPTS: usize = 3;

/// Result of parsing one source
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome<T> {
    /// Every fragment parsed
    Complete(Vec<T>),
    /// Some fragments were skipped
    Partial {
        entries: Vec<T>,
        skipped: usize,
        excerpts: Vec<String>,
    },
    /// No entries at all
    Failed {
        skipped: usize,
        reason: String,
        excerpts: Vec<String>,
    },
}

impl<T> ParseOutcome<T> {
    pub fn entries(&self) -> &[T] {
        match self {
            ParseOutcome::Complete(entries) | ParseOutcome::Partial { entries, .. } => entries,
            ParseOutcome::Failed { .. } => &[],
        }
    }

    pub fn into_entries(self) -> Vec<T> {
        match self {
            ParseOutcome::Complete(entries) | ParseOutcome::Partial { entries, .. } => entries,
            ParseOutcome::Failed { .. } => Vec::new(),
        }
    }

    pub fn skipped(&self) -> usize {
        match self {
            ParseOutcome::Complete(_) => 0,
            ParseOutcome::Partial { skipped, .. } | ParseOutcome::Failed { skipped, .. } => *skipped,
        }
    }

    /// Up to three excerpts of skipped fragments
    pub fn excerpts(&self) -> &[String] {
        match self {
            ParseOutcome::Complete(_) => &[],
            ParseOutcome::Partial { excerpts, .. } | ParseOutcome::Failed { excerpts, .. } => excerpts,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ParseOutcome::Failed { .. })
    }
}

/// Skipped-fragment accumulator handed to the per-type parsers
#[derive(Debug, Default)]
pub struct Skipped {
    count: usize,
    excerpts: Vec<String>,
}

impl Skipped {
    pub fn record(&mut self, fragment: &str) {
        self.count += 1;
        if self.excerpts.len() < MAX_EXCERPTS {
            self.excerpts.push(fields::excerpt(fragment));
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Per-type parsing rules over tokenized blocks
pub trait ContentParser: CatalogEntry + Sized {
    fn parse_blocks(blocks: &[Block], skipped: &mut Skipped) -> Vec<Self>;
}

/// Parse raw content into entries of type `T`, stamping each with `source_url`
pub fn parse<T: ContentParser>(raw: &[u8], source_url: Option<&str>) -> ParseOutcome<T> {
    let Some(blocks) = markup::tokenize(raw) else {
        return ParseOutcome::Failed {
            skipped: 0,
            reason: "empty or non-text content".to_string(),
            excerpts: Vec::new(),
        };
    };

    let mut skipped = Skipped::default();
    let mut entries = T::parse_blocks(&blocks, &mut skipped);
    for entry in &mut entries {
        entry.set_source_url(source_url.map(str::to_string));
    }

    let Skipped { count, excerpts } = skipped;
    match (entries.is_empty(), count) {
        (true, 0) => ParseOutcome::Failed {
            skipped: 0,
            reason: format!("no {} entries found", T::DATA_TYPE),
            excerpts,
        },
        (true, count) => ParseOutcome::Failed {
            skipped: count,
            reason: format!("all {} fragments were malformed", count),
            excerpts,
        },
        (false, 0) => ParseOutcome::Complete(entries),
        (false, count) => ParseOutcome::Partial {
            entries,
            skipped: count,
            excerpts,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Genre, MetaTag};

    const URL: &str = "https://wiki.example/genres";

    #[test]
    fn test_empty_content_fails() {
        let outcome = parse::<Genre>(b"", Some(URL));
        assert!(outcome.is_failed());
        assert_eq!(outcome.skipped(), 0);
    }

    #[test]
    fn test_binary_content_fails() {
        let outcome = parse::<MetaTag>(&[0xff, 0x00, 0xfe, 0x00], Some(URL));
        assert!(outcome.is_failed());
    }

    #[test]
    fn test_entries_are_stamped_with_source() {
        let outcome = parse::<Genre>(b"- Shoegaze\n- Dream Pop\n", Some(URL));
        assert!(matches!(outcome, ParseOutcome::Complete(_)));
        assert!(outcome.entries().iter().all(|g| g.source_url.as_deref() == Some(URL)));
    }

    #[test]
    fn test_partial_outcome_counts_skipped() {
        let outcome = parse::<Genre>(b"- Shoegaze\n- {{broken template\n- 1999\n", Some(URL));
        match outcome {
            ParseOutcome::Partial { entries, skipped, excerpts } => {
                assert_eq!(entries.len(), 1);
                assert_eq!(skipped, 2);
                assert_eq!(excerpts.len(), 2);
            }
            other => panic!("expected partial outcome, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_is_deterministic() {
        let raw = b"# Rock\n- Punk\n- Grunge\n# Jazz\n- Bebop\n";
        assert_eq!(parse::<Genre>(raw, Some(URL)), parse::<Genre>(raw, Some(URL)));
    }

    #[test]
    fn test_non_ascii_separator_parses() {
        let raw = "## Structure Tags\n- [Verse] \u{2014} main section\n";
        let outcome = parse::<MetaTag>(raw.as_bytes(), Some(URL));
        assert!(matches!(outcome, ParseOutcome::Complete(_)));
        assert_eq!(outcome.entries().len(), 1);
        assert_eq!(outcome.entries()[0].description, "main section");
    }
}
