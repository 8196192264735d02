//! Trait matcher
//!
//! Ranks caller-supplied free-text traits against catalog entries.
//!
//! **Scoring:**
//! 1. A trait equal to, or (for traits of 3+ chars) contained in, the entry's
//!    name or one of its key terms scores 1.0
//! 2. Otherwise the score is the Jaccard overlap between trait tokens and the
//!    entry's key-term tokens or descriptive tokens, whichever is higher
//! 3. A parent genre scores at least 0.7 × its best subgenre
//! 4. If nothing reaches 0.3, every entry is ranked by lexical similarity to
//!    the traits instead, with confidence = similarity × 0.3
//!
//! **Ordering:** confidence desc → source fetched_at desc (fallback entries
//! last) → name ascending. The result never depends on catalog order.

use crate::models::{normalize_name, CatalogEntry};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Confidence for an exact or substring hit
pub const EXACT_MATCH_CONFIDENCE: f64 = 1.0;
/// Share of a subgenre's confidence credited to its parent
pub const PARENT_PROPAGATION_FACTOR: f64 = 0.7;
/// Results below this fall through to nearest-neighbour ranking
pub const MATCH_THRESHOLD: f64 = 0.3;
/// Scale applied to nearest-neighbour similarity
pub const NEAREST_NEIGHBOUR_FACTOR: f64 = 0.3;
/// Shortest trait allowed to match as a substring
pub const MIN_SUBSTRING_CHARS: usize = 3;

const MAX_PROPAGATION_PASSES: usize = 16;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "the", "of", "in", "on", "with", "for", "to", "or", "by", "from", "is",
    "are", "music", "style", "sound",
];

/// One ranked entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult<T> {
    pub entry: T,
    /// In [0, 1]
    pub confidence: f64,
}

/// Lowercase alphanumeric tokens without stop words
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

/// |a ∩ b| / |a ∪ b|, zero when both are empty
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Stateless trait matcher
#[derive(Debug, Clone, Copy, Default)]
pub struct Matcher;

impl Matcher {
    pub fn new() -> Self {
        Self
    }

    /// Rank `entries` against `traits`
    ///
    /// `fetched_at` maps an entry's source URL to when that source was last
    /// fetched. The result is non-empty whenever `entries` is.
    pub fn rank<T, S, F>(&self, traits: &[S], entries: &[T], fetched_at: F) -> Vec<MatchResult<T>>
    where
        T: CatalogEntry,
        S: AsRef<str>,
        F: Fn(&str) -> Option<DateTime<Utc>>,
    {
        if entries.is_empty() {
            return Vec::new();
        }

        let traits = normalize_traits(traits);
        let trait_tokens: HashSet<String> = traits.iter().flat_map(|t| tokenize(t)).collect();

        let direct: Vec<f64> = entries
            .iter()
            .map(|entry| direct_score(&traits, &trait_tokens, entry))
            .collect();
        let scores = propagate_to_parents(entries, direct);

        let mut results: Vec<MatchResult<T>> = entries
            .iter()
            .zip(&scores)
            .filter(|(_, score)| **score >= MATCH_THRESHOLD)
            .map(|(entry, score)| MatchResult {
                entry: entry.clone(),
                confidence: score.clamp(0.0, 1.0),
            })
            .collect();

        if results.is_empty() {
            tracing::debug!(
                data_type = %T::DATA_TYPE,
                traits = ?traits,
                "No entry above threshold, ranking by lexical similarity"
            );
            results = entries
                .iter()
                .map(|entry| MatchResult {
                    entry: entry.clone(),
                    confidence: (lexical_similarity(&traits, entry) * NEAREST_NEIGHBOUR_FACTOR)
                        .clamp(0.0, 1.0),
                })
                .collect();
        }

        sort_results(&mut results, &fetched_at);
        results
    }
}

fn normalize_traits<S: AsRef<str>>(traits: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    traits
        .iter()
        .map(|t| normalize_name(t.as_ref()))
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

fn direct_score<T: CatalogEntry>(traits: &[String], trait_tokens: &HashSet<String>, entry: &T) -> f64 {
    let name = normalize_name(entry.match_name());
    let terms: Vec<String> = entry.key_terms().into_iter().map(normalize_name).collect();

    for t in traits {
        if *t == name || terms.contains(t) {
            return EXACT_MATCH_CONFIDENCE;
        }
        if t.chars().count() >= MIN_SUBSTRING_CHARS
            && (name.contains(t.as_str()) || terms.iter().any(|k| k.contains(t.as_str())))
        {
            return EXACT_MATCH_CONFIDENCE;
        }
    }

    let key_tokens: HashSet<String> = terms.iter().flat_map(|k| tokenize(k)).collect();
    let descriptive_tokens = tokenize(&entry.descriptive_text());

    jaccard(trait_tokens, &key_tokens).max(jaccard(trait_tokens, &descriptive_tokens))
}

/// Raise each parent to at least `factor × best child`, through every level
fn propagate_to_parents<T: CatalogEntry>(entries: &[T], mut scores: Vec<f64>) -> Vec<f64> {
    let index: HashMap<String, usize> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| (normalize_name(e.match_name()), i))
        .collect();

    let children: Vec<Vec<usize>> = entries
        .iter()
        .map(|e| {
            e.children()
                .iter()
                .filter_map(|c| index.get(&normalize_name(c)).copied())
                .collect()
        })
        .collect();

    for _ in 0..MAX_PROPAGATION_PASSES {
        let mut changed = false;
        for (parent, kids) in children.iter().enumerate() {
            let best_child = kids.iter().map(|k| scores[*k]).fold(0.0, f64::max);
            let propagated = best_child * PARENT_PROPAGATION_FACTOR;
            if propagated > scores[parent] {
                scores[parent] = propagated;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    scores
}

/// Best similarity of any trait to the entry's name or key terms
fn lexical_similarity<T: CatalogEntry>(traits: &[String], entry: &T) -> f64 {
    let name = normalize_name(entry.match_name());
    let mut entry_tokens = tokenize(&name);
    for term in entry.key_terms() {
        entry_tokens.extend(tokenize(term));
    }

    traits
        .iter()
        .map(|t| {
            let edit = strsim::normalized_levenshtein(t, &name);
            let trait_tokens = tokenize(t);
            let shared = if trait_tokens.is_empty() {
                0.0
            } else {
                trait_tokens.intersection(&entry_tokens).count() as f64 / trait_tokens.len() as f64
            };
            edit.max(shared)
        })
        .fold(0.0, f64::max)
}

fn sort_results<T, F>(results: &mut [MatchResult<T>], fetched_at: &F)
where
    T: CatalogEntry,
    F: Fn(&str) -> Option<DateTime<Utc>>,
{
    let recency = |r: &MatchResult<T>| r.entry.source_url().and_then(fetched_at);

    results.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            // Newer first; None (fallback) sorts below every Some
            .then_with(|| recency(b).cmp(&recency(a)))
            .then_with(|| a.entry.name().to_lowercase().cmp(&b.entry.name().to_lowercase()))
            .then_with(|| a.entry.name().cmp(b.entry.name()))
            .then_with(|| a.entry.source_url().cmp(&b.entry.source_url()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Genre, Technique};

    const URL: &str = "https://wiki.example/genres";

    fn genre(name: &str, characteristics: &[&str]) -> Genre {
        let mut genre = Genre::new(name);
        genre.characteristics = characteristics.iter().map(|c| c.to_string()).collect();
        genre.source_url = Some(URL.to_string());
        genre
    }

    fn no_recency(_: &str) -> Option<DateTime<Utc>> {
        None
    }

    #[test]
    fn test_exact_characteristic_match() {
        let catalog = vec![
            genre("Ambient Folk", &["soft", "acoustic", "introspective"]),
            genre("Metal", &["heavy", "loud"]),
        ];

        let results = Matcher.rank(&["acoustic", "introspective"], &catalog, no_recency);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entry.name, "Ambient Folk");
        assert!(results[0].confidence >= 0.6);
    }

    #[test]
    fn test_substring_requires_three_chars() {
        let catalog = vec![genre("Hard Rock", &[])];

        let hit = Matcher.rank(&["rock"], &catalog, no_recency);
        assert_eq!(hit[0].confidence, 1.0);

        // "ha" is too short to count as a substring hit
        let miss = Matcher.rank(&["ha"], &catalog, no_recency);
        assert!(miss[0].confidence < MATCH_THRESHOLD);
    }

    #[test]
    fn test_token_overlap_gives_partial_confidence() {
        let mut genre = genre("Shoegaze", &[]);
        genre.description = "dreamy wall of distorted guitars".to_string();
        let catalog = vec![genre];

        let results = Matcher.rank(&["dreamy guitars"], &catalog, no_recency);

        // {dreamy, guitars} vs {dreamy, wall, distorted, guitars}
        assert!((results[0].confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_parent_receives_discounted_child_score() {
        let mut folk = genre("Folk", &["traditional"]);
        folk.subgenres = vec!["Ambient Folk".to_string()];
        let catalog = vec![folk, genre("Ambient Folk", &["introspective"])];

        let results = Matcher.rank(&["introspective"], &catalog, no_recency);

        assert_eq!(results[0].entry.name, "Ambient Folk");
        assert_eq!(results[0].confidence, 1.0);
        assert_eq!(results[1].entry.name, "Folk");
        assert!((results[1].confidence - PARENT_PROPAGATION_FACTOR).abs() < 1e-9);
    }

    #[test]
    fn test_parent_already_higher_is_kept() {
        let mut rock = genre("Rock", &["loud"]);
        rock.subgenres = vec!["Punk".to_string()];
        let catalog = vec![rock, genre("Punk", &["loud"])];

        let results = Matcher.rank(&["loud"], &catalog, no_recency);
        assert!(results.iter().all(|r| r.confidence == 1.0));
    }

    #[test]
    fn test_nearest_neighbour_fallback_ranks_whole_catalog() {
        let catalog = vec![
            genre("Jazz", &["swing"]),
            genre("Jaz Fusion", &["complex"]),
            genre("Metal", &["heavy"]),
        ];

        let results = Matcher.rank(&["jazzy"], &catalog, no_recency);

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.confidence < MATCH_THRESHOLD));
        assert_eq!(results[0].entry.name, "Jazz");
    }

    #[test]
    fn test_no_traits_still_returns_entries() {
        let catalog = vec![genre("Jazz", &[]), genre("Blues", &[])];
        let results = Matcher.rank::<Genre, &str, _>(&[], &catalog, no_recency);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].entry.name, "Blues");
    }

    #[test]
    fn test_empty_catalog_returns_empty() {
        let results = Matcher.rank(&["anything"], &Vec::<Technique>::new(), no_recency);
        assert!(results.is_empty());
    }

    #[test]
    fn test_tie_break_prefers_recent_source_then_name() {
        let newer = "https://new.example/genres";
        let mut a = genre("Beta", &["calm"]);
        a.source_url = Some(newer.to_string());
        let b = genre("Alpha", &["calm"]);
        let mut c = genre("Aardvark", &["calm"]);
        c.source_url = None;

        let now = Utc::now();
        let fetched_at = |url: &str| {
            if url == newer {
                Some(now)
            } else {
                Some(now - chrono::Duration::hours(1))
            }
        };

        let names: Vec<String> = Matcher
            .rank(&["calm"], &[c, b, a], fetched_at)
            .into_iter()
            .map(|r| r.entry.name)
            .collect();
        assert_eq!(names, vec!["Beta", "Alpha", "Aardvark"]);
    }

    #[test]
    fn test_ranking_independent_of_catalog_order() {
        let catalog = vec![
            genre("Dream Pop", &["hazy", "ethereal"]),
            genre("Shoegaze", &["hazy", "loud"]),
            genre("Slowcore", &["slow", "hazy"]),
        ];
        let mut reversed = catalog.clone();
        reversed.reverse();

        let first = Matcher.rank(&["hazy"], &catalog, no_recency);
        let second = Matcher.rank(&["hazy"], &reversed, no_recency);
        assert_eq!(first, second);
        assert_eq!(first, Matcher.rank(&["hazy"], &catalog, no_recency));
    }

    #[test]
    fn test_tokenize_drops_stop_words() {
        let tokens = tokenize("The sound of Lo-fi Hip Hop");
        let expected: HashSet<String> = ["lo", "fi", "hip", "hop"].iter().map(|s| s.to_string()).collect();
        assert_eq!(tokens, expected);
    }
}
