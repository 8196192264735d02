//! Genre pages
//!
//! Heading nesting defines the genre hierarchy. List items under a genre
//! heading are its subgenres, and nested list items are subgenres of the item
//! above them. Headings named after a genre attribute ("Characteristics",
//! "Instruments", ...) fill that attribute of the enclosing genre instead of
//! creating a new one.

use super::fields::{self, EntryLine, LabelSet};
use super::markup::Block;
use super::{ContentParser, Skipped};
use crate::models::{normalize_name, Genre};
use std::collections::HashMap;

const PREFIXES: &[&str] = &["genre", "subgenre"];

const LABELS: LabelSet = &[
    ("characteristics", "characteristics"),
    ("characteristic", "characteristics"),
    ("traits", "characteristics"),
    ("instruments", "instruments"),
    ("instrument", "instruments"),
    ("typical instruments", "instruments"),
    ("instrumentation", "instruments"),
    ("moods", "moods"),
    ("mood", "moods"),
    ("mood associations", "moods"),
    ("subgenres", "subgenres"),
    ("subgenre", "subgenres"),
    ("sub-genres", "subgenres"),
    ("description", "description"),
];

/// Headings that describe the enclosing genre rather than name a new one
const ATTRIBUTE_HEADINGS: LabelSet = &[
    ("characteristics", "characteristics"),
    ("musical characteristics", "characteristics"),
    ("instruments", "instruments"),
    ("instrumentation", "instruments"),
    ("typical instruments", "instruments"),
    ("moods", "moods"),
    ("mood", "moods"),
    ("subgenres", "subgenres"),
    ("sub-genres", "subgenres"),
    ("styles", "subgenres"),
    ("description", "description"),
    ("overview", "description"),
    ("history", "description"),
    ("origins", "description"),
];

const MAX_DESCRIPTION_CHARS: usize = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    /// Navigation section; content ignored
    Skipped,
    /// No genre heading in effect; items become genres under `parent`
    Open { parent: Option<usize> },
    Genre(usize),
}

#[derive(Default)]
struct GenreBuilder {
    genres: Vec<Genre>,
    index: HashMap<String, usize>,
}

impl GenreBuilder {
    /// Existing entry for `name`, or a new one (first occurrence wins)
    fn upsert(&mut self, name: &str) -> usize {
        let key = normalize_name(name);
        if let Some(idx) = self.index.get(&key) {
            return *idx;
        }
        let idx = self.genres.len();
        self.genres.push(Genre::new(name));
        self.index.insert(key, idx);
        idx
    }

    fn add_line(&mut self, line: EntryLine) -> usize {
        let idx = self.upsert(&line.name);
        if !line.description.is_empty() && self.genres[idx].description.is_empty() {
            self.genres[idx].description = line.description;
        }
        for (label, values) in line.labeled {
            self.apply(idx, label, values);
        }
        idx
    }

    fn link(&mut self, parent: usize, child: usize) {
        if parent == child {
            return;
        }
        let child_name = self.genres[child].name.clone();
        let key = normalize_name(&child_name);
        let subgenres = &mut self.genres[parent].subgenres;
        if !subgenres.iter().any(|s| normalize_name(s) == key) {
            subgenres.push(child_name);
        }
    }

    fn apply(&mut self, idx: usize, label: &str, values: Vec<String>) {
        match label {
            "characteristics" => extend_lower(&mut self.genres[idx].characteristics, values),
            "instruments" => extend_lower(&mut self.genres[idx].typical_instruments, values),
            "moods" => extend_lower(&mut self.genres[idx].mood_associations, values),
            "subgenres" => {
                for value in values {
                    if fields::is_valid_name(&value) {
                        let child = self.upsert(&value);
                        self.link(idx, child);
                    }
                }
            }
            _ => self.describe(idx, &values.join(", ")),
        }
    }

    fn describe(&mut self, idx: usize, text: &str) {
        let description = &mut self.genres[idx].description;
        if description.chars().count() >= MAX_DESCRIPTION_CHARS {
            return;
        }
        if !description.is_empty() {
            description.push(' ');
        }
        description.push_str(text);
    }
}

fn extend_lower(set: &mut std::collections::BTreeSet<String>, values: Vec<String>) {
    set.extend(values.into_iter().map(|v| v.to_lowercase()));
}

/// Headings that group genres without being one ("List of genres")
fn is_grouping_heading(text: &str) -> bool {
    let key = normalize_name(text);
    key.starts_with("list of")
        || key.starts_with("index")
        || key.split_whitespace().any(|w| w == "genres" || w == "genre")
}

impl ContentParser for Genre {
    fn parse_blocks(blocks: &[Block], skipped: &mut Skipped) -> Vec<Self> {
        let mut builder = GenreBuilder::default();
        let mut headings: Vec<(u8, Option<usize>)> = Vec::new();
        let mut section = Section::Open { parent: None };
        let mut attribute: Option<&'static str> = None;
        let mut items: Vec<(u8, usize)> = Vec::new();

        for block in blocks {
            match block {
                Block::Heading { level, text } => {
                    while headings.last().is_some_and(|(l, _)| *l >= *level) {
                        headings.pop();
                    }
                    items.clear();
                    attribute = None;
                    let enclosing = headings.iter().rev().find_map(|(_, g)| *g);

                    if fields::is_navigation(text) {
                        headings.push((*level, None));
                        section = Section::Skipped;
                        continue;
                    }

                    if let Some(label) = fields::canonical_label(text.trim_end_matches(':'), ATTRIBUTE_HEADINGS) {
                        headings.push((*level, enclosing));
                        match enclosing {
                            Some(idx) => {
                                section = Section::Genre(idx);
                                attribute = Some(label);
                            }
                            None => section = Section::Open { parent: None },
                        }
                        continue;
                    }

                    if is_grouping_heading(text) {
                        headings.push((*level, enclosing));
                        section = Section::Open { parent: enclosing };
                        continue;
                    }

                    match fields::parse_entry_line(text, PREFIXES, LABELS) {
                        Some(line) => {
                            let idx = builder.add_line(line);
                            if let Some(parent) = enclosing {
                                builder.link(parent, idx);
                            }
                            headings.push((*level, Some(idx)));
                            section = Section::Genre(idx);
                        }
                        None => {
                            skipped.record(text);
                            headings.push((*level, enclosing));
                            section = Section::Open { parent: enclosing };
                        }
                    }
                }

                Block::Paragraph(text) => {
                    let current = match section {
                        Section::Skipped => continue,
                        Section::Genre(idx) => Some(idx),
                        Section::Open { parent } => parent,
                    };

                    if fields::strip_prefix(text, PREFIXES).1 {
                        match fields::parse_entry_line(text, PREFIXES, LABELS) {
                            Some(line) => {
                                let idx = builder.add_line(line);
                                if let Some(parent) = current {
                                    builder.link(parent, idx);
                                }
                            }
                            None => skipped.record(text),
                        }
                        continue;
                    }

                    // Prose outside a genre section carries nothing to attach to
                    let Section::Genre(idx) = section else { continue };
                    if let Some((label, values)) = fields::labeled_segment(text, LABELS) {
                        builder.apply(idx, label, values);
                    } else {
                        match attribute {
                            Some(label) if label != "description" => {
                                builder.apply(idx, label, fields::split_values(text))
                            }
                            _ => builder.describe(idx, text),
                        }
                    }
                }

                Block::Item { depth, text } => {
                    let section_genre = match section {
                        Section::Skipped => continue,
                        Section::Genre(idx) => Some(idx),
                        Section::Open { parent } => parent,
                    };

                    while items.last().is_some_and(|(d, _)| *d >= *depth) {
                        items.pop();
                    }
                    let item_parent = items.last().map(|(_, idx)| *idx);

                    if let Some((label, values)) = fields::labeled_segment(text, LABELS) {
                        match item_parent.or(section_genre) {
                            Some(target) => builder.apply(target, label, values),
                            None => skipped.record(text),
                        }
                        continue;
                    }

                    if let (Section::Genre(idx), Some(label), None) = (section, attribute, item_parent) {
                        if label != "subgenres" {
                            if label == "description" {
                                builder.describe(idx, text);
                            } else {
                                builder.apply(idx, label, fields::split_values(text));
                            }
                            continue;
                        }
                    }

                    match fields::parse_entry_line(text, PREFIXES, LABELS) {
                        Some(line) => {
                            let idx = builder.add_line(line);
                            if let Some(parent) = item_parent.or(section_genre) {
                                builder.link(parent, idx);
                            }
                            items.push((*depth, idx));
                        }
                        None => skipped.record(text),
                    }
                }
            }
        }

        builder.genres
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse, ParseOutcome};

    const URL: &str = "https://wiki.example/genres";

    fn genres(raw: &str) -> Vec<Genre> {
        parse::<Genre>(raw.as_bytes(), Some(URL)).into_entries()
    }

    fn find<'a>(genres: &'a [Genre], name: &str) -> &'a Genre {
        genres
            .iter()
            .find(|g| g.name == name)
            .unwrap_or_else(|| panic!("{} not parsed", name))
    }

    #[test]
    fn test_prefixed_genre_line() {
        let parsed = genres("Genre: Ambient Folk — characteristics: soft, acoustic, introspective\n");
        assert_eq!(parsed.len(), 1);
        let genre = &parsed[0];
        assert_eq!(genre.name, "Ambient Folk");
        assert!(genre.characteristics.contains("acoustic"));
        assert!(genre.characteristics.contains("introspective"));
        assert_eq!(genre.source_url.as_deref(), Some(URL));
    }

    #[test]
    fn test_heading_hierarchy_builds_subgenres() {
        let parsed = genres(
            "# Electronic\nMusic made with electronic instruments.\n## House\n- Deep House\n- Acid House\n## Techno\n",
        );

        let electronic = find(&parsed, "Electronic");
        assert_eq!(electronic.subgenres, vec!["House", "Techno"]);
        assert_eq!(electronic.description, "Music made with electronic instruments.");

        let house = find(&parsed, "House");
        assert_eq!(house.subgenres, vec!["Deep House", "Acid House"]);
    }

    #[test]
    fn test_nested_items_are_subgenres_of_item() {
        let parsed = genres("- Rock\n  - Punk\n    - Hardcore\n  - Grunge\n- Jazz\n");
        assert_eq!(find(&parsed, "Rock").subgenres, vec!["Punk", "Grunge"]);
        assert_eq!(find(&parsed, "Punk").subgenres, vec!["Hardcore"]);
        assert!(find(&parsed, "Jazz").subgenres.is_empty());
    }

    #[test]
    fn test_attribute_headings_fill_enclosing_genre() {
        let parsed = genres(
            "<h2>Blues</h2><h3>Characteristics</h3><ul><li>Twelve-bar form, call and response</li></ul>\
             <h3>Instrumentation</h3><p>guitar, harmonica</p>",
        );
        assert_eq!(parsed.len(), 1);
        let blues = &parsed[0];
        assert!(blues.characteristics.contains("twelve-bar form"));
        assert!(blues.characteristics.contains("call and response"));
        assert!(blues.typical_instruments.contains("harmonica"));
    }

    #[test]
    fn test_labeled_nested_item_applies_to_parent() {
        let parsed = genres("- Dream Pop — ethereal pop\n  - Moods: wistful, hazy\n  - Instruments: reverb guitar\n");
        assert_eq!(parsed.len(), 1);
        let dream_pop = &parsed[0];
        assert_eq!(dream_pop.description, "ethereal pop");
        assert!(dream_pop.mood_associations.contains("wistful"));
        assert!(dream_pop.typical_instruments.contains("reverb guitar"));
    }

    #[test]
    fn test_navigation_sections_ignored() {
        let parsed = genres("## Rock\n- Punk\n## See also\n- List of bands\n## References\n- Smith 2001\n");
        assert_eq!(parsed.len(), 2);
        assert!(parsed.iter().all(|g| g.name != "List of bands"));
    }

    #[test]
    fn test_subgenres_label_creates_children() {
        let parsed = genres("- Metal — subgenres: Doom Metal, Black Metal\n");
        let metal = find(&parsed, "Metal");
        assert_eq!(metal.subgenres, vec!["Doom Metal", "Black Metal"]);
        assert!(parsed.iter().any(|g| g.name == "Doom Metal"));
    }

    #[test]
    fn test_duplicates_keep_first_description() {
        let parsed = genres("- Ska — Jamaican dance music\n- Ska — something else; moods: upbeat\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].description, "Jamaican dance music");
        assert!(parsed[0].mood_associations.contains("upbeat"));
    }

    #[test]
    fn test_malformed_fragments_are_isolated() {
        let outcome = parse::<Genre>(
            b"<h2>Folk</h2><ul><li>Freak Folk</li><li>{{cite web|url=x}}</li><li>Anti-Folk</li>",
            Some(URL),
        );
        match outcome {
            ParseOutcome::Partial { entries, skipped, .. } => {
                assert_eq!(entries.len(), 3);
                assert_eq!(skipped, 1);
            }
            other => panic!("expected partial outcome, got {:?}", other),
        }
    }

    #[test]
    fn test_grouping_heading_is_not_a_genre() {
        let parsed = genres("# List of music genres\n- Ambient\n- Shoegaze\n");
        assert_eq!(parsed.len(), 2);
    }
}
