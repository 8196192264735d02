//! Meta-tag pages
//!
//! The section heading supplies the category ("Structure Tags" → `structure`).
//! Candidates are list items and paragraphs starting with `[`. Tags keep their
//! bracket form; a bare name gets brackets added.

use super::fields::{self, LabelSet};
use super::markup::Block;
use super::{ContentParser, Skipped};
use crate::models::{normalize_name, MetaTag};
use std::collections::HashMap;

const PREFIXES: &[&str] = &["meta tag", "metatag", "tag"];

const LABELS: LabelSet = &[
    ("example", "examples"),
    ("examples", "examples"),
    ("usage", "examples"),
    ("genres", "genres"),
    ("genre", "genres"),
    ("compatible genres", "genres"),
    ("category", "category"),
    ("description", "description"),
];

/// Bare (unbracketed) tag names longer than this are prose, not tags
const MAX_BARE_TAG_WORDS: usize = 5;

pub const DEFAULT_CATEGORY: &str = "general";

/// Category from a section heading
pub fn category_from_heading(heading: &str) -> String {
    let key = normalize_name(heading.trim_end_matches(':'));
    let key = key
        .strip_suffix("tags")
        .or_else(|| key.strip_suffix("tag"))
        .unwrap_or(&key)
        .trim();
    if key.is_empty() {
        DEFAULT_CATEGORY.to_string()
    } else {
        key.to_string()
    }
}

#[derive(Default)]
struct TagBuilder {
    tags: Vec<MetaTag>,
    index: HashMap<String, usize>,
}

impl TagBuilder {
    fn add(&mut self, tag: MetaTag) -> usize {
        let key = normalize_name(tag.bare_tag());
        if let Some(idx) = self.index.get(&key) {
            return *idx;
        }
        let idx = self.tags.len();
        self.tags.push(tag);
        self.index.insert(key, idx);
        idx
    }

    fn apply(&mut self, idx: usize, label: &str, values: Vec<String>) {
        apply_label(&mut self.tags[idx], label, values);
    }
}

fn apply_label(tag: &mut MetaTag, label: &str, values: Vec<String>) {
    match label {
        "examples" => tag.usage_examples.extend(values),
        "genres" => tag
            .compatible_genres
            .extend(values.into_iter().map(|v| v.to_lowercase())),
        "category" => tag.category = normalize_name(&values.join(" ")),
        _ => {
            if !tag.description.is_empty() {
                tag.description.push(' ');
            }
            tag.description.push_str(&values.join(", "));
        }
    }
}

/// Parse one candidate fragment into a tag
fn parse_tag(text: &str, category: &str) -> Option<MetaTag> {
    let (text, _) = fields::strip_prefix(text, PREFIXES);

    let (tag, description, labeled) = if let Some(inner) = text.strip_prefix('[') {
        let close = inner.find(']')?;
        let name = inner[..close].trim();
        if !fields::is_valid_name(name) {
            return None;
        }
        let rest = inner[close + 1..]
            .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '—' | '–' | '-' | ':'));
        let (description, labeled) = fields::parse_segments(rest, LABELS);
        (format!("[{}]", name), description, labeled)
    } else {
        let line = fields::parse_entry_line(text, &[], LABELS)?;
        if line.name.split_whitespace().count() > MAX_BARE_TAG_WORDS {
            return None;
        }
        (format!("[{}]", line.name), line.description, line.labeled)
    };

    let mut meta_tag = MetaTag::new(tag, category);
    meta_tag.description = description;
    for (label, values) in labeled {
        apply_label(&mut meta_tag, label, values);
    }
    Some(meta_tag)
}

impl ContentParser for MetaTag {
    fn parse_blocks(blocks: &[Block], skipped: &mut Skipped) -> Vec<Self> {
        let mut builder = TagBuilder::default();
        let mut category = DEFAULT_CATEGORY.to_string();
        let mut in_navigation = false;
        let mut items: Vec<(u8, usize)> = Vec::new();

        for block in blocks {
            match block {
                Block::Heading { text, .. } => {
                    items.clear();
                    in_navigation = fields::is_navigation(text);
                    if !in_navigation {
                        category = category_from_heading(text);
                    }
                }

                Block::Paragraph(text) if !in_navigation => {
                    let (stripped, prefixed) = fields::strip_prefix(text, PREFIXES);
                    if prefixed || stripped.starts_with('[') {
                        items.clear();
                        match parse_tag(text, &category) {
                            Some(tag) => items.push((0, builder.add(tag))),
                            None => skipped.record(text),
                        }
                    } else if let (Some((label, values)), Some((_, idx))) =
                        (fields::labeled_segment(text, LABELS), items.last())
                    {
                        builder.apply(*idx, label, values);
                    }
                }

                Block::Item { depth, text } if !in_navigation => {
                    while items.last().is_some_and(|(d, _)| *d >= *depth) {
                        items.pop();
                    }

                    if let Some((_, parent)) = items.last().copied() {
                        if !text.trim_start().starts_with('[') {
                            match fields::labeled_segment(text, LABELS) {
                                Some((label, values)) => builder.apply(parent, label, values),
                                None => builder.tags[parent].usage_examples.push(text.clone()),
                            }
                            continue;
                        }
                    }

                    match parse_tag(text, &category) {
                        Some(tag) => items.push((*depth, builder.add(tag))),
                        None => skipped.record(text),
                    }
                }

                _ => {}
            }
        }

        builder.tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    const URL: &str = "https://wiki.example/meta-tags";

    fn tags(raw: &str) -> Vec<MetaTag> {
        parse::<MetaTag>(raw.as_bytes(), Some(URL)).into_entries()
    }

    #[test]
    fn test_category_from_heading() {
        assert_eq!(category_from_heading("Structure Tags"), "structure");
        assert_eq!(category_from_heading("Vocal tag:"), "vocal");
        assert_eq!(category_from_heading("Tags"), DEFAULT_CATEGORY);
        assert_eq!(category_from_heading("Instrumental"), "instrumental");
    }

    #[test]
    fn test_bracket_tags_with_category() {
        let parsed = tags(
            "## Structure Tags\n- [Verse] — main narrative section; examples: [Verse 1], [Verse 2]\n- [Chorus]: repeated hook\n",
        );

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].tag, "[Verse]");
        assert_eq!(parsed[0].category, "structure");
        assert_eq!(parsed[0].description, "main narrative section");
        assert_eq!(parsed[0].usage_examples, vec!["[Verse 1]", "[Verse 2]"]);
        assert_eq!(parsed[1].tag, "[Chorus]");
        assert_eq!(parsed[1].description, "repeated hook");
    }

    #[test]
    fn test_no_heading_uses_general_category() {
        let parsed = tags("[Fade Out] — ending that gradually lowers volume\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].category, DEFAULT_CATEGORY);
    }

    #[test]
    fn test_bare_name_gets_brackets() {
        let parsed = tags("<h3>Mood Tags</h3><ul><li>Melancholic - sad and reflective; genres: Folk, Blues</li></ul>");
        assert_eq!(parsed[0].tag, "[Melancholic]");
        assert_eq!(parsed[0].category, "mood");
        assert!(parsed[0].compatible_genres.contains("folk"));
    }

    #[test]
    fn test_nested_items_attach_to_parent_tag() {
        let parsed = tags("- [Bridge] — contrasting section\n  - Usage: before final chorus\n  - [Bridge] soft piano\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].usage_examples, vec!["before final chorus"]);
    }

    #[test]
    fn test_malformed_tags_skipped() {
        let outcome = parse::<MetaTag>(b"- [Intro]\n- [unterminated\n- []\n", Some(URL));
        assert_eq!(outcome.entries().len(), 1);
        assert_eq!(outcome.skipped(), 2);
    }

    #[test]
    fn test_prose_paragraphs_ignored() {
        let parsed = tags("Meta tags steer the arrangement.\n[Outro] — closing section\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].tag, "[Outro]");
    }
}
