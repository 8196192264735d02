//! Technique pages
//!
//! The section heading supplies the technique type ("Vocal Techniques" →
//! `vocal`). Nested list items under a technique carry its labeled details
//! or, when unlabeled, its examples.

use super::fields::{self, LabelSet};
use super::markup::Block;
use super::{ContentParser, Skipped};
use crate::models::{normalize_name, Technique};
use std::collections::HashMap;

const PREFIXES: &[&str] = &["technique"];

const LABELS: LabelSet = &[
    ("example", "examples"),
    ("examples", "examples"),
    ("scenarios", "scenarios"),
    ("scenario", "scenarios"),
    ("use", "scenarios"),
    ("use for", "scenarios"),
    ("used for", "scenarios"),
    ("when", "scenarios"),
    ("applicable", "scenarios"),
    ("type", "type"),
    ("description", "description"),
];

pub const DEFAULT_TYPE: &str = "general";

/// Technique type from a section heading
pub fn type_from_heading(heading: &str) -> String {
    let key = normalize_name(heading.trim_end_matches(':'));
    let key = key
        .strip_suffix("techniques")
        .or_else(|| key.strip_suffix("technique"))
        .unwrap_or(&key)
        .trim();
    if key.is_empty() {
        DEFAULT_TYPE.to_string()
    } else {
        key.to_string()
    }
}

fn apply_label(technique: &mut Technique, label: &str, values: Vec<String>) {
    match label {
        "examples" => technique.examples.extend(values),
        "scenarios" => technique
            .applicable_scenarios
            .extend(values.into_iter().map(|v| v.to_lowercase())),
        "type" => technique.technique_type = normalize_name(&values.join(" ")),
        _ => {
            if !technique.description.is_empty() {
                technique.description.push(' ');
            }
            technique.description.push_str(&values.join(", "));
        }
    }
}

fn parse_technique(text: &str, technique_type: &str) -> Option<Technique> {
    let line = fields::parse_entry_line(text, PREFIXES, LABELS)?;
    let mut technique = Technique::new(line.name, technique_type);
    technique.description = line.description;
    for (label, values) in line.labeled {
        apply_label(&mut technique, label, values);
    }
    Some(technique)
}

impl ContentParser for Technique {
    fn parse_blocks(blocks: &[Block], skipped: &mut Skipped) -> Vec<Self> {
        let mut techniques: Vec<Technique> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut technique_type = DEFAULT_TYPE.to_string();
        let mut in_navigation = false;
        let mut items: Vec<(u8, usize)> = Vec::new();

        let mut add = |technique: Technique, techniques: &mut Vec<Technique>| -> usize {
            let key = normalize_name(&technique.name);
            *index.entry(key).or_insert_with(|| {
                techniques.push(technique);
                techniques.len() - 1
            })
        };

        for block in blocks {
            match block {
                Block::Heading { text, .. } => {
                    items.clear();
                    in_navigation = fields::is_navigation(text);
                    if !in_navigation {
                        technique_type = type_from_heading(text);
                    }
                }

                Block::Paragraph(text) if !in_navigation => {
                    if fields::strip_prefix(text, PREFIXES).1 {
                        items.clear();
                        match parse_technique(text, &technique_type) {
                            Some(technique) => items.push((0, add(technique, &mut techniques))),
                            None => skipped.record(text),
                        }
                    } else if let (Some((label, values)), Some((_, idx))) =
                        (fields::labeled_segment(text, LABELS), items.last())
                    {
                        apply_label(&mut techniques[*idx], label, values);
                    }
                }

                Block::Item { depth, text } if !in_navigation => {
                    while items.last().is_some_and(|(d, _)| *d >= *depth) {
                        items.pop();
                    }

                    if let Some((_, parent)) = items.last().copied() {
                        match fields::labeled_segment(text, LABELS) {
                            Some((label, values)) => apply_label(&mut techniques[parent], label, values),
                            None => techniques[parent].examples.push(text.clone()),
                        }
                        continue;
                    }

                    match parse_technique(text, &technique_type) {
                        Some(technique) => items.push((*depth, add(technique, &mut techniques))),
                        None => skipped.record(text),
                    }
                }

                _ => {}
            }
        }

        techniques
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    const URL: &str = "https://wiki.example/techniques";

    fn techniques(raw: &str) -> Vec<Technique> {
        parse::<Technique>(raw.as_bytes(), Some(URL)).into_entries()
    }

    #[test]
    fn test_type_from_heading() {
        assert_eq!(type_from_heading("Vocal Techniques"), "vocal");
        assert_eq!(type_from_heading("Mixing technique"), "mixing");
        assert_eq!(type_from_heading("Techniques"), DEFAULT_TYPE);
    }

    #[test]
    fn test_technique_entries() {
        let parsed = techniques(
            "## Vocal Techniques\n\
             - Double Tracking — record the same part twice; use: thickening vocals, choruses; example: Beatles harmonies\n\
             - Falsetto: light head voice\n",
        );

        assert_eq!(parsed.len(), 2);
        let double = &parsed[0];
        assert_eq!(double.name, "Double Tracking");
        assert_eq!(double.technique_type, "vocal");
        assert_eq!(double.description, "record the same part twice");
        assert!(double.applicable_scenarios.contains("thickening vocals"));
        assert!(double.applicable_scenarios.contains("choruses"));
        assert_eq!(double.examples, vec!["Beatles harmonies"]);
        assert_eq!(parsed[1].description, "light head voice");
    }

    #[test]
    fn test_nested_items_are_details() {
        let parsed = techniques(
            "# Production\n- Sidechain Compression\n  - When: dance drops\n  - Pumping pads under a kick\n",
        );

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].technique_type, "production");
        assert!(parsed[0].applicable_scenarios.contains("dance drops"));
        assert_eq!(parsed[0].examples, vec!["Pumping pads under a kick"]);
    }

    #[test]
    fn test_prefixed_paragraph_and_type_label() {
        let parsed = techniques("Technique: Tape Saturation — type: Mixing; warm harmonic distortion\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].technique_type, "mixing");
        assert_eq!(parsed[0].description, "warm harmonic distortion");
    }

    #[test]
    fn test_navigation_and_malformed_skipped() {
        let outcome = parse::<Technique>(
            b"<h2>Guitar Techniques</h2><ul><li>Palm Muting</li><li>&lt;&gt;</li></ul><h2>External links</h2><ul><li>Some site</li></ul>",
            Some(URL),
        );
        assert_eq!(outcome.entries().len(), 1);
        assert_eq!(outcome.entries()[0].technique_type, "guitar");
        assert_eq!(outcome.skipped(), 1);
    }
}
