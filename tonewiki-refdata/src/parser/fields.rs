//! Entry-line grammar shared by all content types
//!
//! ```text
//! [Prefix:] Name <sep> segment; segment; ...
//! ```
//!
//! `<sep>` is the first of `—`, `–`, ` - ` or `:`. A segment of the form
//! `label: a, b, c` whose label is known for the content type fills a list
//! field; any other segment is description text.

/// Known labels for one content type: (alias, canonical label)
pub type LabelSet = &'static [(&'static str, &'static str)];

/// Maximum characters in an entry name
pub const MAX_NAME_CHARS: usize = 80;
const MAX_NAME_WORDS: usize = 8;
const EXCERPT_CHARS: usize = 120;

const NAVIGATION_HEADINGS: &[&str] = &[
    "contents",
    "table of contents",
    "references",
    "see also",
    "external links",
    "notes",
    "navigation",
    "further reading",
    "bibliography",
    "footnotes",
    "citations",
    "menu",
];

/// One parsed entry line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryLine {
    pub name: String,
    pub description: String,
    /// (canonical label, values), in line order
    pub labeled: Vec<(&'static str, Vec<String>)>,
}

/// Strip a `Prefix:` marker (case-insensitive); reports whether one was present
pub fn strip_prefix<'a>(text: &'a str, prefixes: &[&str]) -> (&'a str, bool) {
    let trimmed = text.trim();
    for prefix in prefixes {
        let len = prefix.len();
        let Some(head) = trimmed.get(..len) else { continue };
        if head.eq_ignore_ascii_case(prefix) && trimmed[len..].trim_start().starts_with(':') {
            let rest = trimmed[len..].trim_start();
            return (rest[1..].trim_start(), true);
        }
    }
    (trimmed, false)
}

/// Parse `text` as an entry line
///
/// Returns `None` if no valid name can be extracted.
pub fn parse_entry_line(text: &str, prefixes: &[&str], labels: LabelSet) -> Option<EntryLine> {
    let (text, _) = strip_prefix(text, prefixes);

    let (name, rest) = match find_separator(text) {
        Some((start, end)) => (&text[..start], &text[end..]),
        None => (text, ""),
    };

    let name = clean_name(name);
    if !is_valid_name(&name) {
        return None;
    }

    let (description, labeled) = parse_segments(rest, labels);
    Some(EntryLine {
        name,
        description,
        labeled,
    })
}

/// Split the part after the name into description text and labeled values
pub fn parse_segments(rest: &str, labels: LabelSet) -> (String, Vec<(&'static str, Vec<String>)>) {
    let mut description = Vec::new();
    let mut labeled = Vec::new();

    for segment in split_segments(rest) {
        match labeled_segment(&segment, labels) {
            Some(pair) => labeled.push(pair),
            None => description.push(segment),
        }
    }

    (description.join(" "), labeled)
}

/// Recognise a whole fragment of the form `label: a, b, c`
pub fn labeled_segment(text: &str, labels: LabelSet) -> Option<(&'static str, Vec<String>)> {
    let (label, values) = text.split_once(':')?;
    let canonical = canonical_label(label, labels)?;
    let values = split_values(values);
    if values.is_empty() {
        return None;
    }
    Some((canonical, values))
}

/// Look up a label (case-insensitive, whitespace-normalized)
pub fn canonical_label(label: &str, labels: LabelSet) -> Option<&'static str> {
    let key = crate::models::normalize_name(label.trim_matches(|c: char| c == '*' || c.is_whitespace()));
    labels
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, canonical)| *canonical)
}

/// Comma-separated values, trimmed, without trailing punctuation
pub fn split_values(text: &str) -> Vec<String> {
    text.split(',')
        .map(|v| v.trim().trim_end_matches(['.', ';']).trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Headings that frame a page rather than hold content
pub fn is_navigation(heading: &str) -> bool {
    let key = crate::models::normalize_name(heading.trim_end_matches(':'));
    NAVIGATION_HEADINGS.contains(&key.as_str())
}

/// Names need a letter, a bounded length, and no leftover markup
pub fn is_valid_name(name: &str) -> bool {
    name.chars().any(char::is_alphabetic)
        && name.chars().count() <= MAX_NAME_CHARS
        && name.split_whitespace().count() <= MAX_NAME_WORDS
        && !name.contains(['<', '>', '{', '}', '=', '|'])
}

/// First 120 characters of a fragment, for logs
pub fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_CHARS {
        text.to_string()
    } else {
        let cut: String = text.chars().take(EXCERPT_CHARS).collect();
        format!("{}…", cut)
    }
}

fn clean_name(name: &str) -> String {
    name.trim()
        .trim_matches(|c: char| matches!(c, '*' | '"' | '\'' | ',' | '.' | '“' | '”'))
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Byte range of the name/rest separator
fn find_separator(text: &str) -> Option<(usize, usize)> {
    ["—", "–", " - ", ":"]
        .iter()
        .filter_map(|sep| text.find(sep).map(|pos| (pos, pos + sep.len())))
        .min_by_key(|(start, _)| *start)
}

fn split_segments(rest: &str) -> Vec<String> {
    rest.split([';', '|', '—', '–'])
        .flat_map(|s| s.split(" - "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABELS: LabelSet = &[
        ("characteristics", "characteristics"),
        ("moods", "moods"),
        ("mood", "moods"),
    ];

    #[test]
    fn test_prefixed_entry_with_labeled_segment() {
        let line = parse_entry_line(
            "Genre: Ambient Folk — characteristics: soft, acoustic, introspective",
            &["genre"],
            LABELS,
        )
        .unwrap();

        assert_eq!(line.name, "Ambient Folk");
        assert_eq!(line.description, "");
        assert_eq!(
            line.labeled,
            vec![(
                "characteristics",
                vec!["soft".to_string(), "acoustic".to_string(), "introspective".to_string()]
            )]
        );
    }

    #[test]
    fn test_unlabeled_segments_become_description() {
        let line = parse_entry_line(
            "Shoegaze - Dreamy wall of guitars; mood: hazy",
            &[],
            LABELS,
        )
        .unwrap();

        assert_eq!(line.name, "Shoegaze");
        assert_eq!(line.description, "Dreamy wall of guitars");
        assert_eq!(line.labeled, vec![("moods", vec!["hazy".to_string()])]);
    }

    #[test]
    fn test_unknown_label_is_description() {
        let line = parse_entry_line("Drone: tempo: very slow", &[], LABELS).unwrap();
        assert_eq!(line.name, "Drone");
        assert_eq!(line.description, "tempo: very slow");
        assert!(line.labeled.is_empty());
    }

    #[test]
    fn test_hyphenated_name_is_not_split() {
        let line = parse_entry_line("Lo-fi Hip Hop", &[], LABELS).unwrap();
        assert_eq!(line.name, "Lo-fi Hip Hop");
    }

    #[test]
    fn test_invalid_names_rejected() {
        assert!(parse_entry_line("1977 — 42", &[], LABELS).is_none());
        assert!(parse_entry_line("{{Infobox genre}}", &[], LABELS).is_none());
        assert!(parse_entry_line(&"a".repeat(MAX_NAME_CHARS + 1), &[], LABELS).is_none());
        assert!(parse_entry_line("— just a dash", &[], LABELS).is_none());
    }

    #[test]
    fn test_navigation_headings() {
        assert!(is_navigation("See also"));
        assert!(is_navigation("External  Links:"));
        assert!(!is_navigation("Electronic"));
    }

    #[test]
    fn test_excerpt_truncates() {
        let long = "x".repeat(300);
        assert_eq!(excerpt(&long).chars().count(), EXCERPT_CHARS + 1);
        assert_eq!(excerpt("short"), "short");
    }
}
