//! Markup tokenizer: raw page bytes → flat sequence of blocks
//!
//! Handles HTML (as served by wiki engines) and Markdown/wikitext/plain text.
//! Malformed markup degrades to less structure, never to an error.

use regex::Regex;
use std::sync::OnceLock;

/// One structural unit of a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, text: String },
    /// List item; `depth` is 0 for top-level items
    Item { depth: u8, text: String },
    Paragraph(String),
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex"))
}

static HTML_DETECT: OnceLock<Regex> = OnceLock::new();
static HTML_NOISE: OnceLock<Regex> = OnceLock::new();
static HTML_TAG: OnceLock<Regex> = OnceLock::new();
static ENTITY: OnceLock<Regex> = OnceLock::new();
static MD_HEADING: OnceLock<Regex> = OnceLock::new();
static WIKI_HEADING: OnceLock<Regex> = OnceLock::new();
static LIST_ITEM: OnceLock<Regex> = OnceLock::new();
static MD_LINK: OnceLock<Regex> = OnceLock::new();
static WIKI_LINK: OnceLock<Regex> = OnceLock::new();
static TABLE_SEPARATOR: OnceLock<Regex> = OnceLock::new();

/// Split raw bytes into blocks
///
/// Returns `None` when the input is not text at all (empty or binary).
pub fn tokenize(raw: &[u8]) -> Option<Vec<Block>> {
    if raw.is_empty() || raw.iter().take(4096).any(|b| *b == 0) {
        return None;
    }

    let text = String::from_utf8_lossy(raw);
    if text.trim().is_empty() {
        return None;
    }

    let detect = regex(&HTML_DETECT, r"(?i)<(h[1-6]|li|p|dt|dd)\b[^>]*>");
    if detect.is_match(&text) {
        Some(tokenize_html(&text))
    } else {
        Some(tokenize_text(&text))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Loose,
    Heading(u8),
    Item(u8),
    Paragraph,
}

fn tokenize_html(html: &str) -> Vec<Block> {
    let noise = regex(
        &HTML_NOISE,
        r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<!--.*?-->",
    );
    let cleaned = noise.replace_all(html, " ");
    let tag_re = regex(&HTML_TAG, r"(?s)<(/?)([a-zA-Z][a-zA-Z0-9]*)\b[^>]*>");

    let mut blocks = Vec::new();
    let mut pending = Pending::Loose;
    let mut buffer = String::new();
    let mut list_depth: u8 = 0;
    let mut last_end = 0;

    for caps in tag_re.captures_iter(&cleaned) {
        let Some(whole) = caps.get(0) else { continue };
        buffer.push_str(&cleaned[last_end..whole.start()]);
        last_end = whole.end();

        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let name = caps.get(2).map(|m| m.as_str().to_ascii_lowercase()).unwrap_or_default();

        match name.as_str() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                flush(&mut blocks, &mut buffer, pending);
                pending = if closing {
                    Pending::Loose
                } else {
                    Pending::Heading(name[1..].parse().unwrap_or(2))
                };
            }
            "li" | "dt" | "dd" => {
                flush(&mut blocks, &mut buffer, pending);
                pending = if closing {
                    Pending::Loose
                } else {
                    let base = list_depth.saturating_sub(1);
                    Pending::Item(if name == "dd" { base + 1 } else { base })
                };
            }
            "p" => {
                flush(&mut blocks, &mut buffer, pending);
                pending = if closing { Pending::Loose } else { Pending::Paragraph };
            }
            "ul" | "ol" | "dl" => {
                flush(&mut blocks, &mut buffer, pending);
                list_depth = if closing {
                    list_depth.saturating_sub(1)
                } else {
                    list_depth.saturating_add(1)
                };
                pending = Pending::Loose;
            }
            "div" | "section" | "article" | "table" | "tr" | "td" | "th" | "blockquote"
            | "nav" | "header" | "footer" => {
                flush(&mut blocks, &mut buffer, pending);
                pending = Pending::Loose;
            }
            "br" => buffer.push(' '),
            _ => {}
        }
    }
    buffer.push_str(&cleaned[last_end..]);
    flush(&mut blocks, &mut buffer, pending);

    blocks
}

fn flush(blocks: &mut Vec<Block>, buffer: &mut String, pending: Pending) {
    let text = clean_inline(&decode_entities(buffer));
    buffer.clear();
    if text.is_empty() {
        return;
    }

    blocks.push(match pending {
        Pending::Heading(level) => Block::Heading { level, text },
        Pending::Item(depth) => Block::Item { depth, text },
        Pending::Paragraph | Pending::Loose => Block::Paragraph(text),
    });
}

fn tokenize_text(text: &str) -> Vec<Block> {
    let md_heading = regex(&MD_HEADING, r"^(#{1,6})\s+(.*?)\s*#*\s*$");
    let wiki_heading = regex(&WIKI_HEADING, r"^(={1,6})\s*(.*?)\s*={1,6}\s*$");
    let list_item = regex(&LIST_ITEM, r"^(\s*)(\*+|-|\+|\d+[.)])\s+(.*)$");
    let table_separator = regex(&TABLE_SEPARATOR, r"^\|?\s*:?-{3,}:?\s*(\|\s*:?-{3,}:?\s*)*\|?$");

    let mut blocks = Vec::new();
    let mut last_was_table_row = false;

    for line in text.lines() {
        let line = line.trim_end();
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed == "---" || trimmed == "***" {
            last_was_table_row = false;
            continue;
        }

        if table_separator.is_match(trimmed) {
            // The row above a separator is a table header, not data
            if last_was_table_row {
                blocks.pop();
            }
            last_was_table_row = false;
            continue;
        }

        if let Some(caps) = md_heading.captures(trimmed) {
            let level = caps.get(1).map_or(1, |m| m.as_str().len()) as u8;
            push_block(&mut blocks, caps.get(2).map_or("", |m| m.as_str()), |text| {
                Block::Heading { level, text }
            });
            last_was_table_row = false;
            continue;
        }

        if let Some(caps) = wiki_heading.captures(trimmed) {
            let level = caps.get(1).map_or(2, |m| m.as_str().len()) as u8;
            push_block(&mut blocks, caps.get(2).map_or("", |m| m.as_str()), |text| {
                Block::Heading { level, text }
            });
            last_was_table_row = false;
            continue;
        }

        if trimmed.starts_with('|') {
            let cells: Vec<&str> = trimmed
                .trim_matches('|')
                .split('|')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .collect();
            if let Some((first, rest)) = cells.split_first() {
                let joined = if rest.is_empty() {
                    first.to_string()
                } else {
                    format!("{} — {}", first, rest.join("; "))
                };
                push_block(&mut blocks, &joined, |text| Block::Item { depth: 0, text });
                last_was_table_row = true;
            }
            continue;
        }
        last_was_table_row = false;

        if let Some(caps) = list_item.captures(line) {
            let indent = caps.get(1).map_or(0, |m| m.as_str().replace('\t', "  ").len());
            let marker = caps.get(2).map_or("", |m| m.as_str());
            let stars = if marker.starts_with('*') { marker.len() - 1 } else { 0 };
            let depth = (indent / 2 + stars).min(u8::MAX as usize) as u8;
            push_block(&mut blocks, caps.get(3).map_or("", |m| m.as_str()), |text| {
                Block::Item { depth, text }
            });
            continue;
        }

        push_block(&mut blocks, trimmed, Block::Paragraph);
    }

    blocks
}

fn push_block(blocks: &mut Vec<Block>, raw: &str, make: impl FnOnce(String) -> Block) {
    let text = clean_inline(&decode_entities(raw));
    if !text.is_empty() {
        blocks.push(make(text));
    }
}

/// Strip inline Markdown/wikitext formatting and collapse whitespace
pub fn clean_inline(text: &str) -> String {
    let md_link = regex(&MD_LINK, r"\[([^\]]+)\]\([^)]*\)");
    let wiki_link = regex(&WIKI_LINK, r"\[\[(?:[^\]|]*\|)?([^\]]+)\]\]");

    let text = wiki_link.replace_all(text, "$1");
    let text = md_link.replace_all(&text, "$1");
    let text = text
        .replace("'''", "")
        .replace("''", "")
        .replace("**", "")
        .replace("__", "")
        .replace('`', "");

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode the HTML entities that show up in wiki output
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let entity = regex(&ENTITY, r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});");
    entity
        .replace_all(text, |caps: &regex::Captures| {
            let body = caps.get(1).map_or("", |m| m.as_str());
            let decoded = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match body {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    "mdash" => Some('—'),
                    "ndash" => Some('–'),
                    "hellip" => Some('…'),
                    _ => None,
                }
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps.get(0).map_or(String::new(), |m| m.as_str().to_string()),
            }
        })
        .into_owned()
}
