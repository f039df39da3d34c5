//! Post-processing: turn a vision-LLM reply into recognizer regions.
//!
//! Even a well-prompted model wraps its answer in ` ```html ` fences now and
//! then, adds a sentence of commentary, or stops mid-table when it runs out
//! of tokens. The cleanup here is deterministic and never edits the markup
//! inside a table; a truncated table is passed on as-is so the converter can
//! report it as a malformed region instead of silently dropping it.
//!
//! ## Rule Order
//!
//! 1. Strip markdown fences (outer or per block)
//! 2. Normalise line endings (CRLF → LF)
//! 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
//! 4. Split into top-level `<table>` blocks; leftover prose becomes one
//!    text region

use crate::pipeline::recognize::Region;
use crate::prompts::NO_TABLES_SENTINEL;
use once_cell::sync::Lazy;
use regex::Regex;

/// Clean the reply and split it into table regions plus at most one text
/// region for any remaining prose.
pub fn regions_from_reply(reply: &str) -> Vec<Region> {
    let s = strip_markdown_fences(reply);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    split_table_blocks(&s)
}

// ── Rule 1: Strip markdown fences ────────────────────────────────────────────

static RE_FENCE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*```[A-Za-z0-9_-]*[ \t]*\r?$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    RE_FENCE_LINE.replace_all(input, "").to_string()
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Strip invisible characters ───────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| {
            !matches!(
                c,
                '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'
            )
        })
        .collect()
}

// ── Rule 4: Split into table blocks ──────────────────────────────────────────

static RE_TABLE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<table\b[^>]*>|</table\s*>").unwrap());

/// Split on balanced top-level `<table>` … `</table>` spans.
///
/// Nested tables stay inside their outer block. An unterminated block runs
/// to the end of the input.
fn split_table_blocks(input: &str) -> Vec<Region> {
    let mut regions = Vec::new();
    let mut prose = String::new();
    let mut depth = 0usize;
    let mut block_start = 0usize;
    let mut cursor = 0usize;

    for m in RE_TABLE_TAG.find_iter(input) {
        let is_close = m.as_str().starts_with("</");
        if !is_close {
            if depth == 0 {
                prose.push_str(&input[cursor..m.start()]);
                block_start = m.start();
            }
            depth += 1;
        } else if depth > 0 {
            depth -= 1;
            if depth == 0 {
                regions.push(Region::table(input[block_start..m.end()].trim()));
                cursor = m.end();
            }
        }
    }

    if depth > 0 {
        regions.push(Region::table(input[block_start..].trim()));
    } else {
        prose.push_str(&input[cursor..]);
    }

    let prose = prose.trim();
    if !prose.is_empty() && prose != NO_TABLES_SENTINEL {
        regions.push(Region::text());
    }

    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::recognize::RegionKind;

    #[test]
    fn sentinel_yields_no_regions() {
        assert!(regions_from_reply("NO_TABLES").is_empty());
        assert!(regions_from_reply("  NO_TABLES\n").is_empty());
    }

    #[test]
    fn single_table_in_fences() {
        let reply = "```html\n<table><tr><td>1</td></tr></table>\n```";
        let regions = regions_from_reply(reply);
        assert_eq!(regions.len(), 1);
        assert_eq!(
            regions[0].table_markup(),
            Some("<table><tr><td>1</td></tr></table>")
        );
    }

    #[test]
    fn two_tables_and_prose() {
        let reply = "Here are the tables:\n<table><tr><td>a</td></tr></table>\n\n<TABLE border=1><tr><td>b</td></tr></TABLE>";
        let regions = regions_from_reply(reply);
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[0].kind, RegionKind::Table);
        assert_eq!(regions[1].kind, RegionKind::Table);
        assert!(regions[1].table_markup().unwrap().starts_with("<TABLE border=1>"));
        assert_eq!(regions[2].kind, RegionKind::Text);
    }

    #[test]
    fn nested_table_stays_in_outer_block() {
        let reply = "<table><tr><td><table><tr><td>x</td></tr></table></td></tr></table>";
        let regions = regions_from_reply(reply);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].table_markup(), Some(reply));
    }

    #[test]
    fn truncated_table_is_kept_for_the_converter() {
        let reply = "<table><tr><td>ok</td></tr></table>\n<table><tr><td>cut of";
        let regions = regions_from_reply(reply);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[1].table_markup(), Some("<table><tr><td>cut of"));
    }

    #[test]
    fn invisible_chars_and_crlf_removed() {
        let reply = "<table>\r\n<tr><td>a\u{200B}b</td></tr>\r\n</table>";
        let regions = regions_from_reply(reply);
        assert_eq!(
            regions[0].table_markup(),
            Some("<table>\n<tr><td>ab</td></tr>\n</table>")
        );
    }

    #[test]
    fn tablex_is_not_a_table_tag() {
        let regions = regions_from_reply("<tablex>nothing</tablex>");
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].kind, RegionKind::Text);
    }
}
