//! Table markup → [`Table`] rows.
//!
//! The recognizer hands back HTML-like markup per table region. This module
//! runs it through the `html5ever` tokenizer, which decodes every HTML5
//! character reference and reads a bare `<` in OCR text as text, and keeps
//! its own tag stack on top, so the rules are exactly:
//!
//! * every non-void element that is opened must be closed, in order;
//! * void elements (`<br>`, `<img>`, ...) may appear unclosed;
//! * at least one `<table>` must be present, and at least one of them must
//!   hold a cell.
//!
//! Anything else is a [`MarkupError`] and the region is reported as a
//! warning by the caller. Cell text is kept as a string with whitespace
//! collapsed; no numeric or date inference happens here.
//!
//! Row/cell layout mirrors how browsers place cells: `colspan` and `rowspan`
//! copy the cell text into every slot they cover, and short rows are padded
//! with empty strings so the grid is rectangular.

use crate::output::Table;
use html5ever::tendril::StrTendril;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};
use thiserror::Error;

/// Upper bound on a single `colspan`/`rowspan`, so a typo like
/// `colspan="100000"` cannot allocate a huge grid.
const MAX_SPAN: usize = 1000;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Why a region's markup could not be turned into tables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    #[error("no <table> element found")]
    NoTable,

    #[error("<table> has no cells")]
    EmptyTable,

    #[error("unexpected closing tag </{found}> with no open element")]
    UnexpectedClose { found: String },

    #[error("closing tag </{found}> does not match open <{expected}>")]
    MismatchedClose { expected: String, found: String },

    #[error("element <{tag}> is never closed")]
    Unclosed { tag: String },
}

/// Parse every table in `markup`, in the document order of their start tags.
///
/// A nested table without cells is dropped silently; a region where no
/// table has a cell is [`MarkupError::EmptyTable`].
pub fn parse_tables(markup: &str) -> Result<Vec<Table>, MarkupError> {
    let mut input = BufferQueue::new();
    input.push_back(StrTendril::from_slice(markup));

    let mut tokenizer = Tokenizer::new(TableSink::default(), TokenizerOpts::default());
    let _ = tokenizer.feed(&mut input);
    tokenizer.end();

    tokenizer.sink.finish()
}

/// Receives tokens and builds one [`TableBuilder`] per open `<table>`.
///
/// The first structural error wins; later tokens are ignored.
#[derive(Default)]
struct TableSink {
    open: Vec<String>,
    builders: Vec<(usize, TableBuilder)>,
    slots: Vec<Option<Table>>,
    error: Option<MarkupError>,
}

impl TokenSink for TableSink {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        if self.error.is_none() {
            match token {
                Token::TagToken(tag) => self.on_tag(&tag),
                Token::CharacterTokens(text) => push_text(&mut self.builders, &text),
                _ => {}
            }
        }
        TokenSinkResult::Continue
    }
}

impl TableSink {
    fn on_tag(&mut self, tag: &Tag) {
        let name: &str = &tag.name;
        let void = VOID_ELEMENTS.contains(&name);

        match tag.kind {
            TagKind::StartTag => {
                if !void && !tag.self_closing {
                    self.open.push(name.to_string());
                }
                on_open(name, tag, &mut self.builders, &mut self.slots);
                if !void && tag.self_closing {
                    on_close(name, &mut self.builders, &mut self.slots);
                }
            }
            TagKind::EndTag => {
                if void {
                    return;
                }
                match self.open.pop() {
                    None => {
                        self.error = Some(MarkupError::UnexpectedClose {
                            found: name.to_string(),
                        })
                    }
                    Some(expected) if expected != name => {
                        self.error = Some(MarkupError::MismatchedClose {
                            expected,
                            found: name.to_string(),
                        })
                    }
                    Some(_) => on_close(name, &mut self.builders, &mut self.slots),
                }
            }
        }
    }

    fn finish(mut self) -> Result<Vec<Table>, MarkupError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if let Some(tag) = self.open.pop() {
            return Err(MarkupError::Unclosed { tag });
        }
        if self.slots.is_empty() {
            return Err(MarkupError::NoTable);
        }

        let tables: Vec<Table> = self.slots.into_iter().flatten().collect();
        if tables.is_empty() {
            return Err(MarkupError::EmptyTable);
        }
        Ok(tables)
    }
}

fn on_open(
    name: &str,
    tag: &Tag,
    builders: &mut Vec<(usize, TableBuilder)>,
    slots: &mut Vec<Option<Table>>,
) {
    if name == "table" {
        builders.push((slots.len(), TableBuilder::default()));
        slots.push(None);
        return;
    }
    // Line-breaking elements inside a cell separate words.
    if matches!(name, "br" | "p" | "div" | "li") {
        push_text(builders, " ");
        return;
    }

    let Some((_, builder)) = builders.last_mut() else {
        return;
    };
    match name {
        "thead" => builder.in_head = true,
        "tbody" | "tfoot" => builder.in_head = false,
        "tr" => builder.start_row(),
        "td" | "th" => {
            let colspan = span_attr(tag, "colspan");
            let rowspan = span_attr(tag, "rowspan");
            builder.start_cell(name == "th", colspan, rowspan);
        }
        _ => {}
    }
}

fn on_close(name: &str, builders: &mut Vec<(usize, TableBuilder)>, slots: &mut [Option<Table>]) {
    if name == "table" {
        if let Some((slot, builder)) = builders.pop() {
            slots[slot] = builder.finish();
        }
        return;
    }

    let Some((_, builder)) = builders.last_mut() else {
        return;
    };
    match name {
        "thead" => builder.in_head = false,
        "tr" => builder.end_row(),
        "td" | "th" => builder.end_cell(),
        _ => {}
    }
}

/// Text goes into the open cell of every enclosing table, so an outer cell
/// that holds a nested table also carries the nested table's text.
fn push_text(builders: &mut [(usize, TableBuilder)], text: &str) {
    for (_, builder) in builders.iter_mut() {
        if let Some(cell) = builder.cell.as_mut() {
            cell.text.push_str(text);
        }
    }
}

/// Attribute names arrive lowercased from the tokenizer.
fn span_attr(tag: &Tag, key: &str) -> usize {
    let Some(attr) = tag.attrs.iter().find(|a| &*a.name.local == key) else {
        return 1;
    };
    let digits: String = attr
        .value
        .trim()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits
        .parse::<usize>()
        .map(|n| n.clamp(1, MAX_SPAN))
        .unwrap_or(1)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug)]
struct RawCell {
    text: String,
    header: bool,
    colspan: usize,
    rowspan: usize,
}

#[derive(Debug, Default)]
struct RawRow {
    cells: Vec<RawCell>,
    in_head: bool,
}

#[derive(Debug, Default)]
struct TableBuilder {
    rows: Vec<RawRow>,
    row_open: bool,
    cell: Option<RawCell>,
    in_head: bool,
}

impl TableBuilder {
    fn start_row(&mut self) {
        self.end_row();
        self.rows.push(RawRow {
            cells: Vec::new(),
            in_head: self.in_head,
        });
        self.row_open = true;
    }

    fn end_row(&mut self) {
        self.end_cell();
        self.row_open = false;
    }

    fn start_cell(&mut self, header: bool, colspan: usize, rowspan: usize) {
        self.end_cell();
        // A cell directly under <table>/<tbody> implies a row.
        if !self.row_open {
            self.start_row();
        }
        self.cell = Some(RawCell {
            text: String::new(),
            header,
            colspan,
            rowspan,
        });
    }

    fn end_cell(&mut self) {
        if let Some(mut cell) = self.cell.take() {
            cell.text = collapse_whitespace(&cell.text);
            if let Some(row) = self.rows.last_mut() {
                row.cells.push(cell);
            }
        }
    }

    fn finish(mut self) -> Option<Table> {
        self.end_row();

        let n_rows = self.rows.len();
        let mut grid: Vec<Vec<Option<String>>> = vec![Vec::new(); n_rows];

        for (r, row) in self.rows.iter().enumerate() {
            let mut c = 0usize;
            for cell in &row.cells {
                while grid[r].get(c).is_some_and(Option::is_some) {
                    c += 1;
                }
                // rowspan never creates rows beyond the end of the table
                let last_row = (r + cell.rowspan).min(n_rows);
                for slot_row in grid.iter_mut().take(last_row).skip(r) {
                    if slot_row.len() < c + cell.colspan {
                        slot_row.resize(c + cell.colspan, None);
                    }
                    for slot in &mut slot_row[c..c + cell.colspan] {
                        *slot = Some(cell.text.clone());
                    }
                }
                c += cell.colspan;
            }
        }

        let width = grid.iter().map(Vec::len).max().unwrap_or(0);
        if width == 0 {
            return None;
        }

        let rows: Vec<Vec<String>> = grid
            .into_iter()
            .map(|slots| {
                let mut row: Vec<String> = slots.into_iter().map(Option::unwrap_or_default).collect();
                row.resize(width, String::new());
                row
            })
            .collect();

        let header_count = if self.rows.iter().any(|r| r.in_head) {
            None
        } else {
            Some(
                self.rows
                    .iter()
                    .take_while(|r| !r.cells.is_empty() && r.cells.iter().all(|c| c.header))
                    .count(),
            )
        };

        let mut table = Table::default();
        match header_count {
            Some(n) => {
                let mut rows = rows;
                table.rows = rows.split_off(n);
                table.header = rows;
            }
            None => {
                for (raw, row) in self.rows.iter().zip(rows) {
                    if raw.in_head {
                        table.header.push(row);
                    } else {
                        table.rows.push(row);
                    }
                }
            }
        }
        Some(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_cell_table() {
        let tables = parse_tables("<table><tr><td>1</td></tr></table>").unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows, vec![row(&["1"])]);
        assert!(!tables[0].has_header());
    }

    #[test]
    fn unclosed_cell_is_malformed() {
        let err = parse_tables("<table><tr><td>unclosed").unwrap_err();
        assert!(matches!(err, MarkupError::Unclosed { .. }), "got {err:?}");
    }

    #[test]
    fn mismatched_close_is_malformed() {
        let err = parse_tables("<table><tr><td>x</tr></td></table>").unwrap_err();
        assert_eq!(
            err,
            MarkupError::MismatchedClose {
                expected: "td".into(),
                found: "tr".into()
            }
        );
    }

    #[test]
    fn stray_close_is_malformed() {
        let err = parse_tables("<table></table></div>").unwrap_err();
        assert!(matches!(err, MarkupError::UnexpectedClose { .. }));
    }

    #[test]
    fn markup_without_table_is_an_error() {
        assert_eq!(parse_tables("<p>hello</p>").unwrap_err(), MarkupError::NoTable);
        assert_eq!(parse_tables("").unwrap_err(), MarkupError::NoTable);
    }

    #[test]
    fn thead_rows_become_header() {
        let html = "<table><thead><tr><th>Name</th><th>Qty</th></tr></thead>\
                    <tbody><tr><td>Apple</td><td>3</td></tr><tr><td>Pear</td><td>5</td></tr></tbody></table>";
        let t = &parse_tables(html).unwrap()[0];
        assert_eq!(t.header, vec![row(&["Name", "Qty"])]);
        assert_eq!(t.rows, vec![row(&["Apple", "3"]), row(&["Pear", "5"])]);
    }

    #[test]
    fn leading_th_rows_become_header_without_thead() {
        let html = "<table><tr><th>A</th><th>B</th></tr><tr><th>x</th><td>1</td></tr></table>";
        let t = &parse_tables(html).unwrap()[0];
        assert_eq!(t.header, vec![row(&["A", "B"])]);
        assert_eq!(t.rows, vec![row(&["x", "1"])]);
    }

    #[test]
    fn spans_are_replicated() {
        let html = "<table>\
            <tr><td colspan=\"2\">wide</td><td rowspan=2>tall</td></tr>\
            <tr><td>a</td><td>b</td></tr>\
            </table>";
        let t = &parse_tables(html).unwrap()[0];
        assert_eq!(
            t.rows,
            vec![row(&["wide", "wide", "tall"]), row(&["a", "b", "tall"])]
        );
    }

    #[test]
    fn rowspan_does_not_add_rows() {
        let html = "<table><tr><td rowspan=\"5\">x</td><td>y</td></tr></table>";
        let t = &parse_tables(html).unwrap()[0];
        assert_eq!(t.rows, vec![row(&["x", "y"])]);
    }

    #[test]
    fn short_rows_are_padded() {
        let html = "<table><tr><td>1</td><td>2</td><td>3</td></tr><tr><td>4</td></tr></table>";
        let t = &parse_tables(html).unwrap()[0];
        assert_eq!(t.rows[1], row(&["4", "", ""]));
        assert_eq!(t.width(), 3);
    }

    #[test]
    fn entities_void_elements_and_whitespace() {
        let html = "<table><tr><td>R&amp;D&nbsp;costs</td><td>line one<br>line\n   two</td><td>a&lt;b</td></tr></table>";
        let t = &parse_tables(html).unwrap()[0];
        assert_eq!(t.rows[0], row(&["R&D costs", "line one line two", "a<b"]));
    }

    #[test]
    fn unknown_entity_keeps_raw_text() {
        let t = &parse_tables("<table><tr><td>AT&T</td></tr></table>").unwrap()[0];
        assert_eq!(t.rows[0], row(&["AT&T"]));
    }

    #[test]
    fn inline_markup_does_not_split_words() {
        let t = &parse_tables("<table><tr><td>1<sup>st</sup> <b>place</b></td></tr></table>").unwrap()[0];
        assert_eq!(t.rows[0], row(&["1st place"]));
    }

    #[test]
    fn table_without_cells_is_an_error() {
        assert_eq!(parse_tables("<table></table>").unwrap_err(), MarkupError::EmptyTable);
        assert_eq!(
            parse_tables("<table><tr></tr></table>").unwrap_err(),
            MarkupError::EmptyTable
        );
    }

    #[test]
    fn empty_nested_table_is_dropped() {
        let tables = parse_tables("<table><tr><td>x<table></table></td></tr></table>").unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows[0], row(&["x"]));
    }

    #[test]
    fn named_and_numeric_references_are_decoded() {
        let html = "<table><tr><td>5&euro;</td><td>Caf&eacute;</td><td>AT&T &amp; Co</td>\
                    <td>&copy;</td><td>&#8470;&#x41;</td></tr></table>";
        let t = &parse_tables(html).unwrap()[0];
        assert_eq!(t.rows[0], row(&["5\u{20ac}", "Caf\u{e9}", "AT&T & Co", "\u{a9}", "\u{2116}A"]));
    }

    #[test]
    fn bare_less_than_in_text_is_kept() {
        let t = &parse_tables("<table><tr><td>a < b</td><td>x <= 3</td></tr></table>").unwrap()[0];
        assert_eq!(t.rows[0], row(&["a < b", "x <= 3"]));
    }

    #[test]
    fn empty_cell_element_counts() {
        let t = &parse_tables("<table><tr><td/><td>b</td></tr></table>").unwrap()[0];
        assert_eq!(t.rows[0], row(&["", "b"]));
    }

    #[test]
    fn nested_tables_in_start_order() {
        let html = "<table><tr><td>outer <table><tr><td>inner</td></tr></table></td></tr></table>";
        let tables = parse_tables(html).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].rows[0], row(&["outer inner"]));
        assert_eq!(tables[1].rows[0], row(&["inner"]));
    }

    #[test]
    fn two_sibling_tables() {
        let html = "<div><table><tr><td>a</td></tr></table><table><tr><td>b</td></tr></table></div>";
        let tables = parse_tables(html).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[1].rows[0], row(&["b"]));
    }

    #[test]
    fn uppercase_tags_and_unquoted_attributes() {
        let t = &parse_tables("<TABLE BORDER=1><TR><TD COLSPAN=2>x</TD></TR></TABLE>").unwrap()[0];
        assert_eq!(t.rows[0], row(&["x", "x"]));
    }
}
