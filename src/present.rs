//! What to show for the current state: a notice, or the extracted tables.
//!
//! Exactly one of three states applies at any time:
//!
//! | State             | When                                   |
//! |-------------------|----------------------------------------|
//! | `AwaitingInput`   | no upload and no sample selected       |
//! | `NoTablesFound`   | the extraction produced zero tables    |
//! | `Tables`          | one view per table, in result order    |
//!
//! Each table view offers a grid rendering, its CSV (with the download file
//! name) and the raw markup. The markup is collapsed unless asked for.

use crate::error::TabexError;
use crate::export::{csv_file_name, table_to_csv};
use crate::output::{ExtractionResult, Table};
use std::fmt::Write as _;

pub const AWAITING_INPUT_MESSAGE: &str = "Upload an image or use the sample to get started!";
pub const NO_TABLES_MESSAGE: &str =
    "Could not find any tables in the uploaded image. Please try another one.";

#[derive(Debug, Clone, PartialEq)]
pub enum Presentation<'a> {
    AwaitingInput,
    NoTablesFound,
    Tables(Vec<TableView<'a>>),
}

impl<'a> Presentation<'a> {
    /// `None` means no image is selected.
    pub fn from_state(result: Option<&'a ExtractionResult>) -> Self {
        match result {
            None => Presentation::AwaitingInput,
            Some(r) if r.is_empty() => Presentation::NoTablesFound,
            Some(r) => Presentation::Tables(
                r.iter()
                    .enumerate()
                    .map(|(index, (table, markup))| TableView {
                        index,
                        table,
                        markup,
                    })
                    .collect(),
            ),
        }
    }

    /// Headline shown above the tables, or the notice text.
    pub fn headline(&self) -> String {
        match self {
            Presentation::AwaitingInput => AWAITING_INPUT_MESSAGE.to_string(),
            Presentation::NoTablesFound => NO_TABLES_MESSAGE.to_string(),
            Presentation::Tables(views) => {
                format!("Found and extracted {} table(s)!", views.len())
            }
        }
    }

    /// Plain-text rendering for a terminal.
    pub fn render(&self, show_markup: bool) -> String {
        let mut out = self.headline();
        out.push('\n');
        if let Presentation::Tables(views) = self {
            for view in views {
                out.push('\n');
                out.push_str(&view.render(show_markup));
            }
        }
        out
    }
}

/// One extracted table as presented to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct TableView<'a> {
    /// 0-based position in the result.
    pub index: usize,
    pub table: &'a Table,
    pub markup: &'a str,
}

impl TableView<'_> {
    pub fn title(&self) -> String {
        format!("Extracted Table {}", self.index + 1)
    }

    pub fn csv_file_name(&self) -> String {
        csv_file_name(self.index)
    }

    pub fn csv(&self) -> Result<String, TabexError> {
        table_to_csv(self.table, self.index)
    }

    pub fn grid(&self) -> String {
        render_grid(self.table)
    }

    pub fn render(&self, show_markup: bool) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "## {}", self.title());
        out.push('\n');
        out.push_str(&self.grid());
        out.push('\n');
        let _ = writeln!(out, "CSV: {}", self.csv_file_name());
        if show_markup {
            out.push('\n');
            let _ = writeln!(out, "Raw HTML for Table {}:", self.index + 1);
            let _ = writeln!(out, "```html\n{}\n```", self.markup);
        } else {
            let _ = writeln!(out, "Raw HTML for Table {}: (collapsed)", self.index + 1);
        }
        out
    }
}

/// Render a table as a GFM pipe table.
///
/// GFM needs exactly one header row. Multiple header rows are joined per
/// column; without a header, the columns are numbered from 0 the way a
/// dataframe viewer labels them.
pub fn render_grid(table: &Table) -> String {
    let width = table.width();
    if width == 0 {
        return String::new();
    }

    let header: Vec<String> = if table.has_header() {
        (0..width)
            .map(|c| {
                let mut parts: Vec<&str> = Vec::new();
                for row in &table.header {
                    let cell = row.get(c).map(String::as_str).unwrap_or("");
                    if !cell.is_empty() && parts.last() != Some(&cell) {
                        parts.push(cell);
                    }
                }
                parts.join(" / ")
            })
            .collect()
    } else {
        (0..width).map(|c| c.to_string()).collect()
    };

    let mut out = String::new();
    push_grid_row(&mut out, &header);
    out.push('|');
    for _ in 0..width {
        out.push_str(" --- |");
    }
    out.push('\n');
    for row in &table.rows {
        push_grid_row(&mut out, row);
    }
    out
}

fn push_grid_row(out: &mut String, cells: &[String]) {
    out.push('|');
    for cell in cells {
        out.push(' ');
        out.push_str(&escape_cell(cell));
        out.push_str(" |");
    }
    out.push('\n');
}

fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn result_with(tables: Vec<Table>) -> ExtractionResult {
        let mut r = ExtractionResult::new();
        r.push_region_tables("<table>…</table>", tables);
        r
    }

    #[test]
    fn no_image_is_awaiting_input() {
        let p = Presentation::from_state(None);
        assert_eq!(p, Presentation::AwaitingInput);
        assert_eq!(p.headline(), AWAITING_INPUT_MESSAGE);
    }

    #[test]
    fn empty_result_is_no_tables_found() {
        let r = ExtractionResult::new();
        let p = Presentation::from_state(Some(&r));
        assert_eq!(p, Presentation::NoTablesFound);
        assert!(p.render(false).contains("Could not find any tables"));
    }

    #[test]
    fn tables_get_views_in_order() {
        let r = result_with(vec![
            Table { header: vec![], rows: vec![row(&["a"])] },
            Table { header: vec![], rows: vec![row(&["b"])] },
        ]);
        let Presentation::Tables(views) = Presentation::from_state(Some(&r)) else {
            panic!("expected tables");
        };
        assert_eq!(views.len(), 2);
        assert_eq!(views[1].title(), "Extracted Table 2");
        assert_eq!(views[1].csv_file_name(), "extracted_table_2.csv");
        assert_eq!(views[1].csv().unwrap(), "b\n");
    }

    #[test]
    fn markup_is_collapsed_by_default() {
        let r = result_with(vec![Table { header: vec![], rows: vec![row(&["a"])] }]);
        let p = Presentation::from_state(Some(&r));
        assert!(!p.render(false).contains("<table>"));
        assert!(p.render(true).contains("<table>…</table>"));
    }

    #[test]
    fn grid_with_header() {
        let t = Table {
            header: vec![row(&["Name", "Qty"])],
            rows: vec![row(&["a|b", "1"])],
        };
        assert_eq!(
            render_grid(&t),
            "| Name | Qty |\n| --- | --- |\n| a\\|b | 1 |\n"
        );
    }

    #[test]
    fn grid_without_header_numbers_columns() {
        let t = Table {
            header: vec![],
            rows: vec![row(&["x", "y"])],
        };
        assert!(render_grid(&t).starts_with("| 0 | 1 |\n"));
    }

    #[test]
    fn multi_row_header_is_joined() {
        let t = Table {
            header: vec![row(&["Q1", "Q1"]), row(&["Jan", "Feb"])],
            rows: vec![row(&["1", "2"])],
        };
        assert!(render_grid(&t).starts_with("| Q1 / Jan | Q1 / Feb |\n"));
    }
}
