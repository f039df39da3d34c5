//! CSV and markup export.
//!
//! One CSV per table, UTF-8, no index column, header rows first. Files are
//! named `extracted_table_{n}.csv` with `n` counting from 1 in result order.
//! Writes are atomic (temp file + rename) so a crash never leaves a
//! half-written CSV behind.

use crate::error::TabexError;
use crate::output::{ExtractionResult, Table};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Download name of the `index`-th (0-based) table's CSV.
pub fn csv_file_name(index: usize) -> String {
    format!("extracted_table_{}.csv", index + 1)
}

/// File name of the `index`-th (0-based) table's raw markup.
pub fn markup_file_name(index: usize) -> String {
    format!("extracted_table_{}.html", index + 1)
}

/// Write a table as CSV: header rows, then body rows.
pub fn write_csv<W: std::io::Write>(table: &Table, writer: W) -> Result<(), csv::Error> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    for row in table.all_rows() {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Encode the `index`-th table as a CSV string.
pub fn table_to_csv(table: &Table, index: usize) -> Result<String, TabexError> {
    let mut buf = Vec::new();
    write_csv(table, &mut buf).map_err(|source| TabexError::CsvEncode {
        table: index,
        source,
    })?;
    String::from_utf8(buf)
        .map_err(|e| TabexError::Internal(format!("CSV for table {} is not UTF-8: {}", index + 1, e)))
}

/// Write every table of `result` into `dir`, creating it if needed.
///
/// Returns the written paths in table order (CSV before markup for each
/// table). Existing files with the same names are replaced.
pub async fn export_tables(
    result: &ExtractionResult,
    dir: &Path,
    include_markup: bool,
) -> Result<Vec<PathBuf>, TabexError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| TabexError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

    let mut written = Vec::new();
    for (index, (table, markup)) in result.iter().enumerate() {
        let csv_path = dir.join(csv_file_name(index));
        let csv = table_to_csv(table, index)?;
        write_atomic(&csv_path, csv.as_bytes()).await?;
        debug!("Wrote {} ({} rows)", csv_path.display(), table.all_rows().count());
        written.push(csv_path);

        if include_markup {
            let html_path = dir.join(markup_file_name(index));
            write_atomic(&html_path, markup.as_bytes()).await?;
            written.push(html_path);
        }
    }

    info!("Exported {} table(s) to {}", result.len(), dir.display());
    Ok(written)
}

/// Atomic write: write to `<path>.tmp`, then rename over `path`.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), TabexError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TabexError::OutputWriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;
        }
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| TabexError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| TabexError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn file_names_are_one_based() {
        assert_eq!(csv_file_name(0), "extracted_table_1.csv");
        assert_eq!(csv_file_name(9), "extracted_table_10.csv");
        assert_eq!(markup_file_name(1), "extracted_table_2.html");
    }

    #[test]
    fn csv_has_header_then_rows() {
        let t = Table {
            header: vec![row(&["Item", "Price"])],
            rows: vec![row(&["Tea, green", "3"]), row(&["Say \"hi\"", ""])],
        };
        let csv = table_to_csv(&t, 0).unwrap();
        assert_eq!(
            csv,
            "Item,Price\n\"Tea, green\",3\n\"Say \"\"hi\"\"\",\n"
        );
    }

    #[test]
    fn csv_round_trips_through_a_reader() {
        let t = Table {
            header: vec![],
            rows: vec![row(&["a", "b"]), row(&["1,5", "x\ny"]), row(&["ü", "€"])],
        };
        let csv = table_to_csv(&t, 0).unwrap();
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(csv.as_bytes());
        let back: Vec<Vec<String>> = rdr
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect();
        assert_eq!(back, t.rows);
    }

    #[tokio::test]
    async fn export_writes_one_csv_per_table() {
        let mut result = ExtractionResult::new();
        let markup = "<table><tr><td>1</td></tr></table>";
        result.push_region_tables(
            markup,
            vec![
                Table { header: vec![], rows: vec![row(&["1"])] },
                Table { header: vec![], rows: vec![row(&["2"])] },
            ],
        );

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/out");
        let paths = export_tables(&result, &out, true).await.unwrap();

        assert_eq!(paths.len(), 4);
        assert_eq!(std::fs::read_to_string(out.join("extracted_table_2.csv")).unwrap(), "2\n");
        assert_eq!(std::fs::read_to_string(out.join("extracted_table_1.html")).unwrap(), markup);
        assert!(!out.join("extracted_table_1.csv.tmp").exists());
    }

    #[tokio::test]
    async fn export_of_empty_result_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = export_tables(&ExtractionResult::new(), dir.path(), false)
            .await
            .unwrap();
        assert!(paths.is_empty());
    }
}
