//! Result types produced by an extraction.
//!
//! [`ExtractionResult`] is what the cache stores and what the presenter
//! consumes. [`ExtractionOutput`] wraps it with per-call details (image
//! metadata, timings, whether the cache answered) that must *not* be cached.

use crate::error::RegionError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One table recovered from a region's markup.
///
/// Every row, header or body, has exactly [`Table::width`] cells; short rows
/// are padded with empty strings when the table is parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Header rows, from `<thead>` or leading all-`<th>` rows. Often empty.
    pub header: Vec<Vec<String>>,
    /// Body rows in document order.
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Number of columns.
    pub fn width(&self) -> usize {
        self.header
            .iter()
            .chain(self.rows.iter())
            .map(Vec::len)
            .max()
            .unwrap_or(0)
    }

    /// Number of body rows (header rows excluded).
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn has_header(&self) -> bool {
        !self.header.is_empty()
    }

    /// Header rows followed by body rows.
    pub fn all_rows(&self) -> impl Iterator<Item = &Vec<String>> {
        self.header.iter().chain(self.rows.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.rows.is_empty()
    }
}

/// The tables recovered from one image, index-aligned with the markup that
/// produced each of them.
///
/// `markup(i)` is always the raw markup of the region `table(i)` came from.
/// A region that yields two tables therefore contributes its markup twice.
/// The fields are private so the alignment cannot be broken from outside.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    tables: Vec<Table>,
    markups: Vec<String>,
    warnings: Vec<RegionError>,
    region_count: usize,
    table_region_count: usize,
}

impl ExtractionResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every table parsed from one region, pairing each with `markup`.
    pub fn push_region_tables(&mut self, markup: &str, tables: Vec<Table>) {
        for table in tables {
            self.tables.push(table);
            self.markups.push(markup.to_string());
        }
    }

    pub(crate) fn push_warning(&mut self, warning: RegionError) {
        self.warnings.push(warning);
    }

    pub(crate) fn set_region_counts(&mut self, regions: usize, table_regions: usize) {
        self.region_count = regions;
        self.table_region_count = table_regions;
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn markups(&self) -> &[String] {
        &self.markups
    }

    pub fn table(&self, index: usize) -> Option<&Table> {
        self.tables.get(index)
    }

    pub fn markup(&self, index: usize) -> Option<&str> {
        self.markups.get(index).map(String::as_str)
    }

    /// `(table, markup)` pairs in output order.
    pub fn iter(&self) -> impl Iterator<Item = (&Table, &str)> {
        self.tables
            .iter()
            .zip(self.markups.iter().map(String::as_str))
    }

    /// Regions whose markup could not be parsed.
    pub fn warnings(&self) -> &[RegionError] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// `true` when no table was found. A normal outcome, not an error.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Total number of regions the recognizer returned.
    pub fn region_count(&self) -> usize {
        self.region_count
    }

    /// Regions tagged as tables with non-empty markup.
    pub fn table_region_count(&self) -> usize {
        self.table_region_count
    }
}

/// Encoded format of an accepted input image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Png,
    Jpeg,
}

impl ImageKind {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
        }
    }
}

/// Facts about the input image, read without running the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub name: String,
    pub kind: ImageKind,
    pub width: u32,
    pub height: u32,
    pub byte_len: usize,
    /// Hex BLAKE3 digest of the raw bytes; this is the cache key.
    pub digest: String,
}

/// Per-call timings. Only the call that ran the model has non-zero
/// `decode_ms` / `inference_ms`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub cache_hit: bool,
    pub decode_ms: u64,
    pub inference_ms: u64,
    pub total_ms: u64,
}

/// Everything returned by [`crate::TableExtractor::extract_image`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub image: ImageInfo,
    pub result: Arc<ExtractionResult>,
    pub stats: ExtractionStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn table_dimensions() {
        let t = Table {
            header: vec![row(&["Name", "Qty"])],
            rows: vec![row(&["a", "1"]), row(&["b", "2"])],
        };
        assert_eq!(t.width(), 2);
        assert_eq!(t.height(), 2);
        assert!(t.has_header());
        assert_eq!(t.all_rows().count(), 3);
    }

    #[test]
    fn push_region_tables_repeats_markup_per_table() {
        let mut r = ExtractionResult::new();
        r.push_region_tables("<table>A</table>", vec![Table::default()]);
        r.push_region_tables(
            "<table>B</table>",
            vec![Table::default(), Table::default()],
        );
        assert_eq!(r.len(), 3);
        assert_eq!(r.markups().len(), r.tables().len());
        assert_eq!(r.markup(0), Some("<table>A</table>"));
        assert_eq!(r.markup(1), Some("<table>B</table>"));
        assert_eq!(r.markup(2), Some("<table>B</table>"));
    }

    #[test]
    fn empty_result_is_not_an_error() {
        let r = ExtractionResult::new();
        assert!(r.is_empty());
        assert!(r.warnings().is_empty());
        assert_eq!(r.iter().count(), 0);
    }

    #[test]
    fn image_kind_mime() {
        assert_eq!(ImageKind::Png.mime_type(), "image/png");
        assert_eq!(ImageKind::Jpeg.mime_type(), "image/jpeg");
    }
}
