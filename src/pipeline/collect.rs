//! Region list → [`ExtractionResult`].
//!
//! Keeps regions of kind table that carry markup, parses each one, and
//! pairs every resulting table with the markup it came from. A region whose
//! markup does not parse is recorded as a [`RegionError`] and skipped; it
//! never fails the whole image.

use crate::error::RegionError;
use crate::output::ExtractionResult;
use crate::pipeline::markup::parse_tables;
use crate::pipeline::recognize::Region;
use crate::progress::ExtractionProgressCallback;
use tracing::{debug, warn};

/// Convert recognizer regions into tables, in region order.
pub fn collect_tables(
    regions: &[Region],
    progress: &dyn ExtractionProgressCallback,
) -> ExtractionResult {
    let mut result = ExtractionResult::new();
    let mut table_regions = 0usize;

    for (index, region) in regions.iter().enumerate() {
        let Some(markup) = region.table_markup() else {
            debug!("Region {}: kind '{}' skipped", index, region.kind);
            continue;
        };
        table_regions += 1;

        match parse_tables(markup) {
            Ok(tables) => {
                debug!("Region {}: {} table(s)", index, tables.len());
                result.push_region_tables(markup, tables);
            }
            Err(e) => {
                let warning = RegionError::MarkupParse {
                    region: index,
                    detail: e.to_string(),
                };
                warn!("{}", warning);
                progress.on_region_skipped(index, &warning.to_string());
                result.push_warning(warning);
            }
        }
    }

    result.set_region_counts(regions.len(), table_regions);
    result
}
