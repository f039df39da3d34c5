//! Progress-callback trait for extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to be told
//! when the model starts and finishes, when the cache answered instead, and
//! when a table region had to be skipped.
//!
//! # Example
//!
//! ```rust
//! use tabex::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct SkipCounter {
//!     skipped: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for SkipCounter {
//!     fn on_region_skipped(&self, region: usize, error: &str) {
//!         self.skipped.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("region {region} skipped: {error}");
//!     }
//! }
//!
//! let counter = Arc::new(SkipCounter { skipped: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the extractor as it processes an image.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once per extraction request, before the cache is consulted.
    ///
    /// # Arguments
    /// * `name`     — display name of the image
    /// * `byte_len` — size of the encoded image
    fn on_extraction_start(&self, name: &str, byte_len: usize) {
        let _ = (name, byte_len);
    }

    /// Called when a cached result is returned and the model is skipped.
    fn on_cache_hit(&self, name: &str) {
        let _ = name;
    }

    /// Called just before the recognizer is invoked.
    ///
    /// # Arguments
    /// * `backend` — recognizer name, e.g. `"vision"`
    fn on_inference_start(&self, backend: &str) {
        let _ = backend;
    }

    /// Called when the recognizer returned.
    ///
    /// # Arguments
    /// * `regions`     — number of regions returned
    /// * `duration_ms` — wall-clock time spent in the recognizer
    fn on_inference_complete(&self, regions: usize, duration_ms: u64) {
        let _ = (regions, duration_ms);
    }

    /// Called when a table region's markup could not be parsed.
    fn on_region_skipped(&self, region: usize, error: &str) {
        let _ = (region, error);
    }

    /// Called once after a successful extraction (cache hit or not).
    fn on_extraction_complete(&self, tables: usize) {
        let _ = tables;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
