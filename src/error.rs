//! Error types for the tabex library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`TabexError`] — **Fatal**: the request cannot produce a result at all
//!   (unreadable input, undecodable image, the recognition model failed).
//!   Returned as `Err(TabexError)` from the top-level `extract*` functions.
//!
//! * [`RegionError`] — **Non-fatal**: one table region's markup could not be
//!   turned into rows, but every other region is fine. Stored inside
//!   [`crate::output::ExtractionResult::warnings`] so a single bad region
//!   never costs the caller the rest of the image.
//!
//! "No tables found" is neither: it is an empty
//! [`crate::output::ExtractionResult`] and is presented as a notice.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the tabex library.
///
/// Region-level failures use [`RegionError`] and are stored in
/// [`crate::output::ExtractionResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum TabexError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes are not a PNG or JPEG image.
    #[error("'{name}' is not a supported image (expected PNG or JPEG)\nFirst bytes: {magic:?}")]
    UnsupportedFormat { name: String, magic: Vec<u8> },

    /// The bytes claim a supported format but cannot be decoded.
    #[error("Could not decode image '{name}': {detail}")]
    DecodeFailed { name: String, detail: String },

    /// An extraction was requested while no upload or sample is selected.
    #[error("No image selected.\nUpload an image or choose the sample first.")]
    NoImageSelected,

    // ── Recognition errors ────────────────────────────────────────────────
    /// The configured recognition backend could not be constructed.
    #[error("Table recognizer '{backend}' is not configured.\n{hint}")]
    RecognizerNotConfigured { backend: String, hint: String },

    /// The recognition model failed on a valid image. Nothing is returned
    /// for the request; resubmitting the image retries it.
    #[error("Table recognition failed ({backend}): {detail}")]
    InferenceFailed { backend: String, detail: String },

    /// The recognition call exceeded `inference_timeout_secs`.
    #[error("Table recognition timed out after {secs}s ({backend})")]
    InferenceTimeout { backend: String, secs: u64 },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write an exported file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A table could not be serialised as CSV.
    #[error("Failed to encode table {table} as CSV: {source}")]
    CsvEncode {
        table: usize,
        #[source]
        source: csv::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single region of the recognised image.
///
/// Stored in [`crate::output::ExtractionResult::warnings`]; the extraction
/// continues with the remaining regions.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum RegionError {
    /// The region was tagged as a table but its markup could not be parsed.
    #[error("Region {region}: could not parse a table from the markup: {detail}")]
    MarkupParse { region: usize, detail: String },
}

impl RegionError {
    /// 0-based index of the offending region in the recognizer output.
    pub fn region(&self) -> usize {
        match self {
            RegionError::MarkupParse { region, .. } => *region,
        }
    }
}

/// Error returned by a [`crate::pipeline::recognize::TableRecognizer`].
///
/// Adapters describe what went wrong; the extractor wraps it into
/// [`TabexError::InferenceFailed`] together with the backend name.
///
/// `retryable` is `false` when the model itself rejected the input, so an
/// opt-in retry would only get the same answer again.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RecognizeError {
    pub message: String,
    pub retryable: bool,
}

impl RecognizeError {
    /// A failure that may go away on its own (network, rate limit, 5xx).
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// A failure that repeats for the same input.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}
