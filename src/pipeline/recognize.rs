//! The table-recognition seam: region types and the [`TableRecognizer`] trait.
//!
//! A recognizer takes a decoded image and a language hint and returns the
//! layout regions it found. Only table regions carry markup. Everything the
//! model does internally (layout detection, cell segmentation, OCR) stays
//! behind this trait; the rest of the crate only sees [`Region`]s.
//!
//! Built-in implementations:
//! * [`crate::pipeline::vision::VisionTableRecognizer`] — vision LLM
//! * [`crate::pipeline::service::StructureServiceRecognizer`] — HTTP service

use crate::error::RecognizeError;
use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::warn;

/// Layout category of a region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RegionKind {
    Table,
    Text,
    Title,
    Figure,
    List,
    /// Any other category the model reports, lower-cased.
    Other(String),
}

impl From<&str> for RegionKind {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => RegionKind::Table,
            "text" => RegionKind::Text,
            "title" => RegionKind::Title,
            "figure" => RegionKind::Figure,
            "list" => RegionKind::List,
            other => RegionKind::Other(other.to_string()),
        }
    }
}

impl From<String> for RegionKind {
    fn from(s: String) -> Self {
        RegionKind::from(s.as_str())
    }
}

impl From<RegionKind> for String {
    fn from(kind: RegionKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionKind::Table => f.write_str("table"),
            RegionKind::Text => f.write_str("text"),
            RegionKind::Title => f.write_str("title"),
            RegionKind::Figure => f.write_str("figure"),
            RegionKind::List => f.write_str("list"),
            RegionKind::Other(s) => f.write_str(s),
        }
    }
}

/// One detected layout element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub kind: RegionKind,
    /// HTML-like table markup. Only present for table regions with
    /// detected structure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markup: Option<String>,
    /// `[x0, y0, x1, y1]` in image pixels, when the model reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f32; 4]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl Region {
    pub fn new(kind: RegionKind) -> Self {
        Self {
            kind,
            markup: None,
            bbox: None,
            score: None,
        }
    }

    /// A table region with the given markup.
    pub fn table(markup: impl Into<String>) -> Self {
        Self {
            markup: Some(markup.into()),
            ..Self::new(RegionKind::Table)
        }
    }

    pub fn text() -> Self {
        Self::new(RegionKind::Text)
    }

    pub fn with_bbox(mut self, bbox: [f32; 4]) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    /// The markup to convert, if this is a table region with non-empty markup.
    pub fn table_markup(&self) -> Option<&str> {
        match (&self.kind, self.markup.as_deref()) {
            (RegionKind::Table, Some(m)) if !m.trim().is_empty() => Some(m),
            _ => None,
        }
    }
}

/// An external table-structure recognition model.
///
/// Implementations are constructed once per process, shared behind an
/// `Arc`, and never mutated afterwards; `recognize` takes `&self`.
#[async_trait]
pub trait TableRecognizer: Send + Sync {
    /// Short backend name for logs and error messages.
    fn name(&self) -> &str;

    /// Detect the regions of `image`. `lang` is the OCR language hint.
    async fn recognize(
        &self,
        image: &DynamicImage,
        lang: &str,
    ) -> Result<Vec<Region>, RecognizeError>;
}

/// Run `op` up to `max_retries + 1` times with exponential backoff
/// (`backoff_ms * 2^(attempt-1)`), returning the last error on exhaustion.
///
/// With `max_retries == 0` this is a single call. A non-retryable error is
/// returned at once.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    label: &str,
    max_retries: u32,
    backoff_ms: u64,
    mut op: F,
) -> Result<T, RecognizeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RecognizeError>>,
{
    let mut last_err: Option<RecognizeError> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let backoff = backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "{}: retry {}/{} after {}ms",
                label, attempt, max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.retryable => return Err(e),
            Err(e) => {
                warn!("{}: attempt {} failed — {}", label, attempt + 1, e);
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| RecognizeError::new("Unknown error")))
}
