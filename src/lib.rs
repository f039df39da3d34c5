//! # tabex
//!
//! Extract tables from images of documents with a table-structure
//! recognition model, and export them as CSV.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PNG / JPEG
//!  │
//!  ├─ 1. Input      path, URL, upload buffer or the bundled sample
//!  ├─ 2. Decode     RGB pixel grid (CPU-bound, spawn_blocking)
//!  ├─ 3. Recognize  external model → typed regions, table regions carry HTML
//!  ├─ 4. Collect    HTML → rows; malformed regions become warnings
//!  └─ 5. Present    grid view, raw markup, extracted_table_{n}.csv
//! ```
//!
//! Steps 1–4 are memoised per image content: submitting the same bytes
//! twice runs the model once.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tabex::{ExtractionConfig, Presentation, TableExtractor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Vision provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / ...
//!     let extractor = TableExtractor::new(ExtractionConfig::default())?;
//!     let output = extractor.extract("scan.png").await?;
//!     print!("{}", Presentation::from_state(Some(&output.result)).render(false));
//!     Ok(())
//! }
//! ```
//!
//! ## Recognizer Backends
//!
//! | Backend             | Model                                     | Needs            |
//! |---------------------|-------------------------------------------|------------------|
//! | `vision` (default)  | any vision LLM supported by edgequake-llm | an API key       |
//! | `structure-service` | PP-Structure style HTTP service           | `service_url`    |
//!
//! A custom model plugs in by implementing [`TableRecognizer`] and passing it
//! through [`ExtractionConfigBuilder::recognizer`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `tabex` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod present;
pub mod progress;
pub mod prompts;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cache::{CacheKey, CacheStats, ExtractionCache};
pub use config::{CachePolicy, ExtractionConfig, ExtractionConfigBuilder, RecognizerBackend};
pub use error::{RecognizeError, RegionError, TabexError};
pub use export::{csv_file_name, export_tables, markup_file_name, table_to_csv};
pub use extract::{extract_sync, inspect, TableExtractor};
pub use output::{ExtractionOutput, ExtractionResult, ExtractionStats, ImageInfo, ImageKind, Table};
pub use pipeline::input::{load_bytes, ImageInput};
pub use pipeline::markup::{parse_tables, MarkupError};
pub use pipeline::recognize::{Region, RegionKind, TableRecognizer};
pub use pipeline::service::StructureServiceRecognizer;
pub use pipeline::vision::VisionTableRecognizer;
pub use present::{Presentation, TableView};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use session::{ImageSource, Session};
