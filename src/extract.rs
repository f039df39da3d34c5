//! Extraction entry points.
//!
//! [`TableExtractor`] is built once at process start. It owns the
//! recognizer, the result cache and the configuration, and runs
//! Loader → Recognizer → Converter for every image whose content it has not
//! seen before. A second request for the same bytes is answered from the
//! cache without decoding the image or calling the model.

use crate::cache::{CacheKey, CacheStats, ExtractionCache};
use crate::config::{ExtractionConfig, RecognizerBackend};
use crate::error::TabexError;
use crate::export::export_tables;
use crate::output::{ExtractionOutput, ExtractionStats, ImageInfo};
use crate::pipeline::collect::collect_tables;
use crate::pipeline::decode::{decode_image, inspect_image};
use crate::pipeline::input::{self, ImageInput};
use crate::pipeline::recognize::TableRecognizer;
use crate::pipeline::service::StructureServiceRecognizer;
use crate::pipeline::vision::VisionTableRecognizer;
use crate::progress::{ExtractionProgressCallback, NoopProgressCallback};
use crate::session::Session;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Model used when a provider is named without one.
pub const DEFAULT_VISION_MODEL: &str = "gpt-4.1-nano";

/// Runs extractions against one recognizer and one cache.
///
/// # Example
/// ```rust,no_run
/// use tabex::{ExtractionConfig, TableExtractor};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let extractor = TableExtractor::new(ExtractionConfig::default())?;
/// let output = extractor.extract("invoice.png").await?;
/// for (table, _markup) in output.result.iter() {
///     println!("{} x {}", table.height(), table.width());
/// }
/// # Ok(())
/// # }
/// ```
pub struct TableExtractor {
    recognizer: Arc<dyn TableRecognizer>,
    cache: Mutex<ExtractionCache>,
    config: ExtractionConfig,
}

impl std::fmt::Debug for TableExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableExtractor")
            .field("recognizer", &self.recognizer.name())
            .field("cache", &self.cache_stats())
            .field("config", &self.config)
            .finish()
    }
}

impl TableExtractor {
    /// Build an extractor, constructing the recognizer from `config`.
    ///
    /// # Errors
    /// [`TabexError::RecognizerNotConfigured`] when no recognizer can be
    /// built (no API key in the environment, unknown provider, ...).
    pub fn new(config: ExtractionConfig) -> Result<Self, TabexError> {
        let recognizer = resolve_recognizer(&config)?;
        Ok(Self::with_recognizer(recognizer, config))
    }

    /// Build an extractor around an already constructed recognizer.
    pub fn with_recognizer(recognizer: Arc<dyn TableRecognizer>, config: ExtractionConfig) -> Self {
        info!("Table recognizer: {}", recognizer.name());
        Self {
            recognizer,
            cache: Mutex::new(ExtractionCache::new(config.cache_policy)),
            config,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn recognizer_name(&self) -> &str {
        self.recognizer.name()
    }

    /// A fresh session that loads the sample from `config.sample_path`.
    pub fn new_session(&self) -> Session {
        Session::new(self.config.sample_path.clone())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache().stats()
    }

    pub fn clear_cache(&self) {
        self.cache().clear();
    }

    /// Extract the tables of an in-memory image.
    ///
    /// # Errors
    /// * [`TabexError::DecodeFailed`] when the bytes cannot be decoded
    /// * [`TabexError::InferenceFailed`] / [`TabexError::InferenceTimeout`]
    ///   when the model fails; nothing is cached in that case
    ///
    /// Zero tables is `Ok` with an empty result.
    pub async fn extract_image(&self, input: &ImageInput) -> Result<ExtractionOutput, TabexError> {
        let total_start = Instant::now();
        let noop = NoopProgressCallback;
        let progress: &dyn ExtractionProgressCallback =
            self.config.progress_callback.as_deref().unwrap_or(&noop);

        info!("Extracting tables from '{}' ({} bytes)", input.name(), input.len());
        progress.on_extraction_start(input.name(), input.len());

        // ── Step 1: Header check + cache key ────────────────────────────
        let image = inspect_image(input)?;
        let key = CacheKey::from_bytes(input.bytes());

        let cached = self.cache().get(&key);
        if let Some(result) = cached {
            debug!("Cache hit for {:?}", key);
            progress.on_cache_hit(input.name());
            progress.on_extraction_complete(result.len());
            return Ok(ExtractionOutput {
                image,
                result,
                stats: ExtractionStats {
                    cache_hit: true,
                    total_ms: total_start.elapsed().as_millis() as u64,
                    ..Default::default()
                },
            });
        }

        // ── Step 2: Decode ──────────────────────────────────────────────
        let decode_start = Instant::now();
        let decoded = decode_image(input).await?;
        let decode_ms = decode_start.elapsed().as_millis() as u64;

        // ── Step 3: Recognize ───────────────────────────────────────────
        let backend = self.recognizer.name().to_string();
        progress.on_inference_start(&backend);
        let inference_start = Instant::now();

        let call = self.recognizer.recognize(&decoded, &self.config.lang);
        let outcome = match self.config.inference_timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), call)
                .await
                .map_err(|_| TabexError::InferenceTimeout {
                    backend: backend.clone(),
                    secs,
                })?,
            None => call.await,
        };
        let regions = outcome.map_err(|e| TabexError::InferenceFailed {
            backend: backend.clone(),
            detail: e.message,
        })?;

        let inference_ms = inference_start.elapsed().as_millis() as u64;
        progress.on_inference_complete(regions.len(), inference_ms);
        debug!("{} returned {} region(s) in {}ms", backend, regions.len(), inference_ms);

        // ── Step 4: Convert markup ──────────────────────────────────────
        let result = Arc::new(collect_tables(&regions, progress));
        self.cache().insert(key, Arc::clone(&result));

        info!(
            "Extraction complete: {} table(s), {} warning(s), {}ms",
            result.len(),
            result.warnings().len(),
            total_start.elapsed().as_millis()
        );
        progress.on_extraction_complete(result.len());

        Ok(ExtractionOutput {
            image,
            result,
            stats: ExtractionStats {
                cache_hit: false,
                decode_ms,
                inference_ms,
                total_ms: total_start.elapsed().as_millis() as u64,
            },
        })
    }

    /// Extract from a local path or an HTTP/HTTPS URL.
    pub async fn extract(&self, input_str: impl AsRef<str>) -> Result<ExtractionOutput, TabexError> {
        let input = input::resolve_input(input_str.as_ref(), self.config.download_timeout_secs).await?;
        self.extract_image(&input).await
    }

    /// Extract from raw bytes, e.g. an upload buffer.
    pub async fn extract_bytes(
        &self,
        bytes: impl Into<Vec<u8>>,
        name: impl Into<String>,
    ) -> Result<ExtractionOutput, TabexError> {
        let input = input::load_bytes(bytes, name)?;
        self.extract_image(&input).await
    }

    /// Extract from the bundled sample image.
    pub async fn extract_sample(&self) -> Result<ExtractionOutput, TabexError> {
        let input = input::load_sample(&self.config.sample_path).await?;
        self.extract_image(&input).await
    }

    /// Extract from the session's active image.
    ///
    /// # Errors
    /// [`TabexError::NoImageSelected`] when neither an upload nor the sample
    /// is selected.
    pub async fn extract_session(&self, session: &Session) -> Result<ExtractionOutput, TabexError> {
        let (input, source) = session.active().ok_or(TabexError::NoImageSelected)?;
        debug!("Session source: {:?}", source);
        self.extract_image(input).await
    }

    /// Extract and write one CSV per table (plus the markup, if asked) into
    /// `dir`. Returns the output together with the written paths.
    pub async fn extract_to_dir(
        &self,
        input_str: impl AsRef<str>,
        dir: impl AsRef<Path>,
        include_markup: bool,
    ) -> Result<(ExtractionOutput, Vec<PathBuf>), TabexError> {
        let output = self.extract(input_str).await?;
        let paths = export_tables(&output.result, dir.as_ref(), include_markup).await?;
        Ok((output, paths))
    }

    fn cache(&self) -> MutexGuard<'_, ExtractionCache> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Synchronous one-shot wrapper around [`TableExtractor::extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input_str: impl AsRef<str>,
    config: ExtractionConfig,
) -> Result<ExtractionOutput, TabexError> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| TabexError::Internal(format!("Failed to create tokio runtime: {}", e)))?;
    let extractor = TableExtractor::new(config)?;
    runtime.block_on(extractor.extract(input_str))
}

/// Read image metadata without running the model.
///
/// Does not require a recognizer or API key.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<ImageInfo, TabexError> {
    let input = input::resolve_input(input_str.as_ref(), 120).await?;
    inspect_image(&input)
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Build the recognizer, from most-specific to least-specific.
///
/// 1. **Pre-built recognizer** (`config.recognizer`): used as-is.
/// 2. **Structure service** (`backend = StructureService`): HTTP client for
///    `config.service_url`.
/// 3. **Vision LLM**: a provider resolved by [`resolve_provider`].
fn resolve_recognizer(config: &ExtractionConfig) -> Result<Arc<dyn TableRecognizer>, TabexError> {
    if let Some(ref recognizer) = config.recognizer {
        return Ok(Arc::clone(recognizer));
    }

    match config.backend {
        RecognizerBackend::StructureService => {
            let url = config.service_url.as_deref().ok_or_else(|| {
                TabexError::RecognizerNotConfigured {
                    backend: RecognizerBackend::StructureService.as_str().to_string(),
                    hint: "Set --service-url or TABEX_SERVICE_URL.".to_string(),
                }
            })?;
            Ok(Arc::new(StructureServiceRecognizer::new(url, config)?))
        }
        RecognizerBackend::Vision => {
            let (provider, label) = resolve_provider(config)?;
            Ok(Arc::new(VisionTableRecognizer::new(provider, &label, config)))
        }
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<(Arc<dyn LLMProvider>, String), TabexError> {
    let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        TabexError::RecognizerNotConfigured {
            backend: format!("vision:{}", provider_name),
            hint: format!("{e}"),
        }
    })?;
    Ok((provider, format!("{}/{}", provider_name, model)))
}

/// Resolve the vision LLM provider.
///
/// 1. **Named provider + model** (`config.provider_name`).
/// 2. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    honoured before auto-detection so the model choice sticks even when
///    several API keys are present.
/// 3. **OpenAI** when `OPENAI_API_KEY` is set.
/// 4. **Full auto-detection** (`ProviderFactory::from_env`).
fn resolve_provider(config: &ExtractionConfig) -> Result<(Arc<dyn LLMProvider>, String), TabexError> {
    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| TabexError::RecognizerNotConfigured {
            backend: "vision:auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or use --backend structure-service.\n\
                Error: {}",
                e
            ),
        })?;

    Ok((llm_provider, "auto".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecognizeError;
    use crate::pipeline::recognize::Region;
    use async_trait::async_trait;
    use image::DynamicImage;

    struct Slow;

    #[async_trait]
    impl TableRecognizer for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn recognize(&self, _: &DynamicImage, _: &str) -> Result<Vec<Region>, RecognizeError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![])
        }
    }

    fn png() -> ImageInput {
        let mut buf = Vec::new();
        DynamicImage::new_rgb8(4, 4)
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        ImageInput::from_bytes(buf, "tiny.png").unwrap()
    }

    #[tokio::test]
    async fn timeout_is_reported_and_not_cached() {
        let config = ExtractionConfig::builder()
            .inference_timeout_secs(1)
            .build()
            .unwrap();
        let extractor = TableExtractor::with_recognizer(Arc::new(Slow), config);

        let err = extractor.extract_image(&png()).await.unwrap_err();
        assert!(matches!(err, TabexError::InferenceTimeout { secs: 1, .. }), "got {err}");
        assert_eq!(extractor.cache_stats().entries, 0);
    }

    #[tokio::test]
    async fn empty_session_is_no_image_selected() {
        let extractor =
            TableExtractor::with_recognizer(Arc::new(Slow), ExtractionConfig::default());
        let session = extractor.new_session();
        let err = extractor.extract_session(&session).await.unwrap_err();
        assert!(matches!(err, TabexError::NoImageSelected));
    }

    #[test]
    fn structure_service_without_url_is_not_configured() {
        let mut config = ExtractionConfig::default();
        config.backend = RecognizerBackend::StructureService;
        match resolve_recognizer(&config) {
            Err(TabexError::RecognizerNotConfigured { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(recognizer) => panic!("built {} without a URL", recognizer.name()),
        }
    }

    #[test]
    fn injected_recognizer_wins() {
        let mut config = ExtractionConfig::default();
        config.backend = RecognizerBackend::StructureService;
        config.recognizer = Some(Arc::new(Slow));
        assert_eq!(resolve_recognizer(&config).unwrap().name(), "slow");
    }
}
