//! Configuration types for table extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. The config is read once when a
//! [`crate::TableExtractor`] is constructed; the extractor then owns the
//! recognizer and the cache for the rest of the process.

use crate::error::TabexError;
use crate::pipeline::recognize::TableRecognizer;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Location of the bundled sample image, relative to the working directory.
pub const DEFAULT_SAMPLE_PATH: &str = "sample/QlC7W.png";

/// Configuration for a [`crate::TableExtractor`].
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use tabex::{CachePolicy, ExtractionConfig};
///
/// let config = ExtractionConfig::builder()
///     .lang("en")
///     .max_retries(2)
///     .cache_policy(CachePolicy::Bounded(32))
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Language hint passed to the recognizer. Default: `"en"`.
    pub lang: String,

    /// Pre-constructed recognizer. Takes precedence over `backend`.
    pub recognizer: Option<Arc<dyn TableRecognizer>>,

    /// Which built-in recognizer to construct when `recognizer` is None.
    /// Default: [`RecognizerBackend::Vision`].
    pub backend: RecognizerBackend,

    /// Vision LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None, the provider is auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Vision LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// Base URL of the structure-recognition service, e.g.
    /// `http://127.0.0.1:8871/predict/structure_system`.
    /// Required for [`RecognizerBackend::StructureService`].
    pub service_url: Option<String>,

    /// Sampling temperature for the vision LLM. Default: 0.0.
    ///
    /// Transcription wants the most literal reading of the image.
    pub temperature: f32,

    /// Maximum tokens the vision LLM may generate per image. Default: 4096.
    pub max_tokens: usize,

    /// Retry attempts on a transient recognizer failure. Default: 0, i.e.
    /// a failed call fails the request and the caller re-submits.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call recognition timeout in seconds. Default: None (wait for as
    /// long as the model takes).
    pub inference_timeout_secs: Option<u64>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Longest edge, in pixels, of the image sent to a remote model.
    /// Larger images are downscaled before encoding. Default: 2000.
    pub max_image_pixels: u32,

    /// Eviction policy of the result cache. Default: [`CachePolicy::Unbounded`].
    pub cache_policy: CachePolicy,

    /// Path of the bundled sample image. Default: [`DEFAULT_SAMPLE_PATH`].
    pub sample_path: PathBuf,

    /// Custom system prompt for the vision backend. If None, uses the
    /// built-in table transcription prompt.
    pub system_prompt: Option<String>,

    /// Receives extraction events (cache hits, skipped regions, ...).
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            lang: "en".to_string(),
            recognizer: None,
            backend: RecognizerBackend::default(),
            provider_name: None,
            model: None,
            service_url: None,
            temperature: 0.0,
            max_tokens: 4096,
            max_retries: 0,
            retry_backoff_ms: 500,
            inference_timeout_secs: None,
            download_timeout_secs: 120,
            max_image_pixels: 2000,
            cache_policy: CachePolicy::default(),
            sample_path: PathBuf::from(DEFAULT_SAMPLE_PATH),
            system_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("lang", &self.lang)
            .field(
                "recognizer",
                &self.recognizer.as_ref().map(|r| r.name().to_string()),
            )
            .field("backend", &self.backend)
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("service_url", &self.service_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("inference_timeout_secs", &self.inference_timeout_secs)
            .field("max_image_pixels", &self.max_image_pixels)
            .field("cache_policy", &self.cache_policy)
            .field("sample_path", &self.sample_path)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.config.lang = lang.into();
        self
    }

    pub fn recognizer(mut self, recognizer: Arc<dyn TableRecognizer>) -> Self {
        self.config.recognizer = Some(recognizer);
        self
    }

    pub fn backend(mut self, backend: RecognizerBackend) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn service_url(mut self, url: impl Into<String>) -> Self {
        self.config.service_url = Some(url.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn inference_timeout_secs(mut self, secs: u64) -> Self {
        self.config.inference_timeout_secs = Some(secs);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_image_pixels(mut self, px: u32) -> Self {
        self.config.max_image_pixels = px.max(100);
        self
    }

    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.config.cache_policy = policy;
        self
    }

    pub fn sample_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.sample_path = path.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, TabexError> {
        let c = &self.config;
        if c.lang.trim().is_empty() {
            return Err(TabexError::InvalidConfig(
                "Language hint must not be empty".into(),
            ));
        }
        if let CachePolicy::Bounded(0) = c.cache_policy {
            return Err(TabexError::InvalidConfig(
                "Bounded cache capacity must be ≥ 1".into(),
            ));
        }
        if c.inference_timeout_secs == Some(0) {
            return Err(TabexError::InvalidConfig(
                "Inference timeout must be ≥ 1s".into(),
            ));
        }
        if c.recognizer.is_none()
            && c.backend == RecognizerBackend::StructureService
            && c.service_url.as_deref().map_or(true, |u| u.trim().is_empty())
        {
            return Err(TabexError::InvalidConfig(
                "The structure-service backend needs a service URL".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Built-in table recognizers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecognizerBackend {
    /// A vision LLM reached through `edgequake-llm`. (default)
    #[default]
    Vision,
    /// A PP-Structure style HTTP service returning typed regions.
    StructureService,
}

impl RecognizerBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecognizerBackend::Vision => "vision",
            RecognizerBackend::StructureService => "structure-service",
        }
    }
}

/// Eviction policy of the content-keyed result cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CachePolicy {
    /// Keep every result for the life of the process. (default)
    #[default]
    Unbounded,
    /// Keep at most N results, evicting the least recently used.
    Bounded(usize),
}

impl CachePolicy {
    /// Maximum number of entries, or None when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        match self {
            CachePolicy::Unbounded => None,
            CachePolicy::Bounded(n) => Some(*n),
        }
    }
}
