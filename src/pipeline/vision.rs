//! Vision-LLM table recognizer.
//!
//! Sends the image to a multimodal model through `edgequake-llm`, asks for
//! one `<table>` element per table, and splits the reply into regions with
//! [`crate::pipeline::postprocess::regions_from_reply`]. The model does not
//! report bounding boxes, so regions from this backend never carry one.
//!
//! ## Retry Strategy
//!
//! One call per image by default: a failure is reported to the caller, who
//! may re-submit. Setting `max_retries` opts into exponential backoff
//! (`retry_backoff_ms * 2^attempt`) for transient HTTP 429 / 503 errors;
//! with a 500 ms base and 2 retries that waits 500 ms → 1 s.

use crate::config::ExtractionConfig;
use crate::error::RecognizeError;
use crate::pipeline::encode::encode_for_vision;
use crate::pipeline::postprocess::regions_from_reply;
use crate::pipeline::recognize::{retry_with_backoff, Region, TableRecognizer};
use crate::prompts::{language_hint, DEFAULT_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Table recognizer backed by a vision-capable chat model.
pub struct VisionTableRecognizer {
    provider: Arc<dyn LLMProvider>,
    name: String,
    system_prompt: String,
    options: CompletionOptions,
    max_image_pixels: u32,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl VisionTableRecognizer {
    /// Wrap a provider, taking prompt, sampling and retry settings from
    /// `config`. `label` names the provider in logs, e.g. `openai/gpt-4.1-nano`.
    pub fn new(provider: Arc<dyn LLMProvider>, label: &str, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            name: format!("vision:{}", label),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            options: build_options(config),
            max_image_pixels: config.max_image_pixels,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }
}

#[async_trait]
impl TableRecognizer for VisionTableRecognizer {
    fn name(&self) -> &str {
        &self.name
    }

    /// ## Message Layout
    ///
    /// 1. **System message**: the transcription prompt (or user override)
    /// 2. **User message**: the language hint plus the PNG attachment
    async fn recognize(
        &self,
        image: &DynamicImage,
        lang: &str,
    ) -> Result<Vec<Region>, RecognizeError> {
        let image_data = encode_for_vision(image, self.max_image_pixels)
            .map_err(|e| RecognizeError::permanent(format!("Image encoding failed: {}", e)))?;

        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user_with_images(language_hint(lang).as_str(), vec![image_data]),
        ];

        let provider = &self.provider;
        let options = &self.options;
        let messages = &messages;

        let start = Instant::now();
        let response = retry_with_backoff(&self.name, self.max_retries, self.retry_backoff_ms, || async move {
            provider
                .chat(messages, Some(options))
                .await
                .map_err(|e| RecognizeError::new(e.to_string()))
        })
        .await?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            self.name,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        Ok(regions_from_reply(&response.content))
    }
}

/// Build `CompletionOptions` from the extraction config.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = ExtractionConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn build_options_follow_config() {
        let config = ExtractionConfig::builder()
            .temperature(0.3)
            .max_tokens(1024)
            .build()
            .unwrap();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.3));
        assert_eq!(opts.max_tokens, Some(1024));
    }
}
