//! The current image selection: an upload or the bundled sample.
//!
//! At most one of the two is selected at a time. A new upload replaces the
//! sample, and choosing the sample drops the upload. With neither selected
//! there is nothing to extract and the presenter shows the awaiting-input
//! notice.

use crate::error::TabexError;
use crate::pipeline::input::{load_sample, ImageInput};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where the active image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    Upload,
    Sample,
}

#[derive(Debug, Clone)]
pub struct Session {
    upload: Option<ImageInput>,
    sample: Option<ImageInput>,
    sample_path: PathBuf,
}

impl Session {
    pub fn new(sample_path: impl Into<PathBuf>) -> Self {
        Self {
            upload: None,
            sample: None,
            sample_path: sample_path.into(),
        }
    }

    pub fn sample_path(&self) -> &Path {
        &self.sample_path
    }

    /// Select an uploaded image. Any selected sample is cleared.
    pub fn upload(&mut self, input: ImageInput) {
        debug!("Session: upload '{}' selected", input.name());
        self.sample = None;
        self.upload = Some(input);
    }

    /// Read the sample from disk and select it. Any upload is cleared.
    ///
    /// On error the current selection is left untouched.
    pub async fn choose_sample(&mut self) -> Result<&ImageInput, TabexError> {
        let input = load_sample(&self.sample_path).await?;
        Ok(self.select_sample(input))
    }

    /// Select an already loaded sample image. Any upload is cleared.
    pub fn select_sample(&mut self, input: ImageInput) -> &ImageInput {
        debug!("Session: sample '{}' selected", input.name());
        self.upload = None;
        self.sample.insert(input)
    }

    pub fn clear(&mut self) {
        self.upload = None;
        self.sample = None;
    }

    /// The image the pipeline should run on, if any.
    pub fn active(&self) -> Option<(&ImageInput, ImageSource)> {
        self.upload
            .as_ref()
            .map(|i| (i, ImageSource::Upload))
            .or_else(|| self.sample.as_ref().map(|i| (i, ImageSource::Sample)))
    }

    pub fn source(&self) -> Option<ImageSource> {
        self.active().map(|(_, source)| source)
    }

    pub fn has_image(&self) -> bool {
        self.active().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    fn input(name: &str) -> ImageInput {
        ImageInput::from_bytes(PNG_MAGIC.to_vec(), name).unwrap()
    }

    #[test]
    fn empty_session_has_no_image() {
        let s = Session::new("sample/none.png");
        assert!(s.active().is_none());
        assert!(!s.has_image());
    }

    #[test]
    fn upload_clears_sample() {
        let mut s = Session::new("sample/none.png");
        s.select_sample(input("sample.png"));
        assert_eq!(s.source(), Some(ImageSource::Sample));

        s.upload(input("mine.png"));
        let (active, source) = s.active().unwrap();
        assert_eq!(active.name(), "mine.png");
        assert_eq!(source, ImageSource::Upload);

        // The sample does not come back once the upload is dropped.
        s.upload = None;
        assert!(s.active().is_none());
    }

    #[test]
    fn sample_clears_upload() {
        let mut s = Session::new("sample/none.png");
        s.upload(input("mine.png"));
        s.select_sample(input("sample.png"));
        assert_eq!(s.active().unwrap().0.name(), "sample.png");
        assert!(s.upload.is_none());
    }

    #[test]
    fn sample_is_reused_until_replaced() {
        let mut s = Session::new("sample/none.png");
        s.select_sample(input("sample.png"));
        assert_eq!(s.active().unwrap().0.name(), "sample.png");
        assert_eq!(s.active().unwrap().0.name(), "sample.png");
    }

    #[tokio::test]
    async fn missing_sample_keeps_selection() {
        let mut s = Session::new("/definitely/not/here.png");
        s.upload(input("mine.png"));
        let err = s.choose_sample().await.unwrap_err();
        assert!(matches!(err, TabexError::FileNotFound { .. }));
        assert_eq!(s.source(), Some(ImageSource::Upload));
    }

    #[tokio::test]
    async fn choose_sample_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.png");
        std::fs::write(&path, PNG_MAGIC).unwrap();

        let mut s = Session::new(&path);
        s.upload(input("mine.png"));
        let chosen = s.choose_sample().await.unwrap();
        assert_eq!(chosen.name(), "sample.png");
        assert_eq!(s.source(), Some(ImageSource::Sample));
    }
}
