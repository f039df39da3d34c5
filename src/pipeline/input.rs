//! Input resolution: turn a path, URL, upload buffer or the bundled sample
//! into an [`ImageInput`] holding the raw bytes.
//!
//! The format is sniffed from the magic bytes here, before anything is
//! decoded, so a GIF or a PDF renamed to `.png` is rejected with a clear
//! [`TabexError::UnsupportedFormat`] instead of a decoder error. The bytes
//! themselves are kept untouched: they are the cache key.

use crate::error::TabexError;
use crate::output::ImageKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Raw bytes of an accepted PNG or JPEG image plus its display name.
///
/// Cloning is cheap; the bytes are shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    name: String,
    bytes: Arc<[u8]>,
    kind: ImageKind,
}

impl ImageInput {
    /// Accept an in-memory image (e.g. an upload), validating its format.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, name: impl Into<String>) -> Result<Self, TabexError> {
        let bytes: Vec<u8> = bytes.into();
        let name = name.into();
        let kind = sniff_kind(&bytes, &name)?;
        Ok(Self {
            name,
            bytes: Arc::from(bytes),
            kind,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Accept raw bytes from an upload. Same as [`ImageInput::from_bytes`].
pub fn load_bytes(bytes: impl Into<Vec<u8>>, name: impl Into<String>) -> Result<ImageInput, TabexError> {
    ImageInput::from_bytes(bytes, name)
}

/// Identify PNG/JPEG from the leading bytes.
pub fn sniff_kind(bytes: &[u8], name: &str) -> Result<ImageKind, TabexError> {
    if bytes.is_empty() {
        return Err(TabexError::DecodeFailed {
            name: name.to_string(),
            detail: "input is empty".to_string(),
        });
    }

    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => Ok(ImageKind::Png),
        Ok(image::ImageFormat::Jpeg) => Ok(ImageKind::Jpeg),
        _ => Err(TabexError::UnsupportedFormat {
            name: name.to_string(),
            magic: bytes.iter().take(4).copied().collect(),
        }),
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to image bytes.
///
/// If the input is a URL, download it. Otherwise read it as a local file.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ImageInput, TabexError> {
    if input.trim().is_empty() {
        return Err(TabexError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

/// Read the bundled sample image.
pub async fn load_sample(path: &Path) -> Result<ImageInput, TabexError> {
    debug!("Loading sample image from {}", path.display());
    read_local(path).await
}

/// Read a local file, mapping I/O failures to input errors.
async fn read_local(path: &Path) -> Result<ImageInput, TabexError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => TabexError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => TabexError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let name = file_name(path);
    let input = ImageInput::from_bytes(bytes, name)?;
    debug!(
        "Resolved local image: {} ({} bytes)",
        path.display(),
        input.len()
    );
    Ok(input)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| PathBuf::from(path).display().to_string())
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ImageInput, TabexError> {
    info!("Downloading image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| TabexError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            TabexError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            TabexError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(TabexError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| TabexError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let input = ImageInput::from_bytes(bytes.to_vec(), extract_filename(url))?;
    info!("Downloaded {} bytes", input.len());
    Ok(input)
}

/// Extract a reasonable display name from the URL path.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded-image".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;

    fn encoded(format: ImageFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format)
            .expect("encode test image");
        buf
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/scan.png"));
        assert!(is_url("http://example.com/scan.png"));
        assert!(!is_url("/tmp/scan.png"));
        assert!(!is_url("scan.png"));
        assert!(!is_url(""));
    }

    #[test]
    fn sniffs_png_and_jpeg() {
        let png = ImageInput::from_bytes(encoded(ImageFormat::Png), "a.png").unwrap();
        assert_eq!(png.kind(), ImageKind::Png);
        let jpg = ImageInput::from_bytes(encoded(ImageFormat::Jpeg), "a.jpg").unwrap();
        assert_eq!(jpg.kind(), ImageKind::Jpeg);
    }

    #[test]
    fn rejects_other_formats() {
        let err = ImageInput::from_bytes(b"GIF89a....".to_vec(), "anim.gif").unwrap_err();
        match err {
            TabexError::UnsupportedFormat { name, magic } => {
                assert_eq!(name, "anim.gif");
                assert_eq!(magic, b"GIF8".to_vec());
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = ImageInput::from_bytes(b"%PDF-1.7".to_vec(), "doc.png").unwrap_err();
        assert!(matches!(err, TabexError::UnsupportedFormat { .. }));
    }

    #[test]
    fn rejects_empty_input() {
        let err = ImageInput::from_bytes(Vec::new(), "empty.png").unwrap_err();
        assert!(matches!(err, TabexError::DecodeFailed { .. }));
    }

    #[test]
    fn extract_filename_from_url() {
        assert_eq!(
            extract_filename("https://example.com/scans/invoice.jpg?x=1"),
            "invoice.jpg"
        );
        assert_eq!(extract_filename("https://example.com/"), "downloaded-image");
    }

    #[tokio::test]
    async fn missing_file_is_file_not_found() {
        let err = resolve_input("/definitely/not/here.png", 5).await.unwrap_err();
        assert!(matches!(err, TabexError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn reads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.png");
        std::fs::write(&path, encoded(ImageFormat::Png)).unwrap();

        let input = resolve_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(input.name(), "table.png");
        assert_eq!(input.kind(), ImageKind::Png);
    }
}
