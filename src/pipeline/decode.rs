//! Image decoding: raw PNG/JPEG bytes → RGB pixel grid.
//!
//! Decoding a large scan is CPU-bound, so [`decode_image`] runs it on the
//! blocking thread pool. [`inspect_image`] only reads the header and is
//! cheap enough to run on every request, cache hit or not.

use crate::error::TabexError;
use crate::output::{ImageInfo, ImageKind};
use crate::pipeline::input::ImageInput;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;
use tracing::debug;

fn image_format(kind: ImageKind) -> ImageFormat {
    match kind {
        ImageKind::Png => ImageFormat::Png,
        ImageKind::Jpeg => ImageFormat::Jpeg,
    }
}

/// Decode the input into a 3-channel RGB image.
pub async fn decode_image(input: &ImageInput) -> Result<DynamicImage, TabexError> {
    let owned = input.clone();
    tokio::task::spawn_blocking(move || decode_blocking(&owned))
        .await
        .map_err(|e| TabexError::Internal(format!("Decode task panicked: {}", e)))?
}

/// Blocking implementation of [`decode_image`].
pub fn decode_blocking(input: &ImageInput) -> Result<DynamicImage, TabexError> {
    let img = image::load_from_memory_with_format(input.bytes(), image_format(input.kind()))
        .map_err(|e| TabexError::DecodeFailed {
            name: input.name().to_string(),
            detail: e.to_string(),
        })?;

    debug!(
        "Decoded {} → {}x{} px",
        input.name(),
        img.width(),
        img.height()
    );

    Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
}

/// Read dimensions and compute the content digest without decoding pixels.
pub fn inspect_image(input: &ImageInput) -> Result<ImageInfo, TabexError> {
    let (width, height) =
        ImageReader::with_format(Cursor::new(input.bytes()), image_format(input.kind()))
            .into_dimensions()
            .map_err(|e| TabexError::DecodeFailed {
                name: input.name().to_string(),
                detail: e.to_string(),
            })?;

    Ok(ImageInfo {
        name: input.name().to_string(),
        kind: input.kind(),
        width,
        height,
        byte_len: input.len(),
        digest: blake3::hash(input.bytes()).to_hex().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([0, 128, 255, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("encode");
        buf
    }

    #[tokio::test]
    async fn decodes_to_rgb() {
        let input = ImageInput::from_bytes(png_bytes(12, 7), "rgba.png").unwrap();
        let img = decode_image(&input).await.expect("decode");
        assert_eq!((img.width(), img.height()), (12, 7));
        assert!(matches!(img, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn truncated_png_is_decode_error() {
        let mut bytes = png_bytes(16, 16);
        bytes.truncate(24);
        let input = ImageInput::from_bytes(bytes, "broken.png").unwrap();
        let err = decode_blocking(&input).unwrap_err();
        assert!(matches!(err, TabexError::DecodeFailed { .. }), "got {err}");
    }

    #[test]
    fn inspect_reads_header_and_digest() {
        let bytes = png_bytes(30, 20);
        let expected = blake3::hash(&bytes).to_hex().to_string();
        let input = ImageInput::from_bytes(bytes, "x.png").unwrap();
        let info = inspect_image(&input).unwrap();
        assert_eq!((info.width, info.height), (30, 20));
        assert_eq!(info.kind, ImageKind::Png);
        assert_eq!(info.digest, expected);
    }
}
