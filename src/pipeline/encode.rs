//! Image encoding for remote recognizers: `DynamicImage` → base64 PNG.
//!
//! Both built-in backends ship the image inside a JSON body. PNG keeps the
//! glyph edges of small table text intact; the longest edge is capped at
//! `max_image_pixels` so a 600-DPI scan does not blow past upload limits.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::imageops::FilterType;
use image::DynamicImage;
use std::borrow::Cow;
use std::io::Cursor;
use tracing::debug;

/// Downscale so neither edge exceeds `max_pixels`, keeping the aspect ratio.
pub fn fit_within(img: &DynamicImage, max_pixels: u32) -> Cow<'_, DynamicImage> {
    if img.width() <= max_pixels && img.height() <= max_pixels {
        return Cow::Borrowed(img);
    }
    debug!(
        "Downscaling {}x{} to fit {}px",
        img.width(),
        img.height(),
        max_pixels
    );
    Cow::Owned(img.resize(max_pixels, max_pixels, FilterType::Lanczos3))
}

/// PNG-encode the image and return it as standard base64.
pub fn encode_base64_png(img: &DynamicImage, max_pixels: u32) -> Result<String, image::ImageError> {
    let img = fit_within(img, max_pixels);
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());
    Ok(b64)
}

/// Encode an image as an attachment for a vision LLM.
///
/// `detail: "high"` keeps the provider from collapsing the image into a
/// single low-resolution tile, which loses small cell text.
pub fn encode_for_vision(img: &DynamicImage, max_pixels: u32) -> Result<ImageData, image::ImageError> {
    let b64 = encode_base64_png(img, max_pixels)?;
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
