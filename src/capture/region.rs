//! Pure region cropping and JPEG encoding.
//!
//! This module has zero infrastructure dependencies.
//! It takes pixel data in, returns pixel data out.

use super::CaptureRegion;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

/// Crops a `DynamicImage` to the given region.
///
/// Rejects empty rectangles and rectangles that leave the image.
pub fn crop_to_region(image: &DynamicImage, region: &CaptureRegion) -> Result<DynamicImage, CropError> {
    let CaptureRegion { x, y, width, height } = *region;
    if width == 0 || height == 0 {
        return Err(CropError::ZeroDimension);
    }

    let (img_width, img_height) = (image.width(), image.height());
    let right = x.checked_add(width);
    let bottom = y.checked_add(height);

    match (right, bottom) {
        (Some(r), Some(b)) if r <= img_width && b <= img_height => {
            Ok(image.crop_imm(x, y, width, height))
        }
        _ => Err(CropError::OutOfBounds {
            requested: (x, y, width, height),
            image_size: (img_width, img_height),
        }),
    }
}

/// Encodes an image as JPEG at `quality` (1-100).
///
/// JPEG has no alpha channel, so the image is flattened to RGB first.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, CropError> {
    let rgb = image.to_rgb8();
    let mut jpeg_bytes: Vec<u8> = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg_bytes, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|e| CropError::EncodingFailed(e.to_string()))?;
    Ok(jpeg_bytes)
}

#[derive(Debug, thiserror::Error)]
pub enum CropError {
    #[error("Capture region has zero width or height")]
    ZeroDimension,

    #[error(
        "Capture region ({},{},{},{}) exceeds screen bounds ({}x{})",
        requested.0, requested.1, requested.2, requested.3,
        image_size.0, image_size.1
    )]
    OutOfBounds {
        requested: (u32, u32, u32, u32),
        image_size: (u32, u32),
    },

    #[error("JPEG encoding failed: {0}")]
    EncodingFailed(String),
}
