use super::types::PixelBuffer;
use crate::error::{CutoutError, Result};
use image::imageops::{self, FilterType};

/// Decodes still images into RGBA pixel buffers
pub struct ImageDecoder;

impl ImageDecoder {
    /// Decode JPEG/PNG/WebP bytes into a row-major RGBA buffer
    ///
    /// Sources without alpha come back with alpha 255.
    pub fn decode(bytes: &[u8]) -> Result<PixelBuffer> {
        let _span = tracing::debug_span!("decode", bytes = bytes.len()).entered();

        if bytes.is_empty() {
            return Err(CutoutError::Decode("image is empty".to_string()));
        }

        let image = image::load_from_memory(bytes)
            .map_err(|e| CutoutError::Decode(e.to_string()))?;

        if image.width() == 0 || image.height() == 0 {
            return Err(CutoutError::Decode(format!(
                "image has zero area ({}x{})",
                image.width(),
                image.height()
            )));
        }

        tracing::debug!("Decoded {}x{} image", image.width(), image.height());

        Ok(PixelBuffer::from_rgba_image(image.to_rgba8()))
    }

    /// Stretch a buffer onto a fixed working canvas
    ///
    /// Aspect ratio is not preserved; every source pixel lands somewhere on
    /// the `width` x `height` canvas.
    pub fn normalize(pixels: &PixelBuffer, width: u32, height: u32) -> Result<PixelBuffer> {
        let _span = tracing::debug_span!("normalize").entered();

        if width == 0 || height == 0 {
            return Err(CutoutError::Shape(format!(
                "working size must be positive, got {}x{}",
                width, height
            )));
        }

        if pixels.dimensions() == (width, height) {
            return Ok(pixels.clone());
        }

        let source = pixels.to_rgba_image()?;
        let resized = imageops::resize(&source, width, height, FilterType::Triangle);

        Ok(PixelBuffer::from_rgba_image(resized))
    }
}
