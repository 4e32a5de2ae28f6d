//! Keeps foreground pixels, blanks the rest.
//!
//! The keep/drop decision is per pixel and exact: label `1` keeps all four
//! RGBA samples untouched, any other label leaves the zero-initialized
//! (transparent black) output as is.

use crate::error::{CutoutError, Result};
use crate::input::PixelBuffer;
use crate::segmentation::SegmentationMask;

pub struct Compositor;

impl Compositor {
    /// Merge `source` RGBA samples with per-pixel `mask` labels
    pub fn composite(source: &[u8], mask: &[u8], width: u32, height: u32) -> Result<PixelBuffer> {
        let _span = tracing::debug_span!("composite", width, height).entered();

        let pixel_count = width as usize * height as usize;
        if mask.len() != pixel_count {
            return Err(CutoutError::Alignment(format!(
                "mask has {} labels for {}x{} pixels",
                mask.len(),
                width,
                height
            )));
        }
        if source.len() != pixel_count * PixelBuffer::CHANNELS {
            return Err(CutoutError::Alignment(format!(
                "source has {} samples for {}x{} RGBA pixels",
                source.len(),
                width,
                height
            )));
        }

        let mut output = PixelBuffer::zeroed(width, height);
        let mut kept = 0;
        for ((out, src), &label) in output
            .as_bytes_mut()
            .chunks_exact_mut(PixelBuffer::CHANNELS)
            .zip(source.chunks_exact(PixelBuffer::CHANNELS))
            .zip(mask)
        {
            if label == SegmentationMask::FOREGROUND {
                out.copy_from_slice(src);
                kept += 1;
            }
        }

        tracing::debug!("Kept {}/{} pixels", kept, pixel_count);

        Ok(output)
    }

    /// Composite a decoded buffer with a mask of the same dimensions
    pub fn apply(source: &PixelBuffer, mask: &SegmentationMask) -> Result<PixelBuffer> {
        if (mask.width(), mask.height()) != source.dimensions() {
            return Err(CutoutError::Alignment(format!(
                "mask is {}x{}, source is {}x{}",
                mask.width(),
                mask.height(),
                source.width(),
                source.height()
            )));
        }
        Self::composite(source.as_bytes(), mask.labels(), source.width(), source.height())
    }

    /// Render the mask itself: foreground white, background black, opaque
    pub fn mask_to_rgba(mask: &SegmentationMask) -> Result<PixelBuffer> {
        let data = mask
            .labels()
            .iter()
            .flat_map(|&label| {
                let value = if label == SegmentationMask::FOREGROUND { 255 } else { 0 };
                [value, value, value, 255]
            })
            .collect();

        PixelBuffer::new(mask.width(), mask.height(), data)
    }
}
