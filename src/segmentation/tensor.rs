use super::types::PixelTensor;
use crate::error::{CutoutError, Result};
use crate::input::PixelBuffer;
use ndarray::Array3;

/// Reshapes RGBA pixel buffers into (height, width, 3) tensors
pub struct TensorBuilder;

impl TensorBuilder {
    /// Drop the alpha sample of every pixel, keeping row-major RGB order
    pub fn build(pixels: &[u8], width: u32, height: u32) -> Result<PixelTensor> {
        let _span = tracing::debug_span!("tensor_build", width, height).entered();

        let (width, height) = (width as usize, height as usize);
        let expected = width * height * PixelBuffer::CHANNELS;
        if pixels.len() != expected {
            return Err(CutoutError::Shape(format!(
                "{} samples cannot fill a {}x{} RGBA image ({} expected)",
                pixels.len(),
                width,
                height,
                expected
            )));
        }

        let rgb: Vec<u8> = pixels
            .chunks_exact(PixelBuffer::CHANNELS)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();

        let data = Array3::from_shape_vec((height, width, PixelTensor::CHANNELS), rgb)
            .map_err(|e| CutoutError::Shape(e.to_string()))?;

        PixelTensor::from_array(data)
    }

    pub fn from_buffer(buffer: &PixelBuffer) -> Result<PixelTensor> {
        Self::build(buffer.as_bytes(), buffer.width(), buffer.height())
    }
}
