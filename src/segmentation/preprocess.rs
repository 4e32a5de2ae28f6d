use super::types::{PixelTensor, ProbabilityMap};
use crate::config::TensorLayout;
use anyhow::{bail, Result};
use image::imageops;
use ndarray::Array4;

/// Preprocessor for converting pixel tensors to model input tensors
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
    layout: TensorLayout,
    mean: [f32; 3],
    std: [f32; 3],
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
            layout: TensorLayout::Nchw,
            mean: [0.0; 3],
            std: [1.0; 3],
        }
    }

    pub fn with_layout(mut self, layout: TensorLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Per-channel normalization applied after scaling to [0, 1]
    pub fn with_normalization(mut self, mean: [f32; 3], std: [f32; 3]) -> Self {
        self.mean = mean;
        self.std = std;
        self
    }

    /// Preprocess a pixel tensor into a normalized batch-of-one tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Convert to float, scale to [0, 1], then (v - mean) / std
    /// 3. Lay out as NCHW or NHWC
    ///
    /// Returns: Array4<f32> with shape [1, 3, H, W] or [1, H, W, 3]
    pub fn preprocess(&self, tensor: &PixelTensor) -> Result<Array4<f32>> {
        let _span = tracing::debug_span!("preprocess").entered();

        if self.std.iter().any(|&s| s == 0.0) {
            bail!("normalization std must be non-zero, got {:?}", self.std);
        }

        let image = tensor.to_rgb_image()?;
        let resized = if image.dimensions() != (self.target_width, self.target_height) {
            imageops::resize(
                &image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Lanczos3,
            )
        } else {
            image
        };

        let (width, height) = resized.dimensions();
        let (w, h) = (width as usize, height as usize);
        let mut input = match self.layout {
            TensorLayout::Nchw => Array4::<f32>::zeros((1, 3, h, w)),
            TensorLayout::Nhwc => Array4::<f32>::zeros((1, h, w, 3)),
        };

        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                let value = (pixel[c] as f32 / 255.0 - self.mean[c]) / self.std[c];
                match self.layout {
                    TensorLayout::Nchw => input[[0, c, y, x]] = value,
                    TensorLayout::Nhwc => input[[0, y, x, c]] = value,
                }
            }
        }

        Ok(input)
    }

    /// Resize a probability map from model resolution back to tensor resolution
    ///
    /// # Arguments
    /// * `matte` - Flattened probabilities at model resolution
    /// * `matte_width` - Width of the map
    /// * `matte_height` - Height of the map
    /// * `target_width` - Desired output width
    /// * `target_height` - Desired output height
    ///
    /// Returns: Resized map flattened in row-major order
    pub fn postprocess_matte(
        matte: &[f32],
        matte_width: u32,
        matte_height: u32,
        target_width: u32,
        target_height: u32,
    ) -> Result<ProbabilityMap> {
        let _span = tracing::debug_span!("postprocess").entered();

        let expected = matte_width as usize * matte_height as usize;
        if matte.len() != expected {
            bail!(
                "matte holds {} values, {}x{} needs {}",
                matte.len(),
                matte_width,
                matte_height,
                expected
            );
        }

        if matte_width == target_width && matte_height == target_height {
            return Ok(matte.to_vec());
        }

        let gray_image = image::GrayImage::from_fn(matte_width, matte_height, |x, y| {
            let idx = (y * matte_width + x) as usize;
            let value = (matte[idx] * 255.0).clamp(0.0, 255.0) as u8;
            image::Luma([value])
        });

        let resized = imageops::resize(
            &gray_image,
            target_width,
            target_height,
            imageops::FilterType::Lanczos3,
        );

        Ok(resized.pixels().map(|p| p[0] as f32 / 255.0).collect())
    }

    /// Pull the person channel out of a raw model output
    ///
    /// The output is read in the same layout as the input: `[1, C, H, W]`
    /// for NCHW, `[1, H, W, C]` for NHWC, with one or two channels. For
    /// two-class outputs channel 1 is the person. Outputs that stray outside
    /// [0, 1] are treated as logits.
    pub fn person_probabilities(
        shape: &[i64],
        data: &[f32],
        layout: TensorLayout,
    ) -> Result<(ProbabilityMap, u32, u32)> {
        if shape.len() != 4 {
            bail!("expected a 4-d model output, got shape {:?}", shape);
        }

        let (channels_first, height, width, channels) = match layout {
            TensorLayout::Nchw => (true, shape[2], shape[3], shape[1]),
            TensorLayout::Nhwc => (false, shape[1], shape[2], shape[3]),
        };

        if height <= 0 || width <= 0 || !(1..=2).contains(&channels) {
            bail!("unsupported model output shape {:?}", shape);
        }

        let plane = (height * width) as usize;
        if data.len() != plane * channels as usize {
            bail!(
                "model output holds {} values, shape {:?} needs {}",
                data.len(),
                shape,
                plane * channels as usize
            );
        }

        let mut values: Vec<f32> = match (channels, channels_first) {
            (1, _) => data.to_vec(),
            (_, true) => data[plane..plane * 2].to_vec(),
            (_, false) => data.iter().skip(1).step_by(2).copied().collect(),
        };

        if looks_like_logits(&values) {
            for v in values.iter_mut() {
                *v = 1.0 / (1.0 + (-*v).exp());
            }
        }

        Ok((values, width as u32, height as u32))
    }
}

fn looks_like_logits(values: &[f32]) -> bool {
    values.iter().any(|&v| v < -0.01 || v > 1.01)
}
