use crate::error::{CutoutError, Result};
use async_trait::async_trait;
use image::RgbImage;
use ndarray::{Array3, ArrayView3};

/// Person probability per pixel: 0.0 = background, 1.0 = foreground
/// Flattened in row-major order at tensor resolution
pub type ProbabilityMap = Vec<f32>;

/// RGB samples shaped (height, width, 3), alpha dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelTensor {
    data: Array3<u8>,
}

impl PixelTensor {
    pub const CHANNELS: usize = 3;

    pub fn from_array(data: Array3<u8>) -> Result<Self> {
        let shape = data.shape();
        if shape[2] != Self::CHANNELS {
            return Err(CutoutError::Shape(format!(
                "tensor needs {} channels, got shape {:?}",
                Self::CHANNELS,
                shape
            )));
        }
        Ok(Self { data })
    }

    pub fn height(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn width(&self) -> usize {
        self.data.shape()[1]
    }

    /// (height, width, channels)
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height(), self.width(), Self::CHANNELS)
    }

    pub fn pixel_count(&self) -> usize {
        self.height() * self.width()
    }

    pub fn view(&self) -> ArrayView3<'_, u8> {
        self.data.view()
    }

    /// Samples in row-major pixel order, RGB within each pixel
    pub fn samples(&self) -> impl Iterator<Item = u8> + '_ {
        self.data.iter().copied()
    }

    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        let (height, width, _) = self.shape();
        RgbImage::from_raw(width as u32, height as u32, self.samples().collect()).ok_or_else(
            || CutoutError::Shape(format!("cannot view {}x{} tensor as an image", width, height)),
        )
    }
}

/// Per-pixel person labels in the same order as the source pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    width: u32,
    height: u32,
    labels: Vec<u8>,
}

impl SegmentationMask {
    pub const FOREGROUND: u8 = 1;
    pub const BACKGROUND: u8 = 0;

    pub fn from_labels(width: u32, height: u32, labels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if labels.len() != expected {
            return Err(CutoutError::Alignment(format!(
                "mask holds {} labels, {}x{} needs {}",
                labels.len(),
                width,
                height,
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            labels,
        })
    }

    /// Label every pixel whose probability reaches `threshold` as foreground
    pub fn from_probabilities(
        width: u32,
        height: u32,
        probabilities: &[f32],
        threshold: f32,
    ) -> Result<Self> {
        let labels = probabilities
            .iter()
            .map(|&p| {
                if p >= threshold {
                    Self::FOREGROUND
                } else {
                    Self::BACKGROUND
                }
            })
            .collect();
        Self::from_labels(width, height, labels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// Exact match against [`Self::FOREGROUND`]; any other label is background
    pub fn is_foreground(&self, index: usize) -> bool {
        self.labels.get(index) == Some(&Self::FOREGROUND)
    }

    pub fn foreground_count(&self) -> usize {
        self.labels
            .iter()
            .filter(|&&label| label == Self::FOREGROUND)
            .count()
    }
}

/// Trait for segmentation models
/// Allows swapping between backends (ONNX Runtime, test doubles, ...)
pub trait SegmentationModel: Send {
    /// Estimate person probability for every pixel of `tensor`
    ///
    /// # Returns
    /// * Probabilities 0.0-1.0, flattened in row-major order, one per
    ///   tensor pixel
    fn predict(&mut self, tensor: &PixelTensor) -> anyhow::Result<ProbabilityMap>;

    /// Get the model's preferred input dimensions
    ///
    /// Returns (width, height)
    fn input_size(&self) -> (u32, u32);
}

/// Fetches and initializes a [`SegmentationModel`]
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> anyhow::Result<Box<dyn SegmentationModel>>;

    /// Where the model comes from, for logs
    fn describe(&self) -> String;
}
