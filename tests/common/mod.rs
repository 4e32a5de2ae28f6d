#![allow(dead_code)]

use async_trait::async_trait;
use cutout::config::{EngineConfig, PipelineConfig};
use cutout::input::EncodedImage;
use cutout::pipeline::Pipeline;
use cutout::segmentation::{
    ModelLoader, PixelTensor, ProbabilityMap, SegmentationEngine, SegmentationModel,
};
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Returns the same probabilities for every tensor
#[derive(Clone)]
pub struct ScriptedModel {
    pub probabilities: Vec<f32>,
}

impl SegmentationModel for ScriptedModel {
    fn predict(&mut self, _tensor: &PixelTensor) -> anyhow::Result<ProbabilityMap> {
        Ok(self.probabilities.clone())
    }

    fn input_size(&self) -> (u32, u32) {
        (256, 256)
    }
}

pub struct ScriptedLoader {
    pub model: ScriptedModel,
    pub loads: Arc<AtomicUsize>,
    pub delay: Duration,
}

impl ScriptedLoader {
    pub fn new(probabilities: Vec<f32>) -> Self {
        Self {
            model: ScriptedModel { probabilities },
            loads: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ModelLoader for ScriptedLoader {
    async fn load(&self) -> anyhow::Result<Box<dyn SegmentationModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(Box::new(self.model.clone()))
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

pub fn pipeline(loader: ScriptedLoader, width: u32, height: u32) -> Pipeline {
    let engine = SegmentationEngine::new(loader, EngineConfig::default());
    Pipeline::new(
        Arc::new(engine),
        PipelineConfig {
            working_width: width,
            working_height: height,
        },
    )
}

pub fn encode(image: &RgbaImage, format: ImageFormat) -> EncodedImage {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    EncodedImage::from_bytes(bytes)
}

/// PNG whose header declares a 0x1 image
pub fn zero_width_png() -> Vec<u8> {
    fn crc32(bytes: &[u8]) -> u32 {
        let mut crc = 0xFFFF_FFFFu32;
        for &byte in bytes {
            crc ^= byte as u32;
            for _ in 0..8 {
                crc = if crc & 1 != 0 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
            }
        }
        !crc
    }

    let mut ihdr = b"IHDR".to_vec();
    ihdr.extend_from_slice(&0u32.to_be_bytes());
    ihdr.extend_from_slice(&1u32.to_be_bytes());
    ihdr.extend_from_slice(&[8, 6, 0, 0, 0]);

    let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
    png.extend_from_slice(&13u32.to_be_bytes());
    png.extend_from_slice(&ihdr);
    png.extend_from_slice(&crc32(&ihdr).to_be_bytes());
    png.extend_from_slice(&0u32.to_be_bytes());
    png.extend_from_slice(b"IEND");
    png.extend_from_slice(&crc32(b"IEND").to_be_bytes());
    png
}
