//! Person-segmentation background removal.
//!
//! A selected photo is decoded, stretched onto a fixed working canvas,
//! segmented by a pretrained person model, and composited so that only the
//! person's pixels survive; everything else becomes transparent black.
//!
//! ```no_run
//! use cutout::config::{EngineConfig, ModelConfig, ModelSource, PipelineConfig};
//! use cutout::input::EncodedImage;
//! use cutout::pipeline::Pipeline;
//! use cutout::segmentation;
//! use std::sync::Arc;
//!
//! # async fn demo(jpeg_base64: &str) -> cutout::Result<()> {
//! let model = ModelConfig::new(ModelSource::parse("models/selfie.onnx"));
//! let engine = Arc::new(segmentation::create_default_engine(model, EngineConfig::default()));
//! let pipeline = Pipeline::new(engine, PipelineConfig::default());
//!
//! let run = pipeline.run(&EncodedImage::from_base64(jpeg_base64)?).await?;
//! assert_eq!(run.composite.dimensions(), (300, 300));
//! # Ok(())
//! # }
//! ```

pub mod compositor;
pub mod config;
pub mod error;
pub mod input;
pub mod output;
pub mod pipeline;
pub mod segmentation;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use error::{CutoutError, Result};
