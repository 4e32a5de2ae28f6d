mod engine;
mod onnx;
mod preprocess;
mod tensor;
pub mod types;

pub use engine::{EngineState, ModelHandle, SegmentationEngine};
pub use onnx::{OnnxLoader, OnnxSegmenter};
pub use preprocess::Preprocessor;
pub use tensor::TensorBuilder;
pub use types::{ModelLoader, PixelTensor, ProbabilityMap, SegmentationMask, SegmentationModel};

use crate::config::{EngineConfig, ModelConfig};

/// Create an engine backed by the default ONNX person segmenter
pub fn create_default_engine(model: ModelConfig, config: EngineConfig) -> SegmentationEngine {
    SegmentationEngine::new(OnnxLoader::new(model), config)
}
