use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Working canvas the reference renderer draws every selection onto
pub const DEFAULT_WORKING_SIZE: u32 = 300;

/// Probability at or above which a pixel is labelled foreground
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Memory layout of the model's input and output tensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TensorLayout {
    /// [batch, channels, height, width]
    #[default]
    Nchw,
    /// [batch, height, width, channels]
    Nhwc,
}

/// Where the segmentation model is fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    File(PathBuf),
    Url(String),
}

impl ModelSource {
    /// `http://` and `https://` locations are fetched, anything else is a path
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            Self::Url(location.to_string())
        } else {
            Self::File(PathBuf::from(location))
        }
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// ONNX person-segmentation model description
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub source: ModelSource,
    /// Input width the model was exported with
    pub input_width: u32,
    /// Input height the model was exported with
    pub input_height: u32,
    pub layout: TensorLayout,
    /// Per-channel mean subtracted after scaling to [0, 1]
    pub mean: [f32; 3],
    /// Per-channel std divided out after mean subtraction
    pub std: [f32; 3],
    /// ONNX Runtime intra-op threads
    pub intra_threads: usize,
}

impl ModelConfig {
    pub fn new(source: ModelSource) -> Self {
        Self {
            source,
            input_width: 256,
            input_height: 256,
            layout: TensorLayout::Nchw,
            mean: [0.0; 3],
            std: [1.0; 3],
            intra_threads: 4,
        }
    }
}

/// Segmentation engine behaviour
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub threshold: f32,
    /// Give up on a model load after this long (no limit when `None`)
    pub load_timeout: Option<Duration>,
    /// Give up on a single inference after this long (no limit when `None`)
    pub inference_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            load_timeout: None,
            inference_timeout: None,
        }
    }
}

/// End-to-end pipeline settings
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub working_width: u32,
    pub working_height: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            working_width: DEFAULT_WORKING_SIZE,
            working_height: DEFAULT_WORKING_SIZE,
        }
    }
}
