use thiserror::Error;

/// Errors produced by the background removal pipeline
#[derive(Error, Debug)]
pub enum CutoutError {
    /// Image bytes are empty, truncated, in an unsupported format, or zero-area
    #[error("Decode error: {0}")]
    Decode(String),

    /// Pixel buffer length disagrees with the declared dimensions
    #[error("Shape error: {0}")]
    Shape(String),

    /// Mask and pixel buffer do not describe the same pixels
    #[error("Alignment error: {0}")]
    Alignment(String),

    /// Model could not be fetched or initialized
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// Inference requested before the model finished loading
    #[error("Segmentation model is not ready (state: {0})")]
    NotReady(String),

    /// Model failed on a structurally valid tensor
    #[error("Inference error: {0}")]
    Inference(String),

    /// Renderer rejected the composite
    #[error("Render error: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, CutoutError>;
