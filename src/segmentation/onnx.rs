use super::preprocess::Preprocessor;
use super::types::{ModelLoader, PixelTensor, ProbabilityMap, SegmentationModel};
use crate::config::{ModelConfig, ModelSource, TensorLayout};
use anyhow::{Context, Result};
use async_trait::async_trait;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;

/// Person segmentation backed by an ONNX Runtime session
///
/// The model takes a single RGB image tensor and returns either a one-channel
/// person probability map or a two-channel background/person map.
pub struct OnnxSegmenter {
    session: Session,
    preprocessor: Preprocessor,
    width: u32,
    height: u32,
    layout: TensorLayout,
}

impl OnnxSegmenter {
    /// Create a segmenter from an ONNX file on disk
    pub fn from_file<P: AsRef<Path>>(model_path: P, config: &ModelConfig) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading segmentation model from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        Ok(Self::with_session(session, config))
    }

    /// Create a segmenter from ONNX bytes already in memory
    pub fn from_memory(model_bytes: &[u8], config: &ModelConfig) -> Result<Self> {
        tracing::info!("Loading segmentation model from {} bytes", model_bytes.len());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads)?
            .commit_from_memory(model_bytes)
            .context("Failed to load model from memory")?;

        Ok(Self::with_session(session, config))
    }

    fn with_session(session: Session, config: &ModelConfig) -> Self {
        let preprocessor = Preprocessor::new(config.input_width, config.input_height)
            .with_layout(config.layout)
            .with_normalization(config.mean, config.std);

        tracing::info!(
            "Segmentation model ready: input {}x{} {:?}",
            config.input_width,
            config.input_height,
            config.layout
        );

        Self {
            session,
            preprocessor,
            width: config.input_width,
            height: config.input_height,
            layout: config.layout,
        }
    }
}

impl SegmentationModel for OnnxSegmenter {
    fn predict(&mut self, tensor: &PixelTensor) -> Result<ProbabilityMap> {
        let _span = tracing::debug_span!("onnx_predict").entered();

        let input = self.preprocessor.preprocess(tensor)?;
        let (n, d1, d2, d3) = input.dim();
        let data: Vec<f32> = input.iter().copied().collect();
        let input_tensor =
            Tensor::from_array(([n, d1, d2, d3], data)).context("Failed to build input tensor")?;

        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .context("Failed to run inference")?;
        drop(_infer_span);

        let (output_shape, output_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Model output is not an f32 tensor")?;
        let output_shape: Vec<i64> = output_shape.iter().copied().collect();

        tracing::debug!("Model output shape: {:?}", output_shape);

        let (matte, matte_width, matte_height) =
            Preprocessor::person_probabilities(&output_shape, output_data, self.layout)?;

        Preprocessor::postprocess_matte(
            &matte,
            matte_width,
            matte_height,
            tensor.width() as u32,
            tensor.height() as u32,
        )
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Loads an [`OnnxSegmenter`] from a file or over HTTP
pub struct OnnxLoader {
    config: ModelConfig,
}

impl OnnxLoader {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ModelLoader for OnnxLoader {
    async fn load(&self) -> Result<Box<dyn SegmentationModel>> {
        let config = self.config.clone();

        let model = match &self.config.source {
            ModelSource::File(path) => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || OnnxSegmenter::from_file(path, &config))
                    .await
                    .context("Model initialization task failed")??
            }
            ModelSource::Url(url) => {
                let bytes = fetch_model(url).await?;
                tokio::task::spawn_blocking(move || OnnxSegmenter::from_memory(&bytes, &config))
                    .await
                    .context("Model initialization task failed")??
            }
        };

        Ok(Box::new(model))
    }

    fn describe(&self) -> String {
        self.config.source.to_string()
    }
}

async fn fetch_model(url: &str) -> Result<Vec<u8>> {
    tracing::info!("Fetching segmentation model from {}", url);

    let response = reqwest::get(url)
        .await
        .with_context(|| format!("Failed to fetch model from {}", url))?
        .error_for_status()
        .with_context(|| format!("Model host refused {}", url))?;

    let bytes = response
        .bytes()
        .await
        .with_context(|| format!("Failed to read model body from {}", url))?;

    tracing::info!("Fetched {} bytes of model", bytes.len());

    Ok(bytes.to_vec())
}
