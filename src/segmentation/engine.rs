//! Lazily loaded, process-wide segmentation model.
//!
//! The engine walks `Unloaded -> Loading -> Ready`, or `Loading -> Failed`
//! when the loader errors. Every caller that arrives while a load is in
//! flight awaits that same load; once `Ready`, the cached [`ModelHandle`] is
//! handed out without touching the loader again. A failed attempt is reported
//! to everyone waiting on it, and the next [`SegmentationEngine::load_once`]
//! starts a fresh attempt.

use super::types::{ModelLoader, PixelTensor, ProbabilityMap, SegmentationMask, SegmentationModel};
use crate::config::EngineConfig;
use crate::error::{CutoutError, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Lifecycle of the engine's model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Shared access to a loaded model
///
/// Inference calls through the same handle are serialized.
#[derive(Clone)]
pub struct ModelHandle {
    model: Arc<Mutex<Box<dyn SegmentationModel>>>,
    input_size: (u32, u32),
}

impl ModelHandle {
    fn new(model: Box<dyn SegmentationModel>) -> Self {
        let input_size = model.input_size();
        Self {
            model: Arc::new(Mutex::new(model)),
            input_size,
        }
    }

    /// Model input size as (width, height)
    pub fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    /// Whether both handles refer to the same loaded model
    pub fn same_model(&self, other: &ModelHandle) -> bool {
        Arc::ptr_eq(&self.model, &other.model)
    }

    fn predict(&self, tensor: &PixelTensor) -> anyhow::Result<ProbabilityMap> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| anyhow::anyhow!("model lock poisoned by an earlier inference panic"))?;
        model.predict(tensor)
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("input_size", &self.input_size)
            .finish()
    }
}

type LoadFuture = Shared<BoxFuture<'static, std::result::Result<ModelHandle, String>>>;

enum Slot {
    Unloaded,
    Loading { attempt: u64, load: LoadFuture },
    Ready(ModelHandle),
    Failed,
}

impl Slot {
    fn state(&self) -> EngineState {
        match self {
            Self::Unloaded => EngineState::Unloaded,
            Self::Loading { .. } => EngineState::Loading,
            Self::Ready(_) => EngineState::Ready,
            Self::Failed => EngineState::Failed,
        }
    }
}

struct Inner {
    slot: Slot,
    attempts: u64,
}

/// Owns the segmentation model and turns tensors into masks
pub struct SegmentationEngine {
    loader: Arc<dyn ModelLoader>,
    config: EngineConfig,
    inner: Mutex<Inner>,
}

impl SegmentationEngine {
    pub fn new<L: ModelLoader + 'static>(loader: L, config: EngineConfig) -> Self {
        Self {
            loader: Arc::new(loader),
            config,
            inner: Mutex::new(Inner {
                slot: Slot::Unloaded,
                attempts: 0,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.lock().slot.state()
    }

    /// Number of load attempts started so far
    pub fn load_attempts(&self) -> u64 {
        self.lock().attempts
    }

    /// Load the model if nobody has yet, and return the shared handle
    ///
    /// Concurrent callers share one in-flight load. A failure is returned
    /// to all of them and leaves the engine `Failed`; the next call retries.
    pub async fn load_once(&self) -> Result<ModelHandle> {
        let (attempt, load) = {
            let mut inner = self.lock();
            match &inner.slot {
                Slot::Ready(handle) => return Ok(handle.clone()),
                Slot::Loading { attempt, load } => (*attempt, load.clone()),
                Slot::Unloaded | Slot::Failed => {
                    inner.attempts += 1;
                    let attempt = inner.attempts;
                    let load = self.start_load(attempt);
                    tracing::debug!(attempt, "Engine state -> loading");
                    inner.slot = Slot::Loading {
                        attempt,
                        load: load.clone(),
                    };
                    (attempt, load)
                }
            }
        };

        let outcome = load.await;

        let mut inner = self.lock();
        if matches!(inner.slot, Slot::Loading { attempt: current, .. } if current == attempt) {
            inner.slot = match &outcome {
                Ok(handle) => {
                    tracing::debug!(attempt, "Engine state -> ready");
                    Slot::Ready(handle.clone())
                }
                Err(_) => {
                    tracing::debug!(attempt, "Engine state -> failed");
                    Slot::Failed
                }
            };
        }

        outcome.map_err(CutoutError::ModelLoad)
    }

    fn start_load(&self, attempt: u64) -> LoadFuture {
        let loader = Arc::clone(&self.loader);
        let timeout = self.config.load_timeout;

        async move {
            let source = loader.describe();
            tracing::info!(attempt, "Loading segmentation model from {}", source);

            let loaded = match timeout {
                Some(limit) => match tokio::time::timeout(limit, loader.load()).await {
                    Ok(loaded) => loaded,
                    Err(_) => Err(anyhow::anyhow!("model load timed out after {:?}", limit)),
                },
                None => loader.load().await,
            };

            match loaded {
                Ok(model) => {
                    let handle = ModelHandle::new(model);
                    tracing::info!(
                        "Segmentation model loaded (input {}x{})",
                        handle.input_size.0,
                        handle.input_size.1
                    );
                    Ok(handle)
                }
                Err(e) => {
                    tracing::warn!("Failed to load segmentation model from {}: {:#}", source, e);
                    Err(format!("{}: {:#}", source, e))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Raw person probabilities, one per tensor pixel
    #[tracing::instrument(skip_all, fields(height = tensor.height(), width = tensor.width()))]
    pub async fn segment_probabilities(&self, tensor: PixelTensor) -> Result<ProbabilityMap> {
        let handle = self.ready_handle()?;

        let expected = tensor.pixel_count();
        if expected == 0 {
            return Err(CutoutError::Inference(format!(
                "cannot segment an empty {}x{} tensor",
                tensor.width(),
                tensor.height()
            )));
        }

        // A timed-out inference keeps running on its blocking thread and
        // holds the model lock until it finishes.
        let task = tokio::task::spawn_blocking(move || handle.predict(&tensor));
        let joined = match self.config.inference_timeout {
            Some(limit) => tokio::time::timeout(limit, task).await.map_err(|_| {
                CutoutError::Inference(format!("inference timed out after {:?}", limit))
            })?,
            None => task.await,
        };

        let probabilities = joined
            .map_err(|e| CutoutError::Inference(format!("inference task failed: {}", e)))?
            .map_err(|e| CutoutError::Inference(format!("{:#}", e)))?;

        if probabilities.len() != expected {
            return Err(CutoutError::Inference(format!(
                "model returned {} values for {} pixels",
                probabilities.len(),
                expected
            )));
        }

        Ok(probabilities)
    }

    /// Binary person mask, thresholded at the configured probability
    pub async fn segment_person(&self, tensor: PixelTensor) -> Result<SegmentationMask> {
        let (width, height) = (tensor.width() as u32, tensor.height() as u32);
        let probabilities = self.segment_probabilities(tensor).await?;
        let mask = SegmentationMask::from_probabilities(
            width,
            height,
            &probabilities,
            self.config.threshold,
        )?;

        tracing::debug!(
            "Mask has {}/{} foreground pixels",
            mask.foreground_count(),
            mask.len()
        );

        Ok(mask)
    }

    fn ready_handle(&self) -> Result<ModelHandle> {
        let inner = self.lock();
        match &inner.slot {
            Slot::Ready(handle) => Ok(handle.clone()),
            slot => Err(CutoutError::NotReady(slot.state().to_string())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Slot transitions are single assignments, so a poisoned guard is still consistent
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::TensorBuilder;
    use crate::test_helpers::{FakeLoader, FakeModel};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn tensor(reds: &[u8]) -> PixelTensor {
        let pixels: Vec<u8> = reds.iter().flat_map(|&r| [r, 0, 0, 255]).collect();
        TensorBuilder::build(&pixels, reds.len() as u32, 1).unwrap()
    }

    fn engine(model: FakeModel) -> SegmentationEngine {
        SegmentationEngine::new(FakeLoader::new(model), EngineConfig::default())
    }

    #[tokio::test]
    async fn segment_before_load_is_not_ready() {
        let engine = engine(FakeModel::RedChannel);

        let err = engine.segment_person(tensor(&[255])).await.unwrap_err();
        assert!(matches!(err, CutoutError::NotReady(_)));
        assert_eq!(engine.state(), EngineState::Unloaded);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_loads_share_one_attempt() {
        let loader = FakeLoader::new(FakeModel::RedChannel).with_delay(Duration::from_millis(50));
        let loads = Arc::clone(&loader.loads);
        let engine = SegmentationEngine::new(loader, EngineConfig::default());

        let handles = futures::future::join_all((0..8).map(|_| engine.load_once())).await;

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        let first = handles[0].as_ref().unwrap();
        for handle in &handles {
            assert!(handle.as_ref().unwrap().same_model(first));
        }
        assert_eq!(engine.state(), EngineState::Ready);

        let again = engine.load_once().await.unwrap();
        assert!(again.same_model(first));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn state_is_loading_while_in_flight() {
        let loader = FakeLoader::new(FakeModel::RedChannel).with_delay(Duration::from_secs(1));
        let engine = Arc::new(SegmentationEngine::new(loader, EngineConfig::default()));

        let background = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.load_once().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(engine.state(), EngineState::Loading);

        background.await.unwrap().unwrap();
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn failed_load_does_not_poison_the_engine() {
        let loader = FakeLoader::new(FakeModel::RedChannel).failing_first(1);
        let loads = Arc::clone(&loader.loads);
        let engine = SegmentationEngine::new(loader, EngineConfig::default());

        let err = engine.load_once().await.unwrap_err();
        assert!(matches!(err, CutoutError::ModelLoad(_)));
        assert_eq!(engine.state(), EngineState::Failed);

        let err = engine.segment_person(tensor(&[255])).await.unwrap_err();
        assert!(matches!(err, CutoutError::NotReady(_)));

        engine.load_once().await.unwrap();
        assert_eq!(engine.state(), EngineState::Ready);
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert_eq!(engine.load_attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_share_a_failed_attempt() {
        let loader = FakeLoader::new(FakeModel::RedChannel)
            .failing_first(1)
            .with_delay(Duration::from_millis(20));
        let loads = Arc::clone(&loader.loads);
        let engine = SegmentationEngine::new(loader, EngineConfig::default());

        let (a, b) = tokio::join!(engine.load_once(), engine.load_once());
        assert!(matches!(a, Err(CutoutError::ModelLoad(_))));
        assert!(matches!(b, Err(CutoutError::ModelLoad(_))));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_load_times_out() {
        let loader = FakeLoader::new(FakeModel::RedChannel).with_delay(Duration::from_secs(60));
        let config = EngineConfig {
            load_timeout: Some(Duration::from_secs(5)),
            ..EngineConfig::default()
        };
        let engine = SegmentationEngine::new(loader, config);

        let err = engine.load_once().await.unwrap_err();
        assert!(matches!(err, CutoutError::ModelLoad(msg) if msg.contains("timed out")));
        assert_eq!(engine.state(), EngineState::Failed);
    }

    #[tokio::test]
    async fn mask_has_one_label_per_pixel() {
        let engine = engine(FakeModel::RedChannel);
        engine.load_once().await.unwrap();

        let mask = engine.segment_person(tensor(&[255, 0, 200, 10, 128])).await.unwrap();
        assert_eq!(mask.len(), 5);
        assert_eq!(mask.labels(), &[1, 0, 1, 0, 1]);
    }

    #[tokio::test]
    async fn probabilities_are_exposed_raw() {
        let engine = engine(FakeModel::RedChannel);
        engine.load_once().await.unwrap();

        let probabilities = engine.segment_probabilities(tensor(&[0, 255])).await.unwrap();
        assert_eq!(probabilities, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn threshold_is_configurable() {
        let config = EngineConfig {
            threshold: 0.9,
            ..EngineConfig::default()
        };
        let engine = SegmentationEngine::new(FakeLoader::new(FakeModel::RedChannel), config);
        engine.load_once().await.unwrap();

        let mask = engine.segment_person(tensor(&[255, 200])).await.unwrap();
        assert_eq!(mask.labels(), &[1, 0]);
    }

    #[tokio::test]
    async fn short_model_output_is_an_inference_error() {
        let engine = engine(FakeModel::WrongLength);
        engine.load_once().await.unwrap();

        let err = engine.segment_person(tensor(&[1, 2, 3])).await.unwrap_err();
        assert!(matches!(err, CutoutError::Inference(_)));
    }

    #[tokio::test]
    async fn model_failure_is_an_inference_error() {
        let engine = engine(FakeModel::Broken);
        engine.load_once().await.unwrap();

        let err = engine.segment_person(tensor(&[1])).await.unwrap_err();
        assert!(matches!(err, CutoutError::Inference(msg) if msg.contains("corrupt")));
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn slow_inference_times_out() {
        let config = EngineConfig {
            inference_timeout: Some(Duration::from_millis(50)),
            ..EngineConfig::default()
        };
        let loader = FakeLoader::new(FakeModel::Slow(Duration::from_millis(300)));
        let engine = SegmentationEngine::new(loader, config);
        engine.load_once().await.unwrap();

        let err = engine.segment_person(tensor(&[255])).await.unwrap_err();
        assert!(matches!(err, CutoutError::Inference(msg) if msg.contains("timed out")));
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn empty_tensor_is_rejected() {
        let engine = engine(FakeModel::RedChannel);
        engine.load_once().await.unwrap();

        let empty = TensorBuilder::build(&[], 0, 0).unwrap();
        let err = engine.segment_person(empty).await.unwrap_err();
        assert!(matches!(err, CutoutError::Inference(_)));
    }
}
