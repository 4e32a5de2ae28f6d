//! Test doubles for the segmentation seams.

use crate::segmentation::{ModelLoader, PixelTensor, ProbabilityMap, SegmentationModel};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What the fake loader hands out once it succeeds
#[derive(Debug, Clone, Copy)]
pub enum FakeModel {
    /// Probability is the red sample scaled to [0, 1]
    RedChannel,
    /// Always one value short
    WrongLength,
    /// Every prediction errors
    Broken,
    /// Blocks for the given time, then behaves like `RedChannel`
    Slow(Duration),
}

impl SegmentationModel for FakeModel {
    fn predict(&mut self, tensor: &PixelTensor) -> anyhow::Result<ProbabilityMap> {
        match *self {
            Self::Slow(delay) => {
                std::thread::sleep(delay);
                Self::RedChannel.predict(tensor)
            }
            Self::RedChannel => Ok(tensor
                .samples()
                .step_by(3)
                .map(|red| red as f32 / 255.0)
                .collect()),
            Self::WrongLength => Ok(vec![1.0; tensor.pixel_count().saturating_sub(1)]),
            Self::Broken => anyhow::bail!("weights are corrupt"),
        }
    }

    fn input_size(&self) -> (u32, u32) {
        (8, 8)
    }
}

/// Counts loads; fails the first `fail_first` of them
pub struct FakeLoader {
    pub loads: Arc<AtomicUsize>,
    fail_first: usize,
    delay: Option<Duration>,
    model: FakeModel,
}

impl FakeLoader {
    pub fn new(model: FakeModel) -> Self {
        Self {
            loads: Arc::new(AtomicUsize::new(0)),
            fail_first: 0,
            delay: None,
            model,
        }
    }

    pub fn failing_first(mut self, count: usize) -> Self {
        self.fail_first = count;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ModelLoader for FakeLoader {
    async fn load(&self) -> anyhow::Result<Box<dyn SegmentationModel>> {
        let n = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if n <= self.fail_first {
            anyhow::bail!("model host unreachable (attempt {})", n);
        }
        Ok(Box::new(self.model))
    }

    fn describe(&self) -> String {
        "fake://model".to_string()
    }
}
