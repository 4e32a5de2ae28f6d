//! One end-to-end pass per user selection.
//!
//! decode -> working size -> tensor -> model ready -> segment -> composite
//! -> renderer. Each stage either hands its output forward or aborts the
//! run; nothing reaches the renderer unless every stage succeeded.
//!
//! Overlapping selections resolve as "latest wins": every rendered run takes
//! a ticket when it starts, and a run whose ticket is no longer the newest by
//! the time it has a composite drops it instead of rendering.

use crate::compositor::Compositor;
use crate::config::PipelineConfig;
use crate::error::{CutoutError, Result};
use crate::input::{EncodedImage, ImageDecoder, PixelBuffer};
use crate::output::Renderer;
use crate::segmentation::{SegmentationEngine, SegmentationMask, TensorBuilder};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How a rendered run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Rendered,
    /// A newer selection started before this one finished
    Superseded,
}

/// Wall time spent in each stage of one run
#[derive(Debug, Clone, Copy, Default)]
pub struct StageTimings {
    pub decode: Duration,
    pub normalize: Duration,
    pub tensor: Duration,
    pub load: Duration,
    pub segment: Duration,
    pub composite: Duration,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        self.decode + self.normalize + self.tensor + self.load + self.segment + self.composite
    }

    fn log(&self) {
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;
        tracing::info!(
            "Run: decode={:.1}ms, resize={:.1}ms, tensor={:.1}ms, load={:.1}ms, segment={:.1}ms, composite={:.1}ms, total={:.1}ms",
            ms(self.decode),
            ms(self.normalize),
            ms(self.tensor),
            ms(self.load),
            ms(self.segment),
            ms(self.composite),
            ms(self.total())
        );
    }
}

/// Everything one pass produced
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// Foreground-only RGBA at working resolution
    pub composite: PixelBuffer,
    pub mask: SegmentationMask,
    pub timings: StageTimings,
}

/// Sequences decode, segmentation and compositing for user selections
pub struct Pipeline {
    engine: Arc<SegmentationEngine>,
    config: PipelineConfig,
    latest_ticket: AtomicU64,
}

impl Pipeline {
    pub fn new(engine: Arc<SegmentationEngine>, config: PipelineConfig) -> Self {
        Self {
            engine,
            config,
            latest_ticket: AtomicU64::new(0),
        }
    }

    pub fn engine(&self) -> &SegmentationEngine {
        &self.engine
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage for one selection without rendering
    #[tracing::instrument(skip_all, fields(bytes = image.len()))]
    pub async fn run(&self, image: &EncodedImage) -> Result<PipelineRun> {
        let mut timings = StageTimings::default();

        let start = Instant::now();
        let decoded = ImageDecoder::decode(image.as_bytes())?;
        timings.decode = start.elapsed();

        let start = Instant::now();
        let working = ImageDecoder::normalize(
            &decoded,
            self.config.working_width,
            self.config.working_height,
        )?;
        timings.normalize = start.elapsed();
        drop(decoded);

        let start = Instant::now();
        let tensor = TensorBuilder::from_buffer(&working)?;
        timings.tensor = start.elapsed();

        let start = Instant::now();
        self.engine.load_once().await?;
        timings.load = start.elapsed();

        let start = Instant::now();
        let mask = self.engine.segment_person(tensor).await?;
        timings.segment = start.elapsed();

        let start = Instant::now();
        let composite = Compositor::apply(&working, &mask)?;
        timings.composite = start.elapsed();

        timings.log();

        Ok(PipelineRun {
            composite,
            mask,
            timings,
        })
    }

    /// Run one selection and hand the composite to `renderer`
    ///
    /// The renderer lock is only taken once the composite exists, and the
    /// superseded check happens while holding it.
    pub async fn run_and_render<R: Renderer>(
        &self,
        image: &EncodedImage,
        renderer: &Mutex<R>,
    ) -> Result<RunOutcome> {
        let ticket = self.latest_ticket.fetch_add(1, Ordering::SeqCst) + 1;

        let run = self.run(image).await?;

        let mut renderer = renderer
            .lock()
            .map_err(|_| CutoutError::Render("renderer lock poisoned".to_string()))?;

        // Checked under the lock so an older run cannot paint over a newer one
        if !self.is_latest(ticket) {
            tracing::info!(ticket, "Dropping result of superseded selection");
            return Ok(RunOutcome::Superseded);
        }

        renderer
            .render(&run.composite)
            .map_err(|e| CutoutError::Render(format!("{:#}", e)))?;

        Ok(RunOutcome::Rendered)
    }

    fn is_latest(&self, ticket: u64) -> bool {
        self.latest_ticket.load(Ordering::SeqCst) == ticket
    }
}
