use anyhow::{Context, Result};
use clap::Parser;
use cutout::compositor::Compositor;
use cutout::config::{
    EngineConfig, ModelConfig, ModelSource, PipelineConfig, TensorLayout, DEFAULT_THRESHOLD,
    DEFAULT_WORKING_SIZE,
};
use cutout::input::{FileSource, ImageSource};
use cutout::output::{PngRenderer, Renderer};
use cutout::pipeline::{Pipeline, RunOutcome};
use cutout::segmentation;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Selected image (JPEG, PNG or WebP bytes, or base64 text with --base64)
    input: PathBuf,

    /// Where to write the cutout PNG (defaults to <input>_cutout.png)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Segmentation model: path to an ONNX file or an http(s) URL
    #[arg(short, long)]
    model: String,

    /// Input file holds base64 text instead of raw image bytes
    #[arg(long)]
    base64: bool,

    /// Working canvas width
    #[arg(long, default_value_t = DEFAULT_WORKING_SIZE)]
    width: u32,

    /// Working canvas height
    #[arg(long, default_value_t = DEFAULT_WORKING_SIZE)]
    height: u32,

    /// Person probability at which a pixel is kept
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f32,

    /// Model input width
    #[arg(long, default_value_t = 256)]
    model_width: u32,

    /// Model input height
    #[arg(long, default_value_t = 256)]
    model_height: u32,

    /// Model tensor layout
    #[arg(long, value_enum, default_value_t = TensorLayout::Nchw)]
    layout: TensorLayout,

    /// Per-channel mean, subtracted after scaling pixels to [0, 1]
    #[arg(long, value_delimiter = ',', num_args = 3, default_values_t = [0.0, 0.0, 0.0])]
    mean: Vec<f32>,

    /// Per-channel std, divided out after mean subtraction
    #[arg(long, value_delimiter = ',', num_args = 3, default_values_t = [1.0, 1.0, 1.0])]
    std: Vec<f32>,

    /// Give up loading the model after this many seconds
    #[arg(long)]
    load_timeout: Option<u64>,

    /// Give up on inference after this many seconds
    #[arg(long)]
    inference_timeout: Option<u64>,

    /// Write the mask (white = person) instead of the cutout
    #[arg(long)]
    show_mask: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("Cutout starting");
    tracing::info!("Working canvas: {}x{}", args.width, args.height);
    tracing::info!("Threshold: {}", args.threshold);

    let mut source = FileSource::new(&args.input, args.base64);
    let Some(image) = source.next_image()? else {
        tracing::info!("Nothing selected");
        return Ok(());
    };

    let model = ModelConfig {
        input_width: args.model_width,
        input_height: args.model_height,
        layout: args.layout,
        mean: channels(&args.mean, "--mean")?,
        std: channels(&args.std, "--std")?,
        ..ModelConfig::new(ModelSource::parse(&args.model))
    };
    let engine_config = EngineConfig {
        threshold: args.threshold,
        load_timeout: args.load_timeout.map(Duration::from_secs),
        inference_timeout: args.inference_timeout.map(Duration::from_secs),
    };
    let engine = Arc::new(segmentation::create_default_engine(model, engine_config));

    let pipeline = Pipeline::new(
        engine,
        PipelineConfig {
            working_width: args.width,
            working_height: args.height,
        },
    );

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.input, args.show_mask));
    let mut renderer = PngRenderer::new(&output_path, args.width, args.height);

    if args.show_mask {
        let run = pipeline
            .run(&image)
            .await
            .context("Failed to segment image")?;
        let mask = Compositor::mask_to_rgba(&run.mask)?;
        renderer.render(&mask)?;
        return Ok(());
    }

    let renderer = Mutex::new(renderer);
    match pipeline
        .run_and_render(&image, &renderer)
        .await
        .context("Failed to remove background")?
    {
        RunOutcome::Rendered => tracing::info!("Done"),
        RunOutcome::Superseded => tracing::warn!("Selection was superseded, nothing written"),
    }

    Ok(())
}

fn channels(values: &[f32], flag: &str) -> Result<[f32; 3]> {
    values
        .try_into()
        .with_context(|| format!("{} takes exactly 3 values, got {}", flag, values.len()))
}

fn default_output(input: &Path, show_mask: bool) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("out");
    let suffix = if show_mask { "_mask.png" } else { "_cutout.png" };
    input.with_file_name(format!("{}{}", stem, suffix))
}
