use super::Renderer;
use crate::input::PixelBuffer;
use anyhow::{Context, Result};
use image::imageops;
use std::path::{Path, PathBuf};

/// Writes each composite to a PNG file, keeping transparency
pub struct PngRenderer {
    path: PathBuf,
    width: u32,
    height: u32,
}

impl PngRenderer {
    pub fn new<P: AsRef<Path>>(path: P, width: u32, height: u32) -> Self {
        let path = path.as_ref().to_path_buf();
        tracing::info!("Rendering to {} ({}x{})", path.display(), width, height);

        Self {
            path,
            width,
            height,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Renderer for PngRenderer {
    fn render(&mut self, composite: &PixelBuffer) -> Result<()> {
        let image = composite.to_rgba_image()?;

        // Resize frame if needed
        let image = if image.dimensions() != (self.width, self.height) {
            imageops::resize(
                &image,
                self.width,
                self.height,
                imageops::FilterType::Nearest,
            )
        } else {
            image
        };

        image
            .save_with_format(&self.path, image::ImageFormat::Png)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        tracing::info!("Wrote {}", self.path.display());

        Ok(())
    }
}
