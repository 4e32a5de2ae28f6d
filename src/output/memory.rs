use super::Renderer;
use crate::input::PixelBuffer;
use anyhow::{ensure, Result};

/// Keeps every rendered composite in memory, for embedding shells and tests
#[derive(Debug, Default)]
pub struct MemoryRenderer {
    width: u32,
    height: u32,
    frames: Vec<PixelBuffer>,
}

impl MemoryRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frames: Vec::new(),
        }
    }

    pub fn frames(&self) -> &[PixelBuffer] {
        &self.frames
    }

    pub fn last(&self) -> Option<&PixelBuffer> {
        self.frames.last()
    }
}

impl Renderer for MemoryRenderer {
    fn render(&mut self, composite: &PixelBuffer) -> Result<()> {
        ensure!(
            composite.dimensions() == (self.width, self.height),
            "composite is {}x{}, canvas is {}x{}",
            composite.width(),
            composite.height(),
            self.width,
            self.height
        );
        self.frames.push(composite.clone());
        Ok(())
    }
}
