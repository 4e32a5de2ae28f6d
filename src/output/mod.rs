mod memory;
mod png;

pub use memory::MemoryRenderer;
pub use png::PngRenderer;

use crate::input::PixelBuffer;
use anyhow::Result;

/// Trait for whatever displays the finished composite
pub trait Renderer {
    /// Present a composite at working resolution
    fn render(&mut self, composite: &PixelBuffer) -> Result<()>;
}
