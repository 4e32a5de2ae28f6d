mod decoder;
mod file_source;
mod types;

pub use decoder::ImageDecoder;
pub use file_source::FileSource;
pub use types::{EncodedImage, PixelBuffer};

use anyhow::Result;

/// Trait for whatever hands the pipeline a user-selected image
pub trait ImageSource {
    /// Take the next selection, or `None` when nothing was picked
    fn next_image(&mut self) -> Result<Option<EncodedImage>>;
}
