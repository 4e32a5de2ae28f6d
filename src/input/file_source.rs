use super::types::EncodedImage;
use super::ImageSource;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Single selection read from a file, either raw bytes or base64 text
pub struct FileSource {
    path: PathBuf,
    base64: bool,
    taken: bool,
}

impl FileSource {
    pub fn new<P: AsRef<Path>>(path: P, base64: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            base64,
            taken: false,
        }
    }
}

impl ImageSource for FileSource {
    fn next_image(&mut self) -> Result<Option<EncodedImage>> {
        if self.taken {
            return Ok(None);
        }
        self.taken = true;

        tracing::info!("Reading selection from {}", self.path.display());

        let image = if self.base64 {
            let text = std::fs::read_to_string(&self.path)
                .with_context(|| format!("Failed to read {}", self.path.display()))?;
            EncodedImage::from_base64(&text)
                .with_context(|| format!("Failed to parse base64 in {}", self.path.display()))?
        } else {
            let bytes = std::fs::read(&self.path)
                .with_context(|| format!("Failed to read {}", self.path.display()))?;
            EncodedImage::from_bytes(bytes)
        };

        Ok(Some(image))
    }
}
