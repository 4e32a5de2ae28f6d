use crate::error::{CutoutError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::RgbaImage;

/// Compressed image bytes as handed over by the picker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Parse base64 text, optionally wrapped in a `data:<mime>;base64,` URL
    ///
    /// Whitespace anywhere in the payload is ignored, so line-wrapped
    /// exports decode the same as single-line ones.
    pub fn from_base64(text: &str) -> Result<Self> {
        let text = text.trim();
        let payload = match text.strip_prefix("data:") {
            Some(rest) => rest
                .split_once(',')
                .map(|(_, data)| data)
                .ok_or_else(|| CutoutError::Decode("data URL has no payload".to_string()))?,
            None => text,
        };

        let cleaned: String = payload
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();

        let bytes = STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|e| CutoutError::Decode(format!("invalid base64: {}", e)))?;

        Ok(Self { bytes })
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Flat row-major RGBA samples, 4 per pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub const CHANNELS: usize = 4;

    /// Wrap raw RGBA samples, checking the length against the dimensions
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * Self::CHANNELS;
        if data.len() != expected {
            return Err(CutoutError::Shape(format!(
                "pixel buffer holds {} samples, {}x{} RGBA needs {}",
                data.len(),
                width,
                height,
                expected
            )));
        }

        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Fully transparent black buffer
    pub fn zeroed(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * Self::CHANNELS],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// The 4 samples of pixel `index` in row-major order
    pub fn pixel(&self, index: usize) -> Option<&[u8]> {
        let start = index.checked_mul(Self::CHANNELS)?;
        self.data.get(start..start + Self::CHANNELS)
    }

    pub fn to_rgba_image(&self) -> Result<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            CutoutError::Shape(format!(
                "cannot view {} samples as a {}x{} RGBA image",
                self.data.len(),
                self.width,
                self.height
            ))
        })
    }

    pub fn from_rgba_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trips_through_text() {
        let image = EncodedImage::from_bytes(vec![0xff, 0xd8, 0xff, 0xe0, 0x00]);
        let text = image.to_base64();
        assert_eq!(EncodedImage::from_base64(&text).unwrap(), image);
    }

    #[test]
    fn base64_accepts_data_url_and_wrapped_lines() {
        let image = EncodedImage::from_base64("data:image/png;base64, AQID\nBAU=\n").unwrap();
        assert_eq!(image.as_bytes(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn invalid_base64_is_a_decode_error() {
        let err = EncodedImage::from_base64("not base64!!").unwrap_err();
        assert!(matches!(err, CutoutError::Decode(_)));
    }

    #[test]
    fn pixel_buffer_rejects_wrong_length() {
        let err = PixelBuffer::new(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(err, CutoutError::Shape(_)));
    }

    #[test]
    fn pixel_indexes_groups_of_four() {
        let buffer = PixelBuffer::new(2, 1, vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(buffer.pixel(1), Some(&[5, 6, 7, 8][..]));
        assert_eq!(buffer.pixel(2), None);
    }
}
