//! Fixed-size grayscale face samples.

use crate::types::{BoundingBox, Frame};
use image::imageops::{self, FilterType};
use image::GrayImage;
use std::path::Path;

/// Side length of the square samples used for training and recognition.
pub const SAMPLE_SIZE: u32 = 200;

/// A square 8-bit grayscale face crop.
#[derive(Debug, Clone)]
pub struct FaceSample {
    image: GrayImage,
}

impl FaceSample {
    /// Crop `region` out of `frame` and resize it to `size` x `size`.
    ///
    /// The region is clipped to the frame first; `None` if nothing remains
    /// or the frame buffer is shorter than its declared dimensions.
    pub fn from_region(frame: &Frame, region: &BoundingBox, size: u32) -> Option<Self> {
        let region = region.clamp_to(frame.width, frame.height)?;
        let stride = frame.width as usize;
        if frame.data.len() < stride * frame.height as usize {
            return None;
        }

        let mut pixels = Vec::with_capacity((region.width * region.height) as usize);
        for row in region.y..region.y + region.height {
            let start = row as usize * stride + region.x as usize;
            pixels.extend_from_slice(&frame.data[start..start + region.width as usize]);
        }
        let crop = GrayImage::from_raw(region.width, region.height, pixels)?;
        Some(Self::from_image(crop, size))
    }

    /// Wrap an arbitrary grayscale image, resizing it to `size` x `size`.
    pub fn from_image(image: GrayImage, size: u32) -> Self {
        let image = if image.dimensions() == (size, size) {
            image
        } else {
            imageops::resize(&image, size, size, FilterType::Triangle)
        };
        Self { image }
    }

    /// Decode an image file as grayscale and normalise it to `size` x `size`.
    pub fn load(path: &Path, size: u32) -> Result<Self, image::ImageError> {
        let image = image::open(path)?.to_luma8();
        Ok(Self::from_image(image, size))
    }

    /// Encode the sample to `path`; format follows the extension.
    pub fn save(&self, path: &Path) -> Result<(), image::ImageError> {
        self.image.save(path)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Row-major pixel bytes.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }
}
