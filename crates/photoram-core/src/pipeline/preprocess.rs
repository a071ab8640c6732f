//! Classifier input preprocessing.
//!
//! The classifier expects a square RGB image, normalized per channel as
//! `(pixel/255 - mean) / std`, laid out CHW. Batching into NCHW happens in the
//! inference engine.

use image::DynamicImage;
use ndarray::Array3;

/// Number of color channels (RGB).
pub const CHANNELS: usize = 3;

/// Per-channel normalization applied after resizing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            mean: [0.5; 3],
            std: [0.5; 3],
        }
    }
}

/// Resize to `image_size × image_size`, convert to RGB and normalize.
pub fn preprocess(image: &DynamicImage, image_size: u32, norm: &Normalization) -> Array3<f32> {
    let resized = image.resize_exact(
        image_size,
        image_size,
        image::imageops::FilterType::Lanczos3,
    );
    let rgb = resized.to_rgb8();
    let raw = rgb.as_raw();
    let size = image_size as usize;

    // Interleaved HWC bytes -> planar CHW floats
    Array3::from_shape_fn((CHANNELS, size, size), |(c, y, x)| {
        let val = raw[(y * size + x) * CHANNELS + c];
        (val as f32 / 255.0 - norm.mean[c]) / norm.std[c]
    })
}
