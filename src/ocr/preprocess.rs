use anyhow::Result;
use image::{DynamicImage, GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::raster::{Raster, box_blur, encode_png, luminance};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessSettings {
    /// Longer side the working copy is scaled towards.
    pub max_side: u32,
    /// Upper bound on the scale factor for small images.
    pub max_upscale: f32,
    pub sharpen_radius: u32,
    pub sharpen_amount: f32,
    /// Radius of the local mean used as the adaptive threshold.
    pub threshold_radius: u32,
    pub threshold_bias: i32,
}

impl Default for PreprocessSettings {
    fn default() -> Self {
        Self {
            max_side: 1600,
            max_upscale: 2.0,
            sharpen_radius: 1,
            sharpen_amount: 0.6,
            threshold_radius: 16,
            threshold_bias: -10,
        }
    }
}

/// Binarized PNG and the size it was rendered at, which differs from the source size.
#[derive(Debug, Clone)]
pub struct PreprocessedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl PreprocessedImage {
    /// Per-axis factors taking this image's pixels back to a `width` x `height` source.
    pub fn factors_to(&self, width: u32, height: u32) -> (f64, f64) {
        (
            width as f64 / self.width.max(1) as f64,
            height as f64 / self.height.max(1) as f64,
        )
    }
}

/// Produces a black-on-white binarized PNG tuned for OCR.
pub fn preprocess_for_ocr(
    raster: &Raster,
    settings: &PreprocessSettings,
) -> Result<PreprocessedImage> {
    let binary = binarize(raster, settings);
    let (width, height) = binary.dimensions();
    let png = encode_png(DynamicImage::ImageLuma8(binary))?;
    Ok(PreprocessedImage { png, width, height })
}

pub(crate) fn binarize(raster: &Raster, settings: &PreprocessSettings) -> GrayImage {
    let longer = raster.width().max(raster.height()).max(1) as f32;
    let scale = settings.max_upscale.min(settings.max_side as f32 / longer);
    let scaled = raster.scaled(scale);
    let (width, height) = scaled.dimensions();

    let mut gray = GrayImage::new(width, height);
    for (x, y, pixel) in scaled.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let r = (r as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        let g = (g as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        let b = (b as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        gray.put_pixel(x, y, Luma([luminance(r, g, b).round() as u8]));
    }

    let blurred = box_blur(&gray, settings.sharpen_radius);
    let mut sharp = GrayImage::new(width, height);
    for ((out, src), soft) in sharp.pixels_mut().zip(gray.pixels()).zip(blurred.pixels()) {
        let g = src[0] as f32;
        let value = g + (g - soft[0] as f32) * settings.sharpen_amount;
        out[0] = value.round().clamp(0.0, 255.0) as u8;
    }

    let mean = box_blur(&sharp, settings.threshold_radius);
    let mut binary = GrayImage::new(width, height);
    for ((out, value), local) in binary.pixels_mut().zip(sharp.pixels()).zip(mean.pixels()) {
        let threshold = (local[0] as i32 + settings.threshold_bias).clamp(0, 255);
        out[0] = if (value[0] as i32) < threshold { 0 } else { 255 };
    }
    binary
}
