use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{ColorType, DynamicImage, GrayImage, ImageFormat, Luma, RgbaImage};
use std::io::Cursor;

use crate::error::AnalysisError;

/// Decoded RGBA8 pixels of one uploaded image.
#[derive(Debug, Clone)]
pub struct Raster {
    image: RgbaImage,
}

/// A raster together with what the decoder learned about the source file.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub raster: Raster,
    pub color_type: ColorType,
    pub format: Option<ImageFormat>,
}

pub fn decode(bytes: &[u8]) -> Result<DecodedImage, AnalysisError> {
    if bytes.is_empty() {
        return Err(AnalysisError::decode("image is empty"));
    }
    let format = image::guess_format(bytes).ok();
    let image = image::load_from_memory(bytes)?;
    let color_type = image.color();
    let raster = Raster::new(image.to_rgba8());
    if raster.width() == 0 || raster.height() == 0 {
        return Err(AnalysisError::decode("image has zero dimensions"));
    }
    Ok(DecodedImage {
        raster,
        color_type,
        format,
    })
}

impl Raster {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.image
    }

    /// Shrinks the image so it fits inside `max_w` x `max_h`. Never upscales.
    pub fn fit_inside(&self, max_w: u32, max_h: u32) -> RgbaImage {
        let scale_w = max_w as f32 / self.width().max(1) as f32;
        let scale_h = max_h as f32 / self.height().max(1) as f32;
        self.scaled(scale_w.min(scale_h).min(1.0))
    }

    /// Shrinks the image to at most `max_w` pixels wide. Never upscales.
    pub fn scale_to_width(&self, max_w: u32) -> RgbaImage {
        let scale = max_w as f32 / self.width().max(1) as f32;
        self.scaled(scale.min(1.0))
    }

    pub fn scaled(&self, scale: f32) -> RgbaImage {
        let (w, h) = scaled_dimensions(self.width(), self.height(), scale);
        if w == self.width() && h == self.height() {
            return self.image.clone();
        }
        imageops::resize(&self.image, w, h, FilterType::Triangle)
    }

    pub fn encode_png(&self) -> Result<Vec<u8>> {
        encode_png(DynamicImage::ImageRgba8(self.image.clone()))
    }
}

pub(crate) fn scaled_dimensions(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let w = (width as f32 * scale).round().max(1.0) as u32;
    let h = (height as f32 * scale).round().max(1.0) as u32;
    (w, h)
}

pub(crate) fn encode_png(image: DynamicImage) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .with_context(|| "failed to encode png")?;
    Ok(cursor.into_inner())
}

pub(crate) fn luminance(r: u8, g: u8, b: u8) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

pub(crate) fn is_opaque(alpha: u8) -> bool {
    alpha != 0
}

/// Separable mean filter with clamped edges. Matches a `(2r+1)^2` box average.
pub(crate) fn box_blur(src: &GrayImage, radius: u32) -> GrayImage {
    let (width, height) = src.dimensions();
    if width == 0 || height == 0 {
        return src.clone();
    }
    let r = radius as i64;
    let (w, h) = (width as i64, height as i64);
    let data = src.as_raw();

    let mut rows = vec![0u32; data.len()];
    for y in 0..h {
        let row = (y * w) as usize;
        let at = |x: i64| data[row + x.clamp(0, w - 1) as usize] as u32;
        let mut acc: u32 = (-r..=r).map(at).sum();
        rows[row] = acc;
        for x in 1..w {
            acc += at(x + r);
            acc -= at(x - r - 1);
            rows[row + x as usize] = acc;
        }
    }

    let area = ((2 * r + 1) * (2 * r + 1)) as f32;
    let mut out = GrayImage::new(width, height);
    for x in 0..w {
        let at = |y: i64| rows[(y.clamp(0, h - 1) * w + x) as usize];
        let mut acc: u32 = (-r..=r).map(at).sum();
        out.put_pixel(x as u32, 0, Luma([(acc as f32 / area).round() as u8]));
        for y in 1..h {
            acc += at(y + r);
            acc -= at(y - r - 1);
            out.put_pixel(x as u32, y as u32, Luma([(acc as f32 / area).round() as u8]));
        }
    }
    out
}
