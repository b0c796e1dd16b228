use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::raster::{Raster, is_opaque};

pub const DEFAULT_PALETTE_SIZE: usize = 5;
/// Upper bound on `k`; larger requests are clamped.
pub const MAX_PALETTE_SIZE: usize = 32;

const SAMPLE_SIDE: u32 = 128;
const KMEANS_ROUNDS: usize = 8;
const FALLBACK_DARKEN_STEP: f32 = 0.12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    pub fn from_hex(value: &str) -> Option<Self> {
        let digits = value.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).ok();
        Some(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    pub(crate) fn distance_sq(&self, r: u8, g: u8, b: u8) -> u32 {
        let dr = self.r as i32 - r as i32;
        let dg = self.g as i32 - g as i32;
        let db = self.b as i32 - b as i32;
        (dr * dr + dg * dg + db * db) as u32
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Color::from_hex(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid hex color: {}", raw)))
    }
}

/// Extracts up to `k` dominant colors with a deterministic k-means.
///
/// Centroids are seeded by striding evenly through the opaque pixels of a 128px
/// thumbnail and refined for a fixed number of rounds, so identical input always
/// yields an identical palette. The palette keeps centroid order, not size order.
/// Images without opaque pixels fall back to [`fallback_palette`].
pub fn extract_palette(raster: &Raster, k: usize) -> Vec<Color> {
    let k = k.clamp(1, MAX_PALETTE_SIZE);
    let sample = raster.fit_inside(SAMPLE_SIDE, SAMPLE_SIDE);
    let points = sample
        .pixels()
        .filter(|pixel| is_opaque(pixel[3]))
        .map(|pixel| [pixel[0] as f32, pixel[1] as f32, pixel[2] as f32])
        .collect::<Vec<_>>();

    if points.is_empty() {
        return fallback_palette(average_color(raster), k);
    }

    let centroids = kmeans(&points, k);
    dedup_colors(centroids.iter().map(|centroid| {
        Color::new(
            to_channel(centroid[0]),
            to_channel(centroid[1]),
            to_channel(centroid[2]),
        )
    }))
}

/// A base color followed by progressively darker variants of it.
pub fn fallback_palette(base: Color, k: usize) -> Vec<Color> {
    dedup_colors((0..k.clamp(1, MAX_PALETTE_SIZE)).map(|step| {
        let factor = (1.0 - step as f32 * FALLBACK_DARKEN_STEP).max(0.0);
        Color::new(
            to_channel(base.r as f32 * factor),
            to_channel(base.g as f32 * factor),
            to_channel(base.b as f32 * factor),
        )
    }))
}

fn kmeans(points: &[[f32; 3]], k: usize) -> Vec<[f32; 3]> {
    let n = points.len();
    let mut centroids = (0..k).map(|i| points[i * n / k]).collect::<Vec<_>>();

    for _ in 0..KMEANS_ROUNDS {
        let mut sums = vec![[0f64; 3]; k];
        let mut counts = vec![0usize; k];
        for point in points {
            let cluster = nearest_centroid(&centroids, point);
            for (sum, value) in sums[cluster].iter_mut().zip(point) {
                *sum += *value as f64;
            }
            counts[cluster] += 1;
        }
        for ((centroid, sum), count) in centroids.iter_mut().zip(&sums).zip(&counts) {
            if *count == 0 {
                continue;
            }
            for (channel, total) in centroid.iter_mut().zip(sum) {
                *channel = (*total / *count as f64) as f32;
            }
        }
    }
    centroids
}

fn nearest_centroid(centroids: &[[f32; 3]], point: &[f32; 3]) -> usize {
    let mut best = 0;
    let mut best_distance = f32::INFINITY;
    for (idx, centroid) in centroids.iter().enumerate() {
        let distance = centroid
            .iter()
            .zip(point)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>();
        if distance < best_distance {
            best_distance = distance;
            best = idx;
        }
    }
    best
}

fn average_color(raster: &Raster) -> Color {
    let pixels = raster.pixels();
    let count = pixels.width() as u64 * pixels.height() as u64;
    if count == 0 {
        return Color::new(0, 0, 0);
    }
    let mut sums = [0u64; 3];
    for pixel in pixels.pixels() {
        sums[0] += pixel[0] as u64;
        sums[1] += pixel[1] as u64;
        sums[2] += pixel[2] as u64;
    }
    Color::new(
        to_channel(sums[0] as f32 / count as f32),
        to_channel(sums[1] as f32 / count as f32),
        to_channel(sums[2] as f32 / count as f32),
    )
}

fn to_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn dedup_colors(colors: impl IntoIterator<Item = Color>) -> Vec<Color> {
    let mut out: Vec<Color> = Vec::new();
    for color in colors {
        if !out.contains(&color) {
            out.push(color);
        }
    }
    out
}
