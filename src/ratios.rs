use serde::Serialize;

use crate::palette::Color;
use crate::raster::{Raster, is_opaque};

const SAMPLE_WIDTH: u32 = 200;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorRatio {
    pub hex: Color,
    pub pct: f64,
}

/// Share of the image area held by each palette color, largest first.
///
/// Every opaque pixel of a 200px-wide thumbnail votes for its nearest palette entry
/// (ties go to the earlier entry). Percentages are rounded to two decimals and the
/// whole rounding residual is added to the largest bucket, so the list always sums
/// to exactly 100.00.
pub fn compute_color_ratios(raster: &Raster, palette: &[Color]) -> Vec<ColorRatio> {
    if palette.is_empty() {
        return Vec::new();
    }

    let sample = raster.scale_to_width(SAMPLE_WIDTH);
    let mut counts = vec![0u64; palette.len()];
    let mut total = 0u64;
    for pixel in sample.pixels() {
        if !is_opaque(pixel[3]) {
            continue;
        }
        counts[nearest(palette, pixel[0], pixel[1], pixel[2])] += 1;
        total += 1;
    }

    let mut ratios = palette
        .iter()
        .zip(&counts)
        .map(|(color, count)| ColorRatio {
            hex: *color,
            pct: if total == 0 {
                0.0
            } else {
                round2(*count as f64 / total as f64 * 100.0)
            },
        })
        .collect::<Vec<_>>();
    ratios.sort_by(|a, b| b.pct.total_cmp(&a.pct));

    let sum = ratios.iter().map(|ratio| ratio.pct).sum::<f64>();
    let residual = round2(100.0 - sum);
    if residual.abs() >= 0.005 {
        ratios[0].pct = round2(ratios[0].pct + residual);
    }
    ratios
}

fn nearest(palette: &[Color], r: u8, g: u8, b: u8) -> usize {
    let mut best = 0;
    let mut best_distance = u32::MAX;
    for (idx, color) in palette.iter().enumerate() {
        let distance = color.distance_sq(r, g, b);
        if distance < best_distance {
            best_distance = distance;
            best = idx;
        }
    }
    best
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
