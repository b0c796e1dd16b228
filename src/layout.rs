use serde::{Deserialize, Serialize};

use crate::raster::{Raster, is_opaque, luminance};
use crate::ratios::round2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutSettings {
    /// Longer side of the thumbnail the statistics are computed on.
    pub sample_side: u32,
    /// Luminance at or above which a pixel counts as negative space.
    pub bright_threshold: f32,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            sample_side: 160,
            bright_threshold: 240.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutStats {
    pub width: u32,
    pub height: u32,
    pub brightness_avg: f64,
    pub negative_space_pct: f64,
}

pub fn analyze_layout(raster: &Raster, settings: &LayoutSettings) -> LayoutStats {
    let sample = raster.fit_inside(settings.sample_side, settings.sample_side);
    let mut brightness_sum = 0f64;
    let mut bright_pixels = 0u64;
    let mut counted = 0u64;
    for pixel in sample.pixels() {
        if !is_opaque(pixel[3]) {
            continue;
        }
        let y = luminance(pixel[0], pixel[1], pixel[2]);
        brightness_sum += y as f64;
        if y >= settings.bright_threshold {
            bright_pixels += 1;
        }
        counted += 1;
    }

    if counted == 0 {
        return LayoutStats {
            width: raster.width(),
            height: raster.height(),
            ..LayoutStats::default()
        };
    }

    LayoutStats {
        width: raster.width(),
        height: raster.height(),
        brightness_avg: round2(brightness_sum / counted as f64),
        negative_space_pct: round2(bright_pixels as f64 / counted as f64 * 100.0),
    }
}
