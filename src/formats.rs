use serde::{Deserialize, Serialize};

use crate::ocr::BBox;

/// Margin used for the safe-area check when the image matches no preset.
pub const DEFAULT_SAFE_MARGIN_PCT: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatPreset {
    pub id: String,
    pub label: String,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_margin_pct")]
    pub safe_margin_pct: f64,
    #[serde(default)]
    pub tolerance_px: u32,
}

fn default_margin_pct() -> f64 {
    DEFAULT_SAFE_MARGIN_PCT
}

impl FormatPreset {
    fn new(id: &str, label: &str, width: u32, height: u32, margin: f64, tolerance: u32) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            width,
            height,
            safe_margin_pct: margin,
            tolerance_px: tolerance,
        }
    }

    pub fn matches(&self, width: u32, height: u32) -> bool {
        self.width.abs_diff(width) <= self.tolerance_px
            && self.height.abs_diff(height) <= self.tolerance_px
    }
}

pub fn builtin_presets() -> Vec<FormatPreset> {
    vec![
        FormatPreset::new("ig-square", "Instagram Square", 1080, 1080, 5.0, 2),
        FormatPreset::new("ig-portrait", "Instagram Portrait", 1080, 1350, 5.0, 2),
        FormatPreset::new("ig-story", "Story 9:16", 1080, 1920, 5.0, 2),
        FormatPreset::new("mpu", "Display 300×250 (MPU)", 300, 250, 4.0, 1),
    ]
}

/// First preset whose size is within its tolerance of `width` x `height`.
pub fn validate_format(presets: &[FormatPreset], width: u32, height: u32) -> Option<&FormatPreset> {
    presets.iter().find(|preset| preset.matches(width, height))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SafeMargins {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeAreaResult {
    pub safe_area_ok: bool,
    pub margin_px: SafeMargins,
}

/// Checks that every box stays inside the inset left by a `margin_pct` margin on each side.
pub fn check_safe_area(width: u32, height: u32, boxes: &[BBox], margin_pct: f64) -> SafeAreaResult {
    let vertical = (height as f64 * margin_pct / 100.0).round() as u32;
    let horizontal = (width as f64 * margin_pct / 100.0).round() as u32;
    let margins = SafeMargins {
        top: vertical,
        right: horizontal,
        bottom: vertical,
        left: horizontal,
    };
    let max_x = width as i64 - margins.right as i64;
    let max_y = height as i64 - margins.bottom as i64;
    let inside = boxes.iter().all(|bbox| {
        bbox.x >= margins.left
            && bbox.y >= margins.top
            && bbox.right() as i64 <= max_x
            && bbox.bottom() as i64 <= max_y
    });
    SafeAreaResult {
        safe_area_ok: inside,
        margin_px: margins,
    }
}
