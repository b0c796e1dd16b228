use anyhow::{Context, Result};
use serde::Serialize;

use crate::formats::{FormatPreset, SafeMargins};
use crate::layout::LayoutStats;
use crate::meta::ImageMeta;
use crate::ocr::ReconciledOcr;
use crate::ratios::ColorRatio;
use crate::summary::Summary;
use crate::text_regions::EstimationMode;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub meta: ImageMeta,
    pub colors: Vec<ColorRatio>,
    pub ocr: ReconciledOcr,
    pub layout: LayoutStats,
    pub format: FormatReport,
    pub summary: Option<Summary>,
    /// One line per stage that failed and fell back to its default.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatReport {
    pub preset: Option<FormatPreset>,
    pub valid: bool,
    pub safe_area_ok: bool,
    pub safe_margin_px: SafeMargins,
    pub text_area_pct: f64,
    pub text_area_mode: EstimationMode,
}

impl Default for FormatReport {
    fn default() -> Self {
        Self {
            preset: None,
            valid: false,
            safe_area_ok: true,
            safe_margin_px: SafeMargins::default(),
            text_area_pct: 0.0,
            text_area_mode: EstimationMode::None,
        }
    }
}

impl AnalysisReport {
    pub fn to_json(&self, compact: bool) -> Result<String> {
        let json = if compact {
            serde_json::to_string(self)
        } else {
            serde_json::to_string_pretty(self)
        };
        json.with_context(|| "failed to serialize analysis report")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_has_camel_case_sections() {
        let json = serde_json::to_value(AnalysisReport::default()).expect("json");
        for key in ["meta", "colors", "ocr", "layout", "format", "summary", "warnings"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["format"]["safeAreaOk"], true);
        assert_eq!(json["format"]["textAreaMode"], "none");
        assert_eq!(json["ocr"]["cleanedText"], "");
        assert_eq!(json["ocr"]["timedOut"], false);
        assert!(json["ocr"].get("words").is_none());
    }

    #[test]
    fn compact_json_is_single_line() {
        let report = AnalysisReport::default();
        assert!(!report.to_json(true).expect("json").contains('\n'));
        assert!(report.to_json(false).expect("json").contains('\n'));
    }
}
