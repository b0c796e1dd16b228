mod engine;
pub mod preprocess;
pub mod reconcile;
pub mod sanitize;

use serde::{Deserialize, Serialize};

pub use engine::{
    OcrEngine, OcrFuture, OcrRequest, OcrSource, StaticOcrEngine, TesseractCli,
    list_tesseract_languages, parse_engine_json,
};
pub use preprocess::{PreprocessSettings, PreprocessedImage, preprocess_for_ocr};
pub use reconcile::{OcrInput, OcrRecognizer, OcrRun, ReconcileSettings, Strategy, reconcile};
pub use sanitize::{clean_text, compose_from_lines, compose_from_words, score_candidate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrSettings {
    /// Tesseract language set, `+`-separated.
    pub languages: String,
    pub psm: u32,
    pub timeout_ms: u64,
    pub preprocess: PreprocessSettings,
    pub reconcile: ReconcileSettings,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            languages: "spa+eng".to_string(),
            psm: 6,
            timeout_ms: 30_000,
            preprocess: PreprocessSettings::default(),
            reconcile: ReconcileSettings::default(),
        }
    }
}

/// Axis-aligned box in source-image pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BBox {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// Maps the box by per-axis factors, rounding the edges rather than the size.
    pub fn rescale(&self, fx: f64, fy: f64) -> BBox {
        let map = |value: u32, factor: f64| {
            (value as f64 * factor).round().clamp(0.0, u32::MAX as f64) as u32
        };
        let (x0, x1) = (map(self.x, fx), map(self.right(), fx));
        let (y0, y1) = (map(self.y, fy), map(self.bottom(), fy));
        BBox::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrWord {
    pub text: String,
    pub bbox: BBox,
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrLine {
    pub text: Option<String>,
    pub bbox: BBox,
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrBlock {
    pub text: Option<String>,
    pub bbox: BBox,
    pub confidence: Option<f32>,
}

/// Engine output after geometry normalization, before any text cleanup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOcrOutput {
    pub text: String,
    pub confidence: f32,
    pub words: Vec<OcrWord>,
    pub lines: Vec<OcrLine>,
    pub blocks: Vec<OcrBlock>,
}

impl RawOcrOutput {
    /// Moves every box from the pixel space the engine saw into another one.
    pub(crate) fn rescale_boxes(&mut self, fx: f64, fy: f64) {
        for word in &mut self.words {
            word.bbox = word.bbox.rescale(fx, fy);
        }
        for line in &mut self.lines {
            line.bbox = line.bbox.rescale(fx, fy);
        }
        for block in &mut self.blocks {
            block.bbox = block.bbox.rescale(fx, fy);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrDebug {
    pub used_src: OcrSource,
    pub lang: String,
    pub psm: u32,
    pub strategy: Strategy,
    pub confidence: f32,
    pub chars_kept: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledOcr {
    pub text: String,
    pub cleaned_text: String,
    pub confidence: f32,
    #[serde(skip)]
    pub words: Vec<OcrWord>,
    #[serde(skip)]
    pub lines: Vec<OcrLine>,
    #[serde(skip)]
    pub blocks: Vec<OcrBlock>,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<OcrDebug>,
}

impl ReconciledOcr {
    pub fn timed_out() -> Self {
        Self {
            timed_out: true,
            ..Self::default()
        }
    }

    /// Boxes of the finest granularity the engine reported: words, then lines, then blocks.
    pub fn text_boxes(&self) -> Vec<BBox> {
        if !self.words.is_empty() {
            return self.words.iter().map(|word| word.bbox).collect();
        }
        if !self.lines.is_empty() {
            return self.lines.iter().map(|line| line.bbox).collect();
        }
        self.blocks.iter().map(|block| block.bbox).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_maps_edges_back_to_source_pixels() {
        let bbox = BBox::new(1280, 148, 160, 88);
        assert_eq!(bbox.rescale(0.5, 0.5), BBox::new(640, 74, 80, 44));
        assert_eq!(BBox::new(3, 3, 3, 3).rescale(1.0 / 1.5, 1.0 / 1.5), BBox::new(2, 2, 2, 2));
    }

    #[test]
    fn rescale_moves_every_granularity() {
        let mut raw = RawOcrOutput {
            words: vec![OcrWord {
                text: "Hola".to_string(),
                bbox: BBox::new(200, 100, 40, 20),
                confidence: None,
            }],
            lines: vec![OcrLine {
                text: None,
                bbox: BBox::new(200, 100, 80, 20),
                confidence: None,
            }],
            blocks: vec![OcrBlock {
                text: None,
                bbox: BBox::new(0, 0, 400, 200),
                confidence: None,
            }],
            ..RawOcrOutput::default()
        };
        raw.rescale_boxes(0.5, 0.25);
        assert_eq!(raw.words[0].bbox, BBox::new(100, 25, 20, 5));
        assert_eq!(raw.lines[0].bbox, BBox::new(100, 25, 40, 5));
        assert_eq!(raw.blocks[0].bbox, BBox::new(0, 0, 200, 50));
    }
}
