use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::ocr::{OcrBlock, OcrLine, OcrWord, RawOcrOutput};

use super::geom::RawBBox;
use super::{OcrEngine, OcrFuture, OcrRequest};

#[derive(Debug, Deserialize)]
struct EngineJson {
    #[serde(default)]
    text: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    words: Vec<EngineItem>,
    #[serde(default)]
    lines: Vec<EngineItem>,
    #[serde(default)]
    blocks: Vec<EngineItem>,
}

#[derive(Debug, Deserialize)]
struct EngineItem {
    #[serde(default)]
    text: Option<String>,
    bbox: RawBBox,
    #[serde(default, alias = "conf")]
    confidence: Option<f32>,
}

/// Parses recorded engine output. Boxes may use any of the supported conventions.
pub fn parse_engine_json(json: &str) -> Result<RawOcrOutput> {
    let raw: EngineJson =
        serde_json::from_str(json).with_context(|| "failed to parse OCR engine output")?;
    let words = raw
        .words
        .into_iter()
        .filter_map(|item| {
            let text = item.text?;
            Some(OcrWord {
                text,
                bbox: item.bbox.normalize(),
                confidence: item.confidence,
            })
        })
        .collect();
    let lines = raw
        .lines
        .into_iter()
        .map(|item| OcrLine {
            text: item.text,
            bbox: item.bbox.normalize(),
            confidence: item.confidence,
        })
        .collect();
    let blocks = raw
        .blocks
        .into_iter()
        .map(|item| OcrBlock {
            text: item.text,
            bbox: item.bbox.normalize(),
            confidence: item.confidence,
        })
        .collect();
    Ok(RawOcrOutput {
        text: raw.text,
        confidence: raw.confidence.unwrap_or(0.0),
        words,
        lines,
        blocks,
    })
}

/// Replays a fixed engine output for every request.
#[derive(Debug, Clone)]
pub struct StaticOcrEngine {
    output: RawOcrOutput,
}

impl StaticOcrEngine {
    pub fn new(output: RawOcrOutput) -> Self {
        Self { output }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::new(parse_engine_json(json)?))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read OCR output: {}", path.display()))?;
        Self::from_json(&json)
    }
}

impl OcrEngine for StaticOcrEngine {
    fn name(&self) -> &'static str {
        "static"
    }

    fn recognize(&self, _request: OcrRequest) -> OcrFuture {
        let output = self.output.clone();
        Box::pin(async move { Ok(output) })
    }

    /// Recorded output is measured on the uploaded image.
    fn reports_source_geometry(&self) -> bool {
        true
    }
}
