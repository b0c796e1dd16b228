use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::AnalysisError;
use crate::ocr::preprocess::preprocess_for_ocr;
use crate::ocr::sanitize::{clean_text, compose_from_lines, compose_from_words, score_candidate};
use crate::ocr::{
    OcrDebug, OcrEngine, OcrRequest, OcrSettings, OcrSource, RawOcrOutput, ReconciledOcr,
};
use crate::raster::Raster;

/// How the winning cleaned text was assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Words,
    Lines,
    Raw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileSettings {
    pub word_min_conf: f32,
    pub word_min_len: usize,
    pub line_min_conf: f32,
    pub line_min_len: usize,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            word_min_conf: 70.0,
            word_min_len: 2,
            line_min_conf: 60.0,
            line_min_len: 3,
        }
    }
}

/// Picks the best cleaned text among the word, line and raw readings of one engine run.
pub fn reconcile(
    raw: RawOcrOutput,
    request: &OcrRequest,
    settings: &ReconcileSettings,
) -> ReconciledOcr {
    let confidence = raw.confidence.round();
    let candidates = [
        (
            compose_from_words(&raw.words, settings.word_min_conf, settings.word_min_len),
            Strategy::Words,
        ),
        (
            compose_from_lines(&raw.lines, settings.line_min_conf, settings.line_min_len),
            Strategy::Lines,
        ),
        (clean_text(&raw.text), Strategy::Raw),
    ];

    let mut best: Option<(f32, String, Strategy)> = None;
    for (text, strategy) in candidates {
        let score = score_candidate(&text, confidence);
        let better = match &best {
            Some((best_score, _, _)) => score > *best_score,
            None => true,
        };
        if better {
            best = Some((score, text, strategy));
        }
    }
    let (_, cleaned_text, strategy) = best.unwrap_or((0.0, String::new(), Strategy::Raw));
    let chars_kept = cleaned_text.chars().filter(|ch| !ch.is_whitespace()).count();

    ReconciledOcr {
        text: raw.text.trim().to_string(),
        cleaned_text,
        confidence,
        words: raw.words,
        lines: raw.lines,
        blocks: raw.blocks,
        timed_out: false,
        debug: Some(OcrDebug {
            used_src: request.source,
            lang: request.languages.clone(),
            psm: request.psm,
            strategy,
            confidence,
            chars_kept,
        }),
    }
}

/// Image handed to the recognizer: the uploaded bytes plus their decoded pixels.
pub struct OcrInput<'a> {
    pub original: Arc<[u8]>,
    pub format: Option<ImageFormat>,
    pub raster: &'a Raster,
}

/// Outcome of the OCR stage. Errors are informational; `result` is always usable.
#[derive(Debug, Default)]
pub struct OcrRun {
    pub result: ReconciledOcr,
    pub errors: Vec<AnalysisError>,
}

/// Drives an [`OcrEngine`] through the preprocessed, original and re-encoded sources.
pub struct OcrRecognizer<'a> {
    engine: &'a dyn OcrEngine,
    settings: &'a OcrSettings,
}

impl<'a> OcrRecognizer<'a> {
    pub fn new(engine: &'a dyn OcrEngine, settings: &'a OcrSettings) -> Self {
        Self { engine, settings }
    }

    pub async fn recognize(&self, input: OcrInput<'_>) -> OcrRun {
        let mut run = OcrRun::default();

        match preprocess_for_ocr(input.raster, &self.settings.preprocess) {
            Ok(image) => {
                let factors = image.factors_to(input.raster.width(), input.raster.height());
                let source = OcrSource::Preprocessed;
                match self.attempt(image.png.into(), source, Some(factors)).await {
                    Ok(result) if !result.cleaned_text.is_empty() => {
                        run.result = result;
                        return run;
                    }
                    Ok(result) => {
                        debug!("preprocessed image produced no usable text");
                        run.result = result;
                    }
                    Err(err @ AnalysisError::EngineTimeout { .. }) => return timed_out(run, err),
                    Err(err) => {
                        warn!(error = %err, "ocr on preprocessed image failed");
                        run.errors.push(err);
                    }
                }
            }
            Err(err) => {
                let err = AnalysisError::engine("ocr preprocess", err);
                warn!(error = %err, "ocr preprocessing failed");
                run.errors.push(err);
            }
        }

        let direct = self.engine.reads_format(input.format);
        if direct {
            match self.attempt(input.original.clone(), OcrSource::Original, None).await {
                Ok(result) => {
                    run.result = result;
                    return run;
                }
                Err(err @ AnalysisError::EngineTimeout { .. }) => return timed_out(run, err),
                Err(err) => {
                    warn!(error = %err, "ocr on original image failed");
                    run.errors.push(err);
                }
            }
            if input.format == Some(ImageFormat::Png) {
                return run;
            }
        }

        let bytes = match input.raster.encode_png() {
            Ok(bytes) => bytes,
            Err(err) => {
                let err = AnalysisError::engine("ocr re-encode", err);
                warn!(error = %err, "could not re-encode image for ocr");
                run.errors.push(err);
                return run;
            }
        };
        match self.attempt(bytes.into(), OcrSource::Reencoded, None).await {
            Ok(result) => run.result = result,
            Err(err @ AnalysisError::EngineTimeout { .. }) => return timed_out(run, err),
            Err(err) => {
                warn!(error = %err, "ocr on re-encoded image failed");
                run.errors.push(err);
            }
        }
        run
    }

    /// One engine run. `to_source` maps boxes back when the engine saw a rescaled copy.
    async fn attempt(
        &self,
        image: Arc<[u8]>,
        source: OcrSource,
        to_source: Option<(f64, f64)>,
    ) -> Result<ReconciledOcr, AnalysisError> {
        let request = OcrRequest {
            image,
            source,
            languages: self.settings.languages.clone(),
            psm: self.settings.psm,
        };
        let limit = Duration::from_millis(self.settings.timeout_ms);
        info!(
            engine = self.engine.name(),
            source = ?source,
            lang = %request.languages,
            psm = request.psm,
            "running ocr"
        );
        let mut raw = match tokio::time::timeout(limit, self.engine.recognize(request.clone())).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => return Err(AnalysisError::engine("ocr", err)),
            Err(_) => {
                return Err(AnalysisError::EngineTimeout {
                    stage: "ocr",
                    elapsed: limit,
                });
            }
        };
        if let Some((fx, fy)) = to_source.filter(|_| !self.engine.reports_source_geometry()) {
            raw.rescale_boxes(fx, fy);
        }
        let result = reconcile(raw, &request, &self.settings.reconcile);
        debug!(
            source = ?source,
            chars = result.cleaned_text.chars().count(),
            confidence = result.confidence,
            "ocr attempt finished"
        );
        Ok(result)
    }
}

fn timed_out(mut run: OcrRun, err: AnalysisError) -> OcrRun {
    warn!(error = %err, "ocr timed out");
    run.result = ReconciledOcr::timed_out();
    run.errors.push(err);
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{BBox, OcrFuture, OcrLine, OcrWord};
    use crate::raster::test_images;
    use anyhow::anyhow;
    use std::sync::Mutex;

    fn request(source: OcrSource) -> OcrRequest {
        OcrRequest {
            image: Arc::from(Vec::new()),
            source,
            languages: "spa+eng".to_string(),
            psm: 6,
        }
    }

    fn word(text: &str, confidence: f32) -> OcrWord {
        OcrWord {
            text: text.to_string(),
            bbox: BBox::new(0, 0, 10, 10),
            confidence: Some(confidence),
        }
    }

    fn readable() -> RawOcrOutput {
        RawOcrOutput {
            text: "Gran oferta de verano\n~~ ##".to_string(),
            confidence: 84.6,
            words: vec![word("Gran", 90.0), word("oferta", 88.0), word("x", 99.0)],
            lines: vec![OcrLine {
                text: Some("Gran oferta de verano".to_string()),
                bbox: BBox::new(0, 0, 100, 10),
                confidence: Some(80.0),
            }],
            blocks: Vec::new(),
        }
    }

    /// Answers each call with the next scripted outcome and remembers the sources it saw.
    struct ScriptedEngine {
        script: Mutex<Vec<Outcome>>,
        seen: Mutex<Vec<OcrSource>>,
        reads_webp: bool,
    }

    enum Outcome {
        Output(RawOcrOutput),
        Fail,
        Hang,
    }

    impl ScriptedEngine {
        fn new(script: Vec<Outcome>) -> Self {
            Self {
                script: Mutex::new(script),
                seen: Mutex::new(Vec::new()),
                reads_webp: false,
            }
        }

        fn seen(&self) -> Vec<OcrSource> {
            self.seen.lock().expect("seen lock").clone()
        }
    }

    impl OcrEngine for ScriptedEngine {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn recognize(&self, request: OcrRequest) -> OcrFuture {
            self.seen.lock().expect("seen lock").push(request.source);
            let next = {
                let mut script = self.script.lock().expect("script lock");
                if script.is_empty() {
                    Outcome::Fail
                } else {
                    script.remove(0)
                }
            };
            Box::pin(async move {
                match next {
                    Outcome::Output(output) => Ok(output),
                    Outcome::Fail => Err(anyhow!("engine exploded")),
                    Outcome::Hang => {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Ok(RawOcrOutput::default())
                    }
                }
            })
        }

        fn reads_format(&self, format: Option<ImageFormat>) -> bool {
            match format {
                Some(ImageFormat::WebP) => self.reads_webp,
                Some(ImageFormat::Png | ImageFormat::Jpeg) => true,
                _ => false,
            }
        }
    }

    fn settings() -> OcrSettings {
        OcrSettings {
            timeout_ms: 50,
            ..OcrSettings::default()
        }
    }

    fn input(raster: &Raster, format: ImageFormat) -> OcrInput<'_> {
        OcrInput {
            original: Arc::from(vec![1u8, 2, 3]),
            format: Some(format),
            raster,
        }
    }

    #[test]
    fn fuller_line_reading_beats_sparse_words() {
        let result = reconcile(
            readable(),
            &request(OcrSource::Original),
            &ReconcileSettings::default(),
        );
        assert_eq!(result.cleaned_text, "Gran oferta de verano");
        let debug = result.debug.expect("debug");
        assert_eq!(debug.strategy, Strategy::Lines);
        assert_eq!(debug.confidence, 85.0);
        assert_eq!(debug.chars_kept, 18);
        assert_eq!(debug.lang, "spa+eng");
        assert_eq!(debug.psm, 6);
        assert_eq!(result.text, "Gran oferta de verano\n~~ ##");
    }

    #[test]
    fn ties_keep_words_before_lines_and_raw() {
        let raw = RawOcrOutput {
            text: "Hola amigo".to_string(),
            confidence: 90.0,
            words: vec![word("Hola", 90.0), word("amigo", 90.0)],
            lines: vec![OcrLine {
                text: Some("Hola amigo".to_string()),
                bbox: BBox::default(),
                confidence: Some(90.0),
            }],
            blocks: Vec::new(),
        };
        let result = reconcile(raw, &request(OcrSource::Original), &ReconcileSettings::default());
        assert_eq!(result.debug.expect("debug").strategy, Strategy::Words);
    }

    #[test]
    fn empty_output_reconciles_to_empty_text() {
        let result = reconcile(
            RawOcrOutput::default(),
            &request(OcrSource::Preprocessed),
            &ReconcileSettings::default(),
        );
        assert_eq!(result.cleaned_text, "");
        assert_eq!(result.confidence, 0.0);
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn preprocessed_result_is_used_when_it_has_text() {
        let raster = test_images::solid(20, 20, [255, 255, 255, 255]);
        let engine = ScriptedEngine::new(vec![Outcome::Output(readable())]);
        let settings = settings();
        let run = OcrRecognizer::new(&engine, &settings)
            .recognize(input(&raster, ImageFormat::Png))
            .await;
        assert_eq!(engine.seen(), vec![OcrSource::Preprocessed]);
        assert_eq!(run.result.cleaned_text, "Gran oferta de verano");
        assert!(run.errors.is_empty());
    }

    #[tokio::test]
    async fn falls_back_to_original_when_preprocessed_is_empty() {
        let raster = test_images::solid(20, 20, [255, 255, 255, 255]);
        let engine = ScriptedEngine::new(vec![
            Outcome::Output(RawOcrOutput::default()),
            Outcome::Output(readable()),
        ]);
        let settings = settings();
        let run = OcrRecognizer::new(&engine, &settings)
            .recognize(input(&raster, ImageFormat::Jpeg))
            .await;
        assert_eq!(engine.seen(), vec![OcrSource::Preprocessed, OcrSource::Original]);
        let debug = run.result.debug.expect("debug");
        assert_eq!(debug.used_src, OcrSource::Original);
    }

    #[tokio::test]
    async fn unreadable_formats_are_reencoded() {
        let raster = test_images::solid(20, 20, [255, 255, 255, 255]);
        let engine = ScriptedEngine::new(vec![Outcome::Fail, Outcome::Output(readable())]);
        let settings = settings();
        let run = OcrRecognizer::new(&engine, &settings)
            .recognize(input(&raster, ImageFormat::WebP))
            .await;
        assert_eq!(engine.seen(), vec![OcrSource::Preprocessed, OcrSource::Reencoded]);
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.result.debug.expect("debug").used_src, OcrSource::Reencoded);
    }

    #[tokio::test]
    async fn failing_engine_yields_empty_result() {
        let raster = test_images::solid(20, 20, [255, 255, 255, 255]);
        let engine = ScriptedEngine::new(Vec::new());
        let settings = settings();
        let run = OcrRecognizer::new(&engine, &settings)
            .recognize(input(&raster, ImageFormat::Png))
            .await;
        assert_eq!(engine.seen(), vec![OcrSource::Preprocessed, OcrSource::Original]);
        assert_eq!(run.result, ReconciledOcr::default());
        assert_eq!(run.errors.len(), 2);
    }

    #[tokio::test]
    async fn timeout_stops_the_chain() {
        let raster = test_images::solid(20, 20, [255, 255, 255, 255]);
        let engine = ScriptedEngine::new(vec![Outcome::Hang, Outcome::Output(readable())]);
        let settings = settings();
        let run = OcrRecognizer::new(&engine, &settings)
            .recognize(input(&raster, ImageFormat::Png))
            .await;
        assert_eq!(engine.seen(), vec![OcrSource::Preprocessed]);
        assert!(run.result.timed_out);
        assert_eq!(run.result.cleaned_text, "");
        assert!(matches!(
            run.errors.as_slice(),
            [AnalysisError::EngineTimeout { stage: "ocr", .. }]
        ));
    }

    /// Reports one word near the right edge of whatever image it is handed.
    struct RightEdgeEngine;

    impl OcrEngine for RightEdgeEngine {
        fn name(&self) -> &'static str {
            "right-edge"
        }

        fn recognize(&self, request: OcrRequest) -> OcrFuture {
            Box::pin(async move {
                let image = image::load_from_memory(&request.image)?;
                let (w, h) = (image.width(), image.height());
                Ok(RawOcrOutput {
                    text: "Oferta".to_string(),
                    confidence: 90.0,
                    words: vec![OcrWord {
                        text: "Oferta".to_string(),
                        bbox: BBox::new(w * 8 / 10, h / 2, w / 10, h / 10),
                        confidence: Some(90.0),
                    }],
                    lines: Vec::new(),
                    blocks: Vec::new(),
                })
            })
        }
    }

    #[tokio::test]
    async fn preprocessed_boxes_are_mapped_back_to_source_pixels() {
        let raster = test_images::solid(500, 250, [255, 255, 255, 255]);
        let settings = OcrSettings {
            timeout_ms: 10_000,
            ..OcrSettings::default()
        };
        let run = OcrRecognizer::new(&RightEdgeEngine, &settings)
            .recognize(input(&raster, ImageFormat::Png))
            .await;
        assert_eq!(run.result.debug.expect("debug").used_src, OcrSource::Preprocessed);
        assert_eq!(run.result.words[0].bbox, BBox::new(400, 125, 50, 25));
    }

    #[tokio::test]
    async fn empty_preprocessed_reading_survives_a_failed_original() {
        let raster = test_images::solid(20, 20, [255, 255, 255, 255]);
        let noise = RawOcrOutput {
            text: "~~ ##".to_string(),
            confidence: 30.0,
            words: vec![word("~~", 30.0)],
            lines: Vec::new(),
            blocks: Vec::new(),
        };
        let engine = ScriptedEngine::new(vec![Outcome::Output(noise), Outcome::Fail]);
        let settings = settings();
        let run = OcrRecognizer::new(&engine, &settings)
            .recognize(input(&raster, ImageFormat::Png))
            .await;
        assert_eq!(engine.seen(), vec![OcrSource::Preprocessed, OcrSource::Original]);
        assert_eq!(run.errors.len(), 1);
        assert_eq!(run.result.text, "~~ ##");
        assert_eq!(run.result.cleaned_text, "");
        assert_eq!(run.result.words[0].bbox, BBox::new(0, 0, 5, 5));
        assert_eq!(run.result.debug.expect("debug").used_src, OcrSource::Preprocessed);
    }

    #[tokio::test]
    async fn recorded_geometry_is_left_untouched() {
        let raster = test_images::solid(20, 20, [255, 255, 255, 255]);
        let engine = crate::ocr::StaticOcrEngine::new(readable());
        let settings = settings();
        let run = OcrRecognizer::new(&engine, &settings)
            .recognize(input(&raster, ImageFormat::Png))
            .await;
        assert_eq!(run.result.debug.expect("debug").used_src, OcrSource::Preprocessed);
        assert_eq!(run.result.words[0].bbox, BBox::new(0, 0, 10, 10));
    }
}
