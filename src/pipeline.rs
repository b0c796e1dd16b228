use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::error::AnalysisError;
use crate::formats::{check_safe_area, validate_format};
use crate::layout::analyze_layout;
use crate::meta::{ImageMeta, extract_meta, size_kb};
use crate::ocr::{OcrEngine, OcrInput, OcrRecognizer, OcrSettings, ReconciledOcr};
use crate::palette::extract_palette;
use crate::ratios::compute_color_ratios;
use crate::raster::{DecodedImage, decode};
use crate::report::{AnalysisReport, FormatReport};
use crate::settings::Settings;
use crate::summary::SummaryService;
use crate::text_regions::estimate_text_area;

/// One image to analyze. Moving it into [`Analyzer::analyze`] consumes it, so a request is
/// never analyzed twice.
#[derive(Debug)]
pub struct AnalysisRequest {
    bytes: Arc<[u8]>,
    name: Option<String>,
    palette_size: Option<usize>,
    languages: Option<String>,
    ocr_timeout: Option<Duration>,
}

impl AnalysisRequest {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, AnalysisError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(AnalysisError::validation("image is empty"));
        }
        Ok(Self {
            bytes: bytes.into(),
            name: None,
            palette_size: None,
            languages: None,
            ocr_timeout: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_palette_size(mut self, size: usize) -> Self {
        self.palette_size = Some(size);
        self
    }

    pub fn with_languages(mut self, languages: impl Into<String>) -> Self {
        self.languages = Some(languages.into());
        self
    }

    pub fn with_ocr_timeout(mut self, timeout: Duration) -> Self {
        self.ocr_timeout = Some(timeout);
        self
    }

    /// Hex md5 of the image bytes.
    pub fn fingerprint(&self) -> String {
        format!("{:x}", md5::compute(&self.bytes))
    }
}

pub struct Analyzer {
    settings: Settings,
    engine: Option<Box<dyn OcrEngine>>,
    summary: Option<Box<dyn SummaryService>>,
}

impl Analyzer {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            engine: None,
            summary: None,
        }
    }

    pub fn with_engine(mut self, engine: impl OcrEngine + 'static) -> Self {
        self.engine = Some(Box::new(engine));
        self
    }

    pub fn with_summary(mut self, summary: impl SummaryService + 'static) -> Self {
        self.summary = Some(Box::new(summary));
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Runs every stage and folds stage failures into `warnings`. Never fails.
    pub async fn analyze(&self, request: AnalysisRequest) -> AnalysisReport {
        let span = info_span!("analyze", id = %request.fingerprint());
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: AnalysisRequest) -> AnalysisReport {
        let mut warnings = Vec::new();
        info!(bytes = request.bytes.len(), name = ?request.name, "analysis started");

        let bytes = request.bytes.clone();
        let decoded = match tokio::task::spawn_blocking(move || decode(&bytes)).await {
            Ok(Ok(decoded)) => decoded,
            Ok(Err(err)) => return undecodable(&request, err),
            Err(err) => {
                return undecodable(&request, AnalysisError::engine("decode", err.into()));
            }
        };
        let raster = &decoded.raster;
        let (width, height) = (raster.width(), raster.height());
        debug!(width, height, color_type = ?decoded.color_type, "image decoded");

        let meta = extract_meta(&request.bytes, request.name.as_deref(), &decoded);

        let palette_size = request.palette_size.unwrap_or(self.settings.palette_size);
        let palette = extract_palette(raster, palette_size);
        let colors = compute_color_ratios(raster, &palette);
        debug!(colors = colors.len(), "palette extracted");

        let layout = analyze_layout(raster, &self.settings.layout);

        let ocr = self.recognize(&request, &decoded, &mut warnings).await;

        let format = self.check_format(width, height, &ocr, &decoded);

        let mut report = AnalysisReport {
            meta,
            colors,
            ocr,
            layout,
            format,
            summary: None,
            warnings: Vec::new(),
        };

        if let Some(service) = &self.summary {
            match service.summarize(&report).await {
                Ok(summary) => report.summary = Some(summary),
                Err(err) => record(&mut warnings, AnalysisError::engine("summary", err)),
            }
        }

        report.warnings = warnings;
        info!(
            warnings = report.warnings.len(),
            text_area_pct = report.format.text_area_pct,
            "analysis finished"
        );
        report
    }

    async fn recognize(
        &self,
        request: &AnalysisRequest,
        decoded: &DecodedImage,
        warnings: &mut Vec<String>,
    ) -> ReconciledOcr {
        let Some(engine) = &self.engine else {
            debug!("no ocr engine configured");
            return ReconciledOcr::default();
        };
        let mut settings: OcrSettings = self.settings.ocr.clone();
        if let Some(languages) = &request.languages {
            settings.languages = languages.clone();
        }
        if let Some(timeout) = request.ocr_timeout {
            settings.timeout_ms = timeout.as_millis().max(1) as u64;
        }

        let input = OcrInput {
            original: request.bytes.clone(),
            format: decoded.format,
            raster: &decoded.raster,
        };
        let run = OcrRecognizer::new(&**engine, &settings)
            .recognize(input)
            .await;
        warnings.extend(run.errors.iter().map(ToString::to_string));
        run.result
    }

    fn check_format(
        &self,
        width: u32,
        height: u32,
        ocr: &ReconciledOcr,
        decoded: &DecodedImage,
    ) -> FormatReport {
        let preset = validate_format(&self.settings.presets, width, height).cloned();
        let margin = preset
            .as_ref()
            .map(|preset| preset.safe_margin_pct)
            .unwrap_or(self.settings.default_safe_margin_pct);
        let safe_area = check_safe_area(width, height, &ocr.text_boxes(), margin);
        let text_area = estimate_text_area(
            width,
            height,
            ocr,
            Some(&decoded.raster),
            &self.settings.text_regions,
        );
        debug!(
            preset = ?preset.as_ref().map(|preset| preset.id.as_str()),
            safe_area_ok = safe_area.safe_area_ok,
            mode = ?text_area.mode,
            "format checked"
        );
        FormatReport {
            valid: preset.is_some(),
            preset,
            safe_area_ok: safe_area.safe_area_ok,
            safe_margin_px: safe_area.margin_px,
            text_area_pct: text_area.text_area_pct,
            text_area_mode: text_area.mode,
        }
    }
}

fn record(warnings: &mut Vec<String>, err: AnalysisError) {
    warn!(error = %err, "stage fell back to its default");
    warnings.push(err.to_string());
}

fn undecodable(request: &AnalysisRequest, err: AnalysisError) -> AnalysisReport {
    let mut warnings = Vec::new();
    record(&mut warnings, err);
    AnalysisReport {
        meta: ImageMeta {
            name: request.name.clone(),
            size_kb: size_kb(request.bytes.len()),
            ..ImageMeta::default()
        },
        warnings,
        ..AnalysisReport::default()
    }
}
