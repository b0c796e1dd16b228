use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::time::Duration;

pub mod error;
pub mod formats;
mod icc;
pub mod layout;
pub mod logging;
pub mod meta;
pub mod ocr;
pub mod palette;
pub mod pipeline;
pub mod raster;
pub mod ratios;
pub mod report;
pub mod settings;
pub mod summary;
pub mod text_regions;

pub use error::AnalysisError;
pub use ocr::{OcrEngine, StaticOcrEngine, TesseractCli};
pub use pipeline::{AnalysisRequest, Analyzer};
pub use report::AnalysisReport;
pub use settings::Settings;
pub use summary::{PlaceholderSummary, SummaryService};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub data: Option<String>,
    pub name: Option<String>,
    pub palette_size: Option<usize>,
    pub lang: Option<String>,
    pub ocr_timeout_ms: Option<u64>,
    pub psm: Option<u32>,
    pub ocr_json: Option<String>,
    pub no_ocr: bool,
    pub settings_path: Option<String>,
    pub show_presets: bool,
    pub compact: bool,
}

pub async fn run(config: Config, input: Option<Vec<u8>>) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    if config.show_presets {
        let settings = settings::load_settings(settings_path)?;
        return Ok(format_presets(&settings.presets));
    }

    let bytes = read_image(config.data.as_deref(), input)?;
    let mut settings = settings::load_settings(settings_path)?;
    if let Some(psm) = config.psm {
        settings.ocr.psm = psm;
    }

    let mut request = AnalysisRequest::new(bytes)?;
    let name = config.name.clone().or_else(|| {
        config
            .data
            .as_deref()
            .and_then(|path| Path::new(path).file_name())
            .map(|name| name.to_string_lossy().to_string())
    });
    if let Some(name) = name {
        request = request.with_name(name);
    }
    if let Some(size) = config.palette_size {
        request = request.with_palette_size(size);
    }
    if let Some(lang) = config.lang.as_deref() {
        request = request.with_languages(lang);
    }
    if let Some(timeout) = config.ocr_timeout_ms {
        request = request.with_ocr_timeout(Duration::from_millis(timeout));
    }

    let mut analyzer = Analyzer::new(settings).with_summary(PlaceholderSummary);
    if !config.no_ocr {
        let engine: Box<dyn OcrEngine> = match config.ocr_json.as_deref() {
            Some(path) => Box::new(StaticOcrEngine::from_path(Path::new(path))?),
            None => Box::new(TesseractCli::new()),
        };
        analyzer = analyzer.with_engine(engine);
    }

    let report = analyzer.analyze(request).await;
    report.to_json(config.compact)
}

fn read_image(path: Option<&str>, input: Option<Vec<u8>>) -> Result<Vec<u8>> {
    let bytes = match path {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("failed to read image: {}", path))?,
        None => input.unwrap_or_default(),
    };
    if bytes.is_empty() {
        return Err(anyhow!("no image data (use --data or pipe an image on stdin)"));
    }
    Ok(bytes)
}

fn format_presets(presets: &[formats::FormatPreset]) -> String {
    presets
        .iter()
        .map(|preset| {
            format!(
                "{}\t{}\t{}x{}\tmargin {}%\ttolerance {}px",
                preset.id,
                preset.label,
                preset.width,
                preset.height,
                preset.safe_margin_pct,
                preset.tolerance_px
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
