use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::formats::{DEFAULT_SAFE_MARGIN_PCT, FormatPreset, builtin_presets};
use crate::layout::LayoutSettings;
use crate::ocr::{OcrSettings, PreprocessSettings, ReconcileSettings};
use crate::palette::DEFAULT_PALETTE_SIZE;
use crate::text_regions::TextRegionSettings;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub palette_size: usize,
    pub layout: LayoutSettings,
    pub ocr: OcrSettings,
    pub text_regions: TextRegionSettings,
    pub presets: Vec<FormatPreset>,
    pub default_safe_margin_pct: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            palette_size: DEFAULT_PALETTE_SIZE,
            layout: LayoutSettings::default(),
            ocr: OcrSettings::default(),
            text_regions: TextRegionSettings::default(),
            presets: builtin_presets(),
            default_safe_margin_pct: DEFAULT_SAFE_MARGIN_PCT,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    palette: Option<PaletteFile>,
    layout: Option<LayoutFile>,
    ocr: Option<OcrFile>,
    text_regions: Option<TextRegionsFile>,
    format: Option<FormatFile>,
}

#[derive(Debug, Default, Deserialize)]
struct PaletteFile {
    size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LayoutFile {
    sample_side: Option<u32>,
    bright_threshold: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrFile {
    languages: Option<String>,
    psm: Option<u32>,
    timeout_ms: Option<u64>,
    preprocess: Option<PreprocessFile>,
    reconcile: Option<ReconcileFile>,
}

#[derive(Debug, Default, Deserialize)]
struct PreprocessFile {
    max_side: Option<u32>,
    max_upscale: Option<f32>,
    sharpen_radius: Option<u32>,
    sharpen_amount: Option<f32>,
    threshold_radius: Option<u32>,
    threshold_bias: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct ReconcileFile {
    word_min_conf: Option<f32>,
    word_min_len: Option<usize>,
    line_min_conf: Option<f32>,
    line_min_len: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct TextRegionsFile {
    target_width: Option<u32>,
    mean_radius: Option<u32>,
    edge_threshold: Option<i32>,
    contrast_min: Option<i32>,
    blue_hue_min: Option<f32>,
    blue_hue_max: Option<f32>,
    blue_saturation_min: Option<f32>,
    min_area_ratio: Option<f64>,
    min_area_floor: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct FormatFile {
    default_safe_margin_pct: Option<f64>,
    presets: Option<Vec<FormatPreset>>,
}

/// Loads settings from the working directory, the home directory and `extra_path`,
/// later files overriding earlier ones key by key.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    load_settings_from(&ordered_paths)
}

/// Merges the given files over the defaults. Missing files are skipped.
pub fn load_settings_from(paths: &[PathBuf]) -> Result<Settings> {
    let mut settings = Settings::default();
    for path in paths {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
            tracing::debug!(path = %path.display(), "settings merged");
        }
    }
    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(palette) = incoming.palette {
            if let Some(size) = palette.size {
                if size > 0 {
                    self.palette_size = size;
                }
            }
        }
        if let Some(layout) = incoming.layout {
            merge_layout(&mut self.layout, layout);
        }
        if let Some(ocr) = incoming.ocr {
            if let Some(languages) = ocr.languages {
                if !languages.trim().is_empty() {
                    self.ocr.languages = languages.trim().to_string();
                }
            }
            if let Some(psm) = ocr.psm {
                self.ocr.psm = psm;
            }
            if let Some(timeout) = ocr.timeout_ms {
                if timeout > 0 {
                    self.ocr.timeout_ms = timeout;
                }
            }
            if let Some(preprocess) = ocr.preprocess {
                merge_preprocess(&mut self.ocr.preprocess, preprocess);
            }
            if let Some(reconcile) = ocr.reconcile {
                merge_reconcile(&mut self.ocr.reconcile, reconcile);
            }
        }
        if let Some(regions) = incoming.text_regions {
            merge_text_regions(&mut self.text_regions, regions);
        }
        if let Some(format) = incoming.format {
            if let Some(margin) = format.default_safe_margin_pct {
                if (0.0..50.0).contains(&margin) {
                    self.default_safe_margin_pct = margin;
                }
            }
            for preset in format.presets.unwrap_or_default() {
                match self.presets.iter_mut().find(|known| known.id == preset.id) {
                    Some(known) => *known = preset,
                    None => self.presets.push(preset),
                }
            }
        }
    }
}

fn merge_layout(target: &mut LayoutSettings, incoming: LayoutFile) {
    if let Some(side) = incoming.sample_side {
        if side > 0 {
            target.sample_side = side;
        }
    }
    if let Some(threshold) = incoming.bright_threshold {
        target.bright_threshold = threshold;
    }
}

fn merge_preprocess(target: &mut PreprocessSettings, incoming: PreprocessFile) {
    if let Some(value) = incoming.max_side {
        if value > 0 {
            target.max_side = value;
        }
    }
    if let Some(value) = incoming.max_upscale {
        if value > 0.0 {
            target.max_upscale = value;
        }
    }
    if let Some(value) = incoming.sharpen_radius {
        target.sharpen_radius = value;
    }
    if let Some(value) = incoming.sharpen_amount {
        target.sharpen_amount = value;
    }
    if let Some(value) = incoming.threshold_radius {
        target.threshold_radius = value;
    }
    if let Some(value) = incoming.threshold_bias {
        target.threshold_bias = value;
    }
}

fn merge_reconcile(target: &mut ReconcileSettings, incoming: ReconcileFile) {
    if let Some(value) = incoming.word_min_conf {
        target.word_min_conf = value;
    }
    if let Some(value) = incoming.word_min_len {
        target.word_min_len = value;
    }
    if let Some(value) = incoming.line_min_conf {
        target.line_min_conf = value;
    }
    if let Some(value) = incoming.line_min_len {
        target.line_min_len = value;
    }
}

fn merge_text_regions(target: &mut TextRegionSettings, incoming: TextRegionsFile) {
    if let Some(value) = incoming.target_width {
        if value > 0 {
            target.target_width = value;
        }
    }
    if let Some(value) = incoming.mean_radius {
        target.mean_radius = value;
    }
    if let Some(value) = incoming.edge_threshold {
        target.edge_threshold = value;
    }
    if let Some(value) = incoming.contrast_min {
        target.contrast_min = value;
    }
    if let Some(value) = incoming.blue_hue_min {
        target.blue_hue_min = value;
    }
    if let Some(value) = incoming.blue_hue_max {
        target.blue_hue_max = value;
    }
    if let Some(value) = incoming.blue_saturation_min {
        target.blue_saturation_min = value;
    }
    if let Some(value) = incoming.min_area_ratio {
        target.min_area_ratio = value;
    }
    if let Some(value) = incoming.min_area_floor {
        target.min_area_floor = value;
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".creative-audit"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_settings(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).expect("create settings");
        file.write_all(content.as_bytes()).expect("write settings");
        path
    }

    #[test]
    fn embedded_defaults_match_code_defaults() {
        let parsed: SettingsFile = toml::from_str(DEFAULT_SETTINGS_TOML).expect("default toml");
        let mut settings = Settings::default();
        settings.merge(parsed);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn later_files_override_earlier_ones_key_by_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = write_settings(
            &dir,
            "settings.toml",
            "[ocr]\nlanguages = \"eng\"\ntimeout_ms = 5000\n[ocr.preprocess]\nthreshold_bias = -4\n",
        );
        let local = write_settings(
            &dir,
            "settings.local.toml",
            "[ocr]\ntimeout_ms = 1000\n[palette]\nsize = 8\n",
        );
        let settings = load_settings_from(&[base, local]).expect("settings");
        assert_eq!(settings.ocr.languages, "eng");
        assert_eq!(settings.ocr.timeout_ms, 1000);
        assert_eq!(settings.ocr.preprocess.threshold_bias, -4);
        assert_eq!(settings.ocr.preprocess.threshold_radius, 16);
        assert_eq!(settings.palette_size, 8);
    }

    #[test]
    fn presets_extend_or_replace_the_builtin_table() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_settings(
            &dir,
            "settings.toml",
            r#"
[[format.presets]]
id = "li-banner"
label = "LinkedIn Banner"
width = 1584
height = 396
tolerancePx = 2

[[format.presets]]
id = "mpu"
label = "MPU"
width = 300
height = 250
safeMarginPct = 6.0
tolerancePx = 0
"#,
        );
        let settings = load_settings_from(&[path]).expect("settings");
        assert_eq!(settings.presets.len(), 5);
        let banner = settings.presets.last().expect("banner");
        assert_eq!(banner.id, "li-banner");
        assert_eq!(banner.safe_margin_pct, 5.0);
        let mpu = settings
            .presets
            .iter()
            .find(|preset| preset.id == "mpu")
            .expect("mpu");
        assert_eq!(mpu.safe_margin_pct, 6.0);
        assert_eq!(mpu.tolerance_px, 0);
    }

    #[test]
    fn missing_files_are_skipped_and_bad_files_fail() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.toml");
        assert_eq!(
            load_settings_from(&[missing]).expect("settings"),
            Settings::default()
        );

        let broken = write_settings(&dir, "broken.toml", "[ocr\npsm = ");
        let err = load_settings_from(&[broken]).expect_err("parse error");
        assert!(err.to_string().contains("failed to parse settings"));
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_settings(
            &dir,
            "settings.toml",
            "[palette]\nsize = 0\n[ocr]\nlanguages = \"  \"\ntimeout_ms = 0\n",
        );
        let settings = load_settings_from(&[path]).expect("settings");
        assert_eq!(settings.palette_size, DEFAULT_PALETTE_SIZE);
        assert_eq!(settings.ocr.languages, "spa+eng");
        assert_eq!(settings.ocr.timeout_ms, 30_000);
    }
}
