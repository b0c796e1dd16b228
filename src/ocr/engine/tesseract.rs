use anyhow::{Context, Result, anyhow};
use std::io::Write;
use std::path::Path;
use tokio::process::Command;

use super::parse::parse_tsv;
use super::{OcrEngine, OcrFuture, OcrRequest};

/// Runs the `tesseract` binary on a temporary copy of the image and reads its TSV output.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: String,
    dpi: u32,
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self {
            binary: "tesseract".to_string(),
            dpi: 300,
        }
    }
}

impl TesseractCli {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }
}

impl OcrEngine for TesseractCli {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn recognize(&self, request: OcrRequest) -> OcrFuture {
        let binary = self.binary.clone();
        let dpi = self.dpi;
        Box::pin(async move {
            let mut tmp = tempfile::Builder::new()
                .prefix("creative-audit-")
                .tempfile()
                .with_context(|| "failed to create temp file for OCR")?;
            tmp.write_all(&request.image)
                .with_context(|| "failed to write temp image for OCR")?;
            tmp.flush()
                .with_context(|| "failed to flush temp image for OCR")?;

            let languages = normalize_ocr_languages(&binary, &request.languages).await?;
            let tsv = run_tesseract_tsv(&binary, tmp.path(), &languages, request.psm, dpi).await?;
            Ok(parse_tsv(&tsv))
        })
    }
}

pub async fn list_tesseract_languages(binary: &str) -> Result<Vec<String>> {
    let output = Command::new(binary)
        .arg("--list-langs")
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("failed to run {} --list-langs", binary))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("{} --list-langs failed: {}", binary, stderr.trim()));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_language_list(&stdout))
}

fn parse_language_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

async fn normalize_ocr_languages(binary: &str, requested: &str) -> Result<String> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("ocr languages is empty"));
    }
    match list_tesseract_languages(binary).await {
        Ok(available) => choose_languages(trimmed, &available),
        Err(err) => {
            tracing::debug!(error = %err, "language list unavailable; passing languages through");
            Ok(trimmed.to_string())
        }
    }
}

/// Keeps the requested languages that are installed, in request order.
fn choose_languages(requested: &str, available: &[String]) -> Result<String> {
    let mut chosen = Vec::new();
    let mut missing = Vec::new();
    for raw in requested.split(['+', ',', ' ']) {
        let lang = raw.trim();
        if lang.is_empty() {
            continue;
        }
        if available.iter().any(|value| value == lang) {
            chosen.push(lang.to_string());
        } else {
            missing.push(lang.to_string());
        }
    }

    if chosen.is_empty() {
        return Err(anyhow!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        ));
    }
    if !missing.is_empty() {
        tracing::warn!(
            missing = %missing.join(", "),
            available = %available.join(", "),
            "ocr language(s) not available"
        );
    }
    Ok(chosen.join("+"))
}

async fn run_tesseract_tsv(
    binary: &str,
    path: &Path,
    languages: &str,
    psm: u32,
    dpi: u32,
) -> Result<String> {
    let output = Command::new(binary)
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(languages)
        .arg("--oem")
        .arg("1")
        .arg("--psm")
        .arg(psm.to_string())
        .arg("--dpi")
        .arg(dpi.to_string())
        .arg("tsv")
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("failed to run {} (is it installed?)", binary))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract failed: {}", stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
