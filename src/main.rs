use std::io::{self, IsTerminal, Read};

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "creative-audit",
    version,
    about = "Analyze an ad creative: palette, layout, OCR, format and safe area"
)]
struct Cli {
    /// Image file to analyze (reads stdin when omitted)
    #[arg(short = 'd', long = "data")]
    data: Option<String>,

    /// Name reported in meta (defaults to the file name of --data)
    #[arg(long = "name")]
    name: Option<String>,

    /// Number of palette colors
    #[arg(long = "palette-size")]
    palette_size: Option<usize>,

    /// OCR languages, tesseract style (e.g. spa+eng)
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// OCR time budget in milliseconds
    #[arg(long = "ocr-timeout-ms")]
    ocr_timeout_ms: Option<u64>,

    /// Tesseract page segmentation mode
    #[arg(long = "psm")]
    psm: Option<u32>,

    /// Use a recorded OCR engine result (JSON) instead of tesseract
    #[arg(long = "ocr-json", conflicts_with = "no_ocr")]
    ocr_json: Option<String>,

    /// Skip OCR entirely
    #[arg(long = "no-ocr")]
    no_ocr: bool,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Show format presets and exit
    #[arg(long = "show-presets")]
    show_presets: bool,

    /// Print the report as single-line JSON
    #[arg(long = "compact")]
    compact: bool,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    creative_audit::logging::init(cli.verbose)?;

    let needs_stdin = cli.data.is_none() && !cli.show_presets;
    let input = if needs_stdin && !io::stdin().is_terminal() {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        Some(buffer)
    } else {
        None
    };

    let output = creative_audit::run(
        creative_audit::Config {
            data: cli.data,
            name: cli.name,
            palette_size: cli.palette_size,
            lang: cli.lang,
            ocr_timeout_ms: cli.ocr_timeout_ms,
            psm: cli.psm,
            ocr_json: cli.ocr_json,
            no_ocr: cli.no_ocr,
            settings_path: cli.read_settings,
            show_presets: cli.show_presets,
            compact: cli.compact,
        },
        input,
    )
    .await?;

    println!("{}", output);
    Ok(())
}
