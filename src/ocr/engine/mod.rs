mod geom;
mod ingest;
mod parse;
mod tesseract;

use anyhow::Result;
use image::ImageFormat;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::ocr::RawOcrOutput;

pub use ingest::{StaticOcrEngine, parse_engine_json};
pub use tesseract::{TesseractCli, list_tesseract_languages};

/// Which bytes an OCR attempt was run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrSource {
    Preprocessed,
    Original,
    Reencoded,
}

#[derive(Debug, Clone)]
pub struct OcrRequest {
    pub image: Arc<[u8]>,
    pub source: OcrSource,
    pub languages: String,
    pub psm: u32,
}

pub type OcrFuture = Pin<Box<dyn Future<Output = Result<RawOcrOutput>> + Send>>;

pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn recognize(&self, request: OcrRequest) -> OcrFuture;

    /// Whether the engine can read an encoded image of this format as-is.
    fn reads_format(&self, format: Option<ImageFormat>) -> bool {
        matches!(
            format,
            Some(ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Tiff | ImageFormat::Bmp)
        )
    }

    /// True when reported boxes are already in source pixels, whatever image was sent.
    /// Otherwise boxes are taken to be in the pixel space of `request.image`.
    fn reports_source_geometry(&self) -> bool {
        false
    }
}

impl<E: OcrEngine + ?Sized> OcrEngine for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn recognize(&self, request: OcrRequest) -> OcrFuture {
        (**self).recognize(request)
    }

    fn reads_format(&self, format: Option<ImageFormat>) -> bool {
        (**self).reads_format(format)
    }

    fn reports_source_geometry(&self) -> bool {
        (**self).reports_source_geometry()
    }
}
