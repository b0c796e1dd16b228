use image::{ColorType, ImageFormat};
use serde::Serialize;

use crate::icc::sniff_color_profile;
use crate::raster::DecodedImage;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMeta {
    pub name: Option<String>,
    #[serde(rename = "sizeKB")]
    pub size_kb: f64,
    pub format: Option<String>,
    pub color_profile: Option<String>,
    pub has_alpha: bool,
    pub width: u32,
    pub height: u32,
}

/// File-level facts about the upload: size, container format, color profile, alpha.
///
/// `color_profile` is the embedded ICC name when one is found, else the decoder's color
/// space (`srgb` or `b-w`).
pub fn extract_meta(bytes: &[u8], name: Option<&str>, decoded: &DecodedImage) -> ImageMeta {
    ImageMeta {
        name: name.map(str::to_string),
        size_kb: size_kb(bytes.len()),
        format: detect_format(bytes, decoded.format),
        color_profile: sniff_color_profile(bytes)
            .or_else(|| Some(color_space(decoded.color_type).to_string())),
        has_alpha: decoded.color_type.has_alpha(),
        width: decoded.raster.width(),
        height: decoded.raster.height(),
    }
}

pub(crate) fn size_kb(len: usize) -> f64 {
    (len as f64 / 1024.0 * 10.0).round() / 10.0
}

fn detect_format(bytes: &[u8], decoded: Option<ImageFormat>) -> Option<String> {
    let mime = infer::get(bytes)
        .map(|kind| kind.mime_type())
        .filter(|mime| mime.starts_with("image/"))
        .or_else(|| decoded.map(|format| format.to_mime_type()))?;
    mime.strip_prefix("image/").map(str::to_string)
}

fn color_space(color_type: ColorType) -> &'static str {
    match color_type {
        ColorType::L8 | ColorType::La8 | ColorType::L16 | ColorType::La16 => "b-w",
        _ => "srgb",
    }
}
