const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];
const ICC_MARKER: &[u8; 12] = b"ICC_PROFILE\0";

pub const SRGB: &str = "sRGB IEC61966-2.1";
pub const ADOBE_RGB: &str = "Adobe RGB (1998)";
pub const DISPLAY_P3: &str = "Display P3";
pub const UNIDENTIFIED_JPEG: &str = "embedded ICC (unidentified)";
pub const UNNAMED_PNG: &str = "embedded ICC (PNG)";

/// Names the color profile embedded in a JPEG or PNG, if any.
///
/// Only container metadata is inspected: the JPEG `APP2 ICC_PROFILE` segment, or the PNG
/// `sRGB` / `iCCP` chunks. The profile payload itself is never parsed.
pub fn sniff_color_profile(bytes: &[u8]) -> Option<String> {
    if is_jpeg(bytes) {
        let segment = find_jpeg_icc_segment(bytes)?;
        return Some(
            guess_profile_name(segment)
                .unwrap_or(UNIDENTIFIED_JPEG)
                .to_string(),
        );
    }
    if bytes.starts_with(&PNG_SIGNATURE) {
        if find_png_chunk(bytes, b"sRGB").is_some() {
            return Some(SRGB.to_string());
        }
        let iccp = find_png_chunk(bytes, b"iCCP")?;
        return Some(iccp_profile_name(iccp).unwrap_or_else(|| UNNAMED_PNG.to_string()));
    }
    None
}

fn is_jpeg(bytes: &[u8]) -> bool {
    bytes.len() > 3 && bytes[0] == 0xFF && bytes[1] == 0xD8
}

fn find_jpeg_icc_segment(bytes: &[u8]) -> Option<&[u8]> {
    let mut pos = 2usize;
    while pos + 4 < bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        // start of scan / end of image
        if marker == 0xDA || marker == 0xD9 {
            return None;
        }
        let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        if len < 2 {
            return None;
        }
        let start = pos + 4;
        let end = (start + len - 2).min(bytes.len());
        let segment = &bytes[start..end];
        if marker == 0xE2 && len > 16 && segment.starts_with(ICC_MARKER) {
            return Some(segment);
        }
        pos = start + len - 2;
    }
    None
}

fn guess_profile_name(payload: &[u8]) -> Option<&'static str> {
    let ascii = payload
        .iter()
        .map(|b| if b.is_ascii() { b.to_ascii_lowercase() as char } else { '\u{FFFD}' })
        .collect::<String>();
    let compact = ascii.split_whitespace().collect::<String>();
    if compact.contains("adobergb") {
        Some(ADOBE_RGB)
    } else if ascii.contains("srgb") {
        Some(SRGB)
    } else if compact.contains("displayp3") || ascii.contains("dci-p3") {
        Some(DISPLAY_P3)
    } else {
        None
    }
}

fn find_png_chunk<'a>(bytes: &'a [u8], kind: &[u8; 4]) -> Option<&'a [u8]> {
    let mut pos = PNG_SIGNATURE.len();
    while pos + 8 <= bytes.len() {
        let len = u32::from_be_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
            as usize;
        let chunk_kind = &bytes[pos + 4..pos + 8];
        let start = pos + 8;
        let end = start.saturating_add(len).min(bytes.len());
        if chunk_kind == kind {
            return Some(&bytes[start..end]);
        }
        pos = start.saturating_add(len).saturating_add(4);
    }
    None
}

/// The null-terminated profile name at the start of an `iCCP` chunk.
fn iccp_profile_name(data: &[u8]) -> Option<String> {
    let end = data.iter().position(|b| *b == 0).unwrap_or(data.len());
    let name = String::from_utf8_lossy(&data[..end]).trim().to_string();
    let lower = name.to_ascii_lowercase();
    if lower.contains("adobe") {
        Some(ADOBE_RGB.to_string())
    } else if lower.contains("srgb") {
        Some(SRGB.to_string())
    } else if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
