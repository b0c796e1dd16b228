use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::ocr::{BBox, ReconciledOcr};
use crate::raster::{Raster, box_blur, luminance};
use crate::ratios::round2;

/// Where a text-area estimate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimationMode {
    Bboxes,
    Lines,
    Blocks,
    Density,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextAreaEstimate {
    pub text_area_pct: f64,
    pub mask_pixels: u64,
    pub total_pixels: u64,
    pub mode: EstimationMode,
}

impl TextAreaEstimate {
    pub fn none() -> Self {
        Self {
            text_area_pct: 0.0,
            mask_pixels: 0,
            total_pixels: 1,
            mode: EstimationMode::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegionSettings {
    /// Width of the working canvas; larger images are scaled down to it.
    pub target_width: u32,
    pub mean_radius: u32,
    /// Minimum `|dx| + |dy|` for a pixel to count as an edge.
    pub edge_threshold: i32,
    /// Minimum distance between a pixel and its local mean.
    pub contrast_min: i32,
    pub blue_hue_min: f32,
    pub blue_hue_max: f32,
    pub blue_saturation_min: f32,
    /// Smallest kept component as a fraction of the canvas area.
    pub min_area_ratio: f64,
    pub min_area_floor: usize,
}

impl Default for TextRegionSettings {
    fn default() -> Self {
        Self {
            target_width: 360,
            mean_radius: 2,
            edge_threshold: 28,
            contrast_min: 18,
            blue_hue_min: 190.0,
            blue_hue_max: 250.0,
            blue_saturation_min: 0.35,
            min_area_ratio: 0.0008,
            min_area_floor: 8,
        }
    }
}

/// Estimates how much of the image is covered by text.
///
/// OCR geometry wins when present (words, then lines, then blocks). Without any boxes the
/// raster is scanned for dense, high-contrast edges instead, ignoring saturated blue
/// backgrounds. With neither, the estimate is empty.
pub fn estimate_text_area(
    width: u32,
    height: u32,
    ocr: &ReconciledOcr,
    raster: Option<&Raster>,
    settings: &TextRegionSettings,
) -> TextAreaEstimate {
    let boxed = [
        (EstimationMode::Bboxes, ocr.words.iter().map(|w| w.bbox).collect::<Vec<_>>()),
        (EstimationMode::Lines, ocr.lines.iter().map(|l| l.bbox).collect()),
        (EstimationMode::Blocks, ocr.blocks.iter().map(|b| b.bbox).collect()),
    ]
    .into_iter()
    .find(|(_, boxes)| !boxes.is_empty());

    if let Some((mode, boxes)) = boxed {
        return estimate_from_boxes(width, height, &boxes, mode, settings);
    }
    match raster {
        Some(raster) => estimate_from_density(raster, settings),
        None => TextAreaEstimate::none(),
    }
}

fn estimate_from_boxes(
    width: u32,
    height: u32,
    boxes: &[BBox],
    mode: EstimationMode,
    settings: &TextRegionSettings,
) -> TextAreaEstimate {
    let scale = (settings.target_width as f64 / width.max(1) as f64).min(1.0);
    let w = ((width as f64 * scale).round() as usize).max(1);
    let h = ((height as f64 * scale).round() as usize).max(1);
    let scaled = |value: u32| (value as f64 * scale).round() as usize;

    let mut mask = vec![false; w * h];
    for bbox in boxes {
        let x0 = scaled(bbox.x).min(w);
        let y0 = scaled(bbox.y).min(h);
        let x1 = x0.saturating_add(scaled(bbox.width).max(1)).min(w);
        let y1 = y0.saturating_add(scaled(bbox.height).max(1)).min(h);
        for y in y0..y1 {
            mask[y * w + x0..y * w + x1].fill(true);
        }
    }
    summarize(&mask, mode)
}

fn estimate_from_density(raster: &Raster, settings: &TextRegionSettings) -> TextAreaEstimate {
    let canvas = raster.scale_to_width(settings.target_width);
    let (width, height) = canvas.dimensions();
    let (w, h) = (width as usize, height as usize);

    let mut gray = GrayImage::new(width, height);
    let mut blue = vec![false; w * h];
    for (x, y, pixel) in canvas.enumerate_pixels() {
        let [r, g, b] = over_white(pixel.0);
        gray.put_pixel(x, y, Luma([luminance(r, g, b).round() as u8]));
        let (hue, saturation) = hue_saturation(r, g, b);
        blue[y as usize * w + x as usize] = saturation > settings.blue_saturation_min
            && hue >= settings.blue_hue_min
            && hue <= settings.blue_hue_max;
    }
    let mean = box_blur(&gray, settings.mean_radius);
    let luma = gray.as_raw();
    let local = mean.as_raw();

    let mut mask = vec![false; w * h];
    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let p = y * w + x;
            let gx = luma[p + 1] as i32 - luma[p - 1] as i32;
            let gy = luma[p + w] as i32 - luma[p - w] as i32;
            if gx.abs() + gy.abs() <= settings.edge_threshold || blue[p] {
                continue;
            }
            mask[p] = (luma[p] as i32 - local[p] as i32).abs() >= settings.contrast_min;
        }
    }

    let closed = erode(&dilate(&mask, w, h), w, h);
    let min_area = settings
        .min_area_floor
        .max(((w * h) as f64 * settings.min_area_ratio).round() as usize);
    let kept = drop_small_components(&closed, w, h, min_area);
    summarize(&kept, EstimationMode::Density)
}

fn summarize(mask: &[bool], mode: EstimationMode) -> TextAreaEstimate {
    let total = mask.len().max(1) as u64;
    let filled = mask.iter().filter(|on| **on).count() as u64;
    TextAreaEstimate {
        text_area_pct: round2(filled as f64 / total as f64 * 100.0),
        mask_pixels: filled,
        total_pixels: total,
        mode,
    }
}

fn over_white([r, g, b, a]: [u8; 4]) -> [u8; 3] {
    let alpha = a as f32 / 255.0;
    let blend = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
    [blend(r), blend(g), blend(b)]
}

/// HSL hue in degrees and saturation in `[0, 1]`.
fn hue_saturation(r: u8, g: u8, b: u8) -> (f32, f32) {
    let (r, g, b) = (r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    if max == min {
        return (0.0, 0.0);
    }
    let d = max - min;
    let l = (max + min) / 2.0;
    let saturation = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };
    let sector = if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    (sector * 60.0, saturation)
}

fn dilate(mask: &[bool], w: usize, h: usize) -> Vec<bool> {
    morph(mask, w, h, |values| values.iter().any(|v| *v == Some(true)))
}

/// Out-of-canvas neighbors count as off, so the border erodes away.
fn erode(mask: &[bool], w: usize, h: usize) -> Vec<bool> {
    morph(mask, w, h, |values| values.iter().all(|v| *v == Some(true)))
}

fn morph(mask: &[bool], w: usize, h: usize, keep: impl Fn(&[Option<bool>; 9]) -> bool) -> Vec<bool> {
    let mut out = vec![false; mask.len()];
    for y in 0..h {
        for x in 0..w {
            let mut window = [None; 9];
            for (idx, (dx, dy)) in (-1i64..=1)
                .flat_map(|dy| (-1i64..=1).map(move |dx| (dx, dy)))
                .enumerate()
            {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if nx >= 0 && ny >= 0 && (nx as usize) < w && (ny as usize) < h {
                    window[idx] = Some(mask[ny as usize * w + nx as usize]);
                }
            }
            out[y * w + x] = keep(&window);
        }
    }
    out
}

fn drop_small_components(mask: &[bool], w: usize, h: usize, min_area: usize) -> Vec<bool> {
    let mut out = vec![false; mask.len()];
    let mut seen = vec![false; mask.len()];
    let mut stack = Vec::new();
    for start in 0..mask.len() {
        if !mask[start] || seen[start] {
            continue;
        }
        seen[start] = true;
        stack.push(start);
        let mut component = vec![start];
        while let Some(current) = stack.pop() {
            let (x, y) = (current % w, current / w);
            let neighbors = [
                (x > 0).then(|| current - 1),
                (x + 1 < w).then(|| current + 1),
                (y > 0).then(|| current - w),
                (y + 1 < h).then(|| current + w),
            ];
            for next in neighbors.into_iter().flatten() {
                if mask[next] && !seen[next] {
                    seen[next] = true;
                    stack.push(next);
                    component.push(next);
                }
            }
        }
        if component.len() >= min_area {
            for idx in component {
                out[idx] = true;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{OcrBlock, OcrLine, OcrWord};
    use crate::raster::test_images;
    use image::{Rgba, RgbaImage};

    fn ocr_with_words(boxes: &[BBox]) -> ReconciledOcr {
        ReconciledOcr {
            words: boxes
                .iter()
                .map(|bbox| OcrWord {
                    text: "texto".to_string(),
                    bbox: *bbox,
                    confidence: Some(90.0),
                })
                .collect(),
            ..ReconciledOcr::default()
        }
    }

    #[test]
    fn word_boxes_fill_the_mask() {
        let ocr = ocr_with_words(&[BBox::new(0, 0, 50, 10)]);
        let estimate = estimate_text_area(100, 100, &ocr, None, &TextRegionSettings::default());
        assert_eq!(estimate.mode, EstimationMode::Bboxes);
        assert_eq!(estimate.mask_pixels, 500);
        assert_eq!(estimate.total_pixels, 10_000);
        assert_eq!(estimate.text_area_pct, 5.0);
    }

    #[test]
    fn overlapping_boxes_count_once_and_clip_to_canvas() {
        let ocr = ocr_with_words(&[
            BBox::new(0, 0, 10, 10),
            BBox::new(5, 5, 10, 10),
            BBox::new(95, 95, 50, 50),
        ]);
        let estimate = estimate_text_area(100, 100, &ocr, None, &TextRegionSettings::default());
        assert_eq!(estimate.mask_pixels, 100 + 100 - 25 + 25);
    }

    #[test]
    fn wide_images_are_measured_on_a_scaled_canvas() {
        let ocr = ocr_with_words(&[BBox::new(0, 0, 720, 100)]);
        let estimate = estimate_text_area(720, 200, &ocr, None, &TextRegionSettings::default());
        assert_eq!(estimate.total_pixels, 360 * 100);
        assert_eq!(estimate.text_area_pct, 50.0);
    }

    #[test]
    fn tiny_boxes_still_cover_one_pixel() {
        let ocr = ocr_with_words(&[BBox::new(10, 10, 0, 0)]);
        let estimate = estimate_text_area(720, 720, &ocr, None, &TextRegionSettings::default());
        assert_eq!(estimate.mask_pixels, 1);
    }

    #[test]
    fn lines_then_blocks_are_used_without_words() {
        let mut ocr = ReconciledOcr {
            blocks: vec![OcrBlock {
                text: None,
                bbox: BBox::new(0, 0, 10, 10),
                confidence: None,
            }],
            ..ReconciledOcr::default()
        };
        let settings = TextRegionSettings::default();
        assert_eq!(
            estimate_text_area(100, 100, &ocr, None, &settings).mode,
            EstimationMode::Blocks
        );
        ocr.lines.push(OcrLine {
            text: None,
            bbox: BBox::new(0, 0, 20, 20),
            confidence: None,
        });
        let estimate = estimate_text_area(100, 100, &ocr, None, &settings);
        assert_eq!(estimate.mode, EstimationMode::Lines);
        assert_eq!(estimate.mask_pixels, 400);
    }

    #[test]
    fn nothing_to_measure_is_mode_none() {
        let estimate = estimate_text_area(
            100,
            100,
            &ReconciledOcr::default(),
            None,
            &TextRegionSettings::default(),
        );
        assert_eq!(estimate, TextAreaEstimate::none());
    }

    #[test]
    fn flat_image_has_no_density_text() {
        let raster = test_images::solid(400, 300, [200, 40, 40, 255]);
        let estimate = estimate_text_area(
            400,
            300,
            &ReconciledOcr::default(),
            Some(&raster),
            &TextRegionSettings::default(),
        );
        assert_eq!(estimate.mode, EstimationMode::Density);
        assert_eq!(estimate.text_area_pct, 0.0);
        assert_eq!(estimate.total_pixels, 360 * 270);
    }

    fn striped(background: [u8; 4], ink: [u8; 4]) -> Raster {
        let mut image = RgbaImage::from_pixel(120, 80, Rgba(background));
        for y in 30..50 {
            for x in 20..100 {
                if (x / 3) % 2 == 0 {
                    image.put_pixel(x, y, Rgba(ink));
                }
            }
        }
        Raster::new(image)
    }

    #[test]
    fn dense_strokes_register_as_text() {
        let raster = striped([255, 255, 255, 255], [0, 0, 0, 255]);
        let estimate = estimate_text_area(
            120,
            80,
            &ReconciledOcr::default(),
            Some(&raster),
            &TextRegionSettings::default(),
        );
        assert_eq!(estimate.mode, EstimationMode::Density);
        assert!(estimate.text_area_pct > 5.0, "{:?}", estimate);
        assert!(estimate.text_area_pct < 40.0, "{:?}", estimate);
    }

    #[test]
    fn saturated_blue_edges_are_ignored() {
        let raster = striped([255, 255, 255, 255], [20, 60, 230, 255]);
        let blue_ink = estimate_text_area(
            120,
            80,
            &ReconciledOcr::default(),
            Some(&raster),
            &TextRegionSettings::default(),
        );
        let raster = striped([255, 255, 255, 255], [0, 0, 0, 255]);
        let black_ink = estimate_text_area(
            120,
            80,
            &ReconciledOcr::default(),
            Some(&raster),
            &TextRegionSettings::default(),
        );
        assert!(blue_ink.mask_pixels < black_ink.mask_pixels);
    }

    #[test]
    fn hue_and_saturation_follow_hsl() {
        let (hue, sat) = hue_saturation(0, 0, 255);
        assert_eq!(hue, 240.0);
        assert_eq!(sat, 1.0);
        assert_eq!(hue_saturation(128, 128, 128), (0.0, 0.0));
        let (hue, _) = hue_saturation(255, 0, 128);
        assert!(hue > 300.0 && hue < 360.0);
    }

    #[test]
    fn small_components_are_dropped() {
        let mut mask = vec![false; 100];
        mask[0] = true;
        mask[1] = true;
        for idx in [55, 56, 57, 65, 66, 67, 75, 76, 77] {
            mask[idx] = true;
        }
        let kept = drop_small_components(&mask, 10, 10, 8);
        assert!(!kept[0] && !kept[1]);
        assert_eq!(kept.iter().filter(|v| **v).count(), 9);
    }
}
