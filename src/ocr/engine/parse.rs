use std::collections::BTreeMap;

use crate::ocr::{BBox, OcrBlock, OcrLine, OcrWord, RawOcrOutput};

use super::geom::union_bbox;

type LineKey = (i32, i32, i32, i32);
type BlockKey = (i32, i32);

struct Group {
    words: Vec<String>,
    bbox: Option<BBox>,
    conf_sum: f32,
    len_sum: f32,
}

impl Group {
    fn new() -> Self {
        Self {
            words: Vec::new(),
            bbox: None,
            conf_sum: 0.0,
            len_sum: 0.0,
        }
    }

    fn push(&mut self, word: &OcrWord) {
        self.bbox = Some(match self.bbox.take() {
            Some(bbox) => union_bbox(&bbox, &word.bbox),
            None => word.bbox,
        });
        let weight = word.text.chars().count().max(1) as f32;
        self.conf_sum += word.confidence.unwrap_or(0.0) * weight;
        self.len_sum += weight;
        self.words.push(word.text.clone());
    }

    fn confidence(&self) -> f32 {
        if self.len_sum > 0.0 {
            self.conf_sum / self.len_sum
        } else {
            0.0
        }
    }
}

/// Turns `tesseract ... tsv` output into words, lines and blocks.
///
/// Only word rows (level 5) with text and a non-negative confidence are read; lines and
/// blocks are rebuilt from them so their boxes and confidences always agree with the words.
pub(super) fn parse_tsv(tsv: &str) -> RawOcrOutput {
    let mut words = Vec::new();
    let mut lines: BTreeMap<LineKey, Group> = BTreeMap::new();

    for (idx, row) in tsv.lines().enumerate() {
        if idx == 0 {
            continue;
        }
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        let level: i32 = cols[0].parse().unwrap_or(0);
        if level != 5 {
            continue;
        }
        let page_num: i32 = cols[1].parse().unwrap_or(0);
        let block_num: i32 = cols[2].parse().unwrap_or(0);
        let par_num: i32 = cols[3].parse().unwrap_or(0);
        let line_num: i32 = cols[4].parse().unwrap_or(0);
        let left: u32 = cols[6].parse().unwrap_or(0);
        let top: u32 = cols[7].parse().unwrap_or(0);
        let width: u32 = cols[8].parse().unwrap_or(0);
        let height: u32 = cols[9].parse().unwrap_or(0);
        let conf: f32 = cols[10].trim().parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let word = OcrWord {
            text: text.to_string(),
            bbox: BBox::new(left, top, width, height),
            confidence: Some(conf),
        };
        let key = (page_num, block_num, par_num, line_num);
        lines.entry(key).or_insert_with(Group::new).push(&word);
        words.push(word);
    }

    let mut blocks: BTreeMap<BlockKey, (Vec<String>, Group)> = BTreeMap::new();
    let mut out_lines = Vec::new();
    for (key, group) in &lines {
        let Some(bbox) = group.bbox else {
            continue;
        };
        let text = group.words.join(" ");
        let block_key: BlockKey = (key.0, key.1);
        let (block_lines, block_group) = blocks
            .entry(block_key)
            .or_insert_with(|| (Vec::new(), Group::new()));
        block_lines.push(text.clone());
        block_group.bbox = Some(match block_group.bbox.take() {
            Some(current) => union_bbox(&current, &bbox),
            None => bbox,
        });
        block_group.conf_sum += group.conf_sum;
        block_group.len_sum += group.len_sum;
        out_lines.push(OcrLine {
            text: Some(text),
            bbox,
            confidence: Some(group.confidence()),
        });
    }

    let mut out_blocks = Vec::new();
    let mut paragraphs = Vec::new();
    for (block_lines, group) in blocks.into_values() {
        let Some(bbox) = group.bbox else {
            continue;
        };
        let text = block_lines.join("\n");
        paragraphs.push(text.clone());
        out_blocks.push(OcrBlock {
            text: Some(text),
            bbox,
            confidence: Some(group.confidence()),
        });
    }

    let confidence = if words.is_empty() {
        0.0
    } else {
        words
            .iter()
            .map(|word| word.confidence.unwrap_or(0.0))
            .sum::<f32>()
            / words.len() as f32
    };

    RawOcrOutput {
        text: paragraphs.join("\n\n"),
        confidence,
        words,
        lines: out_lines,
        blocks: out_blocks,
    }
}
