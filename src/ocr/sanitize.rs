use unicode_normalization::UnicodeNormalization;

use crate::ocr::{OcrLine, OcrWord};

const MIN_LINE_CHARS: usize = 4;
const MAX_NOISE_RATIO: f32 = 0.25;

/// Cleans OCR text down to lines that read like natural language.
///
/// Lines keep their breaks; a line is folded into the previous one only when the previous
/// line has no closing punctuation and the next starts in lower case.
pub fn clean_text(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let normalized = replace_glyphs(&raw.nfc().collect::<String>());
    let lines = normalized
        .split('\n')
        .map(collapse_spaces)
        .filter(|line| is_natural_line(line))
        .collect::<Vec<_>>();

    let mut merged: Vec<String> = Vec::new();
    for line in lines {
        match merged.last_mut() {
            Some(prev) if !ends_sentence(prev) && starts_lowercase(&line) => {
                prev.push(' ');
                prev.push_str(&line);
            }
            _ => merged.push(line),
        }
    }

    let repaired = repair_hyphenation(&merged.join("\n"));
    repaired
        .split('\n')
        .map(collapse_spaces)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Words above the confidence floor joined with spaces, then cleaned.
pub fn compose_from_words(words: &[OcrWord], min_conf: f32, min_len: usize) -> String {
    let kept = words
        .iter()
        .filter(|word| {
            word.text.chars().count() >= min_len && word.confidence.unwrap_or(0.0) >= min_conf
        })
        .map(|word| word.text.as_str())
        .collect::<Vec<_>>();
    if kept.is_empty() {
        return String::new();
    }
    clean_text(&kept.join(" "))
}

/// Lines above the confidence floor joined with newlines, then cleaned.
pub fn compose_from_lines(lines: &[OcrLine], min_conf: f32, min_len: usize) -> String {
    let kept = lines
        .iter()
        .filter(|line| line.confidence.unwrap_or(0.0) >= min_conf)
        .filter_map(|line| line.text.as_deref().map(str::trim))
        .filter(|text| text.chars().count() >= min_len)
        .collect::<Vec<_>>();
    if kept.is_empty() {
        return String::new();
    }
    clean_text(&kept.join("\n"))
}

/// Rewards confidence and length, penalizes symbol-heavy text.
pub fn score_candidate(text: &str, confidence: f32) -> f32 {
    let dense = text.chars().filter(|ch| !ch.is_whitespace());
    let (mut len, mut symbols) = (0usize, 0usize);
    for ch in dense {
        len += 1;
        if !ch.is_alphanumeric() {
            symbols += 1;
        }
    }
    let symbol_ratio = if len == 0 {
        1.0
    } else {
        symbols as f32 / len as f32
    };
    confidence * 2.0 + len.saturating_sub(5) as f32 * 2.0 - symbol_ratio * 50.0
}

fn replace_glyphs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_rule = false;
    for ch in text.chars() {
        if is_rule_char(ch) {
            if !in_rule {
                out.push(' ');
            }
            in_rule = true;
            continue;
        }
        in_rule = false;
        match ch {
            '\u{201C}' | '\u{201D}' | '\u{201E}' => out.push('"'),
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => out.push('\''),
            '•' | '·' | '●' | '○' | '◉' | '◦' => out.push(' '),
            '\r' => out.push(' '),
            _ => out.push(ch),
        }
    }
    out
}

fn is_rule_char(ch: char) -> bool {
    matches!(ch, '¯' | '_' | '—' | '–' | '−' | '‒' | '―' | '=')
}

fn collapse_spaces(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_natural_line(line: &str) -> bool {
    let len = line.chars().count();
    if len < MIN_LINE_CHARS {
        return false;
    }
    if !line.chars().any(is_vowel) {
        return false;
    }
    let noise = line.chars().filter(|ch| is_noise(*ch)).count();
    if noise as f32 / len as f32 > MAX_NOISE_RATIO {
        return false;
    }
    let shouting = line
        .chars()
        .all(|ch| ch.is_ascii_uppercase() || ch.is_whitespace());
    if shouting && !has_capitalized_word(line) {
        return false;
    }
    true
}

fn is_vowel(ch: char) -> bool {
    matches!(
        ch.to_lowercase().next().unwrap_or(ch),
        'a' | 'e' | 'i' | 'o' | 'u' | 'á' | 'é' | 'í' | 'ó' | 'ú' | 'ü'
    )
}

fn is_noise(ch: char) -> bool {
    if ch.is_alphanumeric() || ch.is_whitespace() {
        return false;
    }
    !matches!(
        ch,
        '.' | ','
            | ':'
            | ';'
            | '!'
            | '?'
            | '¡'
            | '¿'
            | '('
            | ')'
            | '\''
            | '"'
            | '%'
            | '°'
            | '$'
            | '€'
            | '#'
            | '/'
            | '@'
            | '&'
            | '-'
            | '–'
            | '—'
    )
}

/// An upper-case letter followed by a lower-case one at the start of a word.
fn has_capitalized_word(line: &str) -> bool {
    let chars = line.chars().collect::<Vec<_>>();
    chars.windows(2).enumerate().any(|(idx, pair)| {
        let at_word_start = idx == 0 || !is_word_char(chars[idx - 1]);
        at_word_start && pair[0].is_ascii_uppercase() && pair[1].is_ascii_lowercase()
    })
}

fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

fn ends_sentence(line: &str) -> bool {
    matches!(line.chars().last(), Some('.' | '!' | '?' | '…' | ':'))
}

fn starts_lowercase(line: &str) -> bool {
    line.chars().next().is_some_and(char::is_lowercase)
}

/// Joins words split by a hyphen and a line break or spaces (`cam- ping` -> `camping`).
fn repair_hyphenation(text: &str) -> String {
    let chars = text.chars().collect::<Vec<_>>();
    let mut out = String::with_capacity(text.len());
    let mut idx = 0;
    while idx < chars.len() {
        let ch = chars[idx];
        if ch == '-' && idx > 0 && chars[idx - 1].is_alphanumeric() {
            let mut next = idx + 1;
            while next < chars.len() && chars[next].is_whitespace() {
                next += 1;
            }
            if next > idx + 1 && next < chars.len() && chars[next].is_alphanumeric() {
                idx = next;
                continue;
            }
        }
        out.push(ch);
        idx += 1;
    }
    out
}
