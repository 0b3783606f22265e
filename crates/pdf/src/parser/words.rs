//! Grouping positioned characters into words.

use retitle_core::title::WordToken;
use unicode_normalization::UnicodeNormalization;

use super::chars::TextChar;

/// Word-grouping tolerances, in page units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractOptions {
    /// Maximum horizontal gap between two characters of the same word.
    pub x_tolerance: f32,
    /// Maximum difference in `top` between two characters of the same word.
    pub y_tolerance: f32,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            x_tolerance: 3.0,
            y_tolerance: 3.0,
        }
    }
}

/// Group characters into words.
///
/// Characters are first clustered into lines: sorted by `top`, a character
/// joins the current line while its `top` is within `y_tolerance` of the
/// previous one. Each line is then read left-to-right by `x0`, so superscripts
/// and small capitals stay in reading order.
///
/// Whitespace ends the current word, as does a horizontal gap larger than
/// `x_tolerance` or a jump in `top` larger than `y_tolerance`. Overlapping
/// characters (e.g. the duplicated glyphs of fake-bold text) always join.
pub fn group_chars_into_words(chars: Vec<TextChar>, options: &ExtractOptions) -> Vec<WordToken> {
    let mut words: Vec<WordToken> = Vec::new();

    for line in cluster_into_lines(chars, options.y_tolerance) {
        let mut current: Vec<TextChar> = Vec::new();

        for ch in line {
            if ch.is_blank() {
                flush_word(&mut current, &mut words);
                continue;
            }

            if let Some(last) = current.last() {
                if should_split(last, &ch, options) {
                    flush_word(&mut current, &mut words);
                }
            }

            current.push(ch);
        }

        flush_word(&mut current, &mut words);
    }

    words
}

/// Cluster characters whose consecutive `top` values are within `tolerance`,
/// then sort every cluster by `x0`.
fn cluster_into_lines(mut chars: Vec<TextChar>, tolerance: f32) -> Vec<Vec<TextChar>> {
    chars.sort_by(|a, b| a.top.total_cmp(&b.top));

    let mut lines: Vec<Vec<TextChar>> = Vec::new();
    let mut previous_top: Option<f32> = None;

    for ch in chars {
        let top = ch.top;
        let same_line = previous_top.is_some_and(|prev| top - prev <= tolerance);
        match lines.last_mut() {
            Some(line) if same_line => line.push(ch),
            _ => lines.push(vec![ch]),
        }
        previous_top = Some(top);
    }

    for line in &mut lines {
        line.sort_by(|a, b| a.x0.total_cmp(&b.x0));
    }

    lines
}

fn should_split(last: &TextChar, current: &TextChar, options: &ExtractOptions) -> bool {
    let x_gap = (last.x0.max(current.x0) - last.x1.min(current.x1)).max(0.0);
    let y_diff = (current.top - last.top).abs();
    x_gap > options.x_tolerance || y_diff > options.y_tolerance
}

fn flush_word(current: &mut Vec<TextChar>, words: &mut Vec<WordToken>) {
    if current.is_empty() {
        return;
    }

    let text: String = current.iter().map(|c| expand_ligature(&c.text)).collect();
    let x0 = current.iter().map(|c| c.x0).fold(f32::INFINITY, f32::min);
    let x1 = current.iter().map(|c| c.x1).fold(f32::NEG_INFINITY, f32::max);
    let top = current.iter().map(|c| c.top).fold(f32::INFINITY, f32::min);

    words.push(WordToken::new(text, f64::from(x0), f64::from(x1), f64::from(top)));
    current.clear();
}

/// Expand Latin presentation-form ligatures (U+FB00..U+FB06) such as `ﬁ`.
fn expand_ligature(text: &str) -> String {
    let mut expanded = String::with_capacity(text.len());
    for c in text.chars() {
        if ('\u{FB00}'..='\u{FB06}').contains(&c) {
            expanded.extend(std::iter::once(c).nfkc());
        } else {
            expanded.push(c);
        }
    }
    expanded
}
