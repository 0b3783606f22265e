//! Title detection from positioned words.
//!
//! A page's words are bucketed into lines by their truncated `top`
//! coordinate. Lines are then scanned top-to-bottom and the first contiguous
//! run of lines that are both horizontally centered and written in capitals
//! becomes the title.
//!
//! ```text
//! WordToken[]  ->  Line[]            ->  Option<String>
//!                  group_into_lines      select_title
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Fraction of the page width a line's midpoint may sit away from the page
/// center and still count as centered.
pub const CENTER_TOLERANCE_RATIO: f64 = 0.15;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A single word positioned on a page.
///
/// `x0`/`x1` are the horizontal extents and `top` is the distance from the
/// top edge of the page, all in page units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordToken {
    pub text: String,
    pub x0: f64,
    pub x1: f64,
    pub top: f64,
}

impl WordToken {
    pub fn new(text: impl Into<String>, x0: f64, x1: f64, top: f64) -> Self {
        Self {
            text: text.into(),
            x0,
            x1,
            top,
        }
    }
}

/// Words sharing the same truncated `top`, ordered left-to-right.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Line {
    /// Truncated vertical position shared by every word of the line.
    pub key: i64,
    pub words: Vec<WordToken>,
}

impl Line {
    /// Word texts joined with single spaces.
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Leftmost edge of the line, `None` for an empty line.
    pub fn x0(&self) -> Option<f64> {
        self.words.iter().map(|w| w.x0).reduce(f64::min)
    }

    /// Rightmost edge of the line, `None` for an empty line.
    pub fn x1(&self) -> Option<f64> {
        self.words.iter().map(|w| w.x1).reduce(f64::max)
    }

    /// Horizontal midpoint of the line's extent.
    pub fn center_x(&self) -> Option<f64> {
        Some((self.x0()? + self.x1()?) / 2.0)
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Infer a title from a page's words.
///
/// Returns `None` when no line qualifies (including when `words` is empty).
/// `page_width` must be positive.
pub fn detect_title(page_width: f64, words: &[WordToken]) -> Option<String> {
    if words.is_empty() {
        return None;
    }

    select_title(page_width, &group_into_lines(words))
}

/// Bucket words into lines keyed by `top.trunc()`.
///
/// Lines come back sorted top-to-bottom; words inside a line are sorted by
/// `x0`. Words on visually different lines whose `top` truncates to the same
/// integer end up in the same line.
pub fn group_into_lines(words: &[WordToken]) -> Vec<Line> {
    let mut buckets: BTreeMap<i64, Vec<WordToken>> = BTreeMap::new();

    for word in words {
        buckets
            .entry(word.top.trunc() as i64)
            .or_default()
            .push(word.clone());
    }

    buckets
        .into_iter()
        .map(|(key, mut words)| {
            words.sort_by(|a, b| a.x0.total_cmp(&b.x0));
            Line { key, words }
        })
        .collect()
}

/// Scan `lines` in the given order and return the first contiguous run of
/// title lines, joined with single spaces.
///
/// Scanning stops at the first non-qualifying line once a title line has been
/// accepted. Empty lines are skipped.
pub fn select_title(page_width: f64, lines: &[Line]) -> Option<String> {
    let center_x = page_width / 2.0;
    let tolerance = page_width * CENTER_TOLERANCE_RATIO;

    let mut title_lines: Vec<String> = Vec::new();
    let mut in_title = false;

    for line in lines {
        let Some(line_center) = line.center_x() else {
            continue;
        };
        let text = line.text();

        let is_centered = (line_center - center_x).abs() < tolerance;

        if is_centered && is_all_caps(&text) {
            title_lines.push(text);
            in_title = true;
        } else if in_title {
            break;
        }
    }

    if title_lines.is_empty() {
        None
    } else {
        Some(title_lines.join(" "))
    }
}

/// `true` when `text` has at least one uppercase letter, uppercasing leaves
/// it unchanged, and it holds more than one whitespace-separated word.
///
/// Digits and punctuation pass next to capitals; a single lowercase letter
/// anywhere fails, and so does a line with no letters at all (`"1 / 12"`).
pub fn is_all_caps(text: &str) -> bool {
    text.chars().any(char::is_uppercase)
        && text.to_uppercase() == text
        && text.split_whitespace().count() > 1
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
