//! Character positioning from a page's content stream.
//!
//! Walks the content-stream operators with a small text-rendering state
//! machine and emits one [`TextChar`] per shown character, positioned in
//! page space with the origin at the top-left corner of the page box.
//!
//! ```text
//! content ops  ->  TextChar[]
//!   (per page)      extract_page_chars
//! ```

use super::backend::{get_number_from_value, BackendFontInfo, PageBox, PageId, PdfBackend, PdfValue};
use crate::PdfError;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A single positioned glyph.
///
/// `top`/`bottom` are measured downwards from the top edge of the page box;
/// `x0`/`x1` from its left edge.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChar {
    pub text: String,
    pub x0: f32,
    pub x1: f32,
    pub top: f32,
    pub bottom: f32,
}

impl TextChar {
    pub fn is_blank(&self) -> bool {
        self.text.chars().all(char::is_whitespace)
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Glyph advance, as a fraction of the font size, used when the font does
/// not declare widths (standard 14 fonts, composite fonts).
const APPROX_CHAR_WIDTH_RATIO: f32 = 0.5;

// ---------------------------------------------------------------------------
// Internal: matrices
// ---------------------------------------------------------------------------

/// A PDF transformation matrix `[a, b, c, d, e, f]`.
type Matrix = [f32; 6];

const IDENTITY_MATRIX: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// `m × n` in PDF row-vector convention: apply `m` first, then `n`.
fn multiply(m: &Matrix, n: &Matrix) -> Matrix {
    [
        m[0] * n[0] + m[1] * n[2],
        m[0] * n[1] + m[1] * n[3],
        m[2] * n[0] + m[3] * n[2],
        m[2] * n[1] + m[3] * n[3],
        m[4] * n[0] + m[5] * n[2] + n[4],
        m[4] * n[1] + m[5] * n[3] + n[5],
    ]
}

fn transform_point(m: &Matrix, x: f32, y: f32) -> (f32, f32) {
    (x * m[0] + y * m[2] + m[4], x * m[1] + y * m[3] + m[5])
}

fn matrix_from_operands(operands: &[PdfValue]) -> Option<Matrix> {
    let vals: Vec<f32> = operands
        .iter()
        .take(6)
        .filter_map(get_number_from_value)
        .collect();
    if vals.len() == 6 {
        Some([vals[0], vals[1], vals[2], vals[3], vals[4], vals[5]])
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Internal: PDF text-state machine
// ---------------------------------------------------------------------------

/// Mutable state tracked while walking a page's content stream.
#[derive(Debug, Clone)]
struct TextState {
    /// Current font resource name (the `/F1`-style key).
    font_key: Vec<u8>,
    /// Current font size in text-space units.
    font_size: f32,
    /// Current text matrix.
    text_matrix: Matrix,
    /// Text line matrix -- set by BT and updated by Td/TD/T*/Tm.
    line_matrix: Matrix,
    /// Horizontal scaling factor (percent / 100).
    horiz_scale: f32,
    char_spacing: f32,
    word_spacing: f32,
    text_rise: f32,
    leading: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font_key: Vec::new(),
            font_size: 0.0,
            text_matrix: IDENTITY_MATRIX,
            line_matrix: IDENTITY_MATRIX,
            horiz_scale: 1.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            text_rise: 0.0,
            leading: 0.0,
        }
    }
}

impl TextState {
    /// Advance the text matrix horizontally by `dx` text-space units.
    fn advance_x(&mut self, dx: f32) {
        self.text_matrix[4] += dx * self.text_matrix[0];
        self.text_matrix[5] += dx * self.text_matrix[1];
    }

    /// Multiply the text line matrix by a translation (used by Td / TD / T*).
    fn translate_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = multiply(&[1.0, 0.0, 0.0, 1.0, tx, ty], &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    /// Matrix mapping glyph space (one unit = font size) to user space.
    fn render_matrix(&self, ctm: &Matrix) -> Matrix {
        let font = [
            self.font_size * self.horiz_scale,
            0.0,
            0.0,
            self.font_size,
            0.0,
            self.text_rise,
        ];
        multiply(&multiply(&font, &self.text_matrix), ctm)
    }
}

/// Everything needed to turn shown strings into positioned characters.
struct PageContext<'a> {
    backend: &'a dyn PdfBackend,
    page_id: PageId,
    page_box: PageBox,
    fonts: Vec<BackendFontInfo>,
}

impl PageContext<'_> {
    fn font(&self, key: &[u8]) -> Option<&BackendFontInfo> {
        self.fonts.iter().find(|info| info.name == key)
    }

    /// Text for a shown string: the font's ToUnicode CMap wins over the
    /// backend's encoding-based decoding.
    fn decode(&self, font_key: &[u8], bytes: &[u8]) -> String {
        if let Some(cmap) = self.font(font_key).and_then(|f| f.to_unicode.as_ref()) {
            return cmap.decode(bytes);
        }

        let decoded = self.backend.decode_text(self.page_id, font_key, bytes);
        if decoded.is_empty() {
            super::backend::decode_text_simple(bytes)
        } else {
            decoded
        }
    }
}

/// Glyph advances (as a fraction of the font size) for each char of `text`.
///
/// Declared `/Widths` are only usable when every byte produced exactly one
/// character; otherwise every glyph gets the approximate width.
fn glyph_widths(text: &str, bytes: &[u8], font: Option<&BackendFontInfo>) -> Vec<f32> {
    let single_byte = text.chars().count() == bytes.len()
        && font.is_some_and(|f| {
            !f.encoding
                .as_deref()
                .is_some_and(|enc| enc.contains("Identity"))
        });

    if !single_byte {
        return vec![APPROX_CHAR_WIDTH_RATIO; text.chars().count()];
    }

    bytes
        .iter()
        .map(|&code| {
            font.and_then(|f| f.width_of(code))
                .map(|w| w / 1000.0)
                .unwrap_or(APPROX_CHAR_WIDTH_RATIO)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Walk a single page's content stream and produce its positioned characters.
///
/// Handled operators:
///
/// | Operator | Action |
/// |----------|--------|
/// | `q` / `Q` | Save / restore the current transformation matrix |
/// | `cm`     | Concatenate to the current transformation matrix |
/// | `BT`     | Begin text object -- reset matrices |
/// | `Tf`     | Set font and size |
/// | `Tm`     | Set text matrix directly |
/// | `Td`     | Translate text position |
/// | `TD`     | Translate and set leading |
/// | `T*`     | Move to start of next line |
/// | `TL`, `Tc`, `Tw`, `Tz`, `Ts` | Text state parameters |
/// | `Tj`     | Show a string |
/// | `TJ`     | Show strings with kerning adjustments |
/// | `'`, `"` | Move to next line and show string |
pub fn extract_page_chars(
    backend: &dyn PdfBackend,
    page_id: PageId,
    page_box: PageBox,
) -> Result<Vec<TextChar>, PdfError> {
    let raw_content = backend.page_content(page_id)?;
    let ops = backend.decode_content(&raw_content)?;
    let fonts = backend.page_fonts(page_id).unwrap_or_default();

    let ctx = PageContext {
        backend,
        page_id,
        page_box,
        fonts,
    };

    let mut ctm = IDENTITY_MATRIX;
    let mut ctm_stack: Vec<Matrix> = Vec::new();
    let mut state = TextState::default();
    let mut chars: Vec<TextChar> = Vec::new();

    for op in &ops {
        match op.operator.as_str() {
            // -- Graphics state -----------------------------------------
            "q" => ctm_stack.push(ctm),
            "Q" => {
                if let Some(saved) = ctm_stack.pop() {
                    ctm = saved;
                }
            }
            "cm" => {
                if let Some(m) = matrix_from_operands(&op.operands) {
                    ctm = multiply(&m, &ctm);
                }
            }

            // -- Text object --------------------------------------------
            "BT" => {
                state.text_matrix = IDENTITY_MATRIX;
                state.line_matrix = IDENTITY_MATRIX;
            }
            "ET" => {}

            "Tf" => {
                if let (Some(PdfValue::Name(key)), Some(size)) = (
                    op.operands.first(),
                    op.operands.get(1).and_then(get_number_from_value),
                ) {
                    state.font_key = key.clone();
                    state.font_size = size;
                }
            }

            // -- Text matrix / position ---------------------------------
            "Tm" => {
                if let Some(m) = matrix_from_operands(&op.operands) {
                    state.text_matrix = m;
                    state.line_matrix = m;
                }
            }
            "Td" | "TD" => {
                if op.operands.len() >= 2 {
                    let tx = get_number_from_value(&op.operands[0]).unwrap_or(0.0);
                    let ty = get_number_from_value(&op.operands[1]).unwrap_or(0.0);
                    if op.operator == "TD" {
                        state.leading = -ty;
                    }
                    state.translate_line(tx, ty);
                }
            }
            "T*" => state.translate_line(0.0, -state.leading),

            // -- Text state parameters ----------------------------------
            "TL" | "Tc" | "Tw" | "Tz" | "Ts" => {
                if let Some(v) = op.operands.first().and_then(get_number_from_value) {
                    match op.operator.as_str() {
                        "TL" => state.leading = v,
                        "Tc" => state.char_spacing = v,
                        "Tw" => state.word_spacing = v,
                        "Tz" => state.horiz_scale = v / 100.0,
                        _ => state.text_rise = v,
                    }
                }
            }

            // -- Show text ----------------------------------------------
            "Tj" => {
                if let Some(first) = op.operands.first() {
                    show_string(first, &ctx, &ctm, &mut state, &mut chars);
                }
            }
            "TJ" => {
                if let Some(PdfValue::Array(arr)) = op.operands.first() {
                    for elem in arr {
                        match elem {
                            PdfValue::Str(_) => {
                                show_string(elem, &ctx, &ctm, &mut state, &mut chars)
                            }
                            // Kerning in thousandths of a text-space unit;
                            // negative values move right.
                            other => {
                                if let Some(adj) = get_number_from_value(other) {
                                    state.advance_x(
                                        -adj / 1000.0 * state.font_size * state.horiz_scale,
                                    );
                                }
                            }
                        }
                    }
                }
            }
            "'" => {
                state.translate_line(0.0, -state.leading);
                if let Some(first) = op.operands.first() {
                    show_string(first, &ctx, &ctm, &mut state, &mut chars);
                }
            }
            "\"" => {
                if op.operands.len() >= 3 {
                    if let Some(aw) = get_number_from_value(&op.operands[0]) {
                        state.word_spacing = aw;
                    }
                    if let Some(ac) = get_number_from_value(&op.operands[1]) {
                        state.char_spacing = ac;
                    }
                    state.translate_line(0.0, -state.leading);
                    show_string(&op.operands[2], &ctx, &ctm, &mut state, &mut chars);
                }
            }

            other => log::trace!("ignoring content operator {other}"),
        }
    }

    Ok(chars)
}

/// Decode a string operand, emit one [`TextChar`] per character and advance
/// the text matrix past it.
fn show_string(
    operand: &PdfValue,
    ctx: &PageContext<'_>,
    ctm: &Matrix,
    state: &mut TextState,
    chars: &mut Vec<TextChar>,
) {
    let PdfValue::Str(bytes) = operand else {
        return;
    };
    let text = ctx.decode(&state.font_key, bytes);
    let widths = glyph_widths(&text, bytes, ctx.font(&state.font_key));

    for (ch, width) in text.chars().zip(widths) {
        let render = state.render_matrix(ctm);
        chars.push(place_char(ch, width, &render, &ctx.page_box));

        let mut dx = width * state.font_size + state.char_spacing;
        if ch == ' ' {
            dx += state.word_spacing;
        }
        state.advance_x(dx * state.horiz_scale);
    }
}

/// Map the glyph box `(0, 0)..(width, 1)` through `render` and express it in
/// top-left page coordinates.
fn place_char(ch: char, width: f32, render: &Matrix, page_box: &PageBox) -> TextChar {
    let corners = [
        transform_point(render, 0.0, 0.0),
        transform_point(render, width, 0.0),
        transform_point(render, 0.0, 1.0),
        transform_point(render, width, 1.0),
    ];

    let min_x = corners.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
    let max_x = corners.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
    let min_y = corners.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
    let max_y = corners.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);

    TextChar {
        text: ch.to_string(),
        x0: min_x - page_box.left,
        x1: max_x - page_box.left,
        top: page_box.top - max_y,
        bottom: page_box.top - min_y,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
