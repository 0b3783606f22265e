use std::collections::BTreeMap;

use lopdf::{self, content::Content};

use super::cmap::ToUnicodeCMap;
use crate::PdfError;

// ---------------------------------------------------------------------------
// Type aliases
// ---------------------------------------------------------------------------

/// A page identifier mirroring `lopdf::ObjectId`: (object number, generation number).
pub type PageId = (u32, u16);

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Font information extracted from a page's resource dictionary.
#[derive(Debug, Clone, Default)]
pub struct BackendFontInfo {
    /// The font name key as it appears in the resource dictionary (e.g. `b"F1"`).
    pub name: Vec<u8>,
    /// Base font name from the font dictionary, if present.
    pub base_font: Option<String>,
    /// Encoding entry from the font dictionary, if present.
    pub encoding: Option<String>,
    /// First character code covered by `widths`.
    pub first_char: Option<i64>,
    /// Glyph advances in thousandths of a text-space unit, starting at `first_char`.
    pub widths: Vec<f32>,
    /// The font's `/ToUnicode` CMap, when it has a readable one.
    pub to_unicode: Option<ToUnicodeCMap>,
}

impl BackendFontInfo {
    /// Glyph advance for a single-byte character code, in thousandths of a
    /// text-space unit.  `None` when the font does not declare one.
    pub fn width_of(&self, code: u8) -> Option<f32> {
        let first = self.first_char?;
        let index = usize::try_from(i64::from(code) - first).ok()?;
        self.widths.get(index).copied().filter(|w| *w > 0.0)
    }
}

/// The visible rectangle of a page in default user space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl PageBox {
    /// Build a box from a PDF rectangle array, normalising corner order.
    pub fn from_rect(rect: [f32; 4]) -> Self {
        Self {
            left: rect[0].min(rect[2]),
            bottom: rect[1].min(rect[3]),
            right: rect[0].max(rect[2]),
            top: rect[1].max(rect[3]),
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }
}

/// A simplified, lopdf-independent representation of a PDF value.
///
/// This enum decouples higher-level logic from the concrete `lopdf::Object`
/// type so that character extraction can work with pure data.
#[derive(Debug, Clone, PartialEq)]
pub enum PdfValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f32),
    Name(Vec<u8>),
    Str(Vec<u8>),
    Array(Vec<PdfValue>),
    Dict(Vec<(Vec<u8>, PdfValue)>),
    Reference(PageId),
}

/// A single content-stream operation (operator + operands).
#[derive(Debug, Clone)]
pub struct ContentOp {
    pub operator: String,
    pub operands: Vec<PdfValue>,
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Extract an `f32` from a [`PdfValue`], accepting both `Integer` and `Real`.
pub fn get_number_from_value(val: &PdfValue) -> Option<f32> {
    match val {
        PdfValue::Integer(i) => Some(*i as f32),
        PdfValue::Real(f) => Some(*f),
        _ => None,
    }
}

/// Convert a `lopdf::Object` into a [`PdfValue`].
///
/// Stream dictionaries are converted but the raw stream bytes are discarded.
pub fn convert_object(obj: &lopdf::Object) -> PdfValue {
    match obj {
        lopdf::Object::Null => PdfValue::Null,
        lopdf::Object::Boolean(b) => PdfValue::Bool(*b),
        lopdf::Object::Integer(i) => PdfValue::Integer(*i),
        lopdf::Object::Real(f) => PdfValue::Real(*f),
        lopdf::Object::Name(n) => PdfValue::Name(n.clone()),
        lopdf::Object::String(s, _) => PdfValue::Str(s.clone()),
        lopdf::Object::Array(arr) => PdfValue::Array(arr.iter().map(convert_object).collect()),
        lopdf::Object::Dictionary(dict) => PdfValue::Dict(
            dict.iter()
                .map(|(k, v)| (k.clone(), convert_object(v)))
                .collect(),
        ),
        lopdf::Object::Stream(stream) => PdfValue::Dict(
            stream
                .dict
                .iter()
                .map(|(k, v)| (k.clone(), convert_object(v)))
                .collect(),
        ),
        lopdf::Object::Reference(id) => PdfValue::Reference(*id),
    }
}

/// Best-effort decoding of raw PDF string bytes into a Rust `String`.
///
/// Handles three cases in order:
/// 1. UTF-16BE with BOM (`\xFE\xFF` prefix).
/// 2. Valid UTF-8.
/// 3. Latin-1, each byte mapped to its Unicode code point.
pub fn decode_text_simple(bytes: &[u8]) -> String {
    if let Some(payload) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let code_units: Vec<u16> = payload
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        return String::from_utf16_lossy(&code_units);
    }

    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    bytes.iter().map(|&b| b as char).collect()
}

// ---------------------------------------------------------------------------
// PdfBackend trait
// ---------------------------------------------------------------------------

/// Abstraction over a PDF parsing backend (currently backed by `lopdf`).
///
/// Character extraction only talks to this trait, so it can be tested against
/// a mock without building real documents.
pub trait PdfBackend {
    /// Return a mapping from 1-based page number to [`PageId`].
    fn pages(&self) -> BTreeMap<u32, PageId>;

    /// Return the visible box of a page (CropBox, falling back to MediaBox).
    fn page_box(&self, page: PageId) -> Result<PageBox, PdfError>;

    /// Return font information for every font referenced by the given page.
    fn page_fonts(&self, page: PageId) -> Result<Vec<BackendFontInfo>, PdfError>;

    /// Return the decompressed content stream bytes for a page.
    fn page_content(&self, page: PageId) -> Result<Vec<u8>, PdfError>;

    /// Decode raw content-stream bytes into a sequence of [`ContentOp`]s.
    fn decode_content(&self, data: &[u8]) -> Result<Vec<ContentOp>, PdfError>;

    /// Decode raw string bytes found in a text-showing operator, using any
    /// font-specific encoding information the backend can find.
    fn decode_text(&self, page: PageId, font_name: &[u8], bytes: &[u8]) -> String;
}

// ---------------------------------------------------------------------------
// LopdfBackend
// ---------------------------------------------------------------------------

/// Concrete [`PdfBackend`] implementation backed by [`lopdf::Document`].
pub struct LopdfBackend {
    doc: lopdf::Document,
}

impl LopdfBackend {
    /// Parse a PDF from an in-memory byte slice.
    pub fn load_bytes(data: &[u8]) -> Result<Self, PdfError> {
        let doc = lopdf::Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        if doc.is_encrypted() {
            return Err(PdfError::Encrypted);
        }

        Ok(Self { doc })
    }

    /// Total number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    // -- private helpers ----------------------------------------------------

    /// Look `key` up on a page dictionary, walking up the page tree for
    /// inheritable attributes.
    fn find_inherited(&self, dict: &lopdf::Dictionary, key: &[u8]) -> Option<Vec<lopdf::Object>> {
        if let Some(arr) = dict.get(key).ok().and_then(|obj| self.resolve_array(obj)) {
            return Some(arr);
        }

        let parent_id = dict.get(b"Parent").ok()?.as_reference().ok()?;
        let parent = self.doc.get_object(parent_id).ok()?.as_dict().ok()?;
        self.find_inherited(parent, key)
    }

    /// Resolve an object to an array, following a single level of indirection.
    fn resolve_array(&self, obj: &lopdf::Object) -> Option<Vec<lopdf::Object>> {
        match obj {
            lopdf::Object::Array(arr) => Some(arr.clone()),
            lopdf::Object::Reference(id) => self
                .doc
                .get_object(*id)
                .ok()
                .and_then(|resolved| resolved.as_array().ok())
                .cloned(),
            _ => None,
        }
    }

    /// Convert a slice of lopdf objects to `f32` values.
    fn array_to_f32s(&self, objects: &[lopdf::Object]) -> Result<Vec<f32>, PdfError> {
        objects
            .iter()
            .map(|obj| {
                let resolved = match obj {
                    lopdf::Object::Reference(id) => self
                        .doc
                        .get_object(*id)
                        .map_err(|e| PdfError::Parse(e.to_string()))?,
                    other => other,
                };
                match resolved {
                    lopdf::Object::Integer(i) => Ok(*i as f32),
                    lopdf::Object::Real(f) => Ok(*f),
                    _ => Err(PdfError::Parse(format!(
                        "expected number in array, got {:?}",
                        resolved
                    ))),
                }
            })
            .collect()
    }

    /// Read a rectangle attribute (`CropBox`, `MediaBox`) from a page.
    fn page_rect(&self, dict: &lopdf::Dictionary, key: &[u8]) -> Result<Option<PageBox>, PdfError> {
        let Some(objects) = self.find_inherited(dict, key) else {
            return Ok(None);
        };

        let nums = self.array_to_f32s(&objects)?;
        if nums.len() < 4 {
            return Err(PdfError::Parse(format!(
                "{} has {} elements, expected 4",
                String::from_utf8_lossy(key),
                nums.len()
            )));
        }

        Ok(Some(PageBox::from_rect([nums[0], nums[1], nums[2], nums[3]])))
    }

    /// Parse a font's `/ToUnicode` stream. Unreadable CMaps are logged and
    /// ignored so text falls back to the font encoding.
    fn to_unicode_cmap(&self, font: &lopdf::Dictionary) -> Option<ToUnicodeCMap> {
        let stream = match font.get(b"ToUnicode").ok()? {
            lopdf::Object::Reference(id) => self.doc.get_object(*id).ok()?.as_stream().ok()?,
            other => other.as_stream().ok()?,
        };

        let data = if stream.dict.get(b"Filter").is_ok() {
            match stream.decompressed_content() {
                Ok(data) => data,
                Err(e) => {
                    log::debug!("cannot decompress ToUnicode stream: {e}");
                    return None;
                }
            }
        } else {
            stream.content.clone()
        };

        ToUnicodeCMap::parse(&data)
            .map_err(|e| log::debug!("ignoring ToUnicode CMap: {e}"))
            .ok()
    }

    /// Look up the encoding name for a font on a page.
    fn font_encoding_name(&self, page: PageId, font_name: &[u8]) -> Option<String> {
        let fonts = self.doc.get_page_fonts(page).ok()?;
        let font_dict = fonts.get(font_name)?;
        match font_dict.get(b"Encoding").ok()? {
            lopdf::Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// PdfBackend implementation for LopdfBackend
// ---------------------------------------------------------------------------

impl PdfBackend for LopdfBackend {
    fn pages(&self) -> BTreeMap<u32, PageId> {
        self.doc.get_pages()
    }

    fn page_box(&self, page: PageId) -> Result<PageBox, PdfError> {
        let page_dict = self
            .doc
            .get_object(page)
            .and_then(|obj| obj.as_dict())
            .map_err(|e| PdfError::Parse(format!("cannot get page dictionary: {}", e)))?;

        match self.page_rect(page_dict, b"CropBox")? {
            Some(crop) => Ok(crop),
            None => self
                .page_rect(page_dict, b"MediaBox")?
                .ok_or_else(|| PdfError::Parse("MediaBox not found for page".into())),
        }
    }

    fn page_fonts(&self, page: PageId) -> Result<Vec<BackendFontInfo>, PdfError> {
        let fonts_map = self
            .doc
            .get_page_fonts(page)
            .map_err(|e| PdfError::Parse(format!("cannot get page fonts: {}", e)))?;

        let mut result = Vec::with_capacity(fonts_map.len());
        for (name, dict) in &fonts_map {
            let base_font = dict
                .get(b"BaseFont")
                .ok()
                .and_then(|o| o.as_name().ok())
                .map(|n| String::from_utf8_lossy(n).into_owned());

            let encoding = dict.get(b"Encoding").ok().and_then(|o| match o {
                lopdf::Object::Name(n) => Some(String::from_utf8_lossy(n).into_owned()),
                _ => None,
            });

            let first_char = dict.get(b"FirstChar").ok().and_then(|o| o.as_i64().ok());

            let widths = dict
                .get(b"Widths")
                .ok()
                .and_then(|o| self.resolve_array(o))
                .and_then(|arr| self.array_to_f32s(&arr).ok())
                .unwrap_or_default();

            let to_unicode = self.to_unicode_cmap(dict);

            result.push(BackendFontInfo {
                name: name.clone(),
                base_font,
                encoding,
                first_char,
                widths,
                to_unicode,
            });
        }

        Ok(result)
    }

    fn page_content(&self, page: PageId) -> Result<Vec<u8>, PdfError> {
        self.doc
            .get_page_content(page)
            .map_err(|e| PdfError::Parse(format!("cannot get page content: {}", e)))
    }

    fn decode_content(&self, data: &[u8]) -> Result<Vec<ContentOp>, PdfError> {
        let content = Content::decode(data)
            .map_err(|e| PdfError::Parse(format!("content stream decode error: {}", e)))?;

        Ok(content
            .operations
            .into_iter()
            .map(|op| ContentOp {
                operator: op.operator,
                operands: op.operands.iter().map(convert_object).collect(),
            })
            .collect())
    }

    fn decode_text(&self, page: PageId, font_name: &[u8], bytes: &[u8]) -> String {
        // Without a ToUnicode CMap, 2-byte Identity codes are tried as UTF-16.
        if let Some(enc_name) = self.font_encoding_name(page, font_name) {
            if enc_name.contains("Identity") && bytes.len() >= 2 && bytes.len() % 2 == 0 {
                let code_units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                let decoded = String::from_utf16_lossy(&code_units);
                if !decoded.chars().all(|c| c == '\u{FFFD}' || c == '\0') {
                    return decoded;
                }
            }
        }

        decode_text_simple(bytes)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Object, Stream};

    /// Build a one-page document whose page inherits its MediaBox from the
    /// page tree and optionally carries its own CropBox.
    fn document_bytes(crop_box: Option<[i64; 4]>) -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.5");

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Times-Roman",
            "FirstChar" => Object::Integer(65),
            "Widths" => vec![Object::Integer(722), Object::Integer(667)],
        });
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            b"BT /F1 12 Tf 72 720 Td (AB) Tj ET".to_vec(),
        ));

        let mut page = dictionary! {
            "Type" => "Page",
            "Contents" => Object::Reference(content_id),
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => Object::Reference(font_id) },
            },
        };
        if let Some(rect) = crop_box {
            page.set(
                "CropBox",
                rect.iter().map(|v| Object::Integer(*v)).collect::<Vec<_>>(),
            );
        }
        let page_id = doc.add_object(page);

        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => Object::Integer(1),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
        });
        if let Ok(dict) = doc.get_object_mut(page_id).and_then(|o| o.as_dict_mut()) {
            dict.set("Parent", Object::Reference(pages_id));
        }

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    fn first_page(backend: &LopdfBackend) -> PageId {
        *backend.pages().values().next().unwrap()
    }

    // -- LopdfBackend -------------------------------------------------------

    #[test]
    fn load_rejects_garbage() {
        assert!(matches!(
            LopdfBackend::load_bytes(b"not a pdf"),
            Err(PdfError::Parse(_))
        ));
    }

    #[test]
    fn page_box_inherits_media_box() {
        let backend = LopdfBackend::load_bytes(&document_bytes(None)).unwrap();
        assert_eq!(backend.page_count(), 1);

        let page_box = backend.page_box(first_page(&backend)).unwrap();
        assert_eq!(page_box.width(), 612.0);
        assert_eq!(page_box.height(), 792.0);
    }

    #[test]
    fn page_box_prefers_crop_box() {
        let backend = LopdfBackend::load_bytes(&document_bytes(Some([36, 36, 576, 756]))).unwrap();
        let page_box = backend.page_box(first_page(&backend)).unwrap();
        assert_eq!(page_box.left, 36.0);
        assert_eq!(page_box.top, 756.0);
        assert_eq!(page_box.width(), 540.0);
    }

    #[test]
    fn page_fonts_reads_widths() {
        let backend = LopdfBackend::load_bytes(&document_bytes(None)).unwrap();
        let fonts = backend.page_fonts(first_page(&backend)).unwrap();

        assert_eq!(fonts.len(), 1);
        assert_eq!(fonts[0].name, b"F1");
        assert_eq!(fonts[0].base_font.as_deref(), Some("Times-Roman"));
        assert_eq!(fonts[0].width_of(b'A'), Some(722.0));
        assert_eq!(fonts[0].width_of(b'B'), Some(667.0));
        assert_eq!(fonts[0].width_of(b'C'), None);
        assert_eq!(fonts[0].width_of(b' '), None);
    }

    #[test]
    fn decode_content_yields_text_ops() {
        let backend = LopdfBackend::load_bytes(&document_bytes(None)).unwrap();
        let raw = backend.page_content(first_page(&backend)).unwrap();
        let ops = backend.decode_content(&raw).unwrap();

        let operators: Vec<&str> = ops.iter().map(|op| op.operator.as_str()).collect();
        assert_eq!(operators, vec!["BT", "Tf", "Td", "Tj", "ET"]);
        assert_eq!(ops[3].operands, vec![PdfValue::Str(b"AB".to_vec())]);
    }

    // -- PageBox ------------------------------------------------------------

    #[test]
    fn page_box_normalises_corners() {
        let page_box = PageBox::from_rect([612.0, 792.0, 0.0, 0.0]);
        assert_eq!(page_box.left, 0.0);
        assert_eq!(page_box.top, 792.0);
        assert_eq!(page_box.width(), 612.0);
    }

    // -- decode_text_simple -------------------------------------------------

    #[test]
    fn decode_text_simple_utf8() {
        assert_eq!(decode_text_simple("caf\u{00E9}".as_bytes()), "caf\u{00E9}");
    }

    #[test]
    fn decode_text_simple_latin1() {
        let input: &[u8] = &[0x63, 0x61, 0x66, 0xE9];
        assert_eq!(decode_text_simple(input), "caf\u{00E9}");
    }

    #[test]
    fn decode_text_simple_utf16be_odd_trailing_byte() {
        let input: &[u8] = &[0xFE, 0xFF, 0x00, 0x41, 0x00];
        assert_eq!(decode_text_simple(input), "A");
    }

    #[test]
    fn decode_text_simple_empty() {
        assert_eq!(decode_text_simple(&[]), "");
    }

    // -- get_number_from_value ----------------------------------------------

    #[test]
    fn get_number_accepts_integer_and_real() {
        assert_eq!(get_number_from_value(&PdfValue::Integer(-10)), Some(-10.0));
        assert_eq!(get_number_from_value(&PdfValue::Real(2.5)), Some(2.5));
        assert_eq!(get_number_from_value(&PdfValue::Null), None);
        assert_eq!(get_number_from_value(&PdfValue::Name(b"F1".to_vec())), None);
    }

    // -- convert_object -----------------------------------------------------

    #[test]
    fn convert_nested_array() {
        let arr = lopdf::Object::Array(vec![
            lopdf::Object::Integer(1),
            lopdf::Object::Array(vec![lopdf::Object::Real(2.0)]),
        ]);
        assert_eq!(
            convert_object(&arr),
            PdfValue::Array(vec![
                PdfValue::Integer(1),
                PdfValue::Array(vec![PdfValue::Real(2.0)]),
            ]),
        );
    }

    #[test]
    fn convert_string_and_reference() {
        assert_eq!(
            convert_object(&lopdf::Object::String(
                b"hello".to_vec(),
                lopdf::StringFormat::Literal,
            )),
            PdfValue::Str(b"hello".to_vec()),
        );
        assert_eq!(
            convert_object(&lopdf::Object::Reference((7, 0))),
            PdfValue::Reference((7, 0))
        );
    }
}
