use retitle_core::title::WordToken;
use thiserror::Error;

use parser::backend::{LopdfBackend, PdfBackend};

pub mod parser;

pub use parser::backend::PageBox;
pub use parser::words::ExtractOptions;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("PDF parsing error: {0}")]
    Parse(String),
    #[error("Document is encrypted")]
    Encrypted,
    #[error("Document has no pages")]
    NoPages,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// The words of a single page together with the page's dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub width: f64,
    pub height: f64,
    pub words: Vec<WordToken>,
}

/// Parse PDF bytes and extract the words of the first page.
pub fn first_page_text(bytes: &[u8], options: &ExtractOptions) -> Result<PageText, PdfError> {
    let backend = LopdfBackend::load_bytes(bytes)?;
    log::debug!("loaded document with {} page(s)", backend.page_count());
    first_page_from_backend(&backend, options)
}

/// Read a PDF from disk and extract the words of its first page.
pub fn first_page_text_from_path(
    path: &std::path::Path,
    options: &ExtractOptions,
) -> Result<PageText, PdfError> {
    let bytes = std::fs::read(path)?;
    first_page_text(&bytes, options)
}

/// Extract the words of the first page served by `backend`.
pub fn first_page_from_backend(
    backend: &dyn PdfBackend,
    options: &ExtractOptions,
) -> Result<PageText, PdfError> {
    let page_id = backend
        .pages()
        .into_values()
        .next()
        .ok_or(PdfError::NoPages)?;

    let page_box = backend.page_box(page_id)?;
    let chars = parser::chars::extract_page_chars(backend, page_id, page_box)?;
    log::trace!("page {:?}: {} char(s)", page_id, chars.len());

    let words = parser::words::group_chars_into_words(chars, options);
    log::debug!(
        "page {:?}: {}x{} with {} word(s)",
        page_id,
        page_box.width(),
        page_box.height(),
        words.len()
    );

    Ok(PageText {
        width: f64::from(page_box.width()),
        height: f64::from(page_box.height()),
        words,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Object, Stream};
    use parser::backend::{BackendFontInfo, ContentOp, PageId};
    use parser::chars::tests::{helvetica, op, td, tf, tj, MockBackend};
    use std::collections::BTreeMap;

    /// A one-page letter-sized document showing `content` with Helvetica as F1.
    fn pdf_with_content(content: &str) -> Vec<u8> {
        pdf_with_font(content, |doc| {
            doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
            })
        })
    }

    /// A one-page letter-sized document showing `content` with the font built
    /// by `add_font` as F1.
    fn pdf_with_font(
        content: &str,
        add_font: impl FnOnce(&mut lopdf::Document) -> lopdf::ObjectId,
    ) -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.5");

        let font_id = add_font(&mut doc);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.as_bytes().to_vec()));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
            "Contents" => Object::Reference(content_id),
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => Object::Reference(font_id) },
            },
        });

        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => Object::Integer(1),
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

    /// Glyph ids 1..=8 spell `M A I N <space> T L E`.
    const GLYPH_CMAP: &str = "\
/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
1 beginbfrange
<0001> <0004> [<004D> <0041> <0049> <004E>]
endbfrange
4 beginbfchar
<0005> <0020>
<0006> <0054>
<0007> <004C>
<0008> <0045>
endbfchar
endcmap
end
end
";

    #[test]
    fn test_first_page_text_from_real_document() {
        let bytes = pdf_with_content("BT /F1 20 Tf 246 700 Td (MAIN TITLE) Tj ET");
        let page = first_page_text(&bytes, &ExtractOptions::default()).unwrap();

        assert_eq!(page.width, 612.0);
        assert_eq!(page.height, 792.0);

        let texts: Vec<&str> = page.words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["MAIN", "TITLE"]);
        // Baseline 700 + 20pt glyph box, measured from the top.
        assert!((page.words[0].top - 72.0).abs() < 0.01);
        assert!((page.words[0].x0 - 246.0).abs() < 0.01);
        assert!((page.words[1].x1 - 346.0).abs() < 0.01);
    }

    #[test]
    fn test_identity_font_text_comes_from_to_unicode() {
        // "MAIN TITLE" as 2-byte glyph ids.
        let content = "BT /F1 20 Tf 246 700 Td <0001000200030004000500060003000600070008> Tj ET";
        let bytes = pdf_with_font(content, |doc| {
            let cmap_id = doc.add_object(Stream::new(dictionary! {}, GLYPH_CMAP.as_bytes().to_vec()));
            doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type0",
                "BaseFont" => "Calibri-Bold",
                "Encoding" => "Identity-H",
                "ToUnicode" => Object::Reference(cmap_id),
            })
        });

        let page = first_page_text(&bytes, &ExtractOptions::default()).unwrap();

        let texts: Vec<&str> = page.words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["MAIN", "TITLE"]);
        assert!((page.words[0].x0 - 246.0).abs() < 0.01);
        assert!((page.words[1].x1 - 346.0).abs() < 0.01);
        assert_eq!(
            retitle_core::title::detect_title(page.width, &page.words),
            Some("MAIN TITLE".to_string())
        );
    }

    #[test]
    fn test_first_page_text_rejects_garbage() {
        let result = first_page_text(b"%PDF-1.5 garbage", &ExtractOptions::default());
        assert!(matches!(result, Err(PdfError::Parse(_))));
    }

    #[test]
    fn test_first_page_text_from_missing_path() {
        let result = first_page_text_from_path(
            std::path::Path::new("/definitely/not/here.pdf"),
            &ExtractOptions::default(),
        );
        assert!(matches!(result, Err(PdfError::Io(_))));
    }

    #[test]
    fn test_first_page_from_backend_uses_mock() {
        let backend = MockBackend {
            fonts: helvetica(),
            ops: vec![op("BT", vec![]), tf(10.0), td(100.0, 700.0), tj("HELLO THERE")],
        };
        let page = first_page_from_backend(&backend, &ExtractOptions::default()).unwrap();

        assert_eq!(page.width, 612.0);
        assert_eq!(page.words.len(), 2);
        assert_eq!(page.words[1].text, "THERE");
    }

    struct EmptyBackend;

    impl PdfBackend for EmptyBackend {
        fn pages(&self) -> BTreeMap<u32, PageId> {
            BTreeMap::new()
        }

        fn page_box(&self, _page: PageId) -> Result<PageBox, PdfError> {
            unreachable!("no pages to measure")
        }

        fn page_fonts(&self, _page: PageId) -> Result<Vec<BackendFontInfo>, PdfError> {
            Ok(vec![])
        }

        fn page_content(&self, _page: PageId) -> Result<Vec<u8>, PdfError> {
            Ok(vec![])
        }

        fn decode_content(&self, _data: &[u8]) -> Result<Vec<ContentOp>, PdfError> {
            Ok(vec![])
        }

        fn decode_text(&self, _page: PageId, _font_name: &[u8], _bytes: &[u8]) -> String {
            String::new()
        }
    }

    #[test]
    fn test_document_without_pages() {
        let result = first_page_from_backend(&EmptyBackend, &ExtractOptions::default());
        assert!(matches!(result, Err(PdfError::NoPages)));
    }
}
