//! `/ToUnicode` CMaps: mapping a font's character codes to Unicode text.
//!
//! Only the parts needed to recover text are read: `codespacerange` for the
//! code byte lengths, and `bfchar`/`bfrange` for the mappings themselves.

use std::collections::{BTreeSet, HashMap};

use crate::PdfError;

/// Ranges wider than this are treated as malformed and skipped.
const MAX_RANGE_SPAN: u32 = 0xFFFF;

/// A parsed `/ToUnicode` CMap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToUnicodeCMap {
    mappings: HashMap<u32, String>,
    /// Byte lengths of the codes this CMap covers, longest first.
    code_lengths: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token<'a> {
    Hex(String),
    ArrayStart,
    ArrayEnd,
    Keyword(&'a str),
}

impl ToUnicodeCMap {
    /// Parse the (decompressed) bytes of a `/ToUnicode` stream.
    pub fn parse(data: &[u8]) -> Result<Self, PdfError> {
        let text = String::from_utf8_lossy(data);
        let mut tokens = tokenize(&text).into_iter();

        let mut mappings = HashMap::new();
        let mut lengths = BTreeSet::new();

        while let Some(token) = tokens.next() {
            let Token::Keyword(keyword) = token else {
                continue;
            };

            match keyword {
                "begincodespacerange" => {
                    for pair in section(&mut tokens, "endcodespacerange").chunks(2) {
                        if let [Token::Hex(low), Token::Hex(_)] = pair {
                            lengths.insert(code_length(low));
                        }
                    }
                }
                "beginbfchar" => {
                    for pair in section(&mut tokens, "endbfchar").chunks(2) {
                        if let [Token::Hex(src), Token::Hex(dst)] = pair {
                            lengths.insert(code_length(src));
                            mappings.insert(parse_code(src)?, decode_utf16_hex(dst)?);
                        }
                    }
                }
                "beginbfrange" => {
                    let body = section(&mut tokens, "endbfrange");
                    parse_bfrange(body, &mut mappings, &mut lengths)?;
                }
                _ => {}
            }
        }

        Ok(Self {
            mappings,
            code_lengths: lengths.into_iter().rev().collect(),
        })
    }

    /// Text for a single character code.
    pub fn lookup(&self, code: u32) -> Option<&str> {
        self.mappings.get(&code).map(String::as_str)
    }

    /// Decode a shown string, longest matching code first.
    ///
    /// Codes without a mapping become U+FFFD.
    pub fn decode(&self, bytes: &[u8]) -> String {
        let shortest = self.code_lengths.last().copied().unwrap_or(1);
        let mut text = String::new();
        let mut pos = 0;

        while pos < bytes.len() {
            let hit = self.code_lengths.iter().find_map(|&len| {
                let chunk = bytes.get(pos..pos + len)?;
                self.lookup(code_from_bytes(chunk)).map(|mapped| (len, mapped))
            });

            match hit {
                Some((len, mapped)) => {
                    text.push_str(mapped);
                    pos += len;
                }
                None => {
                    text.push(char::REPLACEMENT_CHARACTER);
                    pos += shortest;
                }
            }
        }

        text
    }
}

/// Collect tokens up to (and consuming) the `end` keyword.
fn section<'a>(tokens: &mut impl Iterator<Item = Token<'a>>, end: &str) -> Vec<Token<'a>> {
    tokens
        .take_while(|token| !matches!(token, Token::Keyword(word) if *word == end))
        .collect()
}

fn parse_bfrange(
    body: Vec<Token<'_>>,
    mappings: &mut HashMap<u32, String>,
    lengths: &mut BTreeSet<usize>,
) -> Result<(), PdfError> {
    let mut tokens = body.into_iter();

    while let (Some(Token::Hex(low)), Some(Token::Hex(high))) = (tokens.next(), tokens.next()) {
        let start = parse_code(&low)?;
        let end = parse_code(&high)?;
        lengths.insert(code_length(&low));

        let span = end.checked_sub(start).filter(|span| *span <= MAX_RANGE_SPAN);

        match tokens.next() {
            // <low> <high> <dst>: the last character of dst counts up.
            Some(Token::Hex(dst)) => {
                let base = decode_utf16_hex(&dst)?;
                let Some(span) = span else {
                    log::debug!("skipping bfrange <{low}> <{high}>");
                    continue;
                };
                for offset in 0..=span {
                    mappings.insert(start + offset, shift_last_char(&base, offset));
                }
            }
            // <low> <high> [<dst0> <dst1> ...]
            Some(Token::ArrayStart) => {
                let mut code = start;
                for token in tokens.by_ref() {
                    match token {
                        Token::Hex(dst) => {
                            if code <= end {
                                mappings.insert(code, decode_utf16_hex(&dst)?);
                            }
                            code = code.saturating_add(1);
                        }
                        _ => break,
                    }
                }
            }
            other => {
                return Err(PdfError::Parse(format!(
                    "bfrange <{low}> <{high}> has no destination, found {other:?}"
                )));
            }
        }
    }

    Ok(())
}

fn shift_last_char(base: &str, offset: u32) -> String {
    let mut chars: Vec<char> = base.chars().collect();
    if let Some(last) = chars.last_mut() {
        *last = char::from_u32(u32::from(*last) + offset).unwrap_or(char::REPLACEMENT_CHARACTER);
    }
    chars.into_iter().collect()
}

/// Split CMap source into the tokens we care about. Names, numbers,
/// dictionaries, literal strings and comments collapse into keywords or are
/// skipped.
fn tokenize(text: &str) -> Vec<Token<'_>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        match bytes[pos] {
            b'%' => {
                while pos < bytes.len() && bytes[pos] != b'\n' && bytes[pos] != b'\r' {
                    pos += 1;
                }
            }
            b'<' if bytes.get(pos + 1) == Some(&b'<') => pos += 2,
            b'>' if bytes.get(pos + 1) == Some(&b'>') => pos += 2,
            b'<' => {
                let start = pos + 1;
                let end = text[start..].find('>').map_or(bytes.len(), |i| start + i);
                let hex: String = text[start..end]
                    .chars()
                    .filter(|c| !c.is_ascii_whitespace())
                    .collect();
                tokens.push(Token::Hex(hex));
                pos = end + 1;
            }
            b'[' => {
                tokens.push(Token::ArrayStart);
                pos += 1;
            }
            b']' => {
                tokens.push(Token::ArrayEnd);
                pos += 1;
            }
            b'(' => {
                let mut depth = 0;
                while pos < bytes.len() {
                    match bytes[pos] {
                        b'\\' => pos += 1,
                        b'(' => depth += 1,
                        b')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    pos += 1;
                }
                pos += 1;
            }
            c if c.is_ascii_whitespace() || c == b'>' || c == b')' => pos += 1,
            _ => {
                let start = pos;
                while pos < bytes.len() && !is_delimiter(bytes[pos]) {
                    pos += 1;
                }
                // A leading '/' or '{' is itself a delimiter; always make progress.
                if pos == start {
                    pos += 1;
                    continue;
                }
                tokens.push(Token::Keyword(&text[start..pos]));
            }
        }
    }

    tokens
}

fn is_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace() || b"<>[]()/%{}".contains(&b)
}

fn code_length(hex: &str) -> usize {
    hex.len().div_ceil(2).max(1)
}

fn parse_code(hex: &str) -> Result<u32, PdfError> {
    u32::from_str_radix(hex, 16).map_err(|e| PdfError::Parse(format!("invalid CMap code <{hex}>: {e}")))
}

fn code_from_bytes(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0, |code, b| (code << 8) | u32::from(*b))
}

/// Decode a UTF-16BE hex string. Two-digit values are single-byte code points.
fn decode_utf16_hex(hex: &str) -> Result<String, PdfError> {
    if hex.len() == 2 {
        return decode_utf16_hex(&format!("00{hex}"));
    }
    if hex.len() % 4 != 0 {
        return Err(PdfError::Parse(format!(
            "CMap destination <{hex}> is not UTF-16BE"
        )));
    }

    let units = hex
        .as_bytes()
        .chunks(4)
        .map(|chunk| {
            std::str::from_utf8(chunk)
                .ok()
                .and_then(|s| u16::from_str_radix(s, 16).ok())
                .ok_or_else(|| PdfError::Parse(format!("invalid UTF-16BE in <{hex}>")))
        })
        .collect::<Result<Vec<u16>, _>>()?;

    Ok(String::from_utf16_lossy(&units))
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY_CMAP: &str = "\
/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def
/CMapName /Adobe-Identity-UCS def
/CMapType 2 def
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
2 beginbfchar
<0003> <0020>
<0011> <00660069>
endbfchar
2 beginbfrange
<0024> <0026> <0041>
<0030> <0032> [<0058> <0059> <005A>]
endbfrange
endcmap
CMapName currentdict /CMap defineresource pop
end
end
";

    #[test]
    fn test_parse_bfchar_and_bfrange() {
        let cmap = ToUnicodeCMap::parse(IDENTITY_CMAP.as_bytes()).unwrap();

        assert_eq!(cmap.lookup(0x0003), Some(" "));
        assert_eq!(cmap.lookup(0x0011), Some("fi"));
        assert_eq!(cmap.lookup(0x0024), Some("A"));
        assert_eq!(cmap.lookup(0x0026), Some("C"));
        assert_eq!(cmap.lookup(0x0027), None);
        assert_eq!(cmap.lookup(0x0031), Some("Y"));
    }

    #[test]
    fn test_decode_two_byte_codes() {
        let cmap = ToUnicodeCMap::parse(IDENTITY_CMAP.as_bytes()).unwrap();
        let shown = [0x00, 0x24, 0x00, 0x25, 0x00, 0x03, 0x00, 0x11, 0x00, 0x32];

        assert_eq!(cmap.decode(&shown), "AB fiZ");
    }

    #[test]
    fn test_unmapped_code_becomes_replacement_char() {
        let cmap = ToUnicodeCMap::parse(IDENTITY_CMAP.as_bytes()).unwrap();

        assert_eq!(cmap.decode(&[0x00, 0x24, 0x01, 0x00]), "A\u{FFFD}");
    }

    #[test]
    fn test_single_byte_cmap_with_entries_on_one_line() {
        let cmap = ToUnicodeCMap::parse(b"2 beginbfchar <41> <0058> <42> <0059> endbfchar").unwrap();

        assert_eq!(cmap.decode(b"AB"), "XY");
    }

    #[test]
    fn test_bfrange_with_two_digit_destination() {
        let cmap = ToUnicodeCMap::parse(b"1 beginbfrange <01> <03> <61> endbfrange").unwrap();

        assert_eq!(cmap.decode(&[1, 2, 3]), "abc");
    }

    #[test]
    fn test_oversized_range_is_skipped() {
        let cmap = ToUnicodeCMap::parse(
            b"1 beginbfrange <00000000> <7FFFFFFF> <0041> endbfrange 1 beginbfchar <0001> <0042> endbfchar",
        )
        .unwrap();

        assert_eq!(cmap.lookup(0), None);
        assert_eq!(cmap.lookup(1), Some("B"));
    }

    #[test]
    fn test_invalid_destination_is_an_error() {
        let result = ToUnicodeCMap::parse(b"1 beginbfchar <01> <414> endbfchar");
        assert!(matches!(result, Err(PdfError::Parse(_))));
    }

    #[test]
    fn test_empty_cmap_decodes_to_replacements() {
        let cmap = ToUnicodeCMap::parse(b"").unwrap();
        assert_eq!(cmap.decode(b"ab"), "\u{FFFD}\u{FFFD}");
    }
}
