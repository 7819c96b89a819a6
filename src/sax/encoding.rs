//! Byte to character decoding.
//!
//! The tokenizer only ever sees UTF-8 text; everything here exists to turn
//! the caller's bytes into that text without decoding a single byte past the
//! XML declaration before the declaration had a chance to name the encoding.

use log::debug;

use crate::sax::error::{Error, SaxResult};

// https://tools.ietf.org/html/rfc3629
static UTF8_CHAR_WIDTH: [u8; 256] = [
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, /* 0x1F */
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, /* 0x3F */
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, /* 0x5F */
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, /* 0x7F */
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, /* 0x9F */
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, /* 0xBF */
    0, 0, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    2, /* 0xDF */
    3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, /* 0xEF */
    4, 4, 4, 4, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, /* 0xFF */
];

/// Caller supplied table for a single-byte encoding the parser does not know.
///
/// Entry `b` is the character byte `b` decodes to, `None` marks a byte that
/// must never appear in the document.
#[derive(Clone, PartialEq, Eq)]
pub struct ByteMap {
    table: [Option<char>; 256],
}

impl std::fmt::Debug for ByteMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mapped = self.table.iter().filter(|c| c.is_some()).count();
        write!(f, "ByteMap {{ mapped: {} }}", mapped)
    }
}

impl ByteMap {
    pub fn from_fn<F>(f: F) -> ByteMap
    where
        F: Fn(u8) -> Option<char>,
    {
        let mut table = [None; 256];
        for (b, slot) in table.iter_mut().enumerate() {
            *slot = f(b as u8);
        }
        ByteMap { table }
    }

    /// Builds the table from 256 code points, `-1` marking an invalid byte.
    ///
    /// Multi-byte sequences (expat's `-2..=-4` markers) are not supported.
    pub fn from_code_points(map: &[i32]) -> SaxResult<ByteMap> {
        if map.len() != 256 {
            return Err(Error::InvalidEncodingMap(format!(
                "expected 256 entries, got {}",
                map.len()
            )));
        }
        let mut table = [None; 256];
        for (b, &cp) in map.iter().enumerate() {
            table[b] = match cp {
                -1 => None,
                cp if cp < 0 => {
                    return Err(Error::InvalidEncodingMap(format!(
                        "byte {} starts a multi-byte sequence",
                        b
                    )))
                }
                cp => match char::from_u32(cp as u32) {
                    Some(c) => Some(c),
                    None => {
                        return Err(Error::InvalidEncodingMap(format!(
                            "byte {} maps to invalid code point {:#x}",
                            b, cp
                        )))
                    }
                },
            };
        }
        Ok(ByteMap { table })
    }

    pub fn get(&self, byte: u8) -> Option<char> {
        self.table[byte as usize]
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    Ascii,
    Latin1,
    Custom { name: String, map: Box<ByteMap> },
}

/// What a label names, before byte order is known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Label {
    Utf8,
    Utf16,
    Utf16Le,
    Utf16Be,
    Ascii,
    Latin1,
}

impl Label {
    pub(crate) fn lookup(name: &str) -> Option<Label> {
        let upper = name.trim().to_ascii_uppercase();
        let label = match upper.as_str() {
            "UTF-8" | "UTF8" => Label::Utf8,
            "UTF-16" | "UTF16" | "ISO-10646-UCS-2" => Label::Utf16,
            "UTF-16LE" => Label::Utf16Le,
            "UTF-16BE" => Label::Utf16Be,
            "US-ASCII" | "ASCII" => Label::Ascii,
            "ISO-8859-1" | "ISO_8859-1" | "LATIN1" | "L1" => Label::Latin1,
            _ => return None,
        };
        Some(label)
    }

    fn is_utf16(self) -> bool {
        matches!(self, Label::Utf16 | Label::Utf16Le | Label::Utf16Be)
    }

    fn encoding(self) -> Encoding {
        match self {
            Label::Utf8 => Encoding::Utf8,
            Label::Utf16 | Label::Utf16Be => Encoding::Utf16Be,
            Label::Utf16Le => Encoding::Utf16Le,
            Label::Ascii => Encoding::Ascii,
            Label::Latin1 => Encoding::Latin1,
        }
    }
}

impl Encoding {
    pub fn name(&self) -> &str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Utf16Le => "UTF-16LE",
            Encoding::Utf16Be => "UTF-16BE",
            Encoding::Ascii => "US-ASCII",
            Encoding::Latin1 => "ISO-8859-1",
            Encoding::Custom { name, .. } => name,
        }
    }

    fn is_utf16(&self) -> bool {
        matches!(self, Encoding::Utf16Le | Encoding::Utf16Be)
    }

    /// Number of source bytes `c` was decoded from.
    pub(crate) fn width(&self, c: char) -> usize {
        match self {
            Encoding::Utf8 => c.len_utf8(),
            Encoding::Utf16Le | Encoding::Utf16Be => c.len_utf16() * 2,
            _ => 1,
        }
    }

    fn decode_char(&self, input: &[u8]) -> Decoded {
        if input.is_empty() {
            return Decoded::Incomplete;
        }
        match self {
            Encoding::Utf8 => {
                let width = UTF8_CHAR_WIDTH[input[0] as usize] as usize;
                if width == 0 {
                    return Decoded::Invalid;
                }
                if input.len() < width {
                    return Decoded::Incomplete;
                }
                match std::str::from_utf8(&input[..width]) {
                    Ok(s) => match s.chars().next() {
                        Some(c) => Decoded::Char(c, width),
                        None => Decoded::Invalid,
                    },
                    Err(_) => Decoded::Invalid,
                }
            }
            Encoding::Utf16Le | Encoding::Utf16Be => {
                let unit = |at: usize| -> Option<u16> {
                    let pair = input.get(at..at + 2)?;
                    Some(if *self == Encoding::Utf16Le {
                        u16::from_le_bytes([pair[0], pair[1]])
                    } else {
                        u16::from_be_bytes([pair[0], pair[1]])
                    })
                };
                let first = match unit(0) {
                    Some(u) => u,
                    None => return Decoded::Incomplete,
                };
                if (0xD800..0xDC00).contains(&first) {
                    let second = match unit(2) {
                        Some(u) => u,
                        None => return Decoded::Incomplete,
                    };
                    match char::decode_utf16([first, second]).next() {
                        Some(Ok(c)) => Decoded::Char(c, 4),
                        _ => Decoded::Invalid,
                    }
                } else {
                    match char::decode_utf16([first]).next() {
                        Some(Ok(c)) => Decoded::Char(c, 2),
                        _ => Decoded::Invalid,
                    }
                }
            }
            Encoding::Ascii => {
                if input[0] < 0x80 {
                    Decoded::Char(input[0] as char, 1)
                } else {
                    Decoded::Invalid
                }
            }
            Encoding::Latin1 => Decoded::Char(input[0] as char, 1),
            Encoding::Custom { map, .. } => match map.get(input[0]) {
                Some(c) => Decoded::Char(c, 1),
                None => Decoded::Invalid,
            },
        }
    }
}

enum Decoded {
    Char(char, usize),
    Incomplete,
    Invalid,
}

/// Result of looking at the first bytes of a document.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Sniff {
    NeedMore,
    /// Detection done; this many leading bytes are a byte order mark.
    Done(usize),
}

/// How the encoding named by an XML declaration relates to the active one.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Declared {
    Keep,
    Switched,
    Unknown,
    Incorrect,
}

// Decoding stops after the first '>' while the document may still open with
// an XML declaration, so the declaration can switch encodings.
#[derive(Debug, PartialEq, Eq)]
enum Window {
    Open(usize),
    Held,
    Closed,
}

const DECL_OPEN: [char; 5] = ['<', '?', 'x', 'm', 'l'];

#[derive(Debug)]
pub(crate) struct Decoder {
    encoding: Encoding,
    forced: Option<Label>,
    sniffed: bool,
    window: Window,
}

impl Default for Decoder {
    fn default() -> Self {
        Decoder {
            encoding: Encoding::Utf8,
            forced: None,
            sniffed: false,
            window: Window::Open(0),
        }
    }
}

impl Decoder {
    pub(crate) fn encoding(&self) -> &Encoding {
        &self.encoding
    }

    pub(crate) fn width(&self, c: char) -> usize {
        self.encoding.width(c)
    }

    /// A transport-level encoding; the XML declaration can no longer change it.
    pub(crate) fn force(&mut self, label: Label) {
        self.encoding = label.encoding();
        self.forced = Some(label);
    }

    /// A caller table, either forced or in answer to a declaration.
    pub(crate) fn install_map(&mut self, name: &str, map: ByteMap, forced: bool) {
        debug!("decoding with caller supplied table for {}", name);
        self.encoding = Encoding::Custom {
            name: name.to_owned(),
            map: Box::new(map),
        };
        if forced {
            // any 8-bit label keeps declarations from switching again
            self.forced = Some(Label::Latin1);
        }
    }

    pub(crate) fn is_sniffed(&self) -> bool {
        self.sniffed
    }

    pub(crate) fn sniff(&mut self, raw: &[u8], is_final: bool) -> Sniff {
        let need = match raw.first() {
            None if is_final => 0,
            None => return Sniff::NeedMore,
            Some(0xEF) => 3,
            Some(0xFE) | Some(0xFF) | Some(0x3C) | Some(0x00) => 2,
            Some(_) => 0,
        };
        if raw.len() < need && !is_final {
            return Sniff::NeedMore;
        }
        self.sniffed = true;

        let utf16_allowed = match self.forced {
            None => true,
            Some(label) => label.is_utf16(),
        };
        let utf8_allowed = matches!(self.forced, None | Some(Label::Utf8));

        let bom = match raw {
            [0xEF, 0xBB, 0xBF, ..] if utf8_allowed => {
                self.encoding = Encoding::Utf8;
                3
            }
            [0xFE, 0xFF, ..] if utf16_allowed => {
                self.encoding = Encoding::Utf16Be;
                2
            }
            [0xFF, 0xFE, ..] if utf16_allowed => {
                self.encoding = Encoding::Utf16Le;
                2
            }
            [0x3C, 0x00, ..] if self.forced.is_none() || self.forced == Some(Label::Utf16) => {
                self.encoding = Encoding::Utf16Le;
                0
            }
            [0x00, 0x3C, ..] if self.forced.is_none() => {
                self.encoding = Encoding::Utf16Be;
                0
            }
            _ => 0,
        };
        if bom > 0 || self.encoding.is_utf16() {
            debug!("detected {} input", self.encoding.name());
        }
        Sniff::Done(bom)
    }

    /// Decodes as much of `raw` as is safe into `out`, returning the number of
    /// bytes used. Trailing bytes of an unfinished character stay in `raw`.
    pub(crate) fn decode(&mut self, raw: &[u8], out: &mut String) -> SaxResult<usize> {
        let mut used = 0;
        loop {
            match self.window {
                Window::Held => return Ok(used),
                Window::Closed => {
                    return self.decode_bulk(&raw[used..], out).map(|n| used + n);
                }
                Window::Open(seen) => {
                    let (c, width) = match self.encoding.decode_char(&raw[used..]) {
                        Decoded::Char(c, width) => (c, width),
                        Decoded::Incomplete => return Ok(used),
                        Decoded::Invalid => return Err(Error::InvalidToken),
                    };
                    out.push(c);
                    used += width;
                    self.window = if seen < DECL_OPEN.len() {
                        if DECL_OPEN[seen] == c {
                            Window::Open(seen + 1)
                        } else {
                            Window::Closed
                        }
                    } else if seen == DECL_OPEN.len() {
                        if is_space(c) {
                            Window::Open(seen + 1)
                        } else {
                            Window::Closed
                        }
                    } else if c == '>' {
                        Window::Held
                    } else {
                        Window::Open(seen + 1)
                    };
                }
            }
        }
    }

    fn decode_bulk(&self, raw: &[u8], out: &mut String) -> SaxResult<usize> {
        if self.encoding == Encoding::Utf8 {
            return match std::str::from_utf8(raw) {
                Ok(s) => {
                    out.push_str(s);
                    Ok(raw.len())
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    // valid_up_to guarantees this prefix is UTF-8
                    out.push_str(std::str::from_utf8(&raw[..valid]).map_err(|_| Error::InvalidToken)?);
                    match e.error_len() {
                        None => Ok(valid),
                        Some(_) if valid > 0 => Ok(valid),
                        Some(_) => Err(Error::InvalidToken),
                    }
                }
            };
        }
        let mut used = 0;
        loop {
            match self.encoding.decode_char(&raw[used..]) {
                Decoded::Char(c, width) => {
                    out.push(c);
                    used += width;
                }
                Decoded::Incomplete => return Ok(used),
                Decoded::Invalid if used > 0 => return Ok(used),
                Decoded::Invalid => return Err(Error::InvalidToken),
            }
        }
    }

    /// Decoding was held after a `>` that did not end a declaration.
    pub(crate) fn release_window(&mut self) {
        if self.window == Window::Held {
            self.window = Window::Closed;
        }
    }

    /// Called once the first token of the document has been consumed.
    pub(crate) fn close_decl_window(&mut self) {
        self.window = Window::Closed;
    }

    pub(crate) fn declared(&mut self, name: &str) -> Declared {
        if self.forced.is_some() {
            return Declared::Keep;
        }
        match Label::lookup(name) {
            Some(label) if label.is_utf16() => {
                if self.encoding.is_utf16() {
                    Declared::Keep
                } else {
                    Declared::Incorrect
                }
            }
            Some(label) => {
                if self.encoding.is_utf16() {
                    Declared::Incorrect
                } else {
                    let encoding = label.encoding();
                    if encoding != self.encoding {
                        debug!("switching to {} from XML declaration", encoding.name());
                        self.encoding = encoding;
                    }
                    Declared::Switched
                }
            }
            None if self.encoding.is_utf16() => Declared::Incorrect,
            None => Declared::Unknown,
        }
    }
}

fn is_space(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\n' || c == '\r'
}

#[test]
fn test_decl_window_holds_after_declaration() {
    let mut d = Decoder::default();
    let raw = b"<?xml version='1.0' encoding='latin1'?><r>\xe9</r>";
    assert_eq!(d.sniff(raw, false), Sniff::Done(0));
    let mut out = String::new();
    let used = d.decode(raw, &mut out).unwrap();
    assert_eq!(out, "<?xml version='1.0' encoding='latin1'?>");
    assert_eq!(d.declared("latin1"), Declared::Switched);
    d.close_decl_window();
    out.clear();
    d.decode(&raw[used..], &mut out).unwrap();
    assert_eq!(out, "<r>é</r>");
}

#[test]
fn test_window_closes_without_declaration() {
    let mut d = Decoder::default();
    let mut out = String::new();
    let raw = "<?xml-stylesheet href='a'?><r>ü</r>".as_bytes();
    assert_eq!(d.decode(raw, &mut out).unwrap(), raw.len());
    assert_eq!(out, "<?xml-stylesheet href='a'?><r>ü</r>");
}

#[test]
fn test_utf8_split_character_waits() {
    let mut d = Decoder::default();
    d.close_decl_window();
    let mut out = String::new();
    let bytes = "aß".as_bytes();
    assert_eq!(d.decode(&bytes[..2], &mut out).unwrap(), 1);
    assert_eq!(out, "a");
    assert_eq!(d.decode(&bytes[1..], &mut out).unwrap(), 2);
    assert_eq!(out, "aß");
}

#[test]
fn test_utf16_bom_detection() {
    let mut d = Decoder::default();
    let raw = [0xFF, 0xFE, b'<', 0, b'r', 0, b'/', 0, b'>', 0];
    assert_eq!(d.sniff(&raw, false), Sniff::Done(2));
    assert_eq!(d.encoding(), &Encoding::Utf16Le);
    let mut out = String::new();
    assert_eq!(d.decode(&raw[2..], &mut out).unwrap(), 8);
    assert_eq!(out, "<r/>");
    assert_eq!(d.declared("UTF-8"), Declared::Incorrect);
}

#[test]
fn test_sniff_waits_for_second_byte() {
    let mut d = Decoder::default();
    assert_eq!(d.sniff(b"<", false), Sniff::NeedMore);
    assert_eq!(d.sniff(b"<", true), Sniff::Done(0));
    assert_eq!(d.encoding(), &Encoding::Utf8);
}

#[test]
fn test_byte_map() {
    let mut points: Vec<i32> = (0..256).collect();
    points[128] = 0x20AC;
    points[129] = -1;
    let map = ByteMap::from_code_points(&points).unwrap();
    assert_eq!(map.get(128), Some('€'));
    assert_eq!(map.get(129), None);
    assert!(ByteMap::from_code_points(&points[..10]).is_err());
    points[5] = -2;
    assert!(ByteMap::from_code_points(&points).is_err());
}
