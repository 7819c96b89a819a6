/// Progress through the document, in the units callers report errors in.
///
/// `line` starts at 1, `column` counts characters since the last line break,
/// `bytes` counts source bytes consumed (in the document's own encoding).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Position {
    pub line: u64,
    pub column: u64,
    bytes: u64,
    after_cr: bool,
}

impl Default for Position {
    fn default() -> Self {
        Position {
            line: 1,
            column: 0,
            bytes: 0,
            after_cr: false,
        }
    }
}

impl Position {
    /// Byte index in expat's convention: -1 until the first byte is consumed,
    /// afterwards the count of bytes consumed so far.
    pub fn byte_index(&self) -> i64 {
        if self.bytes == 0 {
            -1
        } else {
            self.bytes as i64
        }
    }

    pub fn consumed_bytes(&self) -> u64 {
        self.bytes
    }

    /// Bytes that carry no character (a byte order mark).
    pub(crate) fn skip_bytes(&mut self, count: usize) {
        self.bytes += count as u64;
    }

    /// `width` maps every character to the number of source bytes it came from.
    pub(crate) fn advance<F>(&mut self, text: &str, width: F)
    where
        F: Fn(char) -> usize,
    {
        for c in text.chars() {
            self.bytes += width(c) as u64;
            match c {
                '\n' if self.after_cr => {
                    // second half of \r\n, already counted
                    self.after_cr = false;
                }
                '\n' => {
                    self.line += 1;
                    self.column = 0;
                }
                '\r' => {
                    self.line += 1;
                    self.column = 0;
                    self.after_cr = true;
                }
                _ => {
                    self.column += 1;
                    self.after_cr = false;
                }
            }
        }
    }
}

#[test]
fn test_position_line_breaks() {
    let mut p = Position::default();
    assert_eq!(p.byte_index(), -1);
    p.advance("ab\r\ncd\re\n", |c| c.len_utf8());
    assert_eq!(p.line, 4);
    assert_eq!(p.column, 0);
    assert_eq!(p.byte_index(), 9);

    // \r and \n in separate calls still make one break
    let mut p = Position::default();
    p.advance("x\r", |c| c.len_utf8());
    p.advance("\ny", |c| c.len_utf8());
    assert_eq!(p.line, 2);
    assert_eq!(p.column, 1);
}

#[test]
fn test_position_counts_source_width() {
    let mut p = Position::default();
    p.skip_bytes(2);
    p.advance("ß<", |c| c.len_utf16() * 2);
    assert_eq!(p.column, 2);
    assert_eq!(p.consumed_bytes(), 6);
}
