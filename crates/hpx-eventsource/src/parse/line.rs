//! Incremental line splitter and field classifier for `text/event-stream`.
//!
//! Bytes are pushed in arbitrary chunks with [`LineParser::feed`] and complete
//! lines are pulled back out one at a time with [`LineParser::next_line`].
//! Incomplete trailing content stays buffered until the next chunk supplies a
//! terminator.

use bytes::{Buf, Bytes, BytesMut};
use bytes_utils::{Str, StrMut};

use super::constants::{BOM, COLON, CR, EMPTY_STR, LF};

/// Field names understood by the event stream interpretation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldName {
    Event,
    Data,
    Id,
    Retry,
    /// Any other name. Parsed, then dropped by the accumulator.
    Ignored,
}

impl FieldName {
    fn from_bytes(name: &[u8]) -> Self {
        match name {
            b"event" => Self::Event,
            b"data" => Self::Data,
            b"id" => Self::Id,
            b"retry" => Self::Retry,
            _ => Self::Ignored,
        }
    }
}

/// A single classified line of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Empty line, terminates the pending event.
    Blank,
    /// Line starting with `:`.
    Comment,
    /// `name:value`, or a bare `name` with an empty value.
    Field { name: FieldName, value: Str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BomState {
    /// Nothing decided yet, the first bytes may still turn out to be a BOM.
    Pending,
    Done,
}

/// Splits a byte stream into [`Line`]s.
///
/// Recognises `\n`, `\r` and `\r\n` terminators in any mix. A `\r` ends its
/// line immediately; when it is the last buffered byte the parser remembers to
/// swallow a `\n` that opens the next chunk, so a split `\r\n` still counts
/// once.
#[derive(Debug)]
pub struct LineParser {
    buffer: BytesMut,
    bom: BomState,
    skip_lf: bool,
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LineParser {
    /// Create a parser positioned at the start of a fresh stream.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            bom: BomState::Pending,
            skip_lf: false,
        }
    }

    /// Append a chunk of raw bytes.
    pub fn feed(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }

        self.buffer.extend_from_slice(chunk);

        if self.bom == BomState::Pending {
            match starts_with_bom(&self.buffer) {
                Some(true) => {
                    self.buffer.advance(BOM.len());
                    self.bom = BomState::Done;
                }
                Some(false) => self.bom = BomState::Done,
                None => {}
            }
        }
    }

    /// Pull the next complete line, or `None` when more input is needed.
    pub fn next_line(&mut self) -> Option<Line> {
        if self.bom == BomState::Pending {
            return None;
        }

        if self.skip_lf {
            let &first = self.buffer.first()?;
            if first == LF {
                self.buffer.advance(1);
            }
            self.skip_lf = false;
        }

        let eol = memchr::memchr2(CR, LF, &self.buffer)?;
        let terminator = self.buffer[eol];
        let line = self.buffer.split_to(eol).freeze();
        self.buffer.advance(1);

        if terminator == CR {
            match self.buffer.first() {
                Some(&LF) => self.buffer.advance(1),
                Some(_) => {}
                None => self.skip_lf = true,
            }
        }

        Some(classify(line))
    }

    /// Iterate over every complete line currently buffered.
    pub fn lines(&mut self) -> Lines<'_> {
        Lines { parser: self }
    }
}

/// Iterator returned by [`LineParser::lines`].
#[derive(Debug)]
pub struct Lines<'a> {
    parser: &'a mut LineParser,
}

impl Iterator for Lines<'_> {
    type Item = Line;

    fn next(&mut self) -> Option<Line> {
        self.parser.next_line()
    }
}

/// `Some(true)` when `buf` opens with a BOM, `Some(false)` when it cannot,
/// `None` while too few bytes have arrived to tell.
const fn starts_with_bom(buf: &[u8]) -> Option<bool> {
    match buf.len() {
        0 => None,
        1 => {
            if buf[0] == BOM[0] {
                None
            } else {
                Some(false)
            }
        }
        2 => {
            if buf[0] == BOM[0] && buf[1] == BOM[1] {
                None
            } else {
                Some(false)
            }
        }
        _gte_3 => Some(buf[0] == BOM[0] && buf[1] == BOM[1] && buf[2] == BOM[2]),
    }
}

fn classify(line: Bytes) -> Line {
    if line.is_empty() {
        return Line::Blank;
    }

    match memchr::memchr(COLON, &line) {
        Some(0) => Line::Comment,
        Some(colon) => {
            let name = FieldName::from_bytes(&line[..colon]);
            if name == FieldName::Ignored {
                return Line::Field {
                    name,
                    value: EMPTY_STR,
                };
            }

            let mut value = line.slice(colon + 1..);
            if value.first() == Some(&b' ') {
                value.advance(1);
            }
            Line::Field {
                name,
                value: decode(value),
            }
        }
        None => Line::Field {
            name: FieldName::from_bytes(&line),
            value: EMPTY_STR,
        },
    }
}

/// Decode a line fragment as UTF-8, substituting U+FFFD for invalid sequences.
fn decode(bytes: Bytes) -> Str {
    match core::str::from_utf8(&bytes) {
        // Safety: the bytes were just validated as UTF-8.
        Ok(_) => unsafe { Str::from_inner_unchecked(bytes) },
        Err(_) => {
            let lossy = String::from_utf8_lossy(&bytes);
            // Safety: the buffer is empty, there are no bytes to be invalid.
            let mut buf = unsafe { StrMut::from_inner_unchecked(BytesMut::with_capacity(lossy.len())) };
            buf.push_str(&lossy);
            buf.freeze()
        }
    }
}
