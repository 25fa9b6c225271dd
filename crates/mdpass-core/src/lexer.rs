//! Line splitting and column-aware cursors.
//!
//! The lexer cuts the input into physical lines for the block recognizer.
//! It uses `memchr` for line-ending detection (SIMD on supported platforms)
//! and accepts `\n`, `\r\n` and a lone `\r` as terminators.
//!
//! Indentation is measured in columns with tab stops every four columns.
//! A container prefix may consume only part of a tab; [`LineCursor`] keeps
//! track of that so the remaining columns still count as indentation.

use crate::span::Span;
use memchr::memchr2;

/// Width of a tab stop.
pub const TAB_STOP: usize = 4;

/// A single physical line from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    /// The line text, without its terminator.
    pub text: &'a str,
    /// Byte span of `text` in the original input.
    pub span: Span,
    /// Leading indentation in columns.
    pub indent: usize,
}

impl<'a> Line<'a> {
    fn new(text: &'a str, start: usize) -> Self {
        let mut col = 0;
        for b in text.bytes() {
            match b {
                b' ' => col += 1,
                b'\t' => col += TAB_STOP - col % TAB_STOP,
                _ => break,
            }
        }
        Line {
            text,
            span: Span::new(start, start + text.len()),
            indent: col,
        }
    }
}

/// Line-by-line reader over the whole input.
pub struct Lexer<'a> {
    input: &'a str,
    offset: usize,
}

impl<'a> Lexer<'a> {
    /// Create a lexer for the given input.
    #[inline]
    pub fn new(input: &'a str) -> Self {
        Self { input, offset: 0 }
    }

    #[inline(always)]
    fn is_eof(&self) -> bool {
        self.offset >= self.input.len()
    }

    fn read_line(&mut self) -> Option<Line<'a>> {
        if self.is_eof() {
            return None;
        }
        let bytes = self.input.as_bytes();
        let start = self.offset;
        let (end, next) = match memchr2(b'\n', b'\r', &bytes[start..]) {
            Some(pos) => {
                let end = start + pos;
                if bytes[end] == b'\r' && bytes.get(end + 1) == Some(&b'\n') {
                    (end, end + 2)
                } else {
                    (end, end + 1)
                }
            }
            None => (bytes.len(), bytes.len()),
        };
        self.offset = next;
        // Line terminators are ASCII, so both ends are char boundaries.
        Some(Line::new(&self.input[start..end], start))
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Line<'a>;

    #[inline]
    fn next(&mut self) -> Option<Line<'a>> {
        self.read_line()
    }
}

/// A position inside one line, tracked both as a byte offset and as a
/// column.
///
/// `col` may sit in the middle of a tab when a container prefix consumed
/// part of it; `pos` then still points at the tab byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCursor<'a> {
    text: &'a str,
    base: usize,
    pos: usize,
    col: usize,
}

impl<'a> LineCursor<'a> {
    /// Start a cursor at the beginning of a line.
    pub fn new(line: &Line<'a>) -> Self {
        Self {
            text: line.text,
            base: line.span.start,
            pos: 0,
            col: 0,
        }
    }

    /// Absolute byte offset in the input.
    #[inline]
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    /// The unconsumed rest of the line, starting at the current byte.
    #[inline]
    pub fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    /// Byte at `pos + ahead`, if any.
    #[inline]
    pub fn peek(&self, ahead: usize) -> Option<u8> {
        self.text.as_bytes().get(self.pos + ahead).copied()
    }

    /// Whether only whitespace remains.
    pub fn is_blank(&self) -> bool {
        self.rest().bytes().all(|b| b == b' ' || b == b'\t')
    }

    /// Columns of whitespace from the cursor, and the byte offset of the
    /// first non-whitespace byte (relative to the line start).
    pub fn indent(&self) -> (usize, usize) {
        let bytes = self.text.as_bytes();
        let mut col = self.col;
        let mut pos = self.pos;
        while pos < bytes.len() {
            match bytes[pos] {
                b' ' => col += 1,
                b'\t' => col += TAB_STOP - col % TAB_STOP,
                _ => break,
            }
            pos += 1;
        }
        (col - self.col, pos)
    }

    /// Consume up to `cols` columns of whitespace, splitting a tab if needed.
    pub fn skip_cols(&mut self, mut cols: usize) {
        let bytes = self.text.as_bytes();
        while cols > 0 && self.pos < bytes.len() {
            let width = match bytes[self.pos] {
                b' ' => 1,
                b'\t' => TAB_STOP - self.col % TAB_STOP,
                _ => break,
            };
            if width <= cols {
                self.pos += 1;
                self.col += width;
                cols -= width;
            } else {
                self.col += cols;
                cols = 0;
            }
        }
    }

    /// Consume all leading whitespace.
    pub fn skip_whitespace(&mut self) {
        let (cols, _) = self.indent();
        self.skip_cols(cols);
    }

    /// Consume `n` non-whitespace bytes (container markers).
    #[inline]
    pub fn advance(&mut self, n: usize) {
        self.pos += n;
        self.col += n;
    }

    /// Consume one column of whitespace if present (the optional space
    /// after `>` or a list marker).
    pub fn skip_one_space(&mut self) {
        if matches!(self.peek(0), Some(b' ') | Some(b'\t')) {
            self.skip_cols(1);
        }
    }

    /// Columns of a partially consumed tab still pending at the cursor.
    pub fn partial_tab(&self) -> usize {
        match self.peek(0) {
            Some(b'\t') if self.col % TAB_STOP != 0 => TAB_STOP - self.col % TAB_STOP,
            _ => 0,
        }
    }
}
