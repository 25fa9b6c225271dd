//! Byte ranges into the input buffer.
//!
//! Source lines, leaf-block contents and inline pieces are all described by
//! a `Span` into a buffer that outlives them, so nothing is copied until a
//! consumer asks for it.

/// A half-open byte range `[start, end)`.
///
/// # Example
///
/// ```rust
/// use mdpass_core::span::Span;
///
/// let span = Span::new(2, 5);
/// assert_eq!(span.len(), 3);
/// assert_eq!(span.slice("ab cde fg"), "cde");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Span {
    /// Starting byte offset (inclusive).
    pub start: usize,
    /// Ending byte offset (exclusive).
    pub end: usize,
}

impl Span {
    /// Create a new span from byte offsets.
    #[inline]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Length of this span in bytes.
    #[inline]
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Whether the span covers no bytes.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Borrow the covered text.
    ///
    /// Spans produced by the parser always fall on character boundaries,
    /// because every split point is an ASCII byte.
    #[inline]
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }
}
