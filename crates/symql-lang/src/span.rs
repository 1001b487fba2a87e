//! Byte ranges of forms in reader input, used to point errors at their source.

use std::ops::Range;

/// Half-open byte range `start..end` into the reader input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Zero-width span at `offset`, used for end-of-input errors.
    pub fn point(offset: usize) -> Self {
        Self::new(offset, offset)
    }

    /// Smallest span holding both, e.g. an opening bracket and its close.
    pub fn merge(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// Width in bytes.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Range<usize>> for Span {
    fn from(range: Range<usize>) -> Self {
        Span::new(range.start, range.end)
    }
}

/// A form paired with where it was read.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub value: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(value: T, span: Span) -> Self {
        Self { value, span }
    }

    /// Replace the form, keeping its location.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Spanned<U> {
        Spanned::new(f(self.value), self.span)
    }
}

/// 1-based line and character column of a byte offset in `source`.
///
/// Offsets past the end land after the last character.
pub fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let before: String = source
        .char_indices()
        .take_while(|(i, _)| *i < offset)
        .map(|(_, c)| c)
        .collect();
    match before.rfind('\n') {
        Some(newline) => (
            before.matches('\n').count() + 1,
            before[newline + 1..].chars().count() + 1,
        ),
        None => (1, before.chars().count() + 1),
    }
}
