//! Syntax errors.

use std::fmt;

/// Byte range `[start, end)` in the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Zero-width span at `pos`.
    pub fn at(pos: usize) -> Self {
        Self::new(pos, pos)
    }
}

/// A query that could not be tokenized or parsed.
///
/// The span points at the offending fragment; [`SyntaxError::fragment`]
/// recovers its text from the original query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at position {}", .span.start + 1)]
pub struct SyntaxError {
    pub message: String,
    pub span: Span,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }

    /// `expected X, found Y`.
    pub fn expected(expected: impl fmt::Display, found: impl fmt::Display, span: Span) -> Self {
        Self::new(format!("expected {expected}, found {found}"), span)
    }

    /// The query ended where `expected` was required.
    pub fn end_of_input(expected: impl fmt::Display, pos: usize) -> Self {
        Self::new(
            format!("unexpected end of input, expected {expected}"),
            Span::at(pos),
        )
    }

    /// 1-based position of the first offending byte.
    pub fn position(&self) -> usize {
        self.span.start + 1
    }

    /// The part of `input` the span covers; empty when out of range.
    pub fn fragment<'a>(&self, input: &'a str) -> &'a str {
        input.get(self.span.start..self.span.end).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_one_based_position() {
        let err = SyntaxError::expected("identifier", "','", Span::new(5, 6));
        assert_eq!(err.position(), 6);
        assert_eq!(
            err.to_string(),
            "expected identifier, found ',' at position 6"
        );
    }

    #[test]
    fn test_fragment() {
        let err = SyntaxError::new("bad", Span::new(7, 11));
        assert_eq!(err.fragment("SELECT oops FROM t"), "oops");
        assert_eq!(SyntaxError::new("bad", Span::new(40, 50)).fragment("x"), "");
        assert_eq!(SyntaxError::end_of_input("FROM", 3).fragment("abc"), "");
    }
}
