//! Tokens produced by the [`Lexer`](super::Lexer).

use std::fmt;

use super::error::Span;

/// A token and the byte range it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    IntegerLit(i64),
    FloatLit(f64),
    /// String literal with `''` escapes already resolved.
    StringLit(String),

    Identifier(String),
    /// `"..."` identifier; may collide with a keyword or contain spaces.
    QuotedIdentifier(String),
    Keyword(Keyword),

    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
    Eq,
    /// `<>` or `!=`
    Neq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Concat,

    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Dot,

    /// Lexical error (unterminated literal, stray character). The parser
    /// turns the first one it meets into a `SyntaxError`.
    Error(String),
    Eof,
}

impl TokenKind {
    /// Maps an identifier to its keyword token, if it is one.
    pub fn from_keyword(ident: &str) -> Option<Self> {
        Keyword::parse(ident).map(TokenKind::Keyword)
    }

    /// Spelling of an operator or punctuation token.
    pub fn symbol(&self) -> Option<&'static str> {
        let symbol = match self {
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Asterisk => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Eq => "=",
            TokenKind::Neq => "<>",
            TokenKind::Lt => "<",
            TokenKind::LtEq => "<=",
            TokenKind::Gt => ">",
            TokenKind::GtEq => ">=",
            TokenKind::Concat => "||",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Dot => ".",
            _ => return None,
        };
        Some(symbol)
    }
}

/// Describes the token the way syntax errors quote it.
impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(symbol) = self.symbol() {
            return write!(f, "'{symbol}'");
        }
        match self {
            TokenKind::IntegerLit(n) => write!(f, "integer '{n}'"),
            TokenKind::FloatLit(n) => write!(f, "float '{n}'"),
            TokenKind::StringLit(s) => write!(f, "string '{s}'"),
            TokenKind::Identifier(s) => write!(f, "identifier '{s}'"),
            TokenKind::QuotedIdentifier(s) => write!(f, "identifier '\"{s}\"'"),
            TokenKind::Keyword(kw) => write!(f, "keyword '{kw}'"),
            TokenKind::Error(msg) => write!(f, "invalid token ({msg})"),
            _ => write!(f, "end of input"),
        }
    }
}

macro_rules! keywords {
    ($($variant:ident => $text:literal,)*) => {
        /// Reserved words. Matched case-insensitively; type names used in
        /// `CAST` are ordinary identifiers and are not listed.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Keyword {
            $($variant,)*
        }

        impl Keyword {
            /// Every keyword, in declaration order.
            pub const ALL: &'static [Keyword] = &[$(Keyword::$variant,)*];

            /// Canonical upper-case spelling.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Keyword::$variant => $text,)*
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s.to_ascii_uppercase().as_str() {
                    $($text => Some(Keyword::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

keywords! {
    With => "WITH",
    Select => "SELECT",
    From => "FROM",
    Where => "WHERE",
    As => "AS",
    Distinct => "DISTINCT",
    All => "ALL",
    Group => "GROUP",
    Having => "HAVING",
    Order => "ORDER",
    By => "BY",
    Asc => "ASC",
    Desc => "DESC",
    Limit => "LIMIT",
    Offset => "OFFSET",
    Nulls => "NULLS",
    First => "FIRST",
    Last => "LAST",
    Join => "JOIN",
    Inner => "INNER",
    Left => "LEFT",
    Right => "RIGHT",
    Full => "FULL",
    Outer => "OUTER",
    Cross => "CROSS",
    Apply => "APPLY",
    On => "ON",
    Pivot => "PIVOT",
    For => "FOR",
    Over => "OVER",
    Partition => "PARTITION",
    And => "AND",
    Or => "OR",
    Not => "NOT",
    Is => "IS",
    Null => "NULL",
    True => "TRUE",
    False => "FALSE",
    In => "IN",
    Between => "BETWEEN",
    Like => "LIKE",
    Case => "CASE",
    When => "WHEN",
    Then => "THEN",
    Else => "ELSE",
    End => "END",
    Cast => "CAST",
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_parse_ignores_case() {
        assert_eq!(Keyword::parse("SELECT"), Some(Keyword::Select));
        assert_eq!(Keyword::parse("pivot"), Some(Keyword::Pivot));
        assert_eq!(Keyword::parse("ApPlY"), Some(Keyword::Apply));
        assert_eq!(Keyword::parse("integer"), None);
    }

    #[test]
    fn test_every_keyword_parses_from_its_spelling() {
        for kw in Keyword::ALL {
            assert_eq!(Keyword::parse(kw.as_str()), Some(*kw));
            assert_eq!(Keyword::parse(&kw.as_str().to_lowercase()), Some(*kw));
        }
    }

    #[test]
    fn test_token_descriptions() {
        assert_eq!(
            TokenKind::Keyword(Keyword::Select).to_string(),
            "keyword 'SELECT'"
        );
        assert_eq!(
            TokenKind::Identifier("foo".to_string()).to_string(),
            "identifier 'foo'"
        );
        assert_eq!(TokenKind::IntegerLit(42).to_string(), "integer '42'");
        assert_eq!(TokenKind::LBracket.to_string(), "'['");
        assert_eq!(TokenKind::Neq.to_string(), "'<>'");
        assert_eq!(TokenKind::Eof.to_string(), "end of input");
    }
}
