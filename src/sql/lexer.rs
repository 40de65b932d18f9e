//! Query lexer.
//!
//! Lexical errors do not stop the [`Lexer`]: they are yielded as
//! [`TokenKind::Error`] tokens and lexing resumes after the bad input. The
//! parser reports the first one.

use std::iter::Peekable;
use std::str::CharIndices;

use super::error::Span;
use super::token::{Token, TokenKind};

/// Tokenizer over query text. Yields a final [`TokenKind::Eof`] and then
/// stops.
///
/// Keywords match case-insensitively. Strings use `'...'` and identifiers may
/// be written `"..."`; both escape their quote by doubling it. `--` line
/// comments and nestable `/* */` block comments are skipped.
pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            finished: false,
        }
    }

    /// Byte offset of the next unread character.
    fn offset(&mut self) -> usize {
        self.chars.peek().map_or(self.input.len(), |&(i, _)| i)
    }

    fn first(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn second(&self) -> Option<char> {
        self.chars.clone().nth(1).map(|(_, c)| c)
    }

    fn bump(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }

    fn eat(&mut self, expected: char) -> bool {
        self.chars.next_if(|&(_, c)| c == expected).is_some()
    }

    /// Consumes characters while `pred` holds; returns how many were consumed.
    fn eat_while(&mut self, pred: impl Fn(char) -> bool) -> usize {
        let mut n = 0;
        while self.chars.next_if(|&(_, c)| pred(c)).is_some() {
            n += 1;
        }
        n
    }

    fn error(&mut self, start: usize, message: impl Into<String>) -> Token {
        let end = self.offset();
        Token::new(TokenKind::Error(message.into()), Span::new(start, end))
    }

    /// Skips whitespace and comments. An unterminated block comment comes
    /// back as an error token.
    fn skip_trivia(&mut self) -> Option<Token> {
        loop {
            self.eat_while(char::is_whitespace);
            match (self.first(), self.second()) {
                (Some('-'), Some('-')) => {
                    self.eat_while(|c| c != '\n');
                }
                (Some('/'), Some('*')) => {
                    let start = self.offset();
                    self.bump();
                    self.bump();
                    let mut depth = 1usize;
                    while depth > 0 {
                        match self.bump() {
                            None => return Some(self.error(start, "unterminated block comment")),
                            Some('/') if self.eat('*') => depth += 1,
                            Some('*') if self.eat('/') => depth -= 1,
                            Some(_) => {}
                        }
                    }
                }
                _ => return None,
            }
        }
    }

    fn scan(&mut self) -> Token {
        if let Some(error) = self.skip_trivia() {
            return error;
        }
        let start = self.offset();
        let Some(ch) = self.first() else {
            return Token::new(TokenKind::Eof, Span::at(start));
        };

        match ch {
            '\'' => match self.quoted('\'') {
                Some(text) => self.token(start, TokenKind::StringLit(text)),
                None => self.error(start, "unterminated string literal"),
            },
            '"' => match self.quoted('"') {
                Some(text) => self.token(start, TokenKind::QuotedIdentifier(text)),
                None => self.error(start, "unterminated quoted identifier"),
            },
            c if c.is_ascii_digit() => self.number(start),
            '.' if self.second().is_some_and(|c| c.is_ascii_digit()) => self.number(start),
            c if c.is_ascii_alphabetic() || c == '_' => self.word(start),
            _ => self.symbol(start),
        }
    }

    fn token(&mut self, start: usize, kind: TokenKind) -> Token {
        let end = self.offset();
        Token::new(kind, Span::new(start, end))
    }

    /// Reads a `quote`-delimited body, resolving doubled quotes. `None` when
    /// the input ends first.
    fn quoted(&mut self, quote: char) -> Option<String> {
        self.bump();
        let mut text = String::new();
        loop {
            match self.bump()? {
                c if c == quote && self.eat(quote) => text.push(quote),
                c if c == quote => return Some(text),
                c => text.push(c),
            }
        }
    }

    fn number(&mut self, start: usize) -> Token {
        let is_digit = |c: char| c.is_ascii_digit();
        self.eat_while(is_digit);

        let mut float = false;
        if self.first() == Some('.') && self.second().is_some_and(is_digit) {
            float = true;
            self.bump();
            self.eat_while(is_digit);
        }
        if matches!(self.first(), Some('e' | 'E')) {
            float = true;
            self.bump();
            if matches!(self.first(), Some('+' | '-')) {
                self.bump();
            }
            if self.eat_while(is_digit) == 0 {
                return self.error(start, "invalid number literal");
            }
        }

        let end = self.offset();
        let text = &self.input[start..end];
        let kind = if float {
            text.parse().ok().map(TokenKind::FloatLit)
        } else {
            text.parse().ok().map(TokenKind::IntegerLit)
        };
        match kind {
            Some(kind) => Token::new(kind, Span::new(start, end)),
            None => self.error(start, "invalid number literal"),
        }
    }

    fn word(&mut self, start: usize) -> Token {
        self.eat_while(|c| c.is_ascii_alphanumeric() || c == '_');
        let end = self.offset();
        let text = &self.input[start..end];
        let kind = TokenKind::from_keyword(text)
            .unwrap_or_else(|| TokenKind::Identifier(text.to_string()));
        Token::new(kind, Span::new(start, end))
    }

    fn symbol(&mut self, start: usize) -> Token {
        let Some(ch) = self.bump() else {
            return Token::new(TokenKind::Eof, Span::at(start));
        };
        let kind = match ch {
            '<' if self.eat('>') => TokenKind::Neq,
            '<' if self.eat('=') => TokenKind::LtEq,
            '<' => TokenKind::Lt,
            '>' if self.eat('=') => TokenKind::GtEq,
            '>' => TokenKind::Gt,
            '!' if self.eat('=') => TokenKind::Neq,
            '|' if self.eat('|') => TokenKind::Concat,
            '=' => TokenKind::Eq,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Asterisk,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '.' => TokenKind::Dot,
            other => return self.error(start, format!("unexpected character '{other}'")),
        };
        self.token(start, kind)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.finished {
            return None;
        }
        let token = self.scan();
        self.finished = token.is_eof();
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::token::Keyword;

    fn lex(input: &str) -> Vec<TokenKind> {
        Lexer::new(input).map(|t| t.kind).collect()
    }

    fn kw(keyword: Keyword) -> TokenKind {
        TokenKind::Keyword(keyword)
    }

    fn ident(name: &str) -> TokenKind {
        TokenKind::Identifier(name.to_string())
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(lex(""), vec![TokenKind::Eof]);
        assert_eq!(lex("  \n\t  "), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(
            lex("select CROSS Apply"),
            vec![
                kw(Keyword::Select),
                kw(Keyword::Cross),
                kw(Keyword::Apply),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_identifiers() {
        assert_eq!(
            lex("foo Population _test"),
            vec![ident("foo"), ident("Population"), ident("_test"), TokenKind::Eof]
        );
    }

    #[test]
    fn test_quoted_identifiers() {
        assert_eq!(
            lex(r#""Home & Garden" "has""quotes""#),
            vec![
                TokenKind::QuotedIdentifier("Home & Garden".to_string()),
                TokenKind::QuotedIdentifier("has\"quotes".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            lex("0 42 3.5 1e10 2.5e-3"),
            vec![
                TokenKind::IntegerLit(0),
                TokenKind::IntegerLit(42),
                TokenKind::FloatLit(3.5),
                TokenKind::FloatLit(1e10),
                TokenKind::FloatLit(2.5e-3),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_literals() {
        assert_eq!(
            lex("'hello' 'it''s' ''"),
            vec![
                TokenKind::StringLit("hello".to_string()),
                TokenKind::StringLit("it's".to_string()),
                TokenKind::StringLit("".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            lex("+ - * / % = <> != < <= > >= ||"),
            vec![
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Asterisk,
                TokenKind::Slash,
                TokenKind::Percent,
                TokenKind::Eq,
                TokenKind::Neq,
                TokenKind::Neq,
                TokenKind::Lt,
                TokenKind::LtEq,
                TokenKind::Gt,
                TokenKind::GtEq,
                TokenKind::Concat,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_indexing_brackets() {
        assert_eq!(
            lex("e.Email[0]"),
            vec![
                ident("e"),
                TokenKind::Dot,
                ident("Email"),
                TokenKind::LBracket,
                TokenKind::IntegerLit(0),
                TokenKind::RBracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            lex("SELECT -- line\n/* outer /* nested */ comment */ FROM"),
            vec![kw(Keyword::Select), kw(Keyword::From), TokenKind::Eof]
        );
    }

    #[test]
    fn test_unterminated_string() {
        assert_eq!(
            lex("'unterminated"),
            vec![
                TokenKind::Error("unterminated string literal".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_block_comment() {
        assert_eq!(
            lex("SELECT /* unterminated"),
            vec![
                kw(Keyword::Select),
                TokenKind::Error("unterminated block comment".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unexpected_character() {
        assert_eq!(
            lex("SELECT @ FROM"),
            vec![
                kw(Keyword::Select),
                TokenKind::Error("unexpected character '@'".to_string()),
                kw(Keyword::From),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_multibyte_character_is_not_split() {
        assert_eq!(
            lex("'é' é"),
            vec![
                TokenKind::StringLit("é".to_string()),
                TokenKind::Error("unexpected character 'é'".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_token_spans() {
        let tokens: Vec<_> = Lexer::new("SELECT foo").collect();
        assert_eq!(tokens[0].span, Span::new(0, 6));
        assert_eq!(tokens[1].span, Span::new(7, 10));
        assert_eq!(tokens[2].span, Span::at(10));
    }

    #[test]
    fn test_iterator_stops_after_eof() {
        let mut lexer = Lexer::new("SELECT");
        assert!(lexer.next().is_some());
        assert!(lexer.next().is_some());
        assert!(lexer.next().is_none());
    }
}
