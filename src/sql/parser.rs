//! Query parser using recursive descent.
//!
//! The [`Parser`] converts a stream of tokens into an Abstract Syntax Tree (AST).
//! It uses recursive descent for most constructs and precedence climbing for
//! expression parsing.

use std::fmt;

use super::ast::*;
use super::error::{Span, SyntaxError};
use super::lexer::Lexer;
use super::token::{Keyword, Token, TokenKind};

/// Query parser that converts tokens into an AST.
///
/// The parser implements recursive descent parsing for queries.
/// Expression parsing uses precedence climbing (see `expr.rs`).
pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    input: &'a str,
}

/// Parses a complete query text.
pub fn parse_query(input: &str) -> Result<Query, SyntaxError> {
    Parser::new(input).parse()
}

impl<'a> Parser<'a> {
    /// Creates a new parser for the given query text.
    pub fn new(input: &'a str) -> Self {
        Self {
            tokens: Lexer::new(input).collect(),
            pos: 0,
            input,
        }
    }

    /// Parses the input as a single query.
    ///
    /// # Errors
    ///
    /// Returns a [`SyntaxError`] for lexical errors, empty input, or any
    /// input that is not a valid query.
    pub fn parse(&mut self) -> Result<Query, SyntaxError> {
        let lexical = self.tokens.iter().find_map(|t| match &t.kind {
            TokenKind::Error(message) => Some(SyntaxError::new(message.clone(), t.span)),
            _ => None,
        });
        if let Some(err) = lexical {
            return Err(err);
        }

        if self.is_eof() {
            return Err(SyntaxError::end_of_input("SELECT or WITH", self.input.len()));
        }

        let query = self.parse_query()?;

        // Optional trailing semicolon
        self.consume_token(TokenKind::Semicolon);

        // Check for unexpected trailing tokens
        if !self.is_eof() {
            return Err(self.unexpected("end of input"));
        }

        Ok(query)
    }

    /// Parses `[WITH cte [, cte]*] select`.
    pub(crate) fn parse_query(&mut self) -> Result<Query, SyntaxError> {
        let mut with = Vec::new();
        if self.consume_keyword(Keyword::With) {
            loop {
                let name = self.expect_identifier()?;
                self.expect_keyword(Keyword::As)?;
                self.expect_token(TokenKind::LParen)?;
                let query = self.parse_query()?;
                self.expect_token(TokenKind::RParen)?;
                with.push(Cte {
                    name,
                    query: Box::new(query),
                });
                if !self.consume_token(TokenKind::Comma) {
                    break;
                }
            }
        }

        let body = self.parse_select_stmt()?;
        Ok(Query { with, body })
    }

    /// Parses a SELECT statement.
    pub(crate) fn parse_select_stmt(&mut self) -> Result<SelectStmt, SyntaxError> {
        self.expect_keyword(Keyword::Select)?;

        // DISTINCT / ALL
        let distinct = if self.consume_keyword(Keyword::Distinct) {
            true
        } else {
            self.consume_keyword(Keyword::All);
            false
        };

        // Select list
        let columns = self.parse_select_list()?;

        // FROM clause
        let from = if self.consume_keyword(Keyword::From) {
            Some(self.parse_from_clause()?)
        } else {
            None
        };

        // WHERE clause
        let where_clause = if self.consume_keyword(Keyword::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        // GROUP BY clause
        let group_by = if self.consume_keyword(Keyword::Group) {
            self.expect_keyword(Keyword::By)?;
            self.parse_expr_list()?
        } else {
            vec![]
        };

        // HAVING clause
        let having = if self.consume_keyword(Keyword::Having) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        // ORDER BY clause
        let order_by = if self.consume_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By)?;
            self.parse_order_by_list()?
        } else {
            vec![]
        };

        // LIMIT clause
        let limit = if self.consume_keyword(Keyword::Limit) {
            Some(self.expect_count()?)
        } else {
            None
        };

        // OFFSET clause
        let offset = if self.consume_keyword(Keyword::Offset) {
            Some(self.expect_count()?)
        } else {
            None
        };

        Ok(SelectStmt {
            distinct,
            columns,
            from,
            where_clause,
            group_by,
            having,
            order_by,
            limit,
            offset,
        })
    }

    /// Parses the select list (columns/expressions).
    fn parse_select_list(&mut self) -> Result<Vec<SelectItem>, SyntaxError> {
        let mut items = Vec::new();

        loop {
            items.push(self.parse_select_item()?);
            if !self.consume_token(TokenKind::Comma) {
                break;
            }
        }

        Ok(items)
    }

    /// Parses a single select item.
    fn parse_select_item(&mut self) -> Result<SelectItem, SyntaxError> {
        // Check for *
        if self.consume_token(TokenKind::Asterisk) {
            return Ok(SelectItem::Wildcard);
        }

        // Check for alias.* or expression
        if let Some(TokenKind::Identifier(name) | TokenKind::QuotedIdentifier(name)) =
            self.peek_kind()
        {
            let name = name.clone();

            if self.peek_nth_kind(1) == Some(&TokenKind::Dot)
                && self.peek_nth_kind(2) == Some(&TokenKind::Asterisk)
            {
                self.advance(); // identifier
                self.advance(); // .
                self.advance(); // *
                return Ok(SelectItem::QualifiedWildcard(name));
            }
        }

        // Expression with optional alias
        let expr = self.parse_expr()?;
        let alias = self.parse_optional_alias()?;

        Ok(SelectItem::Expr { expr, alias })
    }

    /// Parses `[AS] alias` where the bare form must not be a keyword.
    fn parse_optional_alias(&mut self) -> Result<Option<String>, SyntaxError> {
        if self.consume_keyword(Keyword::As) {
            return Ok(Some(self.expect_identifier()?));
        }
        match self.peek_kind() {
            Some(TokenKind::Identifier(name) | TokenKind::QuotedIdentifier(name)) => {
                let alias = name.clone();
                self.advance();
                Ok(Some(alias))
            }
            _ => Ok(None),
        }
    }

    /// Parses the FROM clause: the source tree, then an optional PIVOT.
    fn parse_from_clause(&mut self) -> Result<FromClause, SyntaxError> {
        let source = self.parse_table_ref()?;

        let pivot = if self.consume_keyword(Keyword::Pivot) {
            Some(self.parse_pivot()?)
        } else {
            None
        };

        Ok(FromClause { source, pivot })
    }

    /// Parses a source reference followed by any joins and cross applies.
    fn parse_table_ref(&mut self) -> Result<TableRef, SyntaxError> {
        let mut table_ref = self.parse_primary_table_ref()?;

        loop {
            let join_type = if self.consume_keyword(Keyword::Cross) {
                if self.consume_keyword(Keyword::Apply) {
                    let call = self.parse_expr()?;
                    if !matches!(call, Expr::Function { qualifier: Some(_), over: None, .. }) {
                        let span = self.current_span();
                        return Err(SyntaxError::new(
                            "CROSS APPLY expects a call of the form alias.Method(args)",
                            span,
                        ));
                    }
                    self.consume_keyword(Keyword::As);
                    let alias = self.expect_identifier()?;
                    table_ref = TableRef::CrossApply {
                        left: Box::new(table_ref),
                        call,
                        alias,
                    };
                    continue;
                }
                self.expect_keyword(Keyword::Join)?;
                Some(JoinType::Cross)
            } else if self.consume_keyword(Keyword::Inner) {
                self.expect_keyword(Keyword::Join)?;
                Some(JoinType::Inner)
            } else if self.consume_keyword(Keyword::Left) {
                self.consume_keyword(Keyword::Outer);
                self.expect_keyword(Keyword::Join)?;
                Some(JoinType::Left)
            } else if self.consume_keyword(Keyword::Right) {
                self.consume_keyword(Keyword::Outer);
                self.expect_keyword(Keyword::Join)?;
                Some(JoinType::Right)
            } else if self.consume_keyword(Keyword::Full) {
                self.consume_keyword(Keyword::Outer);
                self.expect_keyword(Keyword::Join)?;
                Some(JoinType::Full)
            } else if self.consume_keyword(Keyword::Join) {
                Some(JoinType::Inner)
            } else {
                None
            };

            let Some(join_type) = join_type else {
                break;
            };

            let right = self.parse_primary_table_ref()?;

            let condition = if join_type == JoinType::Cross {
                None
            } else {
                self.expect_keyword(Keyword::On)?;
                Some(self.parse_expr()?)
            };

            table_ref = TableRef::Join {
                left: Box::new(table_ref),
                join_type,
                right: Box::new(right),
                condition,
            };
        }

        Ok(table_ref)
    }

    /// Parses a primary source: a derived table or a (dotted, optionally called) name.
    fn parse_primary_table_ref(&mut self) -> Result<TableRef, SyntaxError> {
        // Subquery
        if self.consume_token(TokenKind::LParen) {
            let query = self.parse_query()?;
            self.expect_token(TokenKind::RParen)?;

            // Subquery alias is required
            self.consume_keyword(Keyword::As);
            let alias = self.expect_identifier()?;

            return Ok(TableRef::Subquery {
                query: Box::new(query),
                alias,
            });
        }

        let mut name = vec![self.expect_identifier()?];
        while self.consume_token(TokenKind::Dot) {
            name.push(self.expect_identifier()?);
        }

        let args = if self.consume_token(TokenKind::LParen) {
            let args = if self.check_token(TokenKind::RParen) {
                vec![]
            } else {
                self.parse_expr_list()?
            };
            self.expect_token(TokenKind::RParen)?;
            Some(args)
        } else {
            None
        };

        let alias = self.parse_optional_alias()?;

        Ok(TableRef::Source { name, args, alias })
    }

    /// Parses `(aggregate FOR column IN (values)) [AS alias]` after PIVOT.
    fn parse_pivot(&mut self) -> Result<Pivot, SyntaxError> {
        self.expect_token(TokenKind::LParen)?;
        let aggregate = self.parse_expr()?;
        self.expect_keyword(Keyword::For)?;
        let for_column = self.parse_expr_with_precedence(super::expr::Precedence::Concat)?;
        self.expect_keyword(Keyword::In)?;
        self.expect_token(TokenKind::LParen)?;
        let values = self.parse_expr_list()?;
        self.expect_token(TokenKind::RParen)?;
        self.expect_token(TokenKind::RParen)?;

        let alias = self.parse_optional_alias()?;

        Ok(Pivot {
            aggregate,
            for_column,
            values,
            alias,
        })
    }

    // ==================== Helper methods ====================

    /// Returns true if at end of tokens.
    pub(crate) fn is_eof(&self) -> bool {
        self.peek().is_none_or(|t| t.is_eof())
    }

    /// Peeks at the current token.
    pub(crate) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    /// Peeks at the kind of the current token.
    pub(crate) fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    /// Peeks at the nth token ahead.
    pub(crate) fn peek_nth_kind(&self, n: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + n).map(|t| &t.kind)
    }

    /// Advances to the next token.
    pub(crate) fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    /// Returns the span of the current token.
    pub(crate) fn current_span(&self) -> Span {
        self.peek().map_or(Span::at(self.input.len()), |t| t.span)
    }

    /// Error for the current token when `expected` was required.
    pub(crate) fn unexpected(&self, expected: impl fmt::Display) -> SyntaxError {
        let found = self
            .peek()
            .map_or_else(|| "end of input".to_string(), |t| t.kind.to_string());
        SyntaxError::expected(expected, found, self.current_span())
    }

    /// Checks if the current token is a specific keyword.
    pub(crate) fn check_keyword(&self, kw: Keyword) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Keyword(k)) if *k == kw)
    }

    /// Consumes the current token if it's a specific keyword.
    pub(crate) fn consume_keyword(&mut self, kw: Keyword) -> bool {
        if self.check_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Expects a specific keyword, returning an error if not found.
    pub(crate) fn expect_keyword(&mut self, kw: Keyword) -> Result<(), SyntaxError> {
        if self.consume_keyword(kw) {
            Ok(())
        } else {
            Err(self.unexpected(format_args!("keyword '{kw}'")))
        }
    }

    /// Checks if the current token matches.
    pub(crate) fn check_token(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(&kind)
    }

    /// Consumes the current token if it matches.
    pub(crate) fn consume_token(&mut self, kind: TokenKind) -> bool {
        if self.check_token(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Expects a specific token, returning an error if not found.
    pub(crate) fn expect_token(&mut self, kind: TokenKind) -> Result<(), SyntaxError> {
        if self.consume_token(kind.clone()) {
            Ok(())
        } else {
            Err(self.unexpected(&kind))
        }
    }

    /// Expects an identifier, returning its name.
    pub(crate) fn expect_identifier(&mut self) -> Result<String, SyntaxError> {
        match self.peek_kind() {
            Some(TokenKind::Identifier(name) | TokenKind::QuotedIdentifier(name)) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => {
                Err(self.unexpected("identifier"))
            }
        }
    }

    /// Expects a non-negative integer literal (LIMIT/OFFSET).
    fn expect_count(&mut self) -> Result<u64, SyntaxError> {
        match self.peek_kind() {
            Some(TokenKind::IntegerLit(n)) if *n >= 0 => {
                let n = *n as u64;
                self.advance();
                Ok(n)
            }
            _ => {
                Err(self.unexpected("non-negative integer"))
            }
        }
    }

    /// Parses a comma-separated list of expressions.
    pub(crate) fn parse_expr_list(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        let mut list = vec![self.parse_expr()?];
        while self.consume_token(TokenKind::Comma) {
            list.push(self.parse_expr()?);
        }
        Ok(list)
    }
}
