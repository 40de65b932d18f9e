//! Expression parsing with precedence climbing.
//!
//! This module implements expression parsing using the precedence climbing
//! algorithm, which handles operator precedence and associativity correctly.

use super::ast::{
    BinaryOperator, Expr, NullOrdering, OrderByItem, SortDirection, UnaryOperator, WhenClause,
    WindowSpec,
};
use super::error::SyntaxError;
use super::parser::Parser;
use super::token::{Keyword, TokenKind};
use crate::datum::Type;

/// Operator precedence levels (higher = binds tighter).
///
/// Precedence (low to high):
/// 1. OR
/// 2. AND
/// 3. NOT (unary)
/// 4. =, <>, <, <=, >, >=, IS NULL, IN, BETWEEN, LIKE
/// 5. ||
/// 6. +, -
/// 7. *, /, %
/// 8. Unary -, +
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    Lowest = 0,
    Or = 1,
    And = 2,
    Not = 3,
    Comparison = 4,
    Concat = 5,
    AddSub = 6,
    MulDiv = 7,
    UnaryPlusMinus = 8,
}

impl Precedence {
    /// Returns the next higher precedence level.
    pub fn next(self) -> Self {
        match self {
            Precedence::Lowest => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Not,
            Precedence::Not => Precedence::Comparison,
            Precedence::Comparison => Precedence::Concat,
            Precedence::Concat => Precedence::AddSub,
            Precedence::AddSub => Precedence::MulDiv,
            Precedence::MulDiv => Precedence::UnaryPlusMinus,
            Precedence::UnaryPlusMinus => Precedence::UnaryPlusMinus,
        }
    }
}

impl<'a> Parser<'a> {
    /// Parses an expression.
    pub fn parse_expr(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_expr_with_precedence(Precedence::Lowest)
    }

    /// Parses an expression with minimum precedence.
    pub fn parse_expr_with_precedence(
        &mut self,
        min_prec: Precedence,
    ) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_unary_expr()?;

        loop {
            let Some((op, prec)) = self.peek_binary_op() else {
                break;
            };

            if prec < min_prec {
                break;
            }

            self.advance();

            // Left-associative: the right operand binds one level tighter
            let right = self.parse_expr_with_precedence(prec.next())?;

            left = Expr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parses a unary expression (NOT, -, +) or postfix expression.
    fn parse_unary_expr(&mut self) -> Result<Expr, SyntaxError> {
        if self.consume_keyword(Keyword::Not) {
            let operand = self.parse_expr_with_precedence(Precedence::Not)?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Not,
                operand: Box::new(operand),
            });
        }

        if self.consume_token(TokenKind::Minus) {
            let operand = self.parse_expr_with_precedence(Precedence::UnaryPlusMinus)?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Minus,
                operand: Box::new(operand),
            });
        }

        if self.consume_token(TokenKind::Plus) {
            let operand = self.parse_expr_with_precedence(Precedence::UnaryPlusMinus)?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Plus,
                operand: Box::new(operand),
            });
        }

        self.parse_postfix_expr()
    }

    /// Parses postfix forms: `[index]`, IS NULL, IN, BETWEEN, LIKE.
    fn parse_postfix_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_primary_expr()?;

        loop {
            // expr[index]
            if self.consume_token(TokenKind::LBracket) {
                let index = self.parse_expr()?;
                self.expect_token(TokenKind::RBracket)?;
                expr = Expr::Index {
                    expr: Box::new(expr),
                    index: Box::new(index),
                };
                continue;
            }

            // IS [NOT] NULL
            if self.consume_keyword(Keyword::Is) {
                let negated = self.consume_keyword(Keyword::Not);
                self.expect_keyword(Keyword::Null)?;
                expr = Expr::IsNull {
                    expr: Box::new(expr),
                    negated,
                };
                continue;
            }

            // NOT only continues a postfix form when IN/BETWEEN/LIKE follows
            let negated = self.check_keyword(Keyword::Not)
                && matches!(
                    self.peek_nth_kind(1),
                    Some(TokenKind::Keyword(Keyword::In | Keyword::Between | Keyword::Like))
                );
            if negated {
                self.advance();
            }

            // [NOT] IN (...)
            if self.consume_keyword(Keyword::In) {
                self.expect_token(TokenKind::LParen)?;
                let list = self.parse_expr_list()?;
                self.expect_token(TokenKind::RParen)?;
                expr = Expr::InList {
                    expr: Box::new(expr),
                    list,
                    negated,
                };
                continue;
            }

            // [NOT] BETWEEN low AND high
            if self.consume_keyword(Keyword::Between) {
                let low = self.parse_expr_with_precedence(Precedence::Concat)?;
                self.expect_keyword(Keyword::And)?;
                let high = self.parse_expr_with_precedence(Precedence::Concat)?;
                expr = Expr::Between {
                    expr: Box::new(expr),
                    low: Box::new(low),
                    high: Box::new(high),
                    negated,
                };
                continue;
            }

            // [NOT] LIKE pattern
            if self.consume_keyword(Keyword::Like) {
                let pattern = self.parse_expr_with_precedence(Precedence::Concat)?;
                expr = Expr::Like {
                    expr: Box::new(expr),
                    pattern: Box::new(pattern),
                    negated,
                };
                continue;
            }

            break;
        }

        Ok(expr)
    }

    /// Parses a primary expression (literals, identifiers, function calls, etc.).
    fn parse_primary_expr(&mut self) -> Result<Expr, SyntaxError> {
        if self.consume_keyword(Keyword::Null) {
            return Ok(Expr::Null);
        }

        if self.consume_keyword(Keyword::True) {
            return Ok(Expr::Boolean(true));
        }

        if self.consume_keyword(Keyword::False) {
            return Ok(Expr::Boolean(false));
        }

        if self.consume_keyword(Keyword::Case) {
            return self.parse_case_expr();
        }

        // CAST(expr AS type)
        if self.consume_keyword(Keyword::Cast) {
            self.expect_token(TokenKind::LParen)?;
            let expr = self.parse_expr()?;
            self.expect_keyword(Keyword::As)?;
            let data_type = self.parse_type_name()?;
            self.expect_token(TokenKind::RParen)?;
            return Ok(Expr::Cast {
                expr: Box::new(expr),
                data_type,
            });
        }

        match self.peek_kind() {
            Some(TokenKind::IntegerLit(n)) => {
                let n = *n;
                self.advance();
                return Ok(Expr::Integer(n));
            }
            Some(TokenKind::FloatLit(n)) => {
                let n = *n;
                self.advance();
                return Ok(Expr::Float(n));
            }
            Some(TokenKind::StringLit(s)) => {
                let s = s.clone();
                self.advance();
                return Ok(Expr::String(s));
            }
            _ => {}
        }

        // Parenthesized expression
        if self.consume_token(TokenKind::LParen) {
            let expr = self.parse_expr()?;
            self.expect_token(TokenKind::RParen)?;
            return Ok(Expr::Nested(Box::new(expr)));
        }

        // Identifier: column reference, function call, or alias-qualified either
        if let Some(TokenKind::Identifier(name) | TokenKind::QuotedIdentifier(name)) =
            self.peek_kind()
        {
            let name = name.clone();
            self.advance();

            if self.check_token(TokenKind::LParen) {
                return self.parse_function_call(None, name);
            }

            if self.consume_token(TokenKind::Dot) {
                let member = self.expect_identifier()?;
                if self.check_token(TokenKind::LParen) {
                    return self.parse_function_call(Some(name), member);
                }
                return Ok(Expr::ColumnRef {
                    table: Some(name),
                    column: member,
                });
            }

            return Ok(Expr::ColumnRef {
                table: None,
                column: name,
            });
        }

        Err(self.unexpected("expression"))
    }

    /// Parses a call's argument list and optional OVER clause.
    fn parse_function_call(
        &mut self,
        qualifier: Option<String>,
        name: String,
    ) -> Result<Expr, SyntaxError> {
        self.expect_token(TokenKind::LParen)?;

        let distinct = self.consume_keyword(Keyword::Distinct);
        let mut star = false;
        let mut args = Vec::new();

        if self.consume_token(TokenKind::Asterisk) {
            star = true;
        } else if !self.check_token(TokenKind::RParen) {
            args = self.parse_expr_list()?;
        }
        self.expect_token(TokenKind::RParen)?;

        let over = if self.consume_keyword(Keyword::Over) {
            Some(self.parse_window_spec()?)
        } else {
            None
        };

        Ok(Expr::Function {
            qualifier,
            name,
            args,
            distinct,
            star,
            over,
        })
    }

    /// Parses `(PARTITION BY ... ORDER BY ...)` after OVER.
    fn parse_window_spec(&mut self) -> Result<WindowSpec, SyntaxError> {
        self.expect_token(TokenKind::LParen)?;

        let partition_by = if self.consume_keyword(Keyword::Partition) {
            self.expect_keyword(Keyword::By)?;
            self.parse_expr_list()?
        } else {
            vec![]
        };

        let order_by = if self.consume_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By)?;
            self.parse_order_by_list()?
        } else {
            vec![]
        };

        self.expect_token(TokenKind::RParen)?;
        Ok(WindowSpec {
            partition_by,
            order_by,
        })
    }

    /// Parses ORDER BY item list.
    pub(crate) fn parse_order_by_list(&mut self) -> Result<Vec<OrderByItem>, SyntaxError> {
        let mut items = Vec::new();

        loop {
            let expr = self.parse_expr()?;

            let direction = if self.consume_keyword(Keyword::Asc) {
                Some(SortDirection::Asc)
            } else if self.consume_keyword(Keyword::Desc) {
                Some(SortDirection::Desc)
            } else {
                None
            };

            let nulls = if self.consume_keyword(Keyword::Nulls) {
                if self.consume_keyword(Keyword::First) {
                    NullOrdering::First
                } else if self.consume_keyword(Keyword::Last) {
                    NullOrdering::Last
                } else {
                    return Err(self.unexpected("FIRST or LAST"));
                }
            } else {
                NullOrdering::default()
            };

            items.push(OrderByItem {
                expr,
                direction,
                nulls,
            });

            if !self.consume_token(TokenKind::Comma) {
                break;
            }
        }

        Ok(items)
    }

    /// Parses a CASE expression.
    ///
    /// Supports both simple CASE (CASE expr WHEN value THEN result)
    /// and searched CASE (CASE WHEN condition THEN result).
    fn parse_case_expr(&mut self) -> Result<Expr, SyntaxError> {
        let operand = if !self.check_keyword(Keyword::When) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };

        let mut when_clauses = Vec::new();
        while self.consume_keyword(Keyword::When) {
            let condition = self.parse_expr()?;
            self.expect_keyword(Keyword::Then)?;
            let result = self.parse_expr()?;
            when_clauses.push(WhenClause { condition, result });
        }

        if when_clauses.is_empty() {
            return Err(self.unexpected("WHEN in CASE expression"));
        }

        let else_result = if self.consume_keyword(Keyword::Else) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };

        self.expect_keyword(Keyword::End)?;

        Ok(Expr::Case {
            operand,
            when_clauses,
            else_result,
        })
    }

    /// Parses a type name in `CAST(... AS type)`.
    fn parse_type_name(&mut self) -> Result<Type, SyntaxError> {
        let span = self.current_span();
        let name = self.expect_identifier()?;
        Type::from_name(&name)
            .ok_or_else(|| SyntaxError::new(format!("unknown type name '{name}'"), span))
    }

    /// Peeks at the next token and returns the binary operator and its precedence.
    fn peek_binary_op(&self) -> Option<(BinaryOperator, Precedence)> {
        match self.peek_kind()? {
            TokenKind::Keyword(Keyword::Or) => Some((BinaryOperator::Or, Precedence::Or)),
            TokenKind::Keyword(Keyword::And) => Some((BinaryOperator::And, Precedence::And)),
            TokenKind::Eq => Some((BinaryOperator::Eq, Precedence::Comparison)),
            TokenKind::Neq => Some((BinaryOperator::Neq, Precedence::Comparison)),
            TokenKind::Lt => Some((BinaryOperator::Lt, Precedence::Comparison)),
            TokenKind::LtEq => Some((BinaryOperator::LtEq, Precedence::Comparison)),
            TokenKind::Gt => Some((BinaryOperator::Gt, Precedence::Comparison)),
            TokenKind::GtEq => Some((BinaryOperator::GtEq, Precedence::Comparison)),
            TokenKind::Concat => Some((BinaryOperator::Concat, Precedence::Concat)),
            TokenKind::Plus => Some((BinaryOperator::Add, Precedence::AddSub)),
            TokenKind::Minus => Some((BinaryOperator::Sub, Precedence::AddSub)),
            TokenKind::Asterisk => Some((BinaryOperator::Mul, Precedence::MulDiv)),
            TokenKind::Slash => Some((BinaryOperator::Div, Precedence::MulDiv)),
            TokenKind::Percent => Some((BinaryOperator::Mod, Precedence::MulDiv)),
            _ => None,
        }
    }
}
