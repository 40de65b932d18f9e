//! Bound expression tree with compile-time column resolution.
//!
//! [`BoundExpr`] is the executor's internal representation of expressions.
//! Unlike the AST [`Expr`](crate::sql::Expr), column references are resolved
//! to positional indices at bind time, function calls point at the chosen
//! overload, and implicit conversions are explicit [`BoundExpr::Cast`] nodes.

use std::fmt;
use std::sync::Arc;

use crate::datum::{Type, Value};
use crate::sql::{BinaryOperator, UnaryOperator};

use super::function::{ReturnType, ScalarFunction};

/// An expression tree with column references resolved to positional indices.
///
/// Each variant carries enough information to compute its output [`Type`]
/// via [`BoundExpr::ty()`] and its nullability via [`BoundExpr::nullable()`].
#[derive(Debug, Clone, PartialEq)]
pub enum BoundExpr {
    /// Literal value.
    Constant(Value),
    /// Column reference resolved to a positional index.
    Column {
        /// Positional index into the row.
        index: usize,
        /// Resolved column name for display purposes.
        name: String,
        /// Type of the referenced column.
        ty: Type,
        /// Whether the referenced column may hold NULL.
        nullable: bool,
    },
    /// Character at a zero-based position of a string.
    Index {
        expr: Box<BoundExpr>,
        index: Box<BoundExpr>,
    },
    /// Binary operation.
    BinaryOp {
        left: Box<BoundExpr>,
        op: BinaryOperator,
        right: Box<BoundExpr>,
    },
    /// Unary operation.
    UnaryOp {
        op: UnaryOperator,
        operand: Box<BoundExpr>,
    },
    /// IS [NOT] NULL test.
    IsNull { expr: Box<BoundExpr>, negated: bool },
    /// IN list test.
    InList {
        expr: Box<BoundExpr>,
        list: Vec<BoundExpr>,
        negated: bool,
    },
    /// BETWEEN range test.
    Between {
        expr: Box<BoundExpr>,
        low: Box<BoundExpr>,
        high: Box<BoundExpr>,
        negated: bool,
    },
    /// LIKE pattern matching.
    Like {
        expr: Box<BoundExpr>,
        pattern: Box<BoundExpr>,
        negated: bool,
    },
    /// CASE expression (searched or simple).
    Case {
        operand: Option<Box<BoundExpr>>,
        when_clauses: Vec<BoundWhenClause>,
        else_result: Option<Box<BoundExpr>>,
        /// Common type of all results.
        ty: Type,
    },
    /// Explicit or implicit conversion.
    Cast { expr: Box<BoundExpr>, ty: Type },
    /// Scalar function call with arguments already converted to the
    /// overload's parameter types.
    Call {
        func: Arc<ScalarFunction>,
        args: Vec<BoundExpr>,
        /// Result type (resolved for `CommonArgument` overloads).
        ty: Type,
    },
}

/// A WHEN clause in a bound CASE expression.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundWhenClause {
    /// Condition (searched CASE) or comparison value (simple CASE).
    pub condition: BoundExpr,
    /// Result expression when the condition matches.
    pub result: BoundExpr,
}

impl BoundExpr {
    /// Returns the output type of this expression. The untyped NULL literal
    /// reports [`Type::Null`].
    pub fn ty(&self) -> Type {
        match self {
            BoundExpr::Constant(v) => v.data_type(),
            BoundExpr::Column { ty, .. } => *ty,
            BoundExpr::Index { .. } => Type::Char,
            BoundExpr::BinaryOp { op, left, right } => binary_op_type(*op, left.ty(), right.ty()),
            BoundExpr::UnaryOp { op, operand } => match op {
                UnaryOperator::Not => Type::Boolean,
                UnaryOperator::Minus | UnaryOperator::Plus => operand.ty(),
            },
            BoundExpr::IsNull { .. }
            | BoundExpr::InList { .. }
            | BoundExpr::Between { .. }
            | BoundExpr::Like { .. } => Type::Boolean,
            BoundExpr::Case { ty, .. } => *ty,
            BoundExpr::Cast { ty, .. } => *ty,
            BoundExpr::Call { ty, .. } => *ty,
        }
    }

    /// Returns true if evaluating this expression may yield NULL.
    pub fn nullable(&self) -> bool {
        match self {
            BoundExpr::Constant(v) => v.is_null(),
            BoundExpr::Column { nullable, .. } => *nullable,
            BoundExpr::Index { .. } => true,
            BoundExpr::BinaryOp { left, right, .. } => left.nullable() || right.nullable(),
            BoundExpr::UnaryOp { operand, .. } => operand.nullable(),
            BoundExpr::IsNull { .. } => false,
            BoundExpr::InList { expr, list, .. } => {
                expr.nullable() || list.iter().any(BoundExpr::nullable)
            }
            BoundExpr::Between {
                expr, low, high, ..
            } => expr.nullable() || low.nullable() || high.nullable(),
            BoundExpr::Like { expr, pattern, .. } => expr.nullable() || pattern.nullable(),
            BoundExpr::Case {
                when_clauses,
                else_result,
                ..
            } => match else_result {
                Some(e) => e.nullable() || when_clauses.iter().any(|c| c.result.nullable()),
                None => true,
            },
            BoundExpr::Cast { expr, .. } => expr.nullable(),
            BoundExpr::Call { func, args, .. } => {
                if func.null_propagating() {
                    args.iter().any(BoundExpr::nullable)
                } else {
                    matches!(func.signature().returns, ReturnType::CommonArgument)
                        && args.iter().all(BoundExpr::nullable)
                }
            }
        }
    }

    /// Wraps this expression in a [`BoundExpr::Cast`] if its type doesn't
    /// match the target type.
    ///
    /// NULL literals and expressions already matching the target type pass
    /// through unchanged.
    pub fn coerce(self, target: Type) -> BoundExpr {
        if matches!(&self, BoundExpr::Constant(Value::Null)) || self.ty() == target {
            return self;
        }
        if let BoundExpr::Constant(v) = &self
            && let Some(widened) = widen_constant(v, target)
        {
            return BoundExpr::Constant(widened);
        }
        BoundExpr::Cast {
            expr: Box::new(self),
            ty: target,
        }
    }

    /// Calls `f` with the index of every column this expression reads.
    pub fn visit_columns(&self, f: &mut dyn FnMut(usize)) {
        match self {
            BoundExpr::Constant(_) => {}
            BoundExpr::Column { index, .. } => f(*index),
            BoundExpr::Index { expr, index } => {
                expr.visit_columns(f);
                index.visit_columns(f);
            }
            BoundExpr::BinaryOp { left, right, .. } => {
                left.visit_columns(f);
                right.visit_columns(f);
            }
            BoundExpr::UnaryOp { operand, .. } => operand.visit_columns(f),
            BoundExpr::IsNull { expr, .. } => expr.visit_columns(f),
            BoundExpr::InList { expr, list, .. } => {
                expr.visit_columns(f);
                list.iter().for_each(|e| e.visit_columns(f));
            }
            BoundExpr::Between {
                expr, low, high, ..
            } => {
                expr.visit_columns(f);
                low.visit_columns(f);
                high.visit_columns(f);
            }
            BoundExpr::Like { expr, pattern, .. } => {
                expr.visit_columns(f);
                pattern.visit_columns(f);
            }
            BoundExpr::Case {
                operand,
                when_clauses,
                else_result,
                ..
            } => {
                if let Some(op) = operand {
                    op.visit_columns(f);
                }
                for clause in when_clauses {
                    clause.condition.visit_columns(f);
                    clause.result.visit_columns(f);
                }
                if let Some(e) = else_result {
                    e.visit_columns(f);
                }
            }
            BoundExpr::Cast { expr, .. } => expr.visit_columns(f),
            BoundExpr::Call { args, .. } => args.iter().for_each(|e| e.visit_columns(f)),
        }
    }

    /// Returns the sorted, de-duplicated column indices this expression reads.
    pub fn column_indices(&self) -> Vec<usize> {
        let mut out = Vec::new();
        self.visit_columns(&mut |i| out.push(i));
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Shifts every column index down by `offset`, so an expression bound
    /// against a joined row can be evaluated against its right-hand part.
    pub fn rebase(self, offset: usize) -> BoundExpr {
        let rebase = |e: Box<BoundExpr>| Box::new(e.rebase(offset));
        match self {
            BoundExpr::Constant(_) => self,
            BoundExpr::Column {
                index,
                name,
                ty,
                nullable,
            } => BoundExpr::Column {
                index: index - offset,
                name,
                ty,
                nullable,
            },
            BoundExpr::Index { expr, index } => BoundExpr::Index {
                expr: rebase(expr),
                index: rebase(index),
            },
            BoundExpr::BinaryOp { left, op, right } => BoundExpr::BinaryOp {
                left: rebase(left),
                op,
                right: rebase(right),
            },
            BoundExpr::UnaryOp { op, operand } => BoundExpr::UnaryOp {
                op,
                operand: rebase(operand),
            },
            BoundExpr::IsNull { expr, negated } => BoundExpr::IsNull {
                expr: rebase(expr),
                negated,
            },
            BoundExpr::InList {
                expr,
                list,
                negated,
            } => BoundExpr::InList {
                expr: rebase(expr),
                list: list.into_iter().map(|e| e.rebase(offset)).collect(),
                negated,
            },
            BoundExpr::Between {
                expr,
                low,
                high,
                negated,
            } => BoundExpr::Between {
                expr: rebase(expr),
                low: rebase(low),
                high: rebase(high),
                negated,
            },
            BoundExpr::Like {
                expr,
                pattern,
                negated,
            } => BoundExpr::Like {
                expr: rebase(expr),
                pattern: rebase(pattern),
                negated,
            },
            BoundExpr::Case {
                operand,
                when_clauses,
                else_result,
                ty,
            } => BoundExpr::Case {
                operand: operand.map(rebase),
                when_clauses: when_clauses
                    .into_iter()
                    .map(|c| BoundWhenClause {
                        condition: c.condition.rebase(offset),
                        result: c.result.rebase(offset),
                    })
                    .collect(),
                else_result: else_result.map(rebase),
                ty,
            },
            BoundExpr::Cast { expr, ty } => BoundExpr::Cast {
                expr: rebase(expr),
                ty,
            },
            BoundExpr::Call { func, args, ty } => BoundExpr::Call {
                func,
                args: args.into_iter().map(|e| e.rebase(offset)).collect(),
                ty,
            },
        }
    }
}

/// Lossless conversions applied to literals at bind time.
fn widen_constant(value: &Value, target: Type) -> Option<Value> {
    match (value, target) {
        (Value::Integer(n), Type::Bigint) => Some(Value::Bigint(i64::from(*n))),
        (Value::Integer(n), Type::Double) => Some(Value::Double(f64::from(*n))),
        (Value::Bigint(n), Type::Double) => Some(Value::Double(*n as f64)),
        (Value::Char(c), Type::Text) => Some(Value::Text(c.to_string())),
        _ => None,
    }
}

/// Numeric widening rank: Integer < Bigint < Double.
pub(crate) fn numeric_rank(ty: Type) -> Option<u8> {
    match ty {
        Type::Integer => Some(1),
        Type::Bigint => Some(2),
        Type::Double => Some(3),
        _ => None,
    }
}

/// Returns the wider of two numeric types.
pub(crate) fn wider_numeric(a: Type, b: Type) -> Option<Type> {
    let (ra, rb) = (numeric_rank(a)?, numeric_rank(b)?);
    Some(if ra >= rb { a } else { b })
}

/// Computes the output type of a binary operation from its operator and
/// operand types.
pub(crate) fn binary_op_type(op: BinaryOperator, left: Type, right: Type) -> Type {
    use BinaryOperator::*;
    match op {
        Eq | Neq | Lt | LtEq | Gt | GtEq | And | Or => Type::Boolean,
        Concat => Type::Text,
        Add | Sub | Mul | Div | Mod => match (left, right) {
            (Type::Timestamp, Type::Timestamp) => Type::Interval,
            (Type::Timestamp, Type::Interval) | (Type::Interval, Type::Timestamp) => {
                Type::Timestamp
            }
            (Type::Interval, _) | (_, Type::Interval) => Type::Interval,
            (Type::Null, t) | (t, Type::Null) => t,
            (l, r) => wider_numeric(l, r).unwrap_or(Type::Double),
        },
    }
}

impl fmt::Display for BoundExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundExpr::Constant(v) => write!(f, "{}", v),
            BoundExpr::Column { index, name, .. } => write!(f, "$col{} ({})", index, name),
            BoundExpr::Index { expr, index } => write!(f, "{}[{}]", expr, index),
            BoundExpr::BinaryOp { left, op, right } => {
                write!(f, "({} {} {})", left, op.as_str(), right)
            }
            BoundExpr::UnaryOp { op, operand } => match op {
                UnaryOperator::Not => write!(f, "(NOT {})", operand),
                _ => write!(f, "({}{})", op.as_str(), operand),
            },
            BoundExpr::IsNull { expr, negated } => {
                if *negated {
                    write!(f, "({} IS NOT NULL)", expr)
                } else {
                    write!(f, "({} IS NULL)", expr)
                }
            }
            BoundExpr::InList {
                expr,
                list,
                negated,
            } => {
                let items: Vec<String> = list.iter().map(|e| e.to_string()).collect();
                let neg = if *negated { " NOT" } else { "" };
                write!(f, "({}{} IN ({}))", expr, neg, items.join(", "))
            }
            BoundExpr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let neg = if *negated { " NOT" } else { "" };
                write!(f, "({}{} BETWEEN {} AND {})", expr, neg, low, high)
            }
            BoundExpr::Like {
                expr,
                pattern,
                negated,
            } => {
                let neg = if *negated { " NOT" } else { "" };
                write!(f, "({}{} LIKE {})", expr, neg, pattern)
            }
            BoundExpr::Case {
                operand,
                when_clauses,
                else_result,
                ..
            } => {
                write!(f, "CASE")?;
                if let Some(op) = operand {
                    write!(f, " {}", op)?;
                }
                for clause in when_clauses {
                    write!(f, " WHEN {} THEN {}", clause.condition, clause.result)?;
                }
                if let Some(e) = else_result {
                    write!(f, " ELSE {}", e)?;
                }
                write!(f, " END")
            }
            BoundExpr::Cast { expr, ty } => {
                write!(f, "CAST({} AS {})", expr, ty.display_name())
            }
            BoundExpr::Call { func, args, .. } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", func.signature().name, args.join(", "))
            }
        }
    }
}
