//! AST expression binding.
//!
//! [`ExprBinder`] turns an AST [`Expr`] into a [`BoundExpr`]: column
//! references become positions, literals get their narrowest type, operands
//! are converted along the implicit-conversion ladder, and scalar calls are
//! resolved to one overload. Every bound node's type is recorded in the
//! [`Metadata`] under the node's canonical text.

use crate::datum::{Type, Value};
use crate::executor::{
    AggregateFunction, BoundExpr, BoundWhenClause, ParamType, ReturnType, WindowFunction,
};
use crate::sql::{BinaryOperator, Expr, UnaryOperator};

use super::error::BindError;
use super::functions::{FunctionRegistry, common_type, common_type_of, result_type};
use super::metadata::Metadata;
use super::scope::Scope;

/// Binds expressions of one clause against a [`Scope`].
pub struct ExprBinder<'a> {
    scope: Scope<'a>,
    functions: &'a FunctionRegistry,
    metadata: &'a mut Metadata,
    clause: &'static str,
}

impl<'a> ExprBinder<'a> {
    /// Creates a binder for expressions of `clause` (used in error messages).
    pub fn new(
        scope: Scope<'a>,
        functions: &'a FunctionRegistry,
        metadata: &'a mut Metadata,
        clause: &'static str,
    ) -> Self {
        Self {
            scope,
            functions,
            metadata,
            clause,
        }
    }

    /// Binds an expression.
    pub fn bind(&mut self, expr: &Expr) -> Result<BoundExpr, BindError> {
        if let Some(index) = self.scope.substitution(expr) {
            let column = self.column(index);
            self.metadata.record_type(expr.to_string(), column.ty());
            return Ok(column);
        }
        let bound = self.bind_inner(expr)?;
        self.metadata.record_type(expr.to_string(), bound.ty());
        Ok(bound)
    }

    /// Binds an expression used as a condition (WHERE, HAVING, ON, CASE WHEN,
    /// AND/OR/NOT operands).
    ///
    /// A text-typed result is truth-tested, so `WHERE f(x)` and
    /// `WHERE f(x) = true` agree for every `f`.
    pub fn bind_predicate(&mut self, expr: &Expr) -> Result<BoundExpr, BindError> {
        let bound = self.bind(expr)?;
        match bound.ty() {
            Type::Boolean | Type::Null => Ok(bound),
            Type::Text | Type::Char => Ok(bound.coerce(Type::Boolean)),
            other => Err(BindError::mismatch(
                format!("{} condition {}", self.clause, expr),
                Type::Boolean.display_name(),
                other,
            )),
        }
    }

    fn column(&self, index: usize) -> BoundExpr {
        let desc = &self.scope.columns()[index];
        BoundExpr::Column {
            index,
            name: desc.name.clone(),
            ty: desc.ty,
            nullable: desc.nullable,
        }
    }

    fn bind_inner(&mut self, expr: &Expr) -> Result<BoundExpr, BindError> {
        match expr {
            Expr::Null => Ok(BoundExpr::Constant(Value::Null)),
            Expr::Boolean(b) => Ok(BoundExpr::Constant(Value::Boolean(*b))),
            Expr::Integer(n) => Ok(BoundExpr::Constant(match i32::try_from(*n) {
                Ok(small) => Value::Integer(small),
                Err(_) => Value::Bigint(*n),
            })),
            Expr::Float(f) => Ok(BoundExpr::Constant(Value::Double(*f))),
            Expr::String(s) => Ok(BoundExpr::Constant(Value::Text(s.clone()))),

            Expr::ColumnRef { table, column } => {
                let index = self.scope.resolve(table.as_deref(), column)?;
                Ok(self.column(index))
            }

            Expr::Index { expr: target, index } => {
                let target_bound = self.bind(target)?;
                if !matches!(target_bound.ty(), Type::Text | Type::Char | Type::Null) {
                    return Err(BindError::mismatch(
                        format!("index into {}", target),
                        Type::Text.display_name(),
                        target_bound.ty(),
                    ));
                }
                let index_bound = self.bind(index)?;
                if !matches!(index_bound.ty(), Type::Integer | Type::Bigint | Type::Null) {
                    return Err(BindError::mismatch(
                        format!("index {}", index),
                        Type::Integer.display_name(),
                        index_bound.ty(),
                    ));
                }
                Ok(BoundExpr::Index {
                    expr: Box::new(target_bound),
                    index: Box::new(index_bound),
                })
            }

            Expr::Nested(inner) => self.bind(inner),

            Expr::BinaryOp { left, op, right } => self.bind_binary(expr, left, *op, right),

            Expr::UnaryOp { op, operand } => {
                let bound = match op {
                    UnaryOperator::Not => self.bind_predicate(operand)?,
                    UnaryOperator::Minus | UnaryOperator::Plus => {
                        let bound = self.bind(operand)?;
                        let ty = bound.ty();
                        if !(ty.is_numeric() || matches!(ty, Type::Interval | Type::Null)) {
                            return Err(BindError::mismatch(
                                expr.to_string(),
                                "numeric or interval",
                                ty,
                            ));
                        }
                        bound
                    }
                };
                Ok(BoundExpr::UnaryOp {
                    op: *op,
                    operand: Box::new(bound),
                })
            }

            Expr::IsNull { expr, negated } => Ok(BoundExpr::IsNull {
                expr: Box::new(self.bind(expr)?),
                negated: *negated,
            }),

            Expr::InList {
                expr: target,
                list,
                negated,
            } => {
                let mut bound = vec![self.bind(target)?];
                for item in list {
                    bound.push(self.bind(item)?);
                }
                let mut bound = self.unify(expr, bound)?.into_iter();
                let Some(target) = bound.next() else {
                    return Err(BindError::Unsupported(format!("empty IN list in {}", expr)));
                };
                Ok(BoundExpr::InList {
                    expr: Box::new(target),
                    list: bound.collect(),
                    negated: *negated,
                })
            }

            Expr::Between {
                expr: target,
                low,
                high,
                negated,
            } => {
                let bound = vec![self.bind(target)?, self.bind(low)?, self.bind(high)?];
                let mut bound = self.unify(expr, bound)?.into_iter();
                match (bound.next(), bound.next(), bound.next()) {
                    (Some(target), Some(low), Some(high)) => Ok(BoundExpr::Between {
                        expr: Box::new(target),
                        low: Box::new(low),
                        high: Box::new(high),
                        negated: *negated,
                    }),
                    _ => Err(BindError::Unsupported(expr.to_string())),
                }
            }

            Expr::Like {
                expr: target,
                pattern,
                negated,
            } => {
                let target = self.bind_text(expr, target)?;
                let pattern = self.bind_text(expr, pattern)?;
                Ok(BoundExpr::Like {
                    expr: Box::new(target),
                    pattern: Box::new(pattern),
                    negated: *negated,
                })
            }

            Expr::Case {
                operand,
                when_clauses,
                else_result,
            } => self.bind_case(expr, operand.as_deref(), when_clauses, else_result.as_deref()),

            Expr::Cast { expr, data_type } => Ok(self.bind(expr)?.coerce(*data_type)),

            Expr::Function {
                qualifier,
                name,
                args,
                star,
                over,
                ..
            } => {
                if over.is_some() || WindowFunction::from_name(name).is_some_and(|f| {
                    !matches!(f, WindowFunction::Aggregate(_))
                }) {
                    return Err(BindError::Unsupported(format!(
                        "window function {} in {}",
                        expr, self.clause
                    )));
                }
                if qualifier.is_none() && AggregateFunction::from_name(name).is_some() {
                    return Err(if self.clause == "WHERE" {
                        BindError::AggregateInWhere(expr.to_string())
                    } else {
                        BindError::Unsupported(format!("aggregate {} in {}", expr, self.clause))
                    });
                }
                if let Some(q) = qualifier {
                    return Err(BindError::Unsupported(format!(
                        "table-valued method {}.{} outside FROM or CROSS APPLY",
                        q, name
                    )));
                }
                if *star {
                    return Err(BindError::Unsupported(format!("{}(*)", name)));
                }
                self.bind_call(expr, name, args)
            }
        }
    }

    fn bind_binary(
        &mut self,
        expr: &Expr,
        left: &Expr,
        op: BinaryOperator,
        right: &Expr,
    ) -> Result<BoundExpr, BindError> {
        use BinaryOperator::*;

        let (l, r) = match op {
            And | Or => (self.bind_predicate(left)?, self.bind_predicate(right)?),
            Concat => (self.bind(left)?, self.bind(right)?),
            Eq | Neq | Lt | LtEq | Gt | GtEq => {
                let (l, r) = (self.bind(left)?, self.bind(right)?);
                let target = common_type(l.ty(), r.ty()).ok_or_else(|| BindError::TypeMismatch {
                    context: expr.to_string(),
                    expected: l.ty().display_name().to_string(),
                    found: r.ty().display_name().to_string(),
                })?;
                (l.coerce(target), r.coerce(target))
            }
            Add | Sub | Mul | Div | Mod => {
                let (l, r) = (self.bind(left)?, self.bind(right)?);
                self.arithmetic_operands(expr, l, r)?
            }
        };
        Ok(BoundExpr::BinaryOp {
            left: Box::new(l),
            op,
            right: Box::new(r),
        })
    }

    /// Converts arithmetic operands: numerics widen to a common type, text
    /// beside a number is parsed as that number, temporal operands are left
    /// for the evaluator.
    fn arithmetic_operands(
        &self,
        expr: &Expr,
        l: BoundExpr,
        r: BoundExpr,
    ) -> Result<(BoundExpr, BoundExpr), BindError> {
        let (lt, rt) = (l.ty(), r.ty());
        let temporal = |t: Type| matches!(t, Type::Timestamp | Type::Interval);
        let numeric = |t: Type| t.is_numeric() || t == Type::Null;
        if numeric(lt) && numeric(rt) {
            let target = common_type(lt, rt).unwrap_or(Type::Null);
            return Ok((l.coerce(target), r.coerce(target)));
        }
        if lt.is_textual() && rt.is_numeric() {
            return Ok((l.coerce(rt), r));
        }
        if lt.is_numeric() && rt.is_textual() {
            return Ok((l, r.coerce(lt)));
        }
        if temporal(lt) || temporal(rt) {
            return Ok((l, r));
        }
        Err(BindError::TypeMismatch {
            context: expr.to_string(),
            expected: "numeric operands".to_string(),
            found: format!("{} and {}", lt.display_name(), rt.display_name()),
        })
    }

    /// Converts operands to their common type.
    fn unify(&self, expr: &Expr, bound: Vec<BoundExpr>) -> Result<Vec<BoundExpr>, BindError> {
        let target = common_type_of(bound.iter().map(BoundExpr::ty)).ok_or_else(|| {
            BindError::TypeMismatch {
                context: expr.to_string(),
                expected: "operands of one type".to_string(),
                found: bound
                    .iter()
                    .map(|b| b.ty().display_name())
                    .collect::<Vec<_>>()
                    .join(", "),
            }
        })?;
        Ok(bound.into_iter().map(|b| b.coerce(target)).collect())
    }

    fn bind_text(&mut self, context: &Expr, expr: &Expr) -> Result<BoundExpr, BindError> {
        let bound = self.bind(expr)?;
        match bound.ty() {
            Type::Text | Type::Null => Ok(bound),
            Type::Char => Ok(bound.coerce(Type::Text)),
            other => Err(BindError::mismatch(
                context.to_string(),
                Type::Text.display_name(),
                other,
            )),
        }
    }

    fn bind_case(
        &mut self,
        expr: &Expr,
        operand: Option<&Expr>,
        when_clauses: &[crate::sql::WhenClause],
        else_result: Option<&Expr>,
    ) -> Result<BoundExpr, BindError> {
        let (operand, conditions) = match operand {
            Some(op) => {
                let mut keys = vec![self.bind(op)?];
                for clause in when_clauses {
                    keys.push(self.bind(&clause.condition)?);
                }
                let mut keys = self.unify(expr, keys)?.into_iter();
                (keys.next().map(Box::new), keys.collect::<Vec<_>>())
            }
            None => (
                None,
                when_clauses
                    .iter()
                    .map(|c| self.bind_predicate(&c.condition))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        };

        let mut results = Vec::with_capacity(when_clauses.len() + 1);
        for clause in when_clauses {
            results.push(self.bind(&clause.result)?);
        }
        if let Some(e) = else_result {
            results.push(self.bind(e)?);
        }
        let ty = common_type_of(results.iter().map(BoundExpr::ty)).ok_or_else(|| {
            BindError::TypeMismatch {
                context: expr.to_string(),
                expected: "CASE results of one type".to_string(),
                found: results
                    .iter()
                    .map(|b| b.ty().display_name())
                    .collect::<Vec<_>>()
                    .join(", "),
            }
        })?;
        let mut results = results.into_iter().map(|r| r.coerce(ty));

        let when_clauses = conditions
            .into_iter()
            .zip(results.by_ref())
            .map(|(condition, result)| BoundWhenClause { condition, result })
            .collect();
        let else_result = results.next().map(Box::new);
        Ok(BoundExpr::Case {
            operand,
            when_clauses,
            else_result,
            ty,
        })
    }

    fn bind_call(&mut self, expr: &Expr, name: &str, args: &[Expr]) -> Result<BoundExpr, BindError> {
        let bound = args
            .iter()
            .map(|a| self.bind(a))
            .collect::<Result<Vec<_>, _>>()?;
        let arg_types: Vec<Type> = bound.iter().map(BoundExpr::ty).collect();
        let func = self.functions.resolve(name, &arg_types)?;
        let signature = func.signature();
        let ty = result_type(signature, &arg_types)?;

        let args = bound
            .into_iter()
            .enumerate()
            .map(|(i, arg)| match signature.param(i) {
                Some(ParamType::Exact(t)) => arg.coerce(t),
                _ if signature.returns == ReturnType::CommonArgument => arg.coerce(ty),
                _ => arg,
            })
            .collect();

        self.metadata.add_call(expr.to_string(), signature.clone());
        Ok(BoundExpr::Call { func, args, ty })
    }
}
