//! Expression evaluator.
//!
//! Evaluates [`BoundExpr`] nodes against a row of values, producing a single
//! [`Value`] result. Supports arithmetic (including timestamp and interval
//! arithmetic), comparison, three-valued logic, string indexing, LIKE, CASE,
//! CAST and scalar function calls.

use std::cmp::Ordering;

use chrono::TimeDelta;

use crate::datum::{
    Type, Value, parse_decimal, parse_integer, parse_interval, parse_timestamp, parse_truth,
};
use crate::sql::{BinaryOperator, UnaryOperator};

use super::error::ExecutorError;
use super::expr::BoundExpr;

impl BoundExpr {
    /// Evaluates the bound expression against a row, producing a [`Value`].
    ///
    /// Column references are resolved via positional index (O(1)).
    pub fn evaluate(&self, row: &[Value]) -> Result<Value, ExecutorError> {
        match self {
            BoundExpr::Constant(v) => Ok(v.clone()),

            BoundExpr::Column { index, .. } => {
                row.get(*index)
                    .cloned()
                    .ok_or(ExecutorError::ColumnIndexOutOfBounds {
                        index: *index,
                        len: row.len(),
                    })
            }

            BoundExpr::Index { expr, index } => {
                let v = expr.evaluate(row)?;
                let i = index.evaluate(row)?;
                eval_index(&v, &i)
            }

            BoundExpr::BinaryOp { left, op, right } => {
                let l = left.evaluate(row)?;
                let r = right.evaluate(row)?;
                eval_binary_op(&l, *op, &r)
            }

            BoundExpr::UnaryOp { op, operand } => {
                let v = operand.evaluate(row)?;
                eval_unary_op(*op, &v)
            }

            BoundExpr::IsNull { expr, negated } => {
                let is_null = expr.evaluate(row)?.is_null();
                Ok(Value::Boolean(is_null != *negated))
            }

            BoundExpr::InList {
                expr,
                list,
                negated,
            } => {
                let v = expr.evaluate(row)?;
                if v.is_null() {
                    return Ok(Value::Null);
                }
                let mut found = false;
                let mut has_null = false;
                for item in list {
                    let item_val = item.evaluate(row)?;
                    if item_val.is_null() {
                        has_null = true;
                        continue;
                    }
                    if compare_values(&v, &item_val)? == Ordering::Equal {
                        found = true;
                        break;
                    }
                }
                let result = if found {
                    Value::Boolean(!*negated)
                } else if has_null {
                    Value::Null
                } else {
                    Value::Boolean(*negated)
                };
                Ok(result)
            }

            BoundExpr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let v = expr.evaluate(row)?;
                let lo = low.evaluate(row)?;
                let hi = high.evaluate(row)?;
                if v.is_null() || lo.is_null() || hi.is_null() {
                    return Ok(Value::Null);
                }
                let in_range = compare_values(&v, &lo)? != Ordering::Less
                    && compare_values(&v, &hi)? != Ordering::Greater;
                Ok(Value::Boolean(in_range != *negated))
            }

            BoundExpr::Like {
                expr,
                pattern,
                negated,
            } => {
                let v = expr.evaluate(row)?;
                let p = pattern.evaluate(row)?;
                if v.is_null() || p.is_null() {
                    return Ok(Value::Null);
                }
                let matched = like_match(&v.to_text(), &p.to_text());
                Ok(Value::Boolean(matched != *negated))
            }

            BoundExpr::Case {
                operand,
                when_clauses,
                else_result,
                ..
            } => {
                if let Some(op) = operand {
                    let op_val = op.evaluate(row)?;
                    for clause in when_clauses {
                        let when_val = clause.condition.evaluate(row)?;
                        if !op_val.is_null()
                            && !when_val.is_null()
                            && compare_values(&op_val, &when_val)? == Ordering::Equal
                        {
                            return clause.result.evaluate(row);
                        }
                    }
                } else {
                    for clause in when_clauses {
                        if is_true(&clause.condition.evaluate(row)?) {
                            return clause.result.evaluate(row);
                        }
                    }
                }
                match else_result {
                    Some(e) => e.evaluate(row),
                    None => Ok(Value::Null),
                }
            }

            BoundExpr::Cast { expr, ty } => cast_value(expr.evaluate(row)?, *ty),

            BoundExpr::Call { func, args, .. } => {
                let values = args
                    .iter()
                    .map(|a| a.evaluate(row))
                    .collect::<Result<Vec<_>, _>>()?;
                func.invoke(&values)
            }
        }
    }
}

/// Returns true only for `Boolean(true)`. NULL and false both reject.
pub(crate) fn is_true(v: &Value) -> bool {
    matches!(v, Value::Boolean(true))
}

/// Returns the character at a zero-based position, or NULL when the
/// position is out of range.
fn eval_index(v: &Value, i: &Value) -> Result<Value, ExecutorError> {
    if v.is_null() || i.is_null() {
        return Ok(Value::Null);
    }
    let Some(position) = i.as_i64() else {
        return Err(ExecutorError::mismatch("integer index", i.data_type().to_string()));
    };
    let Ok(position) = usize::try_from(position) else {
        return Ok(Value::Null);
    };
    match v {
        Value::Text(s) => Ok(s.chars().nth(position).map_or(Value::Null, Value::Char)),
        Value::Char(c) if position == 0 => Ok(Value::Char(*c)),
        Value::Char(_) => Ok(Value::Null),
        other => Err(ExecutorError::mismatch("text", other.data_type().to_string())),
    }
}

/// Evaluates a binary operation.
pub(crate) fn eval_binary_op(
    left: &Value,
    op: BinaryOperator,
    right: &Value,
) -> Result<Value, ExecutorError> {
    match op {
        BinaryOperator::And => return eval_and(left, right),
        BinaryOperator::Or => return eval_or(left, right),
        BinaryOperator::Concat => return Ok(eval_concat(left, right)),
        _ => {}
    }

    // NULL propagation for all other operators
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    let cmp = || compare_values(left, right);
    match op {
        BinaryOperator::Eq => Ok(Value::Boolean(cmp()? == Ordering::Equal)),
        BinaryOperator::Neq => Ok(Value::Boolean(cmp()? != Ordering::Equal)),
        BinaryOperator::Lt => Ok(Value::Boolean(cmp()? == Ordering::Less)),
        BinaryOperator::LtEq => Ok(Value::Boolean(cmp()? != Ordering::Greater)),
        BinaryOperator::Gt => Ok(Value::Boolean(cmp()? == Ordering::Greater)),
        BinaryOperator::GtEq => Ok(Value::Boolean(cmp()? != Ordering::Less)),
        _ => eval_arithmetic(left, op, right),
    }
}

/// Evaluates AND with 3-value NULL logic.
fn eval_and(left: &Value, right: &Value) -> Result<Value, ExecutorError> {
    let l = value_to_bool_nullable(left)?;
    let r = value_to_bool_nullable(right)?;
    match (l, r) {
        (Some(false), _) | (_, Some(false)) => Ok(Value::Boolean(false)),
        (Some(true), Some(true)) => Ok(Value::Boolean(true)),
        _ => Ok(Value::Null),
    }
}

/// Evaluates OR with 3-value NULL logic.
fn eval_or(left: &Value, right: &Value) -> Result<Value, ExecutorError> {
    let l = value_to_bool_nullable(left)?;
    let r = value_to_bool_nullable(right)?;
    match (l, r) {
        (Some(true), _) | (_, Some(true)) => Ok(Value::Boolean(true)),
        (Some(false), Some(false)) => Ok(Value::Boolean(false)),
        _ => Ok(Value::Null),
    }
}

fn value_to_bool_nullable(v: &Value) -> Result<Option<bool>, ExecutorError> {
    match v {
        Value::Null => Ok(None),
        Value::Boolean(b) => Ok(Some(*b)),
        _ => Err(ExecutorError::mismatch("boolean", v.data_type().to_string())),
    }
}

fn eval_concat(left: &Value, right: &Value) -> Value {
    if left.is_null() || right.is_null() {
        return Value::Null;
    }
    Value::Text(format!("{}{}", left.to_text(), right.to_text()))
}

/// Evaluates `+ - * / %` over numbers, timestamps and intervals.
fn eval_arithmetic(
    left: &Value,
    op: BinaryOperator,
    right: &Value,
) -> Result<Value, ExecutorError> {
    use BinaryOperator::*;
    match (left, right) {
        (Value::Timestamp(a), Value::Timestamp(b)) if op == Sub => {
            Ok(Value::Interval(a.signed_duration_since(*b)))
        }
        (Value::Timestamp(t), Value::Interval(d)) | (Value::Interval(d), Value::Timestamp(t))
            if op == Add =>
        {
            t.checked_add_signed(*d)
                .map(Value::Timestamp)
                .ok_or(ExecutorError::IntegerOverflow)
        }
        (Value::Timestamp(t), Value::Interval(d)) if op == Sub => t
            .checked_sub_signed(*d)
            .map(Value::Timestamp)
            .ok_or(ExecutorError::IntegerOverflow),
        (Value::Interval(a), Value::Interval(b)) if op == Add || op == Sub => {
            let result = if op == Add {
                a.checked_add(b)
            } else {
                a.checked_sub(b)
            };
            result
                .map(Value::Interval)
                .ok_or(ExecutorError::IntegerOverflow)
        }
        (Value::Interval(d), n) if op == Mul || op == Div => {
            let factor = n
                .as_f64()
                .ok_or_else(|| ExecutorError::mismatch("numeric", n.data_type().to_string()))?;
            scale_interval(*d, factor, op == Div)
        }
        (n, Value::Interval(d)) if op == Mul => {
            let factor = n
                .as_f64()
                .ok_or_else(|| ExecutorError::mismatch("numeric", n.data_type().to_string()))?;
            scale_interval(*d, factor, false)
        }
        _ => eval_numeric(left, op, right),
    }
}

fn scale_interval(d: TimeDelta, factor: f64, divide: bool) -> Result<Value, ExecutorError> {
    if divide && factor == 0.0 {
        return Err(ExecutorError::DivisionByZero);
    }
    let nanos = d.num_nanoseconds().ok_or(ExecutorError::IntegerOverflow)? as f64;
    let scaled = if divide { nanos / factor } else { nanos * factor };
    if !scaled.is_finite() || scaled.abs() >= i64::MAX as f64 {
        return Err(ExecutorError::IntegerOverflow);
    }
    Ok(Value::Interval(TimeDelta::nanoseconds(scaled as i64)))
}

fn eval_numeric(left: &Value, op: BinaryOperator, right: &Value) -> Result<Value, ExecutorError> {
    use BinaryOperator::*;
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => {
            let result = match op {
                Add => a.checked_add(*b),
                Sub => a.checked_sub(*b),
                Mul => a.checked_mul(*b),
                Div | Mod if *b == 0 => return Err(ExecutorError::DivisionByZero),
                Div => a.checked_div(*b),
                Mod => a.checked_rem(*b),
                _ => return Err(ExecutorError::Unsupported(op.as_str().to_string())),
            };
            result
                .map(Value::Integer)
                .ok_or(ExecutorError::IntegerOverflow)
        }
        _ => {
            if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
                let result = match op {
                    Add => a.checked_add(b),
                    Sub => a.checked_sub(b),
                    Mul => a.checked_mul(b),
                    Div | Mod if b == 0 => return Err(ExecutorError::DivisionByZero),
                    Div => a.checked_div(b),
                    Mod => a.checked_rem(b),
                    _ => return Err(ExecutorError::Unsupported(op.as_str().to_string())),
                };
                return result
                    .map(Value::Bigint)
                    .ok_or(ExecutorError::IntegerOverflow);
            }
            let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
                return Err(ExecutorError::mismatch(
                    "numeric",
                    format!("{}, {}", left.data_type(), right.data_type()),
                ));
            };
            let result = match op {
                Add => a + b,
                Sub => a - b,
                Mul => a * b,
                Div | Mod if b == 0.0 => return Err(ExecutorError::DivisionByZero),
                Div => a / b,
                Mod => a % b,
                _ => return Err(ExecutorError::Unsupported(op.as_str().to_string())),
            };
            Ok(Value::Double(result))
        }
    }
}

/// Compares two non-NULL values, returning their ordering.
///
/// Integers compare exactly, mixed integer/float compare as `f64`, `Char`
/// compares as a one-character string, timestamps compare by instant.
/// Float ordering: NaN is greater than all non-NaN values; NaN == NaN.
pub(crate) fn compare_values(left: &Value, right: &Value) -> Result<Ordering, ExecutorError> {
    match (left, right) {
        (Value::Boolean(a), Value::Boolean(b)) => Ok(a.cmp(b)),
        (Value::Text(a), Value::Text(b)) => Ok(a.cmp(b)),
        (Value::Char(a), Value::Char(b)) => Ok(a.cmp(b)),
        (Value::Char(a), Value::Text(b)) => Ok(a.to_string().as_str().cmp(b.as_str())),
        (Value::Text(a), Value::Char(b)) => Ok(a.as_str().cmp(b.to_string().as_str())),
        (Value::Timestamp(a), Value::Timestamp(b)) => Ok(a.cmp(b)),
        (Value::Interval(a), Value::Interval(b)) => Ok(a.cmp(b)),
        _ => {
            if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
                return Ok(a.cmp(&b));
            }
            match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => Ok(compare_f64(a, b)),
                _ => Err(ExecutorError::mismatch(
                    "comparable types",
                    format!("{}, {}", left.data_type(), right.data_type()),
                )),
            }
        }
    }
}

/// Compares two f64 values with NaN-aware total ordering.
pub(crate) fn compare_f64(a: f64, b: f64) -> Ordering {
    match a.partial_cmp(&b) {
        Some(ord) => ord,
        None => a.is_nan().cmp(&b.is_nan()),
    }
}

/// Evaluates a unary operation.
fn eval_unary_op(op: UnaryOperator, val: &Value) -> Result<Value, ExecutorError> {
    if val.is_null() {
        return Ok(Value::Null);
    }
    match op {
        UnaryOperator::Not => match val {
            Value::Boolean(b) => Ok(Value::Boolean(!b)),
            _ => Err(ExecutorError::mismatch("boolean", val.data_type().to_string())),
        },
        UnaryOperator::Minus => match val {
            Value::Integer(n) => n
                .checked_neg()
                .map(Value::Integer)
                .ok_or(ExecutorError::IntegerOverflow),
            Value::Bigint(n) => n
                .checked_neg()
                .map(Value::Bigint)
                .ok_or(ExecutorError::IntegerOverflow),
            Value::Double(n) => Ok(Value::Double(-n)),
            Value::Interval(d) => Ok(Value::Interval(-*d)),
            _ => Err(ExecutorError::mismatch("numeric", val.data_type().to_string())),
        },
        UnaryOperator::Plus => match val {
            Value::Integer(_) | Value::Bigint(_) | Value::Double(_) | Value::Interval(_) => {
                Ok(val.clone())
            }
            _ => Err(ExecutorError::mismatch("numeric", val.data_type().to_string())),
        },
    }
}

/// Converts `v` to `target`.
///
/// Text converts to numbers with locale-tolerant parsing (`3,75` and `3.75`
/// are both accepted), to booleans by truth-testing, and to timestamps and
/// intervals by their text forms. A value that cannot be converted is an
/// [`ExecutorError::InvalidCast`]; it never silently becomes NULL or zero.
pub fn cast_value(v: Value, target: Type) -> Result<Value, ExecutorError> {
    if v.is_null() || v.data_type() == target {
        return Ok(v);
    }
    let invalid = |v: &Value| ExecutorError::InvalidCast {
        value: v.to_string(),
        to: target.to_string(),
    };
    match target {
        Type::Null => Ok(Value::Null),
        Type::Boolean => match &v {
            Value::Text(_) | Value::Char(_) => parse_truth(&v.to_text())
                .map(Value::Boolean)
                .ok_or_else(|| invalid(&v)),
            Value::Integer(_) | Value::Bigint(_) => Ok(Value::Boolean(v.as_i64() != Some(0))),
            Value::Double(n) => Ok(Value::Boolean(*n != 0.0)),
            _ => Err(invalid(&v)),
        },
        Type::Char => {
            let text = v.to_text();
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Char(c)),
                _ => Err(invalid(&v)),
            }
        }
        Type::Integer => {
            let n = to_i64(&v).ok_or_else(|| invalid(&v))?;
            i32::try_from(n)
                .map(Value::Integer)
                .map_err(|_| ExecutorError::IntegerOverflow)
        }
        Type::Bigint => to_i64(&v).map(Value::Bigint).ok_or_else(|| invalid(&v)),
        Type::Double => match &v {
            Value::Integer(_) | Value::Bigint(_) => Ok(Value::Double(v.as_f64().unwrap_or(0.0))),
            Value::Text(_) | Value::Char(_) => parse_decimal(&v.to_text())
                .map(Value::Double)
                .ok_or_else(|| invalid(&v)),
            Value::Boolean(b) => Ok(Value::Double(if *b { 1.0 } else { 0.0 })),
            _ => Err(invalid(&v)),
        },
        Type::Text => Ok(Value::Text(v.to_text())),
        Type::Timestamp => match &v {
            Value::Text(s) => parse_timestamp(s)
                .map(Value::Timestamp)
                .ok_or_else(|| invalid(&v)),
            _ => Err(invalid(&v)),
        },
        Type::Interval => match &v {
            Value::Text(s) => parse_interval(s)
                .map(Value::Interval)
                .ok_or_else(|| invalid(&v)),
            _ => Err(invalid(&v)),
        },
    }
}

/// Integer view of a value for casts: truncates floats, parses text.
fn to_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Integer(_) | Value::Bigint(_) => v.as_i64(),
        Value::Double(n) if n.is_finite() && n.abs() < i64::MAX as f64 => Some(n.trunc() as i64),
        Value::Text(_) | Value::Char(_) => parse_integer(&v.to_text()),
        Value::Boolean(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// LIKE pattern matching with `%` and `_` wildcards.
fn like_match(s: &str, pattern: &str) -> bool {
    let s: Vec<char> = s.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    like_match_from(&s, &p)
}

fn like_match_from(s: &[char], p: &[char]) -> bool {
    let Some((&head, rest)) = p.split_first() else {
        return s.is_empty();
    };
    match head {
        '%' => (0..=s.len()).any(|i| like_match_from(&s[i..], rest)),
        '_' => !s.is_empty() && like_match_from(&s[1..], rest),
        c => s.first() == Some(&c) && like_match_from(&s[1..], rest),
    }
}
