//! Aggregate function definitions and accumulators.
//!
//! This module provides the building blocks for GROUP BY, windowed and pivot
//! aggregation:
//!
//! - [`AggregateFunction`]: the supported aggregate functions
//! - [`AggregateOp`]: a single aggregate operation (function + arguments + DISTINCT flag)
//! - [`Accumulator`]: trait for stateful aggregate computation
//! - [`GroupKey`]: HashMap key with GROUP BY equality semantics (NULL=NULL, 1=1.0)

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::TimeDelta;

use crate::datum::{Type, Value};

use super::error::ExecutorError;
use super::eval::compare_values;
use super::expr::BoundExpr;

/// Supported aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    /// COUNT: counts rows or non-NULL values.
    Count,
    /// SUM: sum of numeric values or intervals.
    Sum,
    /// AVG: average of numeric values or intervals.
    Avg,
    /// MIN: minimum value.
    Min,
    /// MAX: maximum value.
    Max,
}

impl AggregateFunction {
    /// Resolves a function name (case-insensitive) to an aggregate function.
    ///
    /// Returns `None` for non-aggregate function names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Some(AggregateFunction::Count),
            "sum" => Some(AggregateFunction::Sum),
            "avg" => Some(AggregateFunction::Avg),
            "min" => Some(AggregateFunction::Min),
            "max" => Some(AggregateFunction::Max),
            _ => None,
        }
    }

    /// Returns true if the function accepts values of type `ty`.
    pub fn accepts(self, ty: Type) -> bool {
        match self {
            AggregateFunction::Count => true,
            AggregateFunction::Sum | AggregateFunction::Avg => {
                ty.is_numeric() || matches!(ty, Type::Interval | Type::Null)
            }
            AggregateFunction::Min | AggregateFunction::Max => ty != Type::Boolean,
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunction::Count => write!(f, "COUNT"),
            AggregateFunction::Sum => write!(f, "SUM"),
            AggregateFunction::Avg => write!(f, "AVG"),
            AggregateFunction::Min => write!(f, "MIN"),
            AggregateFunction::Max => write!(f, "MAX"),
        }
    }
}

/// Computes the output type for an aggregate function given its input type.
///
/// - COUNT → Bigint
/// - SUM: integer input → Bigint, Double → Double, Interval → Interval
/// - AVG: Interval → Interval, anything else → Double
/// - MIN/MAX → same as input type
pub fn aggregate_output_type(func: AggregateFunction, input_ty: Option<Type>) -> Type {
    match func {
        AggregateFunction::Count => Type::Bigint,
        AggregateFunction::Sum => match input_ty {
            Some(Type::Double) => Type::Double,
            Some(Type::Interval) => Type::Interval,
            _ => Type::Bigint,
        },
        AggregateFunction::Avg => match input_ty {
            Some(Type::Interval) => Type::Interval,
            _ => Type::Double,
        },
        AggregateFunction::Min | AggregateFunction::Max => input_ty.unwrap_or(Type::Null),
    }
}

/// Formats an aggregate call as `FUNC([DISTINCT ]args|*)`.
pub fn fmt_aggregate(
    f: &mut fmt::Formatter<'_>,
    func: &AggregateFunction,
    args: &[BoundExpr],
    distinct: bool,
) -> fmt::Result {
    write!(f, "{}(", func)?;
    if distinct {
        write!(f, "DISTINCT ")?;
    }
    if args.is_empty() {
        write!(f, "*")?;
    } else {
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
    }
    write!(f, ")")
}

/// A single aggregate operation within an Aggregate, Window or Pivot node.
///
/// COUNT(\*) is represented as `func: Count` with `args: vec![]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOp {
    /// Aggregate function to apply.
    pub func: AggregateFunction,
    /// Argument expressions (empty for COUNT(\*)).
    pub args: Vec<BoundExpr>,
    /// Whether DISTINCT was specified.
    pub distinct: bool,
}

impl AggregateOp {
    /// Returns the output type of this aggregate operation.
    pub fn output_type(&self) -> Type {
        let input_ty = self.args.first().map(BoundExpr::ty);
        aggregate_output_type(self.func, input_ty)
    }

    /// Whether the result may be NULL.
    ///
    /// COUNT never is. The others are NULL over an empty input, which only
    /// happens for a nullable argument or an ungrouped aggregate.
    pub fn nullable(&self, grouped: bool) -> bool {
        match self.func {
            AggregateFunction::Count => false,
            _ => !grouped || self.args.iter().any(BoundExpr::nullable),
        }
    }

    /// Evaluates the argument for one row. COUNT(\*) yields `Some(Null)` so
    /// that every row is counted; NULL arguments yield `None` and are skipped.
    pub fn input(&self, row: &[Value]) -> Result<Option<Value>, ExecutorError> {
        match self.args.first() {
            None => Ok(Some(Value::Null)),
            Some(arg) => {
                let v = arg.evaluate(row)?;
                Ok(if v.is_null() { None } else { Some(v) })
            }
        }
    }

    /// Creates an accumulator for this aggregate operation.
    ///
    /// DISTINCT filtering is handled by the executor node, not by the
    /// accumulator.
    pub fn create_accumulator(&self) -> Box<dyn Accumulator> {
        match self.func {
            AggregateFunction::Count => Box::new(CountAccumulator { count: 0 }),
            AggregateFunction::Sum => Box::new(SumAccumulator {
                sum: Value::Null,
                output: self.output_type(),
            }),
            AggregateFunction::Avg => Box::new(AvgAccumulator {
                sum: 0.0,
                interval_nanos: 0,
                count: 0,
                interval: self.output_type() == Type::Interval,
            }),
            AggregateFunction::Min => Box::new(ExtremeAccumulator {
                current: Value::Null,
                keep: Ordering::Less,
            }),
            AggregateFunction::Max => Box::new(ExtremeAccumulator {
                current: Value::Null,
                keep: Ordering::Greater,
            }),
        }
    }
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_aggregate(f, &self.func, &self.args, self.distinct)
    }
}

/// Stateful aggregate computation.
///
/// Follows a three-phase lifecycle: creation → feed → finish. `finish` does
/// not consume the state, so running (windowed) aggregates may call it after
/// every feed.
pub trait Accumulator: Send {
    /// Feeds a single non-NULL value into the accumulator.
    ///
    /// For COUNT(\*), the executor feeds `Value::Null` once per row.
    fn feed(&mut self, value: &Value) -> Result<(), ExecutorError>;

    /// Produces the current aggregate result.
    fn finish(&self) -> Value;
}

/// COUNT(\*) and COUNT(expr) accumulator.
struct CountAccumulator {
    count: i64,
}

impl Accumulator for CountAccumulator {
    fn feed(&mut self, _value: &Value) -> Result<(), ExecutorError> {
        self.count += 1;
        Ok(())
    }

    fn finish(&self) -> Value {
        Value::Bigint(self.count)
    }
}

/// SUM(expr) accumulator.
///
/// Integers sum as Bigint with overflow detection, doubles as Double, and
/// intervals as Interval.
struct SumAccumulator {
    sum: Value,
    output: Type,
}

impl Accumulator for SumAccumulator {
    fn feed(&mut self, value: &Value) -> Result<(), ExecutorError> {
        self.sum = match (value, self.output) {
            (Value::Interval(d), Type::Interval) => match &self.sum {
                Value::Interval(acc) => {
                    Value::Interval(acc.checked_add(d).ok_or(ExecutorError::IntegerOverflow)?)
                }
                _ => Value::Interval(*d),
            },
            (v, Type::Double) => {
                let n = v.as_f64().ok_or_else(|| {
                    ExecutorError::mismatch("numeric", v.data_type().to_string())
                })?;
                Value::Double(self.sum.as_f64().unwrap_or(0.0) + n)
            }
            (v, _) => {
                let n = v.as_i64().ok_or_else(|| {
                    ExecutorError::mismatch("integer", v.data_type().to_string())
                })?;
                let acc = self.sum.as_i64().unwrap_or(0);
                Value::Bigint(acc.checked_add(n).ok_or(ExecutorError::IntegerOverflow)?)
            }
        };
        Ok(())
    }

    fn finish(&self) -> Value {
        self.sum.clone()
    }
}

/// AVG(expr) accumulator.
///
/// Numeric inputs average as Double; interval inputs average in nanoseconds.
struct AvgAccumulator {
    sum: f64,
    interval_nanos: i128,
    count: i64,
    interval: bool,
}

impl Accumulator for AvgAccumulator {
    fn feed(&mut self, value: &Value) -> Result<(), ExecutorError> {
        match value {
            Value::Interval(d) if self.interval => {
                let nanos = d.num_nanoseconds().ok_or(ExecutorError::IntegerOverflow)?;
                self.interval_nanos += i128::from(nanos);
            }
            v => {
                self.sum += v.as_f64().ok_or_else(|| {
                    ExecutorError::mismatch("numeric", v.data_type().to_string())
                })?;
            }
        }
        self.count += 1;
        Ok(())
    }

    fn finish(&self) -> Value {
        if self.count == 0 {
            return Value::Null;
        }
        if self.interval {
            let avg = self.interval_nanos / i128::from(self.count);
            return Value::Interval(TimeDelta::nanoseconds(avg as i64));
        }
        Value::Double(self.sum / self.count as f64)
    }
}

/// MIN(expr) and MAX(expr) accumulator.
///
/// Keeps the value that orders as `keep` against everything seen so far.
/// Timestamps compare by instant, so offsets do not affect the result.
struct ExtremeAccumulator {
    current: Value,
    keep: Ordering,
}

impl Accumulator for ExtremeAccumulator {
    fn feed(&mut self, value: &Value) -> Result<(), ExecutorError> {
        if self.current.is_null() || compare_values(value, &self.current)? == self.keep {
            self.current = value.clone();
        }
        Ok(())
    }

    fn finish(&self) -> Value {
        self.current.clone()
    }
}

/// HashMap key for grouping.
///
/// Wraps a `Vec<Value>` with GROUP BY equality semantics:
/// - NULL = NULL (unlike comparison, which yields NULL)
/// - values of different numeric widths are equal when numerically equal
/// - a `Char` equals the one-character `Text`
/// - timestamps are equal when they denote the same instant
///
/// Used for GROUP BY, DISTINCT, window partitions, pivot cells and hash-join
/// keys.
#[derive(Debug, Clone)]
pub struct GroupKey(pub(super) Vec<Value>);

impl GroupKey {
    /// Creates a key from evaluated values.
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Returns true if any component is NULL.
    pub fn has_null(&self) -> bool {
        self.0.iter().any(Value::is_null)
    }

    /// The key's values.
    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        if self.0.len() != other.0.len() {
            return false;
        }
        self.0.iter().zip(other.0.iter()).all(|(a, b)| match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            _ => matches!(compare_values(a, b), Ok(Ordering::Equal)),
        })
    }
}

impl Eq for GroupKey {}

impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for val in &self.0 {
            match val {
                Value::Null => 0u8.hash(state),
                Value::Boolean(b) => {
                    1u8.hash(state);
                    b.hash(state);
                }
                Value::Integer(_) | Value::Bigint(_) => {
                    2u8.hash(state);
                    val.as_i64().hash(state);
                }
                Value::Double(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                    2u8.hash(state);
                    Some(*n as i64).hash(state);
                }
                Value::Double(n) => {
                    3u8.hash(state);
                    let bits = if n.is_nan() { f64::NAN.to_bits() } else { n.to_bits() };
                    bits.hash(state);
                }
                Value::Char(c) => {
                    4u8.hash(state);
                    c.to_string().hash(state);
                }
                Value::Text(s) => {
                    4u8.hash(state);
                    s.hash(state);
                }
                Value::Timestamp(ts) => {
                    5u8.hash(state);
                    ts.timestamp().hash(state);
                    ts.timestamp_subsec_nanos().hash(state);
                }
                Value::Interval(d) => {
                    6u8.hash(state);
                    d.num_seconds().hash(state);
                    d.subsec_nanos().hash(state);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::collections::HashSet;
    use std::collections::hash_map::DefaultHasher;

    fn hash_key(key: &GroupKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn op(func: AggregateFunction, ty: Type) -> AggregateOp {
        AggregateOp {
            func,
            args: vec![BoundExpr::Column {
                index: 0,
                name: "v".into(),
                ty,
                nullable: true,
            }],
            distinct: false,
        }
    }

    fn run(op: &AggregateOp, values: &[Value]) -> Value {
        let mut acc = op.create_accumulator();
        for v in values {
            acc.feed(v).unwrap();
        }
        acc.finish()
    }

    // ========================================================================
    // COUNT / SUM / AVG
    // ========================================================================

    #[test]
    fn test_count_empty_and_basic() {
        let count = op(AggregateFunction::Count, Type::Text);
        assert_eq!(run(&count, &[]), Value::Bigint(0));
        assert_eq!(
            run(&count, &[Value::from("a"), Value::from("b")]),
            Value::Bigint(2)
        );
    }

    #[test]
    fn test_sum_integers_widen_to_bigint() {
        let sum = op(AggregateFunction::Sum, Type::Integer);
        assert_eq!(sum.output_type(), Type::Bigint);
        assert_eq!(
            run(&sum, &[Value::Integer(i32::MAX), Value::Integer(i32::MAX)]),
            Value::Bigint(2 * i32::MAX as i64)
        );
        assert_eq!(run(&sum, &[]), Value::Null);
    }

    #[test]
    fn test_sum_overflow() {
        let sum = op(AggregateFunction::Sum, Type::Bigint);
        let mut acc = sum.create_accumulator();
        acc.feed(&Value::Bigint(i64::MAX)).unwrap();
        assert_eq!(
            acc.feed(&Value::Bigint(1)),
            Err(ExecutorError::IntegerOverflow)
        );
    }

    #[test]
    fn test_sum_and_avg_intervals() {
        let values = [
            Value::Interval(TimeDelta::hours(1)),
            Value::Interval(TimeDelta::minutes(30)),
        ];
        let sum = op(AggregateFunction::Sum, Type::Interval);
        assert_eq!(sum.output_type(), Type::Interval);
        assert_eq!(run(&sum, &values), Value::Interval(TimeDelta::minutes(90)));

        let avg = op(AggregateFunction::Avg, Type::Interval);
        assert_eq!(run(&avg, &values), Value::Interval(TimeDelta::minutes(45)));
    }

    #[test]
    fn test_avg_numeric() {
        let avg = op(AggregateFunction::Avg, Type::Integer);
        assert_eq!(avg.output_type(), Type::Double);
        assert_eq!(
            run(&avg, &[Value::Integer(1), Value::Integer(2)]),
            Value::Double(1.5)
        );
        assert_eq!(run(&avg, &[]), Value::Null);
    }

    // ========================================================================
    // MIN / MAX
    // ========================================================================

    #[test]
    fn test_min_max_text() {
        let values = [Value::from("pear"), Value::from("apple"), Value::from("zucchini")];
        assert_eq!(
            run(&op(AggregateFunction::Min, Type::Text), &values),
            Value::from("apple")
        );
        assert_eq!(
            run(&op(AggregateFunction::Max, Type::Text), &values),
            Value::from("zucchini")
        );
    }

    #[test]
    fn test_max_timestamp_compares_instants() {
        let early = DateTime::parse_from_rfc3339("2024-01-01T10:00:00+05:00").unwrap();
        let late = DateTime::parse_from_rfc3339("2024-01-01T06:00:00+00:00").unwrap();
        let max = op(AggregateFunction::Max, Type::Timestamp);
        assert_eq!(
            run(&max, &[Value::Timestamp(late), Value::Timestamp(early)]),
            Value::Timestamp(late)
        );
    }

    #[test]
    fn test_nullable() {
        let count = op(AggregateFunction::Count, Type::Text);
        assert!(!count.nullable(false));
        let mut sum = op(AggregateFunction::Sum, Type::Integer);
        assert!(sum.nullable(true));
        sum.args[0] = BoundExpr::Column {
            index: 0,
            name: "v".into(),
            ty: Type::Integer,
            nullable: false,
        };
        assert!(!sum.nullable(true));
        assert!(sum.nullable(false));
    }

    // ========================================================================
    // GroupKey
    // ========================================================================

    #[test]
    fn test_group_key_null_equals_null() {
        let a = GroupKey::new(vec![Value::Null, Value::from("x")]);
        let b = GroupKey::new(vec![Value::Null, Value::from("x")]);
        assert_eq!(a, b);
        assert_eq!(hash_key(&a), hash_key(&b));
        assert!(a.has_null());
    }

    #[test]
    fn test_group_key_numeric_widths() {
        let a = GroupKey::new(vec![Value::Integer(7)]);
        let b = GroupKey::new(vec![Value::Bigint(7)]);
        let c = GroupKey::new(vec![Value::Double(7.0)]);
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(hash_key(&a), hash_key(&b));
        assert_eq!(hash_key(&a), hash_key(&c));
        assert_ne!(a, GroupKey::new(vec![Value::Double(7.5)]));
    }

    #[test]
    fn test_group_key_char_and_text() {
        let a = GroupKey::new(vec![Value::Char('d')]);
        let b = GroupKey::new(vec![Value::from("d")]);
        assert_eq!(a, b);
        assert_eq!(hash_key(&a), hash_key(&b));
    }

    #[test]
    fn test_group_key_dedup_in_set() {
        let ts1 = DateTime::parse_from_rfc3339("2024-01-01T10:00:00+02:00").unwrap();
        let ts2 = DateTime::parse_from_rfc3339("2024-01-01T08:00:00+00:00").unwrap();
        let set: HashSet<GroupKey> = [
            GroupKey::new(vec![Value::Timestamp(ts1)]),
            GroupKey::new(vec![Value::Timestamp(ts2)]),
            GroupKey::new(vec![Value::Boolean(true)]),
            GroupKey::new(vec![Value::Boolean(true)]),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_group_key_mismatched_types_unequal() {
        let a = GroupKey::new(vec![Value::from("1")]);
        let b = GroupKey::new(vec![Value::Integer(1)]);
        assert_ne!(a, b);
    }
}
