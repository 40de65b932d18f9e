//! Function registry, overload resolution and the implicit-conversion ladder.
//!
//! Overloads are matched by name (case-insensitive) and arity, then ranked by
//! the summed cost of converting each argument to its parameter type. The
//! cheapest overload wins; ties go to the overload registered first.
//!
//! Conversion costs:
//!
//! | from → to                                   | cost |
//! |---------------------------------------------|------|
//! | same type, or an `ANY` parameter            | 0    |
//! | NULL → anything                             | 1    |
//! | INTEGER → BIGINT, CHAR → TEXT               | 1    |
//! | INTEGER/BIGINT → DOUBLE                     | 2    |
//! | TEXT/CHAR → numeric, BOOLEAN, TIMESTAMP, INTERVAL | 10 |

use std::sync::Arc;

use chrono::{Datelike, Timelike};
use parking_lot::RwLock;

use crate::datum::{Type, Value};
use crate::executor::{
    ExecutorError, ParamType, ReturnType, ScalarFunction, Signature, cast_value, wider_numeric,
};

use super::error::BindError;

/// Cost of implicitly converting a value of type `from` to parameter `to`,
/// or `None` when no implicit conversion exists.
pub(crate) fn conversion_cost(from: Type, to: ParamType) -> Option<u32> {
    let ParamType::Exact(to) = to else {
        return Some(0);
    };
    if from == to {
        return Some(0);
    }
    match (from, to) {
        (Type::Null, _) => Some(1),
        (Type::Integer, Type::Bigint) | (Type::Char, Type::Text) => Some(1),
        (Type::Integer | Type::Bigint, Type::Double) => Some(2),
        (Type::Text | Type::Char, t)
            if t.is_numeric() || matches!(t, Type::Boolean | Type::Timestamp | Type::Interval) =>
        {
            Some(10)
        }
        _ => None,
    }
}

/// The type two operands are converted to before they are compared or
/// combined. NULL adopts the other side; numerics widen; CHAR joins TEXT;
/// text meeting a non-text type is parsed as that type.
pub(crate) fn common_type(a: Type, b: Type) -> Option<Type> {
    if a == b {
        return Some(a);
    }
    match (a, b) {
        (Type::Null, t) | (t, Type::Null) => Some(t),
        (Type::Char, Type::Text) | (Type::Text, Type::Char) => Some(Type::Text),
        (l, r) if l.is_numeric() && r.is_numeric() => wider_numeric(l, r),
        (Type::Text | Type::Char, t) | (t, Type::Text | Type::Char)
            if t.is_numeric() || matches!(t, Type::Boolean | Type::Timestamp | Type::Interval) =>
        {
            Some(t)
        }
        _ => None,
    }
}

/// Common type of several operands, ignoring untyped NULLs.
pub(crate) fn common_type_of(types: impl IntoIterator<Item = Type>) -> Option<Type> {
    types
        .into_iter()
        .try_fold(Type::Null, |acc, t| common_type(acc, t))
}

/// Registry of scalar function overloads.
///
/// Shared by every compilation of an engine; functions registered later are
/// visible to queries compiled afterwards.
pub struct FunctionRegistry {
    functions: RwLock<Vec<Arc<ScalarFunction>>>,
}

impl FunctionRegistry {
    /// Creates a registry with no functions.
    pub fn empty() -> Self {
        Self {
            functions: RwLock::new(Vec::new()),
        }
    }

    /// Creates a registry holding the built-in function library.
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        register_builtins(&registry);
        registry
    }

    /// Adds an overload.
    pub fn register(&self, function: ScalarFunction) {
        self.functions.write().push(Arc::new(function));
    }

    /// Returns all overloads registered under `name`.
    pub fn candidates(&self, name: &str) -> Vec<Arc<ScalarFunction>> {
        self.functions
            .read()
            .iter()
            .filter(|f| f.signature().name.eq_ignore_ascii_case(name))
            .cloned()
            .collect()
    }

    /// Picks the overload of `name` that accepts `arg_types` most cheaply.
    pub fn resolve(&self, name: &str, arg_types: &[Type]) -> Result<Arc<ScalarFunction>, BindError> {
        let candidates = self.candidates(name);
        candidates
            .iter()
            .filter_map(|f| overload_cost(f.signature(), arg_types).map(|cost| (cost, f)))
            .min_by_key(|(cost, _)| *cost)
            .map(|(_, f)| Arc::clone(f))
            .ok_or_else(|| BindError::MethodNotResolvable {
                name: name.to_string(),
                arg_types: arg_types.to_vec(),
                candidates: candidates.iter().map(|f| f.signature().to_string()).collect(),
            })
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.functions.read().len())
            .finish()
    }
}

fn overload_cost(signature: &Signature, arg_types: &[Type]) -> Option<u32> {
    if !signature.accepts_arity(arg_types.len()) {
        return None;
    }
    arg_types.iter().enumerate().try_fold(0u32, |total, (i, ty)| {
        let param = signature.param(i)?;
        Some(total + conversion_cost(*ty, param)?)
    })
}

/// Result type of a call to `signature` with arguments of `arg_types`.
pub(crate) fn result_type(signature: &Signature, arg_types: &[Type]) -> Result<Type, BindError> {
    match signature.returns {
        ReturnType::Fixed(ty) => Ok(ty),
        ReturnType::CommonArgument => common_type_of(arg_types.iter().copied()).ok_or_else(|| {
            BindError::MethodNotResolvable {
                name: signature.name.clone(),
                arg_types: arg_types.to_vec(),
                candidates: vec![signature.to_string()],
            }
        }),
    }
}

// ============================================================================
// Built-in library
// ============================================================================

fn text(v: &Value) -> String {
    v.to_text()
}

fn int_arg(v: &Value) -> Result<i64, ExecutorError> {
    v.as_i64()
        .ok_or_else(|| ExecutorError::mismatch("integer", v.data_type().to_string()))
}

fn timestamp_arg(v: &Value) -> Result<&chrono::DateTime<chrono::FixedOffset>, ExecutorError> {
    match v {
        Value::Timestamp(ts) => Ok(ts),
        other => Err(ExecutorError::mismatch("timestamp", other.data_type().to_string())),
    }
}

fn interval_arg(v: &Value) -> Result<chrono::TimeDelta, ExecutorError> {
    match v {
        Value::Interval(d) => Ok(*d),
        other => Err(ExecutorError::mismatch("interval", other.data_type().to_string())),
    }
}

fn count_chars(s: &str) -> Result<Value, ExecutorError> {
    i32::try_from(s.chars().count())
        .map(Value::Integer)
        .map_err(|_| ExecutorError::IntegerOverflow)
}

/// Zero-based, character-indexed substring. Out-of-range positions clamp.
fn substring(s: &str, start: i64, length: Option<i64>) -> String {
    let start = usize::try_from(start.max(0)).unwrap_or(usize::MAX);
    let chars = s.chars().skip(start);
    match length {
        Some(n) => chars.take(usize::try_from(n.max(0)).unwrap_or(0)).collect(),
        None => chars.collect(),
    }
}

fn sig(name: &str, params: &[Type], returns: Type) -> Signature {
    Signature::new(name, params.to_vec(), returns)
}

fn register_builtins(registry: &FunctionRegistry) {
    use Type::*;

    // Strings
    registry.register(ScalarFunction::new(sig("Upper", &[Text], Text), |a| {
        Ok(Value::Text(text(&a[0]).to_uppercase()))
    }));
    registry.register(ScalarFunction::new(sig("Lower", &[Text], Text), |a| {
        Ok(Value::Text(text(&a[0]).to_lowercase()))
    }));
    registry.register(ScalarFunction::new(sig("Length", &[Text], Integer), |a| {
        count_chars(&text(&a[0]))
    }));
    registry.register(ScalarFunction::new(sig("Trim", &[Text], Text), |a| {
        Ok(Value::Text(text(&a[0]).trim().to_string()))
    }));
    registry.register(ScalarFunction::new(
        sig("Substring", &[Text, Bigint], Text),
        |a| Ok(Value::Text(substring(&text(&a[0]), int_arg(&a[1])?, None))),
    ));
    registry.register(ScalarFunction::new(
        sig("Substring", &[Text, Bigint, Bigint], Text),
        |a| {
            Ok(Value::Text(substring(
                &text(&a[0]),
                int_arg(&a[1])?,
                Some(int_arg(&a[2])?),
            )))
        },
    ));
    registry.register(ScalarFunction::new(sig("Contains", &[Text, Text], Boolean), |a| {
        Ok(Value::Boolean(text(&a[0]).contains(text(&a[1]).as_str())))
    }));
    registry.register(ScalarFunction::new(
        sig("StartsWith", &[Text, Text], Boolean),
        |a| Ok(Value::Boolean(text(&a[0]).starts_with(text(&a[1]).as_str()))),
    ));
    registry.register(ScalarFunction::new(
        sig("EndsWith", &[Text, Text], Boolean),
        |a| Ok(Value::Boolean(text(&a[0]).ends_with(text(&a[1]).as_str()))),
    ));
    registry.register(ScalarFunction::new(sig("IndexOf", &[Text, Text], Integer), |a| {
        let haystack = text(&a[0]);
        let needle = text(&a[1]);
        match haystack.find(needle.as_str()) {
            Some(byte) => count_chars(&haystack[..byte]),
            None => Ok(Value::Integer(-1)),
        }
    }));
    registry.register(ScalarFunction::new(
        sig("Replace", &[Text, Text, Text], Text),
        |a| {
            Ok(Value::Text(
                text(&a[0]).replace(text(&a[1]).as_str(), text(&a[2]).as_str()),
            ))
        },
    ));
    registry.register(ScalarFunction::null_aware(
        Signature {
            name: "Concat".into(),
            params: vec![],
            variadic: Some(ParamType::Any),
            returns: ReturnType::Fixed(Text),
        },
        |a| Ok(Value::Text(a.iter().map(Value::to_text).collect())),
    ));

    // Numbers. DOUBLE first so text arguments parse as decimals.
    registry.register(ScalarFunction::new(sig("Abs", &[Double], Double), |a| {
        Ok(Value::Double(a[0].as_f64().unwrap_or(0.0).abs()))
    }));
    registry.register(ScalarFunction::new(sig("Abs", &[Integer], Integer), |a| {
        match a[0] {
            Value::Integer(n) => n
                .checked_abs()
                .map(Value::Integer)
                .ok_or(ExecutorError::IntegerOverflow),
            ref other => Err(ExecutorError::mismatch("integer", other.data_type().to_string())),
        }
    }));
    registry.register(ScalarFunction::new(sig("Abs", &[Bigint], Bigint), |a| {
        int_arg(&a[0])?
            .checked_abs()
            .map(Value::Bigint)
            .ok_or(ExecutorError::IntegerOverflow)
    }));
    registry.register(ScalarFunction::new(sig("Round", &[Double], Double), |a| {
        Ok(Value::Double(a[0].as_f64().unwrap_or(0.0).round()))
    }));
    registry.register(ScalarFunction::new(
        sig("Round", &[Double, Integer], Double),
        |a| {
            let digits = i32::try_from(int_arg(&a[1])?).map_err(|_| ExecutorError::IntegerOverflow)?;
            let factor = 10f64.powi(digits);
            Ok(Value::Double((a[0].as_f64().unwrap_or(0.0) * factor).round() / factor))
        },
    ));
    registry.register(ScalarFunction::new(
        Signature {
            name: "ToDecimal".into(),
            params: vec![ParamType::Any],
            variadic: None,
            returns: ReturnType::Fixed(Double),
        },
        |a| cast_value(a[0].clone(), Double),
    ));
    registry.register(ScalarFunction::new(
        Signature {
            name: "ToInt".into(),
            params: vec![ParamType::Any],
            variadic: None,
            returns: ReturnType::Fixed(Integer),
        },
        |a| cast_value(a[0].clone(), Integer),
    ));

    // Time
    registry.register(ScalarFunction::new(sig("Year", &[Timestamp], Integer), |a| {
        Ok(Value::Integer(timestamp_arg(&a[0])?.year()))
    }));
    registry.register(ScalarFunction::new(sig("Month", &[Timestamp], Integer), |a| {
        Ok(Value::Integer(timestamp_arg(&a[0])?.month() as i32))
    }));
    registry.register(ScalarFunction::new(sig("Day", &[Timestamp], Integer), |a| {
        Ok(Value::Integer(timestamp_arg(&a[0])?.day() as i32))
    }));
    registry.register(ScalarFunction::new(sig("Hours", &[Timestamp], Integer), |a| {
        Ok(Value::Integer(timestamp_arg(&a[0])?.hour() as i32))
    }));
    registry.register(ScalarFunction::new(sig("Hours", &[Interval], Bigint), |a| {
        Ok(Value::Bigint(interval_arg(&a[0])?.num_hours()))
    }));
    registry.register(ScalarFunction::new(sig("Minutes", &[Timestamp], Integer), |a| {
        Ok(Value::Integer(timestamp_arg(&a[0])?.minute() as i32))
    }));
    registry.register(ScalarFunction::new(sig("Minutes", &[Interval], Bigint), |a| {
        Ok(Value::Bigint(interval_arg(&a[0])?.num_minutes()))
    }));
    registry.register(ScalarFunction::new(
        sig("TotalSeconds", &[Interval], Double),
        |a| {
            let d = interval_arg(&a[0])?;
            Ok(Value::Double(
                d.num_seconds() as f64 + f64::from(d.subsec_nanos()) / 1e9,
            ))
        },
    ));

    // NULL handling
    registry.register(ScalarFunction::null_aware(
        Signature {
            name: "Coalesce".into(),
            params: vec![],
            variadic: Some(ParamType::Any),
            returns: ReturnType::CommonArgument,
        },
        |a| Ok(a.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null)),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Conversion ladder
    // ========================================================================

    #[test]
    fn test_conversion_costs() {
        let exact = ParamType::Exact;
        assert_eq!(conversion_cost(Type::Integer, exact(Type::Integer)), Some(0));
        assert_eq!(conversion_cost(Type::Integer, exact(Type::Bigint)), Some(1));
        assert_eq!(conversion_cost(Type::Bigint, exact(Type::Double)), Some(2));
        assert_eq!(conversion_cost(Type::Text, exact(Type::Double)), Some(10));
        assert_eq!(conversion_cost(Type::Text, exact(Type::Boolean)), Some(10));
        assert_eq!(conversion_cost(Type::Double, exact(Type::Integer)), None);
        assert_eq!(conversion_cost(Type::Boolean, ParamType::Any), Some(0));
    }

    #[test]
    fn test_common_type() {
        assert_eq!(common_type(Type::Integer, Type::Double), Some(Type::Double));
        assert_eq!(common_type(Type::Null, Type::Text), Some(Type::Text));
        assert_eq!(common_type(Type::Char, Type::Text), Some(Type::Text));
        assert_eq!(common_type(Type::Text, Type::Boolean), Some(Type::Boolean));
        assert_eq!(common_type(Type::Boolean, Type::Timestamp), None);
        assert_eq!(
            common_type_of([Type::Null, Type::Integer, Type::Bigint]),
            Some(Type::Bigint)
        );
    }

    // ========================================================================
    // Overload resolution
    // ========================================================================

    #[test]
    fn test_cheapest_overload_wins() {
        let registry = FunctionRegistry::with_builtins();
        let abs = registry.resolve("ABS", &[Type::Integer]).unwrap();
        assert_eq!(abs.signature().to_string(), "Abs(INTEGER) -> INTEGER");
        let abs = registry.resolve("abs", &[Type::Text]).unwrap();
        assert_eq!(abs.signature().to_string(), "Abs(DOUBLE) -> DOUBLE");
        let sub = registry
            .resolve("Substring", &[Type::Text, Type::Integer])
            .unwrap();
        assert_eq!(sub.signature().params.len(), 2);
    }

    #[test]
    fn test_unresolvable_lists_candidates() {
        let registry = FunctionRegistry::with_builtins();
        let err = registry.resolve("Upper", &[Type::Boolean]).unwrap_err();
        match err {
            BindError::MethodNotResolvable {
                name,
                arg_types,
                candidates,
            } => {
                assert_eq!(name, "Upper");
                assert_eq!(arg_types, vec![Type::Boolean]);
                assert_eq!(candidates, vec!["Upper(TEXT) -> TEXT".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_user_registered_function_is_resolvable() {
        let registry = FunctionRegistry::empty();
        assert!(registry.resolve("Twice", &[Type::Integer]).is_err());
        registry.register(ScalarFunction::new(
            Signature::new("Twice", vec![Type::Bigint], Type::Bigint),
            |a| Ok(Value::Bigint(a[0].as_i64().unwrap_or(0) * 2)),
        ));
        let f = registry.resolve("twice", &[Type::Integer]).unwrap();
        assert_eq!(f.invoke(&[Value::Bigint(21)]).unwrap(), Value::Bigint(42));
    }

    // ========================================================================
    // Built-ins
    // ========================================================================

    fn call(name: &str, args: &[Value]) -> Value {
        let registry = FunctionRegistry::with_builtins();
        let types: Vec<Type> = args.iter().map(Value::data_type).collect();
        let f = registry.resolve(name, &types).unwrap();
        let converted: Vec<Value> = args
            .iter()
            .enumerate()
            .map(|(i, v)| match f.signature().param(i) {
                Some(ParamType::Exact(t)) => cast_value(v.clone(), t).unwrap(),
                _ => v.clone(),
            })
            .collect();
        f.invoke(&converted).unwrap()
    }

    #[test]
    fn test_string_builtins() {
        assert_eq!(
            call("Substring", &[Value::from("proseware"), Value::Integer(0), Value::Integer(5)]),
            Value::from("prose")
        );
        assert_eq!(
            call("Substring", &[Value::from("abc"), Value::Integer(10)]),
            Value::from("")
        );
        assert_eq!(
            call("IndexOf", &[Value::from("héllo"), Value::from("l")]),
            Value::Integer(2)
        );
        assert_eq!(
            call("Concat", &[Value::from("a"), Value::Null, Value::Integer(1)]),
            Value::from("a1")
        );
        assert_eq!(call("Length", &[Value::Null]), Value::Null);
    }

    #[test]
    fn test_numeric_and_null_builtins() {
        assert_eq!(call("Abs", &[Value::from("-3,5")]), Value::Double(3.5));
        assert_eq!(
            call("Round", &[Value::Double(2.346), Value::Integer(2)]),
            Value::Double(2.35)
        );
        assert_eq!(call("ToInt", &[Value::from("42")]), Value::Integer(42));
        assert_eq!(
            call("Coalesce", &[Value::Null, Value::Integer(7)]),
            Value::Integer(7)
        );
    }
}
