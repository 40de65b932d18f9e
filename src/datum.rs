//! Data types and values.
//!
//! This module defines the type system shared by the binder and the executor.
//! [`Type`] identifies a column or expression type, and [`Value`] is a single
//! typed value flowing through the engine. Row sources hand values over as
//! [`Value`]s once per column, so the shape of a source is fixed at bind time.

use std::fmt;

use chrono::{DateTime, FixedOffset, TimeDelta};

/// Data type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// Type of the untyped `NULL` literal. Converts to every other type.
    Null,
    /// Boolean type.
    Boolean,
    /// Single character, produced by indexing into a string.
    Char,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    Bigint,
    /// Double-precision floating-point.
    Double,
    /// Variable-length string.
    Text,
    /// Instant with a fixed UTC offset.
    Timestamp,
    /// Signed duration.
    Interval,
}

impl Type {
    /// Returns the SQL display name for this type (e.g., `"BOOLEAN"`, `"INTEGER"`).
    pub const fn display_name(self) -> &'static str {
        match self {
            Type::Null => "NULL",
            Type::Boolean => "BOOLEAN",
            Type::Char => "CHAR",
            Type::Integer => "INTEGER",
            Type::Bigint => "BIGINT",
            Type::Double => "DOUBLE",
            Type::Text => "TEXT",
            Type::Timestamp => "TIMESTAMP",
            Type::Interval => "INTERVAL",
        }
    }

    /// Parses a type name as written in `CAST(x AS type)`.
    pub fn from_name(name: &str) -> Option<Self> {
        let ty = match name.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Type::Boolean,
            "char" | "character" => Type::Char,
            "int" | "integer" | "int4" => Type::Integer,
            "bigint" | "long" | "int8" => Type::Bigint,
            "double" | "float" | "float8" | "decimal" | "numeric" | "real" => Type::Double,
            "text" | "string" | "varchar" => Type::Text,
            "timestamp" | "datetime" | "datetimeoffset" => Type::Timestamp,
            "interval" | "timespan" => Type::Interval,
            _ => return None,
        };
        Some(ty)
    }

    /// Returns true for the integer and floating-point types.
    pub const fn is_numeric(self) -> bool {
        matches!(self, Type::Integer | Type::Bigint | Type::Double)
    }

    /// Returns true for the string-like types.
    pub const fn is_textual(self) -> bool {
        matches!(self, Type::Char | Type::Text)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Null => "null",
            Type::Boolean => "boolean",
            Type::Char => "char",
            Type::Integer => "integer",
            Type::Bigint => "bigint",
            Type::Double => "double",
            Type::Text => "text",
            Type::Timestamp => "timestamp",
            Type::Interval => "interval",
        };
        write!(f, "{}", name)
    }
}

/// A typed value.
///
/// Variable-length types (Text) are heap-allocated; everything else is
/// stored inline.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL (type is unknown/any).
    Null,
    /// Boolean (true/false).
    Boolean(bool),
    /// Single character.
    Char(char),
    /// 32-bit signed integer.
    Integer(i32),
    /// 64-bit signed integer.
    Bigint(i64),
    /// 64-bit floating point.
    Double(f64),
    /// Variable-length text.
    Text(String),
    /// Instant with offset. Comparisons use the instant, not the wall clock.
    Timestamp(DateTime<FixedOffset>),
    /// Signed duration.
    Interval(TimeDelta),
}

impl Value {
    /// Returns the type of this value. `NULL` reports [`Type::Null`].
    pub fn data_type(&self) -> Type {
        match self {
            Value::Null => Type::Null,
            Value::Boolean(_) => Type::Boolean,
            Value::Char(_) => Type::Char,
            Value::Integer(_) => Type::Integer,
            Value::Bigint(_) => Type::Bigint,
            Value::Double(_) => Type::Double,
            Value::Text(_) => Type::Text,
            Value::Timestamp(_) => Type::Timestamp,
            Value::Interval(_) => Type::Interval,
        }
    }

    /// Returns true if this value is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean payload, or `None` for anything else.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the string payload for `Text`, or `None` for anything else.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Widens an integer or floating-point value to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Bigint(n) => Some(*n as f64),
            Value::Double(n) => Some(*n),
            _ => None,
        }
    }

    /// Widens an integer value to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n as i64),
            Value::Bigint(n) => Some(*n),
            _ => None,
        }
    }

    /// Converts this value to its plain text representation.
    ///
    /// Strings are returned without quotes and NULL is the empty string. Pivot
    /// column names are derived from this form.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(b) => (if *b { "true" } else { "false" }).to_string(),
            Value::Char(c) => c.to_string(),
            Value::Integer(n) => n.to_string(),
            Value::Bigint(n) => n.to_string(),
            Value::Double(n) => format_float(*n),
            Value::Text(s) => s.clone(),
            Value::Timestamp(ts) => ts.to_rfc3339(),
            Value::Interval(d) => format_interval(*d),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Char(c) => write!(f, "'{}'", c),
            other => write!(f, "{}", other.to_text()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Value::Char(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Bigint(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<TimeDelta> for Value {
    fn from(v: TimeDelta) -> Self {
        Value::Interval(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Formats a float value.
///
/// Special values use `Infinity`, `-Infinity` and `NaN`.
fn format_float(n: f64) -> String {
    if n.is_infinite() {
        if n.is_sign_positive() {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n.is_nan() {
        "NaN".to_string()
    } else {
        format!("{}", n)
    }
}

/// Formats a duration as `[-][d.]hh:mm:ss[.fffffff]`.
fn format_interval(d: TimeDelta) -> String {
    let sign = if d < TimeDelta::zero() { "-" } else { "" };
    let d = d.abs();
    let days = d.num_days();
    let hours = d.num_hours() % 24;
    let minutes = d.num_minutes() % 60;
    let seconds = d.num_seconds() % 60;
    let nanos = d.subsec_nanos();
    let mut out = String::from(sign);
    if days > 0 {
        out.push_str(&format!("{}.", days));
    }
    out.push_str(&format!("{:02}:{:02}:{:02}", hours, minutes, seconds));
    if nanos > 0 {
        out.push_str(&format!(".{:07}", nanos / 100));
    }
    out
}

/// Parses a decimal number written with either `.` or `,` as the decimal
/// separator.
///
/// When both separators appear, the last one is the decimal separator and the
/// other is treated as digit grouping (`1.234,5` and `1,234.5` are both
/// 1234.5). A lone single comma is a decimal separator (`3,75`); repeated
/// commas are grouping (`1,234,567`). Spaces inside the number are grouping.
pub fn parse_decimal(text: &str) -> Option<f64> {
    let s: String = text
        .trim()
        .chars()
        .filter(|c| *c != ' ' && *c != '\u{a0}')
        .collect();
    if s.is_empty() {
        return None;
    }
    let normalized = match (s.rfind('.'), s.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (None, Some(_)) if s.matches(',').count() == 1 => s.replace(',', "."),
        (None, Some(_)) => s.replace(',', ""),
        _ => s,
    };
    let digits = normalized.strip_prefix(['+', '-']).unwrap_or(&normalized);
    let plain = digits.bytes().any(|b| b.is_ascii_digit())
        && digits.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        && digits.matches('.').count() <= 1;
    if !plain {
        return None;
    }
    normalized.parse::<f64>().ok()
}

/// Parses an integer, accepting the same separators as [`parse_decimal`] as
/// long as the value has no fractional part.
pub fn parse_integer(text: &str) -> Option<i64> {
    if let Ok(n) = text.trim().parse::<i64>() {
        return Some(n);
    }
    let n = parse_decimal(text)?;
    if n.fract() != 0.0 || n < i64::MIN as f64 || n > i64::MAX as f64 {
        return None;
    }
    Some(n as i64)
}

/// Truth-tests a string: `true/t/yes/y/1/on` and `false/f/no/n/0/off`,
/// case-insensitive, surrounding whitespace ignored.
pub fn parse_truth(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" | "on" => Some(true),
        "false" | "f" | "no" | "n" | "0" | "off" => Some(false),
        _ => None,
    }
}

/// Parses an RFC 3339 timestamp (`2024-01-02T03:04:05+01:00`) or a
/// `YYYY-MM-DD HH:MM:SS` wall-clock time, which is taken as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<FixedOffset>> {
    let s = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts);
    }
    let naive = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|d| d.and_time(chrono::NaiveTime::default()))
        })
        .ok()?;
    Some(naive.and_utc().fixed_offset())
}

/// Parses a `[-][d.]hh:mm:ss[.fraction]` duration.
pub fn parse_interval(text: &str) -> Option<TimeDelta> {
    let s = text.trim();
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let mut parts = s.split(':');
    let head = parts.next()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds_part = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let (days, hours) = match head.split_once('.') {
        Some((d, h)) => (d.parse::<i64>().ok()?, h.parse::<i64>().ok()?),
        None => (0, head.parse::<i64>().ok()?),
    };
    let (secs, frac) = match seconds_part.split_once('.') {
        Some((s, f)) => (s.parse::<i64>().ok()?, f),
        None => (seconds_part.parse::<i64>().ok()?, ""),
    };
    let nanos = if frac.is_empty() {
        0
    } else {
        let digits: String = frac.chars().chain(std::iter::repeat('0')).take(9).collect();
        digits.parse::<i64>().ok()?
    };
    let total = TimeDelta::days(days)
        + TimeDelta::hours(hours)
        + TimeDelta::minutes(minutes)
        + TimeDelta::seconds(secs)
        + TimeDelta::nanoseconds(nanos);
    Some(if negative { -total } else { total })
}
