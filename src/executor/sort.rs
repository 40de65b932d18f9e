//! Sort keys shared by the Sort node, window ordering and sort-merge joins.

use std::cmp::Ordering;
use std::fmt;

use crate::datum::Value;
use crate::sql::NullOrdering;

use super::error::ExecutorError;
use super::eval::compare_values;
use super::expr::BoundExpr;

/// A single ORDER BY key.
#[derive(Debug, Clone, PartialEq)]
pub struct SortItem {
    /// Key expression, bound against the input row.
    pub expr: BoundExpr,
    /// Descending order.
    pub descending: bool,
    /// Where NULLs sort.
    pub nulls: NullOrdering,
}

impl SortItem {
    /// Ascending key with default NULL placement.
    pub fn asc(expr: BoundExpr) -> Self {
        Self {
            expr,
            descending: false,
            nulls: NullOrdering::Default,
        }
    }

    /// Default: NULLS LAST for ASC, NULLS FIRST for DESC.
    fn nulls_first(&self) -> bool {
        match self.nulls {
            NullOrdering::First => true,
            NullOrdering::Last => false,
            NullOrdering::Default => self.descending,
        }
    }
}

impl fmt::Display for SortItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if self.descending {
            write!(f, " DESC")?;
        }
        match self.nulls {
            NullOrdering::First => write!(f, " NULLS FIRST"),
            NullOrdering::Last => write!(f, " NULLS LAST"),
            NullOrdering::Default => Ok(()),
        }
    }
}

/// Evaluates every sort key for one row.
pub(crate) fn sort_keys(items: &[SortItem], row: &[Value]) -> Result<Vec<Value>, ExecutorError> {
    items.iter().map(|item| item.expr.evaluate(row)).collect()
}

/// Compares two precomputed key tuples under `items`.
pub(crate) fn compare_keys(
    a: &[Value],
    b: &[Value],
    items: &[SortItem],
) -> Result<Ordering, ExecutorError> {
    for ((a_val, b_val), item) in a.iter().zip(b).zip(items) {
        let ord = match (a_val.is_null(), b_val.is_null()) {
            (true, true) => continue,
            (true, false) if item.nulls_first() => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if item.nulls_first() => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = compare_values(a_val, b_val)?;
                if item.descending { ord.reverse() } else { ord }
            }
        };
        if ord != Ordering::Equal {
            return Ok(ord);
        }
    }
    Ok(Ordering::Equal)
}

/// Stable-sorts `entries` by their precomputed keys.
///
/// The first comparison error aborts the sort and is returned.
pub(crate) fn sort_by_keys<T>(
    entries: &mut [(Vec<Value>, T)],
    items: &[SortItem],
) -> Result<(), ExecutorError> {
    let mut error = None;
    entries.sort_by(|(a, _), (b, _)| match compare_keys(a, b, items) {
        Ok(ord) => ord,
        Err(e) => {
            error.get_or_insert(e);
            Ordering::Equal
        }
    });
    match error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::Type;

    fn item(descending: bool, nulls: NullOrdering) -> SortItem {
        SortItem {
            expr: BoundExpr::Column {
                index: 0,
                name: "v".into(),
                ty: Type::Bigint,
                nullable: true,
            },
            descending,
            nulls,
        }
    }

    fn sorted(values: Vec<Value>, item: SortItem) -> Vec<Value> {
        let mut entries: Vec<(Vec<Value>, usize)> = values
            .iter()
            .enumerate()
            .map(|(i, v)| (vec![v.clone()], i))
            .collect();
        sort_by_keys(&mut entries, &[item]).unwrap();
        entries.into_iter().map(|(k, _)| k[0].clone()).collect()
    }

    #[test]
    fn test_default_null_placement() {
        let values = vec![Value::Bigint(2), Value::Null, Value::Bigint(1)];
        assert_eq!(
            sorted(values.clone(), item(false, NullOrdering::Default)),
            vec![Value::Bigint(1), Value::Bigint(2), Value::Null]
        );
        assert_eq!(
            sorted(values.clone(), item(true, NullOrdering::Default)),
            vec![Value::Null, Value::Bigint(2), Value::Bigint(1)]
        );
        assert_eq!(
            sorted(values, item(false, NullOrdering::First)),
            vec![Value::Null, Value::Bigint(1), Value::Bigint(2)]
        );
    }

    #[test]
    fn test_sort_is_stable() {
        let mut entries = vec![
            (vec![Value::Bigint(1)], "a"),
            (vec![Value::Bigint(0)], "b"),
            (vec![Value::Bigint(1)], "c"),
        ];
        sort_by_keys(&mut entries, &[item(false, NullOrdering::Default)]).unwrap();
        let order: Vec<&str> = entries.iter().map(|(_, s)| *s).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_incomparable_keys_error() {
        let mut entries = vec![(vec![Value::from("x")], 0), (vec![Value::Bigint(1)], 1)];
        assert!(sort_by_keys(&mut entries, &[item(false, NullOrdering::Default)]).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            item(true, NullOrdering::Last).to_string(),
            "$col0 (v) DESC NULLS LAST"
        );
    }
}
