//! PIVOT materialization.
//!
//! Rows are grouped by every input column the pivot does not consume, and one
//! accumulator is kept per (group, listed value) cell. Each group becomes one
//! wide output row: the group columns followed by one column per listed value.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::trace;

use crate::datum::Value;

use super::aggregate::{Accumulator, AggregateOp, GroupKey};
use super::error::ExecutorError;
use super::expr::BoundExpr;

/// A bound PIVOT clause.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotOp {
    /// Aggregate computed per cell, bound against the input row.
    pub aggregate: AggregateOp,
    /// The categorical FOR expression.
    pub for_expr: BoundExpr,
    /// Listed values, one output column each.
    pub values: Vec<Value>,
    /// Input positions of the implicit grouping columns.
    pub group_columns: Vec<usize>,
}

struct Cell {
    accumulator: Box<dyn Accumulator>,
    seen: HashSet<GroupKey>,
}

impl PivotOp {
    /// Returns the index of the listed value `v` matches, if any.
    fn slot(&self, v: &Value) -> Option<usize> {
        if v.is_null() {
            return None;
        }
        let probe = GroupKey::new(vec![v.clone()]);
        self.values
            .iter()
            .position(|listed| GroupKey::new(vec![listed.clone()]) == probe)
    }

    fn new_cells(&self) -> Vec<Cell> {
        self.values
            .iter()
            .map(|_| Cell {
                accumulator: self.aggregate.create_accumulator(),
                seen: HashSet::new(),
            })
            .collect()
    }

    /// Reshapes `rows` into wide form.
    ///
    /// Groups appear in first-seen order. Rows whose FOR value is not listed
    /// still establish their group; cells that receive no rows hold the
    /// aggregate's empty result (0 for COUNT, NULL otherwise).
    pub(crate) fn compute(&self, rows: &[Vec<Value>]) -> Result<Vec<Vec<Value>>, ExecutorError> {
        let mut groups: HashMap<GroupKey, Vec<Cell>> = HashMap::new();
        let mut order: Vec<GroupKey> = Vec::new();

        for row in rows {
            let key = GroupKey::new(
                self.group_columns
                    .iter()
                    .map(|&i| {
                        row.get(i)
                            .cloned()
                            .ok_or(ExecutorError::ColumnIndexOutOfBounds {
                                index: i,
                                len: row.len(),
                            })
                    })
                    .collect::<Result<_, _>>()?,
            );
            if !groups.contains_key(&key) {
                order.push(key.clone());
                groups.insert(key.clone(), self.new_cells());
            }
            let Some(slot) = self.slot(&self.for_expr.evaluate(row)?) else {
                continue;
            };
            let Some(value) = self.aggregate.input(row)? else {
                continue;
            };
            let Some(cells) = groups.get_mut(&key) else {
                continue;
            };
            let cell = &mut cells[slot];
            if self.aggregate.distinct && !cell.seen.insert(GroupKey::new(vec![value.clone()])) {
                continue;
            }
            cell.accumulator.feed(&value)?;
        }

        trace!(
            groups = order.len(),
            columns = self.values.len(),
            "pivot materialized"
        );

        Ok(order
            .into_iter()
            .map(|key| {
                let cells = groups.remove(&key).unwrap_or_default();
                let mut out = key.0;
                out.extend(cells.iter().map(|c| c.accumulator.finish()));
                out
            })
            .collect())
    }
}

impl fmt::Display for PivotOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();
        write!(
            f,
            "{} FOR {} IN ({})",
            self.aggregate,
            self.for_expr,
            values.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::Type;
    use crate::executor::aggregate::AggregateFunction;

    fn col(index: usize, ty: Type) -> BoundExpr {
        BoundExpr::Column {
            index,
            name: format!("c{index}"),
            ty,
            nullable: false,
        }
    }

    /// (region, product, amount)
    fn sales() -> Vec<Vec<Value>> {
        [
            ("north", "apple", 3),
            ("north", "pear", 2),
            ("south", "apple", 5),
            ("north", "apple", 4),
            ("south", "fig", 1),
        ]
        .iter()
        .map(|(r, p, a)| vec![Value::from(*r), Value::from(*p), Value::Bigint(*a)])
        .collect()
    }

    fn pivot(func: AggregateFunction) -> PivotOp {
        PivotOp {
            aggregate: AggregateOp {
                func,
                args: vec![col(2, Type::Bigint)],
                distinct: false,
            },
            for_expr: col(1, Type::Text),
            values: vec![Value::from("apple"), Value::from("pear"), Value::from("kiwi")],
            group_columns: vec![0],
        }
    }

    #[test]
    fn test_sum_pivot_with_absent_value() {
        let out = pivot(AggregateFunction::Sum).compute(&sales()).unwrap();
        assert_eq!(
            out,
            vec![
                vec![
                    Value::from("north"),
                    Value::Bigint(7),
                    Value::Bigint(2),
                    Value::Null
                ],
                vec![Value::from("south"), Value::Bigint(5), Value::Null, Value::Null],
            ]
        );
    }

    #[test]
    fn test_count_pivot_absent_cells_are_zero() {
        let out = pivot(AggregateFunction::Count).compute(&sales()).unwrap();
        assert_eq!(out[1], vec![
            Value::from("south"),
            Value::Bigint(1),
            Value::Bigint(0),
            Value::Bigint(0)
        ]);
    }

    #[test]
    fn test_empty_input_produces_no_rows() {
        assert!(pivot(AggregateFunction::Sum).compute(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            pivot(AggregateFunction::Sum).to_string(),
            "SUM($col2 (c2)) FOR $col1 (c1) IN ('apple', 'pear', 'kiwi')"
        );
    }
}
