//! Window function evaluation.
//!
//! A [`WindowOp`] is computed over a fully materialized input: rows are
//! partitioned by the PARTITION BY tuple, stably ordered by the ORDER BY keys
//! inside each partition, and each row receives one value. Results are
//! returned by input position so several windows over the same input can be
//! combined into one output row.

use std::collections::HashMap;
use std::fmt;

use tracing::trace;

use crate::datum::{Type, Value};

use super::aggregate::{AggregateFunction, AggregateOp, GroupKey, aggregate_output_type};
use super::error::ExecutorError;
use super::expr::BoundExpr;
use super::sort::{SortItem, compare_keys, sort_by_keys, sort_keys};

/// Functions usable with an OVER clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFunction {
    /// Sequential 1-based number within the partition.
    RowNumber,
    /// 1-based rank with gaps after ties.
    Rank,
    /// 1-based rank without gaps.
    DenseRank,
    /// An aggregate computed over the window frame.
    Aggregate(AggregateFunction),
}

impl WindowFunction {
    /// Resolves a window function name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "row_number" => Some(WindowFunction::RowNumber),
            "rank" => Some(WindowFunction::Rank),
            "dense_rank" => Some(WindowFunction::DenseRank),
            other => AggregateFunction::from_name(other).map(WindowFunction::Aggregate),
        }
    }
}

impl fmt::Display for WindowFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowFunction::RowNumber => write!(f, "ROW_NUMBER"),
            WindowFunction::Rank => write!(f, "RANK"),
            WindowFunction::DenseRank => write!(f, "DENSE_RANK"),
            WindowFunction::Aggregate(agg) => write!(f, "{}", agg),
        }
    }
}

/// One windowed call.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowOp {
    pub func: WindowFunction,
    pub args: Vec<BoundExpr>,
    pub partition_by: Vec<BoundExpr>,
    pub order_by: Vec<SortItem>,
}

impl WindowOp {
    pub fn output_type(&self) -> Type {
        match self.func {
            WindowFunction::Aggregate(agg) => {
                aggregate_output_type(agg, self.args.first().map(BoundExpr::ty))
            }
            _ => Type::Bigint,
        }
    }

    pub fn nullable(&self) -> bool {
        match self.func {
            WindowFunction::Aggregate(agg) => self.aggregate(agg).nullable(true),
            _ => false,
        }
    }

    fn aggregate(&self, func: AggregateFunction) -> AggregateOp {
        AggregateOp {
            func,
            args: self.args.clone(),
            distinct: false,
        }
    }

    /// Computes this window's value for every row, in input order.
    pub(crate) fn compute(&self, rows: &[Vec<Value>]) -> Result<Vec<Value>, ExecutorError> {
        let mut partition_index: HashMap<GroupKey, usize> = HashMap::new();
        let mut partitions: Vec<Vec<usize>> = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            let key = GroupKey::new(
                self.partition_by
                    .iter()
                    .map(|e| e.evaluate(row))
                    .collect::<Result<_, _>>()?,
            );
            let slot = *partition_index.entry(key).or_insert_with(|| {
                partitions.push(Vec::new());
                partitions.len() - 1
            });
            partitions[slot].push(i);
        }

        let mut out = vec![Value::Null; rows.len()];
        for members in &partitions {
            let mut ordered = members
                .iter()
                .map(|&i| Ok((sort_keys(&self.order_by, &rows[i])?, i)))
                .collect::<Result<Vec<_>, ExecutorError>>()?;
            sort_by_keys(&mut ordered, &self.order_by)?;
            self.fill_partition(&ordered, rows, &mut out)?;
        }

        trace!(
            function = %self.func,
            partitions = partitions.len(),
            rows = rows.len(),
            "window computed"
        );
        Ok(out)
    }

    fn fill_partition(
        &self,
        ordered: &[(Vec<Value>, usize)],
        rows: &[Vec<Value>],
        out: &mut [Value],
    ) -> Result<(), ExecutorError> {
        match self.func {
            WindowFunction::RowNumber => {
                for (n, (_, i)) in ordered.iter().enumerate() {
                    out[*i] = Value::Bigint(n as i64 + 1);
                }
            }
            WindowFunction::Rank | WindowFunction::DenseRank => {
                let mut rank = 0i64;
                let mut dense = 0i64;
                for (n, (keys, i)) in ordered.iter().enumerate() {
                    let tied = n > 0
                        && compare_keys(&ordered[n - 1].0, keys, &self.order_by)?.is_eq();
                    if !tied {
                        rank = n as i64 + 1;
                        dense += 1;
                    }
                    out[*i] = Value::Bigint(if self.func == WindowFunction::Rank {
                        rank
                    } else {
                        dense
                    });
                }
            }
            WindowFunction::Aggregate(func) => {
                let op = self.aggregate(func);
                let mut acc = op.create_accumulator();
                if self.order_by.is_empty() {
                    for (_, i) in ordered {
                        if let Some(v) = op.input(&rows[*i])? {
                            acc.feed(&v)?;
                        }
                    }
                    let total = acc.finish();
                    for (_, i) in ordered {
                        out[*i] = total.clone();
                    }
                } else {
                    for (_, i) in ordered {
                        if let Some(v) = op.input(&rows[*i])? {
                            acc.feed(&v)?;
                        }
                        out[*i] = acc.finish();
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for WindowOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
        let args = match self.func {
            WindowFunction::Aggregate(AggregateFunction::Count) if args.is_empty() => "*".into(),
            _ => args.join(", "),
        };
        write!(f, "{}({}) OVER (", self.func, args)?;
        let mut sep = "";
        if !self.partition_by.is_empty() {
            let keys: Vec<String> = self.partition_by.iter().map(|e| e.to_string()).collect();
            write!(f, "PARTITION BY {}", keys.join(", "))?;
            sep = " ";
        }
        if !self.order_by.is_empty() {
            let keys: Vec<String> = self.order_by.iter().map(|e| e.to_string()).collect();
            write!(f, "{}ORDER BY {}", sep, keys.join(", "))?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::NullOrdering;

    fn col(index: usize, ty: Type) -> BoundExpr {
        BoundExpr::Column {
            index,
            name: format!("c{index}"),
            ty,
            nullable: false,
        }
    }

    fn desc(expr: BoundExpr) -> SortItem {
        SortItem {
            expr,
            descending: true,
            nulls: NullOrdering::Default,
        }
    }

    fn rows(data: &[(&str, i64)]) -> Vec<Vec<Value>> {
        data.iter()
            .map(|(g, v)| vec![Value::from(*g), Value::Bigint(*v)])
            .collect()
    }

    fn bigints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|v| Value::Bigint(*v)).collect()
    }

    // ========================================================================
    // Ranking
    // ========================================================================

    #[test]
    fn test_rank_with_ties_leaves_gaps() {
        let input = rows(&[("a", 10), ("a", 30), ("a", 30), ("a", 20), ("b", 5)]);
        let op = WindowOp {
            func: WindowFunction::Rank,
            args: vec![],
            partition_by: vec![col(0, Type::Text)],
            order_by: vec![desc(col(1, Type::Bigint))],
        };
        assert_eq!(op.compute(&input).unwrap(), bigints(&[4, 1, 1, 3, 1]));
    }

    #[test]
    fn test_dense_rank_and_row_number() {
        let input = rows(&[("a", 10), ("a", 30), ("a", 30), ("a", 20)]);
        let mut op = WindowOp {
            func: WindowFunction::DenseRank,
            args: vec![],
            partition_by: vec![],
            order_by: vec![desc(col(1, Type::Bigint))],
        };
        assert_eq!(op.compute(&input).unwrap(), bigints(&[3, 1, 1, 2]));

        op.func = WindowFunction::RowNumber;
        assert_eq!(op.compute(&input).unwrap(), bigints(&[4, 1, 2, 3]));
    }

    // ========================================================================
    // Windowed aggregates
    // ========================================================================

    #[test]
    fn test_running_sum_with_order_by() {
        let input = rows(&[("a", 3), ("a", 1), ("b", 7), ("a", 2)]);
        let op = WindowOp {
            func: WindowFunction::Aggregate(AggregateFunction::Sum),
            args: vec![col(1, Type::Bigint)],
            partition_by: vec![col(0, Type::Text)],
            order_by: vec![SortItem::asc(col(1, Type::Bigint))],
        };
        assert_eq!(op.compute(&input).unwrap(), bigints(&[6, 1, 7, 3]));
    }

    #[test]
    fn test_partition_total_without_order_by() {
        let input = rows(&[("a", 3), ("a", 1), ("b", 7)]);
        let op = WindowOp {
            func: WindowFunction::Aggregate(AggregateFunction::Count),
            args: vec![],
            partition_by: vec![col(0, Type::Text)],
            order_by: vec![],
        };
        assert_eq!(op.compute(&input).unwrap(), bigints(&[2, 2, 1]));
        assert!(!op.nullable());
    }

    #[test]
    fn test_from_name_and_display() {
        assert_eq!(WindowFunction::from_name("Rank"), Some(WindowFunction::Rank));
        assert_eq!(
            WindowFunction::from_name("sum"),
            Some(WindowFunction::Aggregate(AggregateFunction::Sum))
        );
        assert_eq!(WindowFunction::from_name("upper"), None);

        let op = WindowOp {
            func: WindowFunction::Rank,
            args: vec![],
            partition_by: vec![col(0, Type::Text)],
            order_by: vec![desc(col(1, Type::Bigint))],
        };
        assert_eq!(
            op.to_string(),
            "RANK() OVER (PARTITION BY $col0 (c0) ORDER BY $col1 (c1) DESC)"
        );
    }
}
