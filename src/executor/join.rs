//! Join engine.
//!
//! Both inputs are materialized (the build side fully drained before any
//! probing), then one of three strategies produces the matching
//! `(left, right)` index pairs:
//!
//! - **hash**: build on the smaller side keyed by the equality conjuncts,
//!   probe with the other;
//! - **sort-merge**: sort both sides by the join key and merge; for a range
//!   predicate a monotone cursor over the sorted right side bounds the
//!   candidate set;
//! - **nested loop**: test every pair.
//!
//! Every candidate is re-checked against the full ON condition, and all
//! strategies share one assembly step that interleaves null-extended rows.
//! The output for a given input is therefore identical across strategies.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::datum::Value;
use crate::sql::{BinaryOperator, JoinType};

use super::aggregate::GroupKey;
use super::context::CompilationOptions;
use super::error::ExecutorError;
use super::eval::{compare_values, is_true};
use super::expr::BoundExpr;
use super::row::Row;

/// Join algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStrategy {
    Hash,
    SortMerge,
    NestedLoop,
}

impl fmt::Display for JoinStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinStrategy::Hash => write!(f, "hash"),
            JoinStrategy::SortMerge => write!(f, "sort-merge"),
            JoinStrategy::NestedLoop => write!(f, "nested-loop"),
        }
    }
}

/// An orderable comparison between one expression over the left input and
/// one over the right input.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeKey {
    /// Expression over the left row.
    pub left: BoundExpr,
    /// One of `<`, `<=`, `>`, `>=`, reading `left op right`.
    pub op: BinaryOperator,
    /// Expression over the right row (indices relative to the right row).
    pub right: BoundExpr,
}

/// A bound join: kind, condition, and the predicate shapes the optimized
/// strategies can exploit.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub kind: JoinType,
    /// Full ON condition over the concatenated `left ++ right` row.
    pub condition: Option<BoundExpr>,
    pub left_width: usize,
    pub right_width: usize,
    /// Equality conjuncts as (left expr, right expr) pairs.
    pub equi_keys: Vec<(BoundExpr, BoundExpr)>,
    /// First orderable non-equality conjunct, if any.
    pub range: Option<RangeKey>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

fn side_of(expr: &BoundExpr, left_width: usize) -> Option<Side> {
    let columns = expr.column_indices();
    if columns.is_empty() {
        None
    } else if columns.iter().all(|&i| i < left_width) {
        Some(Side::Left)
    } else if columns.iter().all(|&i| i >= left_width) {
        Some(Side::Right)
    } else {
        None
    }
}

fn conjuncts<'a>(expr: &'a BoundExpr, out: &mut Vec<&'a BoundExpr>) {
    match expr {
        BoundExpr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            conjuncts(left, out);
            conjuncts(right, out);
        }
        other => out.push(other),
    }
}

impl JoinSpec {
    /// Splits the ON condition into equality and range conjuncts whose
    /// operands each reference exactly one input.
    pub fn analyze(
        kind: JoinType,
        condition: Option<BoundExpr>,
        left_width: usize,
        right_width: usize,
    ) -> Self {
        let mut equi_keys = Vec::new();
        let mut range = None;
        let mut parts = Vec::new();
        if let Some(cond) = &condition {
            conjuncts(cond, &mut parts);
        }
        for part in parts {
            let BoundExpr::BinaryOp { left, op, right } = part else {
                continue;
            };
            if !op.is_comparison() || *op == BinaryOperator::Neq {
                continue;
            }
            let (l, op, r) = match (side_of(left, left_width), side_of(right, left_width)) {
                (Some(Side::Left), Some(Side::Right)) => (left, *op, right),
                (Some(Side::Right), Some(Side::Left)) => (right, op.flipped(), left),
                _ => continue,
            };
            let r = r.as_ref().clone().rebase(left_width);
            if op == BinaryOperator::Eq {
                equi_keys.push((l.as_ref().clone(), r));
            } else if range.is_none() {
                range = Some(RangeKey {
                    left: l.as_ref().clone(),
                    op,
                    right: r,
                });
            }
        }
        Self {
            kind,
            condition,
            left_width,
            right_width,
            equi_keys,
            range,
        }
    }

    /// Picks the strategy for this join under `options`.
    ///
    /// Hash requires an equality conjunct; sort-merge requires an equality
    /// or an orderable comparison; anything else runs as a nested loop.
    pub fn strategy(&self, options: &CompilationOptions) -> JoinStrategy {
        if options.use_hash_join && !self.equi_keys.is_empty() {
            JoinStrategy::Hash
        } else if options.use_sort_merge_join
            && (!self.equi_keys.is_empty() || self.range.is_some())
        {
            JoinStrategy::SortMerge
        } else {
            JoinStrategy::NestedLoop
        }
    }

    /// Joins two materialized inputs.
    pub(crate) fn execute(
        &self,
        strategy: JoinStrategy,
        left: &[Row],
        right: &[Row],
    ) -> Result<Vec<Row>, ExecutorError> {
        // No pair can match, so no key is evaluated under any strategy.
        if left.is_empty() || right.is_empty() {
            return Ok(self.assemble(Vec::new(), left, right));
        }
        let pairs = match strategy {
            JoinStrategy::Hash if !self.equi_keys.is_empty() => self.hash_pairs(left, right)?,
            JoinStrategy::SortMerge if !self.equi_keys.is_empty() => {
                self.merge_equi_pairs(left, right)?
            }
            JoinStrategy::SortMerge if self.range.is_some() => {
                self.merge_range_pairs(left, right)?
            }
            _ => self.nested_loop_pairs(left, right)?,
        };
        Ok(self.assemble(pairs, left, right))
    }

    fn matches(&self, left: &Row, right: &Row) -> Result<bool, ExecutorError> {
        let Some(cond) = &self.condition else {
            return Ok(true);
        };
        let mut combined = Vec::with_capacity(left.values.len() + right.values.len());
        combined.extend_from_slice(&left.values);
        combined.extend_from_slice(&right.values);
        Ok(is_true(&cond.evaluate(&combined)?))
    }

    fn nested_loop_pairs(
        &self,
        left: &[Row],
        right: &[Row],
    ) -> Result<Vec<(usize, usize)>, ExecutorError> {
        let mut pairs = Vec::new();
        for (li, l) in left.iter().enumerate() {
            for (rj, r) in right.iter().enumerate() {
                if self.matches(l, r)? {
                    pairs.push((li, rj));
                }
            }
        }
        Ok(pairs)
    }

    fn hash_pairs(
        &self,
        left: &[Row],
        right: &[Row],
    ) -> Result<Vec<(usize, usize)>, ExecutorError> {
        let build_left = left.len() <= right.len();
        debug!(
            build_side = if build_left { "left" } else { "right" },
            build_rows = if build_left { left.len() } else { right.len() },
            "building hash table"
        );

        let (build, probe, build_exprs, probe_exprs): (_, _, Vec<_>, Vec<_>) = if build_left {
            (
                left,
                right,
                self.equi_keys.iter().map(|(l, _)| l).collect(),
                self.equi_keys.iter().map(|(_, r)| r).collect(),
            )
        } else {
            (
                right,
                left,
                self.equi_keys.iter().map(|(_, r)| r).collect(),
                self.equi_keys.iter().map(|(l, _)| l).collect(),
            )
        };

        let mut table: HashMap<GroupKey, Vec<usize>> = HashMap::new();
        for (i, row) in build.iter().enumerate() {
            let key = eval_key(&build_exprs, row)?;
            if !key.has_null() {
                table.entry(key).or_default().push(i);
            }
        }

        let mut pairs = Vec::new();
        for (j, row) in probe.iter().enumerate() {
            let key = eval_key(&probe_exprs, row)?;
            if key.has_null() {
                continue;
            }
            for &i in table.get(&key).into_iter().flatten() {
                let (li, rj) = if build_left { (i, j) } else { (j, i) };
                if self.matches(&left[li], &right[rj])? {
                    pairs.push((li, rj));
                }
            }
        }
        Ok(pairs)
    }

    fn merge_equi_pairs(
        &self,
        left: &[Row],
        right: &[Row],
    ) -> Result<Vec<(usize, usize)>, ExecutorError> {
        let left_exprs: Vec<_> = self.equi_keys.iter().map(|(l, _)| l).collect();
        let right_exprs: Vec<_> = self.equi_keys.iter().map(|(_, r)| r).collect();
        let ls = sorted_keys(&left_exprs, left)?;
        let rs = sorted_keys(&right_exprs, right)?;

        let mut pairs = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < ls.len() && j < rs.len() {
            match compare_tuple(&ls[i].0, &rs[j].0)? {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    let i_end = run_end(&ls, i)?;
                    let j_end = run_end(&rs, j)?;
                    for (_, li) in &ls[i..i_end] {
                        for (_, rj) in &rs[j..j_end] {
                            if self.matches(&left[*li], &right[*rj])? {
                                pairs.push((*li, *rj));
                            }
                        }
                    }
                    i = i_end;
                    j = j_end;
                }
            }
        }
        Ok(pairs)
    }

    fn merge_range_pairs(
        &self,
        left: &[Row],
        right: &[Row],
    ) -> Result<Vec<(usize, usize)>, ExecutorError> {
        let Some(range) = &self.range else {
            return self.nested_loop_pairs(left, right);
        };
        let ls = sorted_keys(&[&range.left], left)?;
        let rs = sorted_keys(&[&range.right], right)?;

        // Right rows that satisfy `l op r` form a prefix (for > and >=) or a
        // suffix (for < and <=) of the ascending right side, and the boundary
        // only moves forward as `l` grows.
        let mut pairs = Vec::new();
        let mut cursor = 0;
        for (lk, li) in &ls {
            while cursor < rs.len() {
                let ord = compare_values(&rs[cursor].0[0], &lk[0])?;
                let advance = match range.op {
                    BinaryOperator::Gt | BinaryOperator::LtEq => ord == Ordering::Less,
                    _ => ord != Ordering::Greater,
                };
                if !advance {
                    break;
                }
                cursor += 1;
            }
            let candidates = match range.op {
                BinaryOperator::Gt | BinaryOperator::GtEq => &rs[..cursor],
                _ => &rs[cursor..],
            };
            for (_, rj) in candidates {
                if self.matches(&left[*li], &right[*rj])? {
                    pairs.push((*li, *rj));
                }
            }
        }
        Ok(pairs)
    }

    /// Emits matched pairs in left order, null-extending unmatched rows
    /// according to the join kind.
    fn assemble(&self, mut pairs: Vec<(usize, usize)>, left: &[Row], right: &[Row]) -> Vec<Row> {
        pairs.sort_unstable();
        let keep_left = matches!(self.kind, JoinType::Left | JoinType::Full);
        let keep_right = matches!(self.kind, JoinType::Right | JoinType::Full);

        let mut right_matched = vec![false; right.len()];
        let mut out = Vec::with_capacity(pairs.len());
        let mut p = 0;
        for (li, l) in left.iter().enumerate() {
            let mut matched = false;
            while p < pairs.len() && pairs[p].0 == li {
                let rj = pairs[p].1;
                out.push(concat(&l.values, &right[rj].values));
                right_matched[rj] = true;
                matched = true;
                p += 1;
            }
            if !matched && keep_left {
                out.push(concat(&l.values, &vec![Value::Null; self.right_width]));
            }
        }
        if keep_right {
            let nulls = vec![Value::Null; self.left_width];
            for (r, matched) in right.iter().zip(&right_matched) {
                if !matched {
                    out.push(concat(&nulls, &r.values));
                }
            }
        }
        out
    }
}

fn concat(left: &[Value], right: &[Value]) -> Row {
    let mut values = Vec::with_capacity(left.len() + right.len());
    values.extend_from_slice(left);
    values.extend_from_slice(right);
    Row::computed(values)
}

fn eval_key(exprs: &[&BoundExpr], row: &Row) -> Result<GroupKey, ExecutorError> {
    Ok(GroupKey::new(
        exprs
            .iter()
            .map(|e| e.evaluate(&row.values))
            .collect::<Result<_, _>>()?,
    ))
}

/// Evaluates the key for every row, drops rows with a NULL key component
/// (they can never satisfy a comparison), and sorts ascending.
fn sorted_keys(
    exprs: &[&BoundExpr],
    rows: &[Row],
) -> Result<Vec<(Vec<Value>, usize)>, ExecutorError> {
    let mut keyed = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let key = eval_key(exprs, row)?;
        if !key.has_null() {
            keyed.push((key.0, i));
        }
    }
    let mut error = None;
    keyed.sort_by(|(a, _), (b, _)| {
        compare_tuple(a, b).unwrap_or_else(|e| {
            error.get_or_insert(e);
            Ordering::Equal
        })
    });
    match error {
        Some(e) => Err(e),
        None => Ok(keyed),
    }
}

fn compare_tuple(a: &[Value], b: &[Value]) -> Result<Ordering, ExecutorError> {
    for (x, y) in a.iter().zip(b) {
        let ord = compare_values(x, y)?;
        if ord != Ordering::Equal {
            return Ok(ord);
        }
    }
    Ok(Ordering::Equal)
}

/// End (exclusive) of the run of equal keys starting at `start`.
fn run_end(sorted: &[(Vec<Value>, usize)], start: usize) -> Result<usize, ExecutorError> {
    let mut end = start + 1;
    while end < sorted.len() && compare_tuple(&sorted[start].0, &sorted[end].0)?.is_eq() {
        end += 1;
    }
    Ok(end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::Type;

    fn col(index: usize, ty: Type) -> BoundExpr {
        BoundExpr::Column {
            index,
            name: format!("c{index}"),
            ty,
            nullable: true,
        }
    }

    fn cmp(op: BinaryOperator, l: usize, r: usize) -> BoundExpr {
        BoundExpr::BinaryOp {
            left: Box::new(col(l, Type::Bigint)),
            op,
            right: Box::new(col(r, Type::Bigint)),
        }
    }

    fn rows(data: &[(&str, Option<i64>)]) -> Vec<Row> {
        data.iter()
            .map(|(name, n)| Row::computed(vec![Value::from(*name), Value::from(*n)]))
            .collect()
    }

    fn names(out: &[Row]) -> Vec<(String, String)> {
        out.iter()
            .map(|r| (r.values[0].to_text(), r.values[2].to_text()))
            .collect()
    }

    const ALL: [JoinStrategy; 3] = [
        JoinStrategy::Hash,
        JoinStrategy::SortMerge,
        JoinStrategy::NestedLoop,
    ];

    // ========================================================================
    // Predicate analysis and strategy selection
    // ========================================================================

    #[test]
    fn test_analyze_extracts_keys() {
        let cond = BoundExpr::BinaryOp {
            left: Box::new(cmp(BinaryOperator::Eq, 3, 1)),
            op: BinaryOperator::And,
            right: Box::new(cmp(BinaryOperator::Lt, 1, 3)),
        };
        let spec = JoinSpec::analyze(JoinType::Inner, Some(cond), 2, 2);
        assert_eq!(spec.equi_keys.len(), 1);
        assert_eq!(spec.equi_keys[0].0.column_indices(), vec![1]);
        assert_eq!(spec.equi_keys[0].1.column_indices(), vec![1]);
        let range = spec.range.unwrap();
        assert_eq!(range.op, BinaryOperator::Lt);
    }

    #[test]
    fn test_strategy_selection() {
        let equi = JoinSpec::analyze(JoinType::Inner, Some(cmp(BinaryOperator::Eq, 1, 3)), 2, 2);
        let range = JoinSpec::analyze(JoinType::Inner, Some(cmp(BinaryOperator::Gt, 1, 3)), 2, 2);
        let other = JoinSpec::analyze(JoinType::Inner, Some(cmp(BinaryOperator::Neq, 1, 3)), 2, 2);
        let all = CompilationOptions::default();
        let merge_only = CompilationOptions {
            use_hash_join: false,
            use_sort_merge_join: true,
        };

        assert_eq!(equi.strategy(&all), JoinStrategy::Hash);
        assert_eq!(equi.strategy(&merge_only), JoinStrategy::SortMerge);
        assert_eq!(range.strategy(&all), JoinStrategy::SortMerge);
        assert_eq!(other.strategy(&all), JoinStrategy::NestedLoop);
        assert_eq!(
            equi.strategy(&CompilationOptions::nested_loop_only()),
            JoinStrategy::NestedLoop
        );
    }

    // ========================================================================
    // Outer-join semantics across strategies
    // ========================================================================

    #[test]
    fn test_left_join_non_equi() {
        let a = rows(&[("A1", Some(100)), ("A2", Some(10))]);
        let b = rows(&[("B1", Some(50))]);
        let spec = JoinSpec::analyze(JoinType::Left, Some(cmp(BinaryOperator::Gt, 1, 3)), 2, 2);
        for strategy in ALL {
            let out = spec.execute(strategy, &a, &b).unwrap();
            assert_eq!(
                names(&out),
                vec![("A1".into(), "B1".into()), ("A2".into(), String::new())],
                "{strategy}"
            );
        }
    }

    #[test]
    fn test_right_join_non_equi() {
        let a = rows(&[("A1", Some(100))]);
        let b = rows(&[("B1", Some(50)), ("B2", Some(200))]);
        let spec = JoinSpec::analyze(JoinType::Right, Some(cmp(BinaryOperator::Gt, 1, 3)), 2, 2);
        for strategy in ALL {
            let out = spec.execute(strategy, &a, &b).unwrap();
            assert_eq!(
                names(&out),
                vec![("A1".into(), "B1".into()), (String::new(), "B2".into())],
                "{strategy}"
            );
            assert_eq!(out[1].values[0], Value::Null);
        }
    }

    #[test]
    fn test_full_join_with_null_keys() {
        let a = rows(&[("A1", Some(1)), ("A2", None), ("A3", Some(2))]);
        let b = rows(&[("B1", Some(2)), ("B2", None), ("B3", Some(2))]);
        let spec = JoinSpec::analyze(JoinType::Full, Some(cmp(BinaryOperator::Eq, 1, 3)), 2, 2);
        let expected = vec![
            ("A1".to_string(), String::new()),
            ("A2".into(), String::new()),
            ("A3".into(), "B1".into()),
            ("A3".into(), "B3".into()),
            (String::new(), "B2".into()),
        ];
        for strategy in ALL {
            let out = spec.execute(strategy, &a, &b).unwrap();
            assert_eq!(names(&out), expected, "{strategy}");
        }
    }

    #[test]
    fn test_inequality_operators_agree() {
        let a = rows(&[("A1", Some(3)), ("A2", Some(1)), ("A3", Some(2)), ("A4", None)]);
        let b = rows(&[("B1", Some(2)), ("B2", Some(2)), ("B3", Some(0)), ("B4", Some(5))]);
        for op in [
            BinaryOperator::Lt,
            BinaryOperator::LtEq,
            BinaryOperator::Gt,
            BinaryOperator::GtEq,
        ] {
            let spec = JoinSpec::analyze(JoinType::Inner, Some(cmp(op, 1, 3)), 2, 2);
            let truth = spec.execute(JoinStrategy::NestedLoop, &a, &b).unwrap();
            let merged = spec.execute(JoinStrategy::SortMerge, &a, &b).unwrap();
            assert_eq!(names(&merged), names(&truth), "{}", op.as_str());
        }
    }

    #[test]
    fn test_empty_side_skips_key_evaluation() {
        let text_key = BoundExpr::BinaryOp {
            left: Box::new(BoundExpr::Cast {
                expr: Box::new(col(0, Type::Text)),
                ty: Type::Bigint,
            }),
            op: BinaryOperator::Eq,
            right: Box::new(col(3, Type::Bigint)),
        };
        let a = vec![Row::computed(vec![Value::from("abc"), Value::Null])];
        let empty: Vec<Row> = Vec::new();

        let left = JoinSpec::analyze(JoinType::Left, Some(text_key.clone()), 2, 2);
        let right = JoinSpec::analyze(JoinType::Right, Some(text_key), 2, 2);
        for strategy in ALL {
            let out = left.execute(strategy, &a, &empty).unwrap();
            assert_eq!(names(&out), vec![("abc".into(), String::new())], "{strategy}");
            let out = right.execute(strategy, &a, &empty).unwrap();
            assert!(out.is_empty(), "{strategy}");
        }
    }

    #[test]
    fn test_cross_join() {
        let a = rows(&[("A1", Some(1)), ("A2", Some(2))]);
        let b = rows(&[("B1", Some(1))]);
        let spec = JoinSpec::analyze(JoinType::Cross, None, 2, 2);
        assert_eq!(spec.strategy(&CompilationOptions::default()), JoinStrategy::NestedLoop);
        let out = spec.execute(JoinStrategy::NestedLoop, &a, &b).unwrap();
        assert_eq!(out.len(), 2);
    }
}
