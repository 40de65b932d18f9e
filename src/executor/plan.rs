//! Logical query plan representation.
//!
//! Plans describe *what* to execute without touching any source: a
//! [`QueryPlan`] is produced once by the binder and converted into a fresh
//! [`QueryNode`](super::runner::QueryNode) tree for every run via
//! [`QueryPlan::prepare_for_execute`](super::runner). Join strategies are not
//! fixed in the plan; each run picks them from its
//! [`CompilationOptions`].

use std::sync::Arc;

use crate::schema::Schema;

use super::aggregate::AggregateOp;
use super::column::ColumnDesc;
use super::context::CompilationOptions;
use super::expr::BoundExpr;
use super::join::JoinSpec;
use super::pivot::PivotOp;
use super::sort::SortItem;
use super::window::WindowOp;

/// What a [`QueryPlan::Scan`] reads.
#[derive(Debug, Clone)]
pub enum ScanSource {
    /// The schema's own rows.
    Table(Arc<dyn Schema>),
    /// A table-valued method called once with constant arguments.
    Method {
        schema: Arc<dyn Schema>,
        method: String,
        args: Vec<BoundExpr>,
    },
}

/// A row-producing logical query plan node.
#[derive(Debug, Clone)]
pub enum QueryPlan {
    /// Rows of one FROM-clause source, delivered through the chunk pipeline.
    Scan {
        /// Alias the source is bound to.
        alias: String,
        /// Compilation-unique source number, stamped on every row's origin.
        source_id: usize,
        source: ScanSource,
        columns: Vec<ColumnDesc>,
    },
    /// Re-homes a derived relation (subquery or CTE reference) under an alias.
    Rename {
        input: Box<QueryPlan>,
        alias: String,
        columns: Vec<ColumnDesc>,
    },
    /// Row filter (WHERE / HAVING).
    Filter {
        input: Box<QueryPlan>,
        predicate: BoundExpr,
    },
    /// Column projection (SELECT list).
    Projection {
        input: Box<QueryPlan>,
        exprs: Vec<BoundExpr>,
        columns: Vec<ColumnDesc>,
    },
    /// Grouping aggregation. Output is the group keys followed by one column
    /// per aggregate.
    Aggregate {
        input: Box<QueryPlan>,
        group_by: Vec<BoundExpr>,
        aggregates: Vec<AggregateOp>,
        columns: Vec<ColumnDesc>,
    },
    /// Window functions. Output is the input row followed by one column per
    /// window.
    Window {
        input: Box<QueryPlan>,
        windows: Vec<WindowOp>,
        columns: Vec<ColumnDesc>,
    },
    /// Long-to-wide reshaping.
    Pivot {
        input: Box<QueryPlan>,
        pivot: PivotOp,
        columns: Vec<ColumnDesc>,
    },
    /// Two-input join. Output is the left row followed by the right row.
    Join {
        left: Box<QueryPlan>,
        right: Box<QueryPlan>,
        spec: JoinSpec,
        columns: Vec<ColumnDesc>,
    },
    /// Per-row table-valued method invocation. Output is the outer row
    /// followed by each row the method yields for it.
    CrossApply {
        input: Box<QueryPlan>,
        schema: Arc<dyn Schema>,
        method: String,
        /// Arguments bound against the outer row.
        args: Vec<BoundExpr>,
        alias: String,
        source_id: usize,
        columns: Vec<ColumnDesc>,
    },
    /// Duplicate elimination (SELECT DISTINCT).
    Distinct { input: Box<QueryPlan> },
    /// In-memory sort (ORDER BY).
    Sort {
        input: Box<QueryPlan>,
        items: Vec<SortItem>,
    },
    /// LIMIT / OFFSET.
    Limit {
        input: Box<QueryPlan>,
        limit: Option<u64>,
        offset: u64,
    },
    /// Single-row scan for queries without FROM (e.g., `SELECT 1+1`).
    ValuesScan,
}

impl QueryPlan {
    /// Returns the output column descriptors for this plan node.
    pub fn columns(&self) -> &[ColumnDesc] {
        match self {
            QueryPlan::Scan { columns, .. }
            | QueryPlan::Rename { columns, .. }
            | QueryPlan::Projection { columns, .. }
            | QueryPlan::Aggregate { columns, .. }
            | QueryPlan::Window { columns, .. }
            | QueryPlan::Pivot { columns, .. }
            | QueryPlan::Join { columns, .. }
            | QueryPlan::CrossApply { columns, .. } => columns,
            QueryPlan::Filter { input, .. }
            | QueryPlan::Distinct { input }
            | QueryPlan::Sort { input, .. }
            | QueryPlan::Limit { input, .. } => input.columns(),
            QueryPlan::ValuesScan => &[],
        }
    }

    /// Formats this plan as a human-readable EXPLAIN string using the default
    /// join strategy flags.
    ///
    /// # Example output
    ///
    /// ```text
    /// Projection: $col0 (Name)
    ///   Filter: ($col1 (Age) > 18)
    ///     Scan People AS p (cols: Name, Age)
    /// ```
    pub fn explain(&self) -> String {
        self.explain_with(&CompilationOptions::default())
    }

    /// Formats this plan, showing the join strategies `options` would pick.
    pub fn explain_with(&self, options: &CompilationOptions) -> String {
        self.format_explain(0, options)
    }

    /// Recursively formats a plan node with indentation.
    fn format_explain(&self, indent: usize, options: &CompilationOptions) -> String {
        let prefix = "  ".repeat(indent);
        let child = |input: &QueryPlan| input.format_explain(indent + 1, options);
        let list = |exprs: &[BoundExpr]| {
            exprs
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self {
            QueryPlan::Scan {
                alias,
                source,
                columns,
                ..
            } => {
                let cols: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
                let target = match source {
                    ScanSource::Table(schema) => schema.name().to_string(),
                    ScanSource::Method {
                        schema,
                        method,
                        args,
                    } => format!("{}.{}({})", schema.name(), method, list(args)),
                };
                format!(
                    "{}Scan {} AS {} (cols: {})",
                    prefix,
                    target,
                    alias,
                    cols.join(", ")
                )
            }
            QueryPlan::Rename { input, alias, .. } => {
                format!("{}Rename AS {}\n{}", prefix, alias, child(input))
            }
            QueryPlan::Filter { input, predicate } => {
                format!("{}Filter: {}\n{}", prefix, predicate, child(input))
            }
            QueryPlan::Projection { input, exprs, .. } => {
                format!("{}Projection: {}\n{}", prefix, list(exprs), child(input))
            }
            QueryPlan::Aggregate {
                input,
                group_by,
                aggregates,
                ..
            } => {
                let aggs: Vec<String> = aggregates.iter().map(|a| a.to_string()).collect();
                let mut line = format!("{}Aggregate: {}", prefix, aggs.join(", "));
                if !group_by.is_empty() {
                    line.push_str(&format!(" GROUP BY {}", list(group_by)));
                }
                format!("{}\n{}", line, child(input))
            }
            QueryPlan::Window { input, windows, .. } => {
                let ws: Vec<String> = windows.iter().map(|w| w.to_string()).collect();
                format!("{}Window: {}\n{}", prefix, ws.join(", "), child(input))
            }
            QueryPlan::Pivot { input, pivot, .. } => {
                format!("{}Pivot: {}\n{}", prefix, pivot, child(input))
            }
            QueryPlan::Join {
                left, right, spec, ..
            } => {
                let mut line = format!(
                    "{}Join ({}, {})",
                    prefix,
                    spec.kind.as_str(),
                    spec.strategy(options)
                );
                if let Some(cond) = &spec.condition {
                    line.push_str(&format!(": {}", cond));
                }
                format!("{}\n{}\n{}", line, child(left), child(right))
            }
            QueryPlan::CrossApply {
                input,
                schema,
                method,
                args,
                alias,
                ..
            } => format!(
                "{}CrossApply {}.{}({}) AS {}\n{}",
                prefix,
                schema.name(),
                method,
                list(args),
                alias,
                child(input)
            ),
            QueryPlan::Distinct { input } => format!("{}Distinct\n{}", prefix, child(input)),
            QueryPlan::Sort { input, items } => {
                let keys: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                format!("{}Sort: {}\n{}", prefix, keys.join(", "), child(input))
            }
            QueryPlan::Limit {
                input,
                limit,
                offset,
            } => {
                let mut line = format!("{}Limit:", prefix);
                if let Some(n) = limit {
                    line.push_str(&format!(" {}", n));
                }
                if *offset > 0 {
                    line.push_str(&format!(" OFFSET {}", offset));
                }
                format!("{}\n{}", line, child(input))
            }
            QueryPlan::ValuesScan => format!("{}ValuesScan (1 row)", prefix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::{Type, Value};
    use crate::executor::tests::bind_expr;
    use crate::schema::MemorySchema;
    use crate::sql::{BinaryOperator, JoinType};

    fn people() -> Arc<dyn Schema> {
        Arc::new(
            MemorySchema::new("People")
                .column("Name", Type::Text)
                .column("Age", Type::Integer)
                .row(vec![Value::from("ann"), Value::Integer(30)]),
        )
    }

    fn col(name: &str, ty: Type) -> ColumnDesc {
        ColumnDesc::computed(name, ty, false)
    }

    fn scan(alias: &str) -> QueryPlan {
        QueryPlan::Scan {
            alias: alias.into(),
            source_id: 0,
            source: ScanSource::Table(people()),
            columns: vec![col("Name", Type::Text), col("Age", Type::Integer)],
        }
    }

    #[test]
    fn test_explain_scan() {
        assert_eq!(scan("p").explain(), "Scan People AS p (cols: Name, Age)");
    }

    #[test]
    fn test_explain_filter_projection() {
        let columns = vec![col("Name", Type::Text), col("Age", Type::Integer)];
        let plan = QueryPlan::Projection {
            input: Box::new(QueryPlan::Filter {
                input: Box::new(scan("p")),
                predicate: bind_expr("Age > 18", &columns),
            }),
            exprs: vec![bind_expr("Name", &columns)],
            columns: vec![col("Name", Type::Text)],
        };
        assert_eq!(
            plan.explain(),
            "Projection: $col0 (Name)\n  Filter: ($col1 (Age) > 18)\n    Scan People AS p (cols: Name, Age)"
        );
        assert_eq!(plan.columns().len(), 1);
    }

    #[test]
    fn test_explain_join_strategy_follows_options() {
        let cond = BoundExpr::BinaryOp {
            left: Box::new(BoundExpr::Column {
                index: 1,
                name: "Age".into(),
                ty: Type::Integer,
                nullable: false,
            }),
            op: BinaryOperator::Gt,
            right: Box::new(BoundExpr::Column {
                index: 3,
                name: "Age".into(),
                ty: Type::Integer,
                nullable: false,
            }),
        };
        let plan = QueryPlan::Join {
            left: Box::new(scan("a")),
            right: Box::new(scan("b")),
            spec: JoinSpec::analyze(JoinType::Left, Some(cond), 2, 2),
            columns: vec![],
        };
        let explain = plan.explain();
        assert!(explain.starts_with("Join (LEFT JOIN, sort-merge): ($col1 (Age) > $col3 (Age))"));
        assert!(
            plan.explain_with(&CompilationOptions::nested_loop_only())
                .starts_with("Join (LEFT JOIN, nested-loop)")
        );
    }

    #[test]
    fn test_explain_values_scan() {
        assert_eq!(QueryPlan::ValuesScan.explain(), "ValuesScan (1 row)");
    }
}
