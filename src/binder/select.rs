//! SELECT lowering.
//!
//! Clauses are lowered in evaluation order:
//!
//! ```text
//! FROM (joins, cross apply, pivot) -> WHERE -> GROUP BY / aggregates
//!   -> HAVING -> windows -> ORDER BY -> SELECT list -> DISTINCT -> LIMIT
//! ```
//!
//! Aggregate and window calls are computed by dedicated nodes below the
//! projection. Later clauses see them through substitutions: an expression
//! equal to an already-computed call binds to that call's output column.

use crate::datum::Type;
use crate::executor::{
    AggregateFunction, AggregateOp, BoundExpr, ColumnDesc, QueryPlan, SortItem, WindowFunction,
    WindowOp,
};
use crate::sql::{Expr, OrderByItem, SelectItem, SelectStmt};

use super::Binder;
use super::error::BindError;
use super::expr::ExprBinder;
use super::scope::Scope;

impl Binder<'_> {
    pub(super) fn bind_select(&mut self, select: &SelectStmt) -> Result<QueryPlan, BindError> {
        // Step 1: FROM
        let (mut plan, pivot_alias) = match &select.from {
            Some(from) => {
                let bound = self.bind_from(from)?;
                (bound.plan, bound.pivot_alias)
            }
            None => (QueryPlan::ValuesScan, None),
        };
        let pivot = pivot_alias.as_deref();

        // Step 2: WHERE
        if let Some(condition) = &select.where_clause {
            let columns = plan.columns().to_vec();
            let predicate = ExprBinder::new(
                Scope::new(&columns).with_pivot(pivot),
                self.functions,
                &mut self.metadata,
                "WHERE",
            )
            .bind_predicate(condition)?;
            plan = QueryPlan::Filter {
                input: Box::new(plan),
                predicate,
            };
        }

        // Step 3: GROUP BY and aggregates
        let mut aggregate_calls = Vec::new();
        for item in &select.columns {
            if let SelectItem::Expr { expr, .. } = item {
                collect_aggregates(expr, &mut aggregate_calls);
            }
        }
        if let Some(having) = &select.having {
            collect_aggregates(having, &mut aggregate_calls);
        }
        for item in &select.order_by {
            collect_aggregates(&item.expr, &mut aggregate_calls);
        }

        let mut substitutions: Vec<(Expr, usize)> = Vec::new();
        let mut ungrouped: Option<Vec<ColumnDesc>> = None;
        if !select.group_by.is_empty() || !aggregate_calls.is_empty() || select.having.is_some() {
            let input_columns = plan.columns().to_vec();
            let scope = Scope::new(&input_columns).with_pivot(pivot);
            let grouped = !select.group_by.is_empty();

            let mut group_by = Vec::with_capacity(select.group_by.len());
            let mut columns = Vec::new();
            for expr in &select.group_by {
                let bound = ExprBinder::new(scope, self.functions, &mut self.metadata, "GROUP BY")
                    .bind(expr)?;
                columns.push(match &bound {
                    BoundExpr::Column { index, .. } => input_columns[*index].clone(),
                    other => ColumnDesc::computed(expr.to_string(), other.ty(), other.nullable()),
                });
                substitutions.push((expr.clone(), group_by.len()));
                group_by.push(bound);
            }

            let mut aggregates = Vec::with_capacity(aggregate_calls.len());
            for call in &aggregate_calls {
                let op = self.bind_aggregate(scope, call, "SELECT")?;
                columns.push(ColumnDesc::computed(
                    call.to_string(),
                    op.output_type(),
                    op.nullable(grouped),
                ));
                substitutions.push((call.clone(), group_by.len() + aggregates.len()));
                aggregates.push(op);
            }

            plan = QueryPlan::Aggregate {
                input: Box::new(plan),
                group_by,
                aggregates,
                columns,
            };
            ungrouped = Some(input_columns);
        }

        // Step 4: HAVING
        if let Some(having) = &select.having {
            let columns = plan.columns().to_vec();
            let scope = Scope::new(&columns)
                .with_substitutions(&substitutions)
                .with_ungrouped(ungrouped.as_deref());
            let predicate = ExprBinder::new(scope, self.functions, &mut self.metadata, "HAVING")
                .bind_predicate(having)?;
            plan = QueryPlan::Filter {
                input: Box::new(plan),
                predicate,
            };
        }

        // Step 5: window calls
        let visible_width = plan.columns().len();
        let mut window_calls = Vec::new();
        for item in &select.columns {
            if let SelectItem::Expr { expr, .. } = item {
                collect_windows(expr, &mut window_calls);
            }
        }
        for item in &select.order_by {
            collect_windows(&item.expr, &mut window_calls);
        }
        if !window_calls.is_empty() {
            let input_columns = plan.columns().to_vec();
            let scope = Scope::new(&input_columns)
                .with_pivot(pivot)
                .with_substitutions(&substitutions)
                .with_ungrouped(ungrouped.as_deref());
            let mut windows = Vec::with_capacity(window_calls.len());
            let mut columns = input_columns.clone();
            for call in &window_calls {
                let op = self.bind_window(scope, call)?;
                columns.push(ColumnDesc::computed(
                    call.to_string(),
                    op.output_type(),
                    op.nullable(),
                ));
                self.metadata.record_type(call.to_string(), op.output_type());
                windows.push(op);
            }
            for (j, call) in window_calls.iter().enumerate() {
                substitutions.push((call.clone(), visible_width + j));
            }
            plan = QueryPlan::Window {
                input: Box::new(plan),
                windows,
                columns,
            };
        }

        // Step 6: SELECT list
        let columns = plan.columns().to_vec();
        let scope = Scope::new(&columns)
            .with_pivot(pivot)
            .with_substitutions(&substitutions)
            .with_ungrouped(ungrouped.as_deref());
        let projection = self.bind_projection(scope, &select.columns, visible_width)?;

        // Step 7: ORDER BY, DISTINCT
        if select.distinct {
            let output = projection.columns.clone();
            plan = QueryPlan::Distinct {
                input: Box::new(QueryPlan::Projection {
                    input: Box::new(plan),
                    exprs: projection.exprs,
                    columns: projection.columns,
                }),
            };
            if !select.order_by.is_empty() {
                let items = self.bind_order_by(Scope::new(&output), &select.order_by, None)?;
                plan = QueryPlan::Sort {
                    input: Box::new(plan),
                    items,
                };
            }
        } else {
            if !select.order_by.is_empty() {
                let items = self.bind_order_by(scope, &select.order_by, Some(&projection))?;
                plan = QueryPlan::Sort {
                    input: Box::new(plan),
                    items,
                };
            }
            plan = QueryPlan::Projection {
                input: Box::new(plan),
                exprs: projection.exprs,
                columns: projection.columns,
            };
        }

        // Step 8: LIMIT / OFFSET
        if select.limit.is_some() || select.offset.is_some() {
            plan = QueryPlan::Limit {
                input: Box::new(plan),
                limit: select.limit,
                offset: select.offset.unwrap_or(0),
            };
        }

        Ok(plan)
    }

    fn bind_projection(
        &mut self,
        scope: Scope<'_>,
        items: &[SelectItem],
        visible_width: usize,
    ) -> Result<Projection, BindError> {
        let columns = scope.columns();
        let visible = &columns[..visible_width];
        let mut projection = Projection::default();

        for item in items {
            match item {
                SelectItem::Wildcard => {
                    for (index, desc) in visible.iter().enumerate() {
                        projection.push(column_ref(index, desc), desc.clone(), None);
                    }
                }
                SelectItem::QualifiedWildcard(qualifier) => {
                    let before = projection.exprs.len();
                    for (index, desc) in visible.iter().enumerate() {
                        if desc.source.as_ref().is_some_and(|s| s.matches(qualifier)) {
                            projection.push(column_ref(index, desc), desc.clone(), None);
                        }
                    }
                    if projection.exprs.len() == before {
                        return Err(BindError::AliasNotFound(qualifier.clone()));
                    }
                }
                SelectItem::Expr { expr, alias } => {
                    let bound = ExprBinder::new(scope, self.functions, &mut self.metadata, "SELECT")
                        .bind(expr)?;
                    let desc = match (&bound, alias) {
                        (_, Some(alias)) => {
                            ColumnDesc::computed(alias.clone(), bound.ty(), bound.nullable())
                        }
                        (BoundExpr::Column { index, .. }, None) => columns[*index].clone(),
                        (_, None) => {
                            ColumnDesc::computed(expr.to_string(), bound.ty(), bound.nullable())
                        }
                    };
                    projection.push(bound, desc, alias.clone());
                }
            }
        }
        Ok(projection)
    }

    /// Binds ORDER BY keys. With a projection, a key may name a select-list
    /// alias or a 1-based output position and then sorts by that item.
    fn bind_order_by(
        &mut self,
        scope: Scope<'_>,
        items: &[OrderByItem],
        projection: Option<&Projection>,
    ) -> Result<Vec<SortItem>, BindError> {
        let mut keys = Vec::with_capacity(items.len());
        for item in items {
            let expr = match (item.expr.unnested(), projection) {
                (Expr::Integer(position), _) => {
                    let width = projection.map_or(scope.columns().len(), |p| p.exprs.len());
                    let index = usize::try_from(*position)
                        .ok()
                        .filter(|p| (1..=width).contains(p))
                        .ok_or_else(|| {
                            BindError::Unsupported(format!(
                                "ORDER BY position {} is not in the select list",
                                position
                            ))
                        })?
                        - 1;
                    match projection {
                        Some(p) => p.exprs[index].clone(),
                        None => column_ref(index, &scope.columns()[index]),
                    }
                }
                (expr, projection) => match projection.and_then(|p| p.aliased(expr)) {
                    Some(aliased) => aliased.clone(),
                    None => ExprBinder::new(scope, self.functions, &mut self.metadata, "ORDER BY")
                        .bind(&item.expr)?,
                },
            };
            keys.push(SortItem {
                expr,
                descending: item.is_descending(),
                nulls: item.nulls,
            });
        }
        Ok(keys)
    }

    /// Binds an aggregate call such as `Sum(x)` or `Count(*)`.
    pub(super) fn bind_aggregate(
        &mut self,
        scope: Scope<'_>,
        call: &Expr,
        clause: &'static str,
    ) -> Result<AggregateOp, BindError> {
        let not_aggregate = || BindError::Unsupported(format!("{} is not an aggregate call", call));
        let Expr::Function {
            qualifier: None,
            name,
            args,
            distinct,
            star,
            over: None,
        } = call.unnested()
        else {
            return Err(not_aggregate());
        };
        let func = AggregateFunction::from_name(name).ok_or_else(not_aggregate)?;

        if *star {
            if func != AggregateFunction::Count {
                return Err(BindError::Unsupported(format!("{}(*)", name)));
            }
            self.metadata.record_type(call.to_string(), Type::Bigint);
            return Ok(AggregateOp {
                func,
                args: vec![],
                distinct: false,
            });
        }

        let args = self.bind_aggregate_args(scope, func, name, args, clause)?;
        let op = AggregateOp {
            func,
            args,
            distinct: *distinct,
        };
        self.metadata.record_type(call.to_string(), op.output_type());
        Ok(op)
    }

    /// Binds the single argument of an aggregate. Text summed or averaged is
    /// parsed as a number.
    fn bind_aggregate_args(
        &mut self,
        scope: Scope<'_>,
        func: AggregateFunction,
        name: &str,
        args: &[Expr],
        clause: &'static str,
    ) -> Result<Vec<BoundExpr>, BindError> {
        let mut binder = ExprBinder::new(scope, self.functions, &mut self.metadata, clause);
        let bound = args
            .iter()
            .map(|a| binder.bind(a))
            .collect::<Result<Vec<_>, _>>()?;
        let unresolvable = |bound: &[BoundExpr]| BindError::MethodNotResolvable {
            name: name.to_string(),
            arg_types: bound.iter().map(BoundExpr::ty).collect(),
            candidates: vec![format!("{}(value)", func)],
        };
        let [arg] = <[BoundExpr; 1]>::try_from(bound).map_err(|b| unresolvable(&b))?;

        let arg = match func {
            AggregateFunction::Sum | AggregateFunction::Avg if arg.ty().is_textual() => {
                arg.coerce(Type::Double)
            }
            _ => arg,
        };
        if !func.accepts(arg.ty()) {
            return Err(unresolvable(std::slice::from_ref(&arg)));
        }
        Ok(vec![arg])
    }

    fn bind_window(&mut self, scope: Scope<'_>, call: &Expr) -> Result<WindowOp, BindError> {
        let Expr::Function {
            qualifier: None,
            name,
            args,
            distinct: false,
            star,
            over: Some(spec),
        } = call.unnested()
        else {
            return Err(BindError::Unsupported(format!("window call {}", call)));
        };
        let func = WindowFunction::from_name(name)
            .ok_or_else(|| BindError::Unsupported(format!("{} is not a window function", name)))?;

        let args = match func {
            WindowFunction::Aggregate(AggregateFunction::Count) if *star => vec![],
            WindowFunction::Aggregate(agg) => {
                self.bind_aggregate_args(scope, agg, name, args, "OVER")?
            }
            _ if args.is_empty() && !*star => vec![],
            _ => {
                return Err(BindError::Unsupported(format!(
                    "{} takes no arguments",
                    func
                )));
            }
        };

        let mut binder = ExprBinder::new(scope, self.functions, &mut self.metadata, "OVER");
        let partition_by = spec
            .partition_by
            .iter()
            .map(|e| binder.bind(e))
            .collect::<Result<Vec<_>, _>>()?;
        let order_by = spec
            .order_by
            .iter()
            .map(|o| {
                Ok(SortItem {
                    expr: binder.bind(&o.expr)?,
                    descending: o.is_descending(),
                    nulls: o.nulls,
                })
            })
            .collect::<Result<Vec<_>, BindError>>()?;

        Ok(WindowOp {
            func,
            args,
            partition_by,
            order_by,
        })
    }
}

/// A bound SELECT list.
#[derive(Default)]
struct Projection {
    exprs: Vec<BoundExpr>,
    columns: Vec<ColumnDesc>,
    aliases: Vec<Option<String>>,
}

impl Projection {
    fn push(&mut self, expr: BoundExpr, column: ColumnDesc, alias: Option<String>) {
        self.exprs.push(expr);
        self.columns.push(column);
        self.aliases.push(alias);
    }

    /// The item whose alias `expr` names, if `expr` is a bare identifier.
    fn aliased(&self, expr: &Expr) -> Option<&BoundExpr> {
        let Expr::ColumnRef { table: None, column } = expr else {
            return None;
        };
        self.aliases
            .iter()
            .position(|a| a.as_deref().is_some_and(|a| a.eq_ignore_ascii_case(column)))
            .map(|i| &self.exprs[i])
    }
}

fn column_ref(index: usize, desc: &ColumnDesc) -> BoundExpr {
    BoundExpr::Column {
        index,
        name: desc.name.clone(),
        ty: desc.ty,
        nullable: desc.nullable,
    }
}

fn push_unique(out: &mut Vec<Expr>, expr: &Expr) {
    if !out.iter().any(|e| e.unnested() == expr.unnested()) {
        out.push(expr.clone());
    }
}

/// Collects aggregate calls, without descending into them. Window calls are
/// skipped but their arguments and window clauses are searched.
fn collect_aggregates(expr: &Expr, out: &mut Vec<Expr>) {
    match expr {
        Expr::Function {
            qualifier: None,
            name,
            over: None,
            ..
        } if AggregateFunction::from_name(name).is_some() => push_unique(out, expr),
        _ => children(expr)
            .into_iter()
            .for_each(|child| collect_aggregates(child, out)),
    }
}

/// Collects calls with an OVER clause, without descending into them.
fn collect_windows(expr: &Expr, out: &mut Vec<Expr>) {
    match expr {
        Expr::Function { over: Some(_), .. } => push_unique(out, expr),
        _ => children(expr)
            .into_iter()
            .for_each(|child| collect_windows(child, out)),
    }
}

/// Direct sub-expressions of `expr`.
fn children(expr: &Expr) -> Vec<&Expr> {
    match expr {
        Expr::Null
        | Expr::Boolean(_)
        | Expr::Integer(_)
        | Expr::Float(_)
        | Expr::String(_)
        | Expr::ColumnRef { .. } => vec![],
        Expr::Index { expr, index } => vec![expr.as_ref(), index.as_ref()],
        Expr::Nested(inner) => vec![inner.as_ref()],
        Expr::BinaryOp { left, right, .. } => vec![left.as_ref(), right.as_ref()],
        Expr::UnaryOp { operand, .. } => vec![operand.as_ref()],
        Expr::IsNull { expr, .. } | Expr::Cast { expr, .. } => vec![expr.as_ref()],
        Expr::InList { expr, list, .. } => std::iter::once(expr.as_ref()).chain(list).collect(),
        Expr::Between {
            expr, low, high, ..
        } => vec![expr.as_ref(), low.as_ref(), high.as_ref()],
        Expr::Like { expr, pattern, .. } => vec![expr.as_ref(), pattern.as_ref()],
        Expr::Case {
            operand,
            when_clauses,
            else_result,
        } => operand
            .as_deref()
            .into_iter()
            .chain(
                when_clauses
                    .iter()
                    .flat_map(|c| [&c.condition, &c.result]),
            )
            .chain(else_result.as_deref())
            .collect(),
        Expr::Function { args, over, .. } => args
            .iter()
            .chain(over.iter().flat_map(|spec| {
                spec.partition_by
                    .iter()
                    .chain(spec.order_by.iter().map(|o| &o.expr))
            }))
            .collect(),
    }
}
