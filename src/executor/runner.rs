//! Query execution runner.
//!
//! This module provides the physical execution layer:
//!
//! - [`QueryNode`]: Volcano iterator nodes with async `next()`
//! - [`QueryPlan::prepare_for_execute`]: plan-to-executor conversion
//!
//! Every node owns a clone of the [`ExecContext`], which carries the join
//! strategy flags, pipeline parameters, cancellation token and cross-apply
//! environments for one run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::datum::Value;
use crate::pipeline::{ChunkEnumerator, spawn_source};
use crate::schema::{EntityResolver, InvocationContext, RowSource, Schema, SourceError, VecRowSource};

use super::aggregate::{Accumulator, AggregateOp, GroupKey};
use super::column::ColumnDesc;
use super::context::ExecContext;
use super::error::ExecutorError;
use super::eval::is_true;
use super::expr::BoundExpr;
use super::join::JoinSpec;
use super::pivot::PivotOp;
use super::plan::{QueryPlan, ScanSource};
use super::row::Row;
use super::sort::{SortItem, sort_by_keys, sort_keys};
use super::window::WindowOp;

/// A query executor node.
pub enum QueryNode {
    /// Source scan fed by the chunk pipeline.
    Scan(Scan),
    /// Pass-through that re-homes columns under a new alias.
    Rename(Rename),
    /// Row filter (WHERE / HAVING).
    Filter(Filter),
    /// Column projection (SELECT list).
    Projection(Projection),
    /// Hash-aggregate node.
    Aggregate(Aggregate),
    /// Window function node.
    Window(Window),
    /// Pivot node.
    Pivot(Pivot),
    /// Two-input join.
    Join(Join),
    /// Per-row table-valued method invocation.
    CrossApply(CrossApply),
    /// Duplicate elimination.
    Distinct(Distinct),
    /// In-memory sort node.
    Sort(Sort),
    /// LIMIT/OFFSET node.
    Limit(Limit),
    /// Single-row scan for queries without FROM (e.g., `SELECT 1+1`).
    ValuesScan(ValuesScan),
}

impl QueryPlan {
    /// Converts a logical [`QueryPlan`] into a physical [`QueryNode`] tree.
    ///
    /// This is a synchronous function; no source is opened here. All row
    /// production is deferred to [`QueryNode::next()`].
    pub fn prepare_for_execute(self, ctx: &ExecContext) -> QueryNode {
        match self {
            QueryPlan::Scan {
                alias,
                source_id,
                source,
                columns,
            } => QueryNode::Scan(Scan::new(alias, source_id, source, columns, ctx.clone())),
            QueryPlan::Rename { input, columns, .. } => QueryNode::Rename(Rename {
                child: Box::new(input.prepare_for_execute(ctx)),
                columns,
            }),
            QueryPlan::Filter { input, predicate } => {
                QueryNode::Filter(Filter::new(input.prepare_for_execute(ctx), predicate))
            }
            QueryPlan::Projection {
                input,
                exprs,
                columns,
            } => QueryNode::Projection(Projection::new(
                input.prepare_for_execute(ctx),
                exprs,
                columns,
            )),
            QueryPlan::Aggregate {
                input,
                group_by,
                aggregates,
                columns,
            } => QueryNode::Aggregate(Aggregate::new(
                input.prepare_for_execute(ctx),
                group_by,
                aggregates,
                columns,
            )),
            QueryPlan::Window {
                input,
                windows,
                columns,
            } => QueryNode::Window(Window {
                child: Box::new(input.prepare_for_execute(ctx)),
                windows,
                columns,
                buffer: None,
            }),
            QueryPlan::Pivot {
                input,
                pivot,
                columns,
            } => QueryNode::Pivot(Pivot {
                child: Box::new(input.prepare_for_execute(ctx)),
                pivot,
                columns,
                buffer: None,
            }),
            QueryPlan::Join {
                left,
                right,
                spec,
                columns,
            } => QueryNode::Join(Join {
                left: Box::new(left.prepare_for_execute(ctx)),
                right: Box::new(right.prepare_for_execute(ctx)),
                spec,
                columns,
                ctx: ctx.clone(),
                buffer: None,
            }),
            QueryPlan::CrossApply {
                input,
                schema,
                method,
                args,
                alias,
                columns,
                ..
            } => QueryNode::CrossApply(CrossApply {
                child: Box::new(input.prepare_for_execute(ctx)),
                schema,
                method,
                args,
                alias,
                columns,
                ctx: ctx.clone(),
                position: 0,
                buffer: Vec::new().into_iter(),
            }),
            QueryPlan::Distinct { input } => QueryNode::Distinct(Distinct {
                child: Box::new(input.prepare_for_execute(ctx)),
                seen: HashSet::new(),
            }),
            QueryPlan::Sort { input, items } => {
                QueryNode::Sort(Sort::new(input.prepare_for_execute(ctx), items))
            }
            QueryPlan::Limit {
                input,
                limit,
                offset,
            } => QueryNode::Limit(Limit::new(input.prepare_for_execute(ctx), limit, offset)),
            QueryPlan::ValuesScan => QueryNode::ValuesScan(ValuesScan::new()),
        }
    }
}

impl QueryNode {
    /// Returns the next row, or `None` if exhausted.
    ///
    /// This method follows the Volcano iterator model naming convention,
    /// not `std::iter::Iterator`, because it returns `Result<Option<_>>`.
    ///
    /// Uses `Pin<Box<...>>` to break the recursive future cycle
    /// (QueryNode -> Filter -> QueryNode).
    #[allow(clippy::should_implement_trait)]
    pub fn next(
        &mut self,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Option<Row>, ExecutorError>> + Send + '_>,
    > {
        Box::pin(async move {
            match self {
                QueryNode::Scan(n) => n.next().await,
                QueryNode::Rename(n) => n.child.next().await,
                QueryNode::Filter(n) => n.next().await,
                QueryNode::Projection(n) => n.next().await,
                QueryNode::Aggregate(n) => n.next().await,
                QueryNode::Window(n) => n.next().await,
                QueryNode::Pivot(n) => n.next().await,
                QueryNode::Join(n) => n.next().await,
                QueryNode::CrossApply(n) => n.next().await,
                QueryNode::Distinct(n) => n.next().await,
                QueryNode::Sort(n) => n.next().await,
                QueryNode::Limit(n) => n.next().await,
                QueryNode::ValuesScan(n) => n.next().await,
            }
        })
    }

    /// Returns the column descriptors for this node's output.
    pub fn columns(&self) -> &[ColumnDesc] {
        match self {
            QueryNode::Scan(n) => &n.columns,
            QueryNode::Rename(n) => &n.columns,
            QueryNode::Filter(n) => n.child.columns(),
            QueryNode::Projection(n) => &n.columns,
            QueryNode::Aggregate(n) => &n.columns,
            QueryNode::Window(n) => &n.columns,
            QueryNode::Pivot(n) => &n.columns,
            QueryNode::Join(n) => &n.columns,
            QueryNode::CrossApply(n) => &n.columns,
            QueryNode::Distinct(n) => n.child.columns(),
            QueryNode::Sort(n) => n.child.columns(),
            QueryNode::Limit(n) => n.child.columns(),
            QueryNode::ValuesScan(n) => &n.columns,
        }
    }

    /// Drains this node into a vector.
    async fn drain(&mut self) -> Result<Vec<Row>, ExecutorError> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }
}

fn source_error(alias: &str, e: SourceError) -> ExecutorError {
    ExecutorError::Source {
        alias: alias.to_string(),
        message: e.to_string(),
    }
}

fn check_width(alias: &str, len: usize, expected: usize) -> Result<(), ExecutorError> {
    if len == expected {
        Ok(())
    } else {
        Err(ExecutorError::Source {
            alias: alias.to_string(),
            message: format!("row has {} values, expected {}", len, expected),
        })
    }
}

/// Source scan node.
///
/// The row source is opened on the first `next()` call and handed to a
/// producer task; rows arrive through a bounded [`ChunkEnumerator`].
pub struct Scan {
    /// Alias the source is bound to (for errors and logs).
    pub alias: String,
    /// Column descriptors for the output.
    pub columns: Vec<ColumnDesc>,
    source_id: usize,
    source: Option<ScanSource>,
    ctx: ExecContext,
    stream: Option<ChunkEnumerator<EntityResolver>>,
}

impl Scan {
    /// Creates a new Scan over `source`.
    pub fn new(
        alias: String,
        source_id: usize,
        source: ScanSource,
        columns: Vec<ColumnDesc>,
        ctx: ExecContext,
    ) -> Self {
        Self {
            alias,
            columns,
            source_id,
            source: Some(source),
            ctx,
            stream: None,
        }
    }

    fn open(&self, source: ScanSource) -> Result<Box<dyn RowSource>, ExecutorError> {
        match source {
            ScanSource::Table(schema) => schema.rows().map_err(|e| source_error(&self.alias, e)),
            ScanSource::Method {
                schema,
                method,
                args,
            } => {
                let args = args
                    .iter()
                    .map(|a| a.evaluate(&[]))
                    .collect::<Result<Vec<_>, _>>()?;
                let empty = HashMap::new();
                let invocation = InvocationContext {
                    position: 0,
                    args: &args,
                    environment: self.ctx.environment_at(0).unwrap_or(&empty),
                };
                let rows = schema
                    .invoke(&method, &invocation)
                    .map_err(|e| source_error(&self.alias, e))?;
                Ok(Box::new(VecRowSource::new(rows)))
            }
        }
    }

    /// Returns the next row from the pipeline.
    async fn next(&mut self) -> Result<Option<Row>, ExecutorError> {
        if let Some(source) = self.source.take() {
            let rows = self.open(source)?;
            let names = EntityResolver::name_map(self.columns.iter().map(|c| c.name.as_str()));
            self.stream = Some(spawn_source(
                rows,
                names,
                self.source_id,
                self.alias.clone(),
                self.ctx.pipeline,
                self.ctx.cancel.clone(),
            ));
        }
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        match stream.next().await {
            Ok(Some(entity)) => {
                check_width(&self.alias, entity.len(), self.columns.len())?;
                Ok(Some(Row::from_entity(entity)))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(source_error(&self.alias, e)),
        }
    }
}

/// Pass-through node for subqueries and CTE references bound under an alias.
pub struct Rename {
    child: Box<QueryNode>,
    columns: Vec<ColumnDesc>,
}

/// Filter node that applies a predicate to each row from its child.
pub struct Filter {
    /// Child node to pull rows from.
    child: Box<QueryNode>,
    /// Bound predicate expression (must evaluate to boolean).
    predicate: BoundExpr,
}

impl Filter {
    /// Creates a new Filter node.
    pub fn new(child: QueryNode, predicate: BoundExpr) -> Self {
        Self {
            child: Box::new(child),
            predicate,
        }
    }

    /// Returns the next row that satisfies the predicate.
    async fn next(&mut self) -> Result<Option<Row>, ExecutorError> {
        loop {
            match self.child.next().await? {
                Some(row) => {
                    // NULL and false both skip the row
                    if is_true(&self.predicate.evaluate(&row.values)?) {
                        return Ok(Some(row));
                    }
                }
                None => return Ok(None),
            }
        }
    }
}

/// Projection node that evaluates bound expressions to produce output columns.
pub struct Projection {
    /// Child node to pull rows from.
    child: Box<QueryNode>,
    /// Bound expressions to evaluate for each output column.
    exprs: Vec<BoundExpr>,
    /// Output column descriptors.
    columns: Vec<ColumnDesc>,
}

impl Projection {
    /// Creates a new Projection node.
    pub fn new(child: QueryNode, exprs: Vec<BoundExpr>, columns: Vec<ColumnDesc>) -> Self {
        Self {
            child: Box::new(child),
            exprs,
            columns,
        }
    }

    /// Returns the next projected row.
    async fn next(&mut self) -> Result<Option<Row>, ExecutorError> {
        match self.child.next().await? {
            Some(row) => {
                let values = self
                    .exprs
                    .iter()
                    .map(|expr| expr.evaluate(&row.values))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Some(Row::computed(values)))
            }
            None => Ok(None),
        }
    }
}

/// Hash-aggregate node.
///
/// Consumes all input rows on first `next()` call, groups them by the
/// GROUP BY key (using [`GroupKey`] for NULL=NULL HashMap semantics),
/// computes aggregate values per group, then emits result rows one
/// at a time in first-seen group order.
///
/// Output schema: \[group_key_values..., aggregate_results...\].
pub struct Aggregate {
    /// Child node to pull rows from.
    child: Box<QueryNode>,
    /// GROUP BY expressions (bound against child's output schema).
    group_by: Vec<BoundExpr>,
    /// Aggregate operations to compute.
    aggregates: Vec<AggregateOp>,
    /// Output column descriptors.
    columns: Vec<ColumnDesc>,
    /// Buffered result rows (populated on first `next()` call).
    buffer: Option<std::vec::IntoIter<Row>>,
}

impl Aggregate {
    /// Creates a new Aggregate node.
    pub fn new(
        child: QueryNode,
        group_by: Vec<BoundExpr>,
        aggregates: Vec<AggregateOp>,
        columns: Vec<ColumnDesc>,
    ) -> Self {
        Self {
            child: Box::new(child),
            group_by,
            aggregates,
            columns,
            buffer: None,
        }
    }

    /// Returns the next aggregated row, or `None` if exhausted.
    async fn next(&mut self) -> Result<Option<Row>, ExecutorError> {
        if let Some(iter) = self.buffer.as_mut() {
            return Ok(iter.next());
        }

        struct GroupState {
            accumulators: Vec<Box<dyn Accumulator>>,
            distinct_sets: Vec<Option<HashSet<GroupKey>>>,
        }

        let new_state = |aggregates: &[AggregateOp]| GroupState {
            accumulators: aggregates.iter().map(|op| op.create_accumulator()).collect(),
            distinct_sets: aggregates
                .iter()
                .map(|op| op.distinct.then(HashSet::new))
                .collect(),
        };

        let mut groups: HashMap<GroupKey, GroupState> = HashMap::new();
        // Insertion order keeps output deterministic
        let mut group_order: Vec<GroupKey> = Vec::new();

        while let Some(row) = self.child.next().await? {
            let key = GroupKey::new(
                self.group_by
                    .iter()
                    .map(|expr| expr.evaluate(&row.values))
                    .collect::<Result<_, _>>()?,
            );

            let state = match groups.entry(key) {
                std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                std::collections::hash_map::Entry::Vacant(e) => {
                    group_order.push(e.key().clone());
                    e.insert(new_state(&self.aggregates))
                }
            };

            for (i, op) in self.aggregates.iter().enumerate() {
                let Some(val) = op.input(&row.values)? else {
                    continue;
                };
                if let Some(seen) = state.distinct_sets[i].as_mut()
                    && !seen.insert(GroupKey::new(vec![val.clone()]))
                {
                    continue;
                }
                state.accumulators[i].feed(&val)?;
            }
        }

        // An ungrouped aggregate over no rows still yields one row
        if groups.is_empty() && self.group_by.is_empty() {
            let key = GroupKey::new(vec![]);
            group_order.push(key.clone());
            groups.insert(key, new_state(&self.aggregates));
        }

        let mut rows = Vec::with_capacity(group_order.len());
        for key in group_order {
            let Some(state) = groups.remove(&key) else {
                continue;
            };
            let mut values = key.0;
            values.extend(state.accumulators.iter().map(|acc| acc.finish()));
            rows.push(Row::computed(values));
        }

        let mut iter = rows.into_iter();
        let first = iter.next();
        self.buffer = Some(iter);
        Ok(first)
    }
}

/// Window node.
///
/// Materializes the input, computes every window independently, and appends
/// the results to each row by input position.
pub struct Window {
    child: Box<QueryNode>,
    windows: Vec<WindowOp>,
    columns: Vec<ColumnDesc>,
    buffer: Option<std::vec::IntoIter<Row>>,
}

impl Window {
    async fn next(&mut self) -> Result<Option<Row>, ExecutorError> {
        if let Some(iter) = self.buffer.as_mut() {
            return Ok(iter.next());
        }
        let input = self.child.drain().await?;
        let mut values: Vec<Vec<Value>> = input.into_iter().map(|r| r.values).collect();
        let results = self
            .windows
            .iter()
            .map(|w| w.compute(&values))
            .collect::<Result<Vec<_>, _>>()?;
        for column in results {
            for (row, v) in values.iter_mut().zip(column) {
                row.push(v);
            }
        }
        let mut iter = values
            .into_iter()
            .map(Row::computed)
            .collect::<Vec<_>>()
            .into_iter();
        let first = iter.next();
        self.buffer = Some(iter);
        Ok(first)
    }
}

/// Pivot node.
pub struct Pivot {
    child: Box<QueryNode>,
    pivot: PivotOp,
    columns: Vec<ColumnDesc>,
    buffer: Option<std::vec::IntoIter<Row>>,
}

impl Pivot {
    async fn next(&mut self) -> Result<Option<Row>, ExecutorError> {
        if let Some(iter) = self.buffer.as_mut() {
            return Ok(iter.next());
        }
        let input: Vec<Vec<Value>> = self
            .child
            .drain()
            .await?
            .into_iter()
            .map(|r| r.values)
            .collect();
        let mut iter = self
            .pivot
            .compute(&input)?
            .into_iter()
            .map(Row::computed)
            .collect::<Vec<_>>()
            .into_iter();
        let first = iter.next();
        self.buffer = Some(iter);
        Ok(first)
    }
}

/// Join node.
///
/// Drains the left input completely, then the right, before any matching
/// starts. The strategy is chosen per run from the context's options.
pub struct Join {
    left: Box<QueryNode>,
    right: Box<QueryNode>,
    spec: JoinSpec,
    columns: Vec<ColumnDesc>,
    ctx: ExecContext,
    buffer: Option<std::vec::IntoIter<Row>>,
}

impl Join {
    async fn next(&mut self) -> Result<Option<Row>, ExecutorError> {
        if let Some(iter) = self.buffer.as_mut() {
            return Ok(iter.next());
        }
        let left = self.left.drain().await?;
        let right = self.right.drain().await?;
        let strategy = self.spec.strategy(&self.ctx.options);
        debug!(
            kind = self.spec.kind.as_str(),
            strategy = %strategy,
            left_rows = left.len(),
            right_rows = right.len(),
            "executing join"
        );
        let mut iter = self.spec.execute(strategy, &left, &right)?.into_iter();
        let first = iter.next();
        self.buffer = Some(iter);
        Ok(first)
    }
}

/// Cross-apply node.
///
/// Invokes the method once per outer row. The Nth outer row is invocation
/// position N, and receives the environment supplied for that position (an
/// empty one if none was). Outer rows for which the method yields nothing
/// are dropped.
pub struct CrossApply {
    child: Box<QueryNode>,
    schema: Arc<dyn Schema>,
    method: String,
    args: Vec<BoundExpr>,
    alias: String,
    columns: Vec<ColumnDesc>,
    ctx: ExecContext,
    position: usize,
    buffer: std::vec::IntoIter<Row>,
}

impl CrossApply {
    async fn next(&mut self) -> Result<Option<Row>, ExecutorError> {
        loop {
            if let Some(row) = self.buffer.next() {
                return Ok(Some(row));
            }
            let Some(outer) = self.child.next().await? else {
                return Ok(None);
            };
            let position = self.position;
            self.position += 1;

            let args = self
                .args
                .iter()
                .map(|a| a.evaluate(&outer.values))
                .collect::<Result<Vec<_>, _>>()?;
            let empty = HashMap::new();
            let invocation = InvocationContext {
                position,
                args: &args,
                environment: self.ctx.environment_at(position).unwrap_or(&empty),
            };
            let inner = self
                .schema
                .invoke(&self.method, &invocation)
                .map_err(|e| source_error(&self.alias, e))?;

            let inner_width = self.columns.len().saturating_sub(outer.values.len());
            let mut rows = Vec::with_capacity(inner.len());
            for values in inner {
                check_width(&self.alias, values.len(), inner_width)?;
                let mut combined = outer.values.clone();
                combined.extend(values);
                rows.push(Row::computed(combined));
            }
            self.buffer = rows.into_iter();
        }
    }
}

/// DISTINCT node. Keeps the first occurrence of every row.
pub struct Distinct {
    child: Box<QueryNode>,
    seen: HashSet<GroupKey>,
}

impl Distinct {
    async fn next(&mut self) -> Result<Option<Row>, ExecutorError> {
        while let Some(row) = self.child.next().await? {
            if self.seen.insert(GroupKey::new(row.values.clone())) {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }
}

/// In-memory sort node.
///
/// Buffers all input rows on first `next()` call, sorts them by the
/// specified key expressions, then emits one row at a time.
pub struct Sort {
    /// Child node to pull rows from.
    child: Box<QueryNode>,
    /// Sort key items.
    items: Vec<SortItem>,
    /// Buffered sorted rows (populated on first `next()` call).
    buffer: Option<std::vec::IntoIter<Row>>,
}

impl Sort {
    /// Creates a new Sort node.
    pub fn new(child: QueryNode, items: Vec<SortItem>) -> Self {
        Self {
            child: Box::new(child),
            items,
            buffer: None,
        }
    }

    /// Returns the next sorted row, or `None` if exhausted.
    async fn next(&mut self) -> Result<Option<Row>, ExecutorError> {
        if let Some(iter) = self.buffer.as_mut() {
            return Ok(iter.next());
        }

        let mut keyed = Vec::new();
        while let Some(row) = self.child.next().await? {
            keyed.push((sort_keys(&self.items, &row.values)?, row));
        }
        // Stable: equal keys keep input order
        sort_by_keys(&mut keyed, &self.items)?;

        let mut iter = keyed
            .into_iter()
            .map(|(_, row)| row)
            .collect::<Vec<_>>()
            .into_iter();
        let first = iter.next();
        self.buffer = Some(iter);
        Ok(first)
    }
}

/// LIMIT/OFFSET node.
///
/// Skips `offset` rows from the child, then returns at most `limit` rows.
pub struct Limit {
    /// Child node to pull rows from.
    child: Box<QueryNode>,
    /// Maximum rows to return (None = no limit).
    limit: Option<u64>,
    /// Rows to skip before returning.
    offset: u64,
    /// Number of rows skipped so far.
    skipped: u64,
    /// Number of rows emitted so far.
    emitted: u64,
}

impl Limit {
    /// Creates a new Limit node.
    pub fn new(child: QueryNode, limit: Option<u64>, offset: u64) -> Self {
        Self {
            child: Box::new(child),
            limit,
            offset,
            skipped: 0,
            emitted: 0,
        }
    }

    /// Returns the next row within the LIMIT/OFFSET window.
    async fn next(&mut self) -> Result<Option<Row>, ExecutorError> {
        while self.skipped < self.offset {
            match self.child.next().await? {
                Some(_) => self.skipped += 1,
                None => return Ok(None),
            }
        }

        if let Some(limit) = self.limit
            && self.emitted >= limit
        {
            return Ok(None);
        }

        match self.child.next().await? {
            Some(row) => {
                self.emitted += 1;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }
}

/// Values scan node for queries without a FROM clause.
///
/// Returns exactly one empty row, then `None`. This allows expressions
/// like `SELECT 1+1` to be evaluated via normal Projection.
pub struct ValuesScan {
    /// Output column descriptors (empty for no-FROM queries).
    columns: Vec<ColumnDesc>,
    /// Whether the single row has been returned.
    done: bool,
}

impl ValuesScan {
    /// Creates a new ValuesScan.
    pub fn new() -> Self {
        Self {
            columns: vec![],
            done: false,
        }
    }

    /// Returns the single empty row, then `None`.
    async fn next(&mut self) -> Result<Option<Row>, ExecutorError> {
        if self.done {
            Ok(None)
        } else {
            self.done = true;
            Ok(Some(Row::computed(vec![])))
        }
    }
}

impl Default for ValuesScan {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::Type;
    use crate::executor::aggregate::AggregateFunction;
    use crate::executor::column::ColumnSource;
    use crate::executor::tests::bind_expr;
    use crate::pipeline::PipelineConfig;
    use crate::schema::{ColumnDescriptor, MemorySchema, TableMethod};
    use crate::sql::JoinType;

    fn people() -> Arc<dyn Schema> {
        Arc::new(
            MemorySchema::new("People")
                .column("Name", Type::Text)
                .column("Age", Type::Integer)
                .row(vec![Value::from("ann"), Value::Integer(30)])
                .row(vec![Value::from("bob"), Value::Integer(12)])
                .row(vec![Value::from("cy"), Value::Integer(45)]),
        )
    }

    fn people_columns(alias: &str) -> Vec<ColumnDesc> {
        ["Name", "Age"]
            .iter()
            .zip([Type::Text, Type::Integer])
            .map(|(name, ty)| ColumnDesc {
                name: name.to_string(),
                source: Some(ColumnSource {
                    alias: alias.into(),
                    name: Some("People".into()),
                }),
                ty,
                nullable: false,
            })
            .collect()
    }

    fn scan(alias: &str, source_id: usize) -> QueryPlan {
        QueryPlan::Scan {
            alias: alias.into(),
            source_id,
            source: ScanSource::Table(people()),
            columns: people_columns(alias),
        }
    }

    fn small_chunks() -> ExecContext {
        ExecContext {
            pipeline: PipelineConfig {
                chunk_size: 1,
                channel_capacity: 1,
            },
            ..ExecContext::default()
        }
    }

    async fn run(plan: QueryPlan, ctx: &ExecContext) -> Vec<Vec<Value>> {
        let mut node = plan.prepare_for_execute(ctx);
        let mut out = Vec::new();
        while let Some(row) = node.next().await.unwrap() {
            out.push(row.values);
        }
        out
    }

    // ========================================================================
    // Scan, Filter, Projection
    // ========================================================================

    #[tokio::test]
    async fn test_scan_tags_origins() {
        let mut node = scan("p", 7).prepare_for_execute(&small_chunks());
        let mut indices = Vec::new();
        while let Some(row) = node.next().await.unwrap() {
            let origin = row.origin.unwrap();
            assert_eq!(origin.source_id, 7);
            indices.push(origin.row_index);
        }
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_filter_and_projection() {
        let columns = people_columns("p");
        let plan = QueryPlan::Projection {
            input: Box::new(QueryPlan::Filter {
                input: Box::new(scan("p", 0)),
                predicate: bind_expr("Age > 18", &columns),
            }),
            exprs: vec![bind_expr("Name", &columns)],
            columns: vec![ColumnDesc::computed("Name", Type::Text, false)],
        };
        assert_eq!(
            run(plan, &small_chunks()).await,
            vec![vec![Value::from("ann")], vec![Value::from("cy")]]
        );
    }

    #[tokio::test]
    async fn test_source_width_mismatch_is_an_error() {
        let broken: Arc<dyn Schema> = Arc::new(
            MemorySchema::new("Broken")
                .column("a", Type::Integer)
                .row(vec![Value::Integer(1), Value::Integer(2)]),
        );
        let plan = QueryPlan::Scan {
            alias: "b".into(),
            source_id: 0,
            source: ScanSource::Table(broken),
            columns: vec![ColumnDesc::computed("a", Type::Integer, false)],
        };
        let mut node = plan.prepare_for_execute(&ExecContext::default());
        let err = node.next().await.unwrap_err();
        assert!(matches!(err, ExecutorError::Source { ref alias, .. } if alias == "b"));
    }

    // ========================================================================
    // Aggregate, Sort, Limit, Distinct
    // ========================================================================

    #[tokio::test]
    async fn test_scalar_aggregate_over_empty_input() {
        let columns = people_columns("p");
        let plan = QueryPlan::Aggregate {
            input: Box::new(QueryPlan::Filter {
                input: Box::new(scan("p", 0)),
                predicate: bind_expr("Age > 100", &columns),
            }),
            group_by: vec![],
            aggregates: vec![
                AggregateOp {
                    func: AggregateFunction::Count,
                    args: vec![],
                    distinct: false,
                },
                AggregateOp {
                    func: AggregateFunction::Sum,
                    args: vec![bind_expr("Age", &columns)],
                    distinct: false,
                },
            ],
            columns: vec![],
        };
        assert_eq!(
            run(plan, &ExecContext::default()).await,
            vec![vec![Value::Bigint(0), Value::Null]]
        );
    }

    #[tokio::test]
    async fn test_sort_desc_then_limit() {
        let columns = people_columns("p");
        let plan = QueryPlan::Limit {
            input: Box::new(QueryPlan::Sort {
                input: Box::new(scan("p", 0)),
                items: vec![SortItem {
                    expr: bind_expr("Age", &columns),
                    descending: true,
                    nulls: crate::sql::NullOrdering::Default,
                }],
            }),
            limit: Some(2),
            offset: 0,
        };
        let names: Vec<Value> = run(plan, &small_chunks())
            .await
            .into_iter()
            .map(|r| r[0].clone())
            .collect();
        assert_eq!(names, vec![Value::from("cy"), Value::from("ann")]);
    }

    #[tokio::test]
    async fn test_distinct() {
        let columns = people_columns("p");
        let plan = QueryPlan::Distinct {
            input: Box::new(QueryPlan::Projection {
                input: Box::new(scan("p", 0)),
                exprs: vec![bind_expr("Age > 18", &columns)],
                columns: vec![ColumnDesc::computed("adult", Type::Boolean, false)],
            }),
        };
        assert_eq!(
            run(plan, &ExecContext::default()).await,
            vec![vec![Value::Boolean(true)], vec![Value::Boolean(false)]]
        );
    }

    // ========================================================================
    // Join and CrossApply
    // ========================================================================

    #[tokio::test]
    async fn test_join_strategies_agree() {
        let mut columns = people_columns("a");
        columns.extend(people_columns("b"));
        let cond = bind_expr("a.Age > b.Age", &columns);
        let plan = QueryPlan::Join {
            left: Box::new(scan("a", 0)),
            right: Box::new(scan("b", 1)),
            spec: JoinSpec::analyze(JoinType::Left, Some(cond), 2, 2),
            columns,
        };
        let merged = run(plan.clone(), &small_chunks()).await;
        let nested = run(
            plan,
            &ExecContext {
                options: crate::executor::CompilationOptions::nested_loop_only(),
                ..ExecContext::default()
            },
        )
        .await;
        assert_eq!(merged, nested);
        // ann>bob, bob unmatched, cy>ann, cy>bob
        assert_eq!(merged.len(), 4);
    }

    #[tokio::test]
    async fn test_cross_apply_positions_and_environment() {
        let method = TableMethod {
            name: "Tags".into(),
            params: vec![Type::Text],
            columns: vec![ColumnDescriptor::new("Tag", 0, Type::Text)],
        };
        let schema: Arc<dyn Schema> = Arc::new(MemorySchema::new("Tagger").method(
            method,
            |ctx: &InvocationContext<'_>| {
                let prefix = ctx.environment.get("prefix").cloned().unwrap_or_default();
                Ok(vec![vec![Value::Text(format!(
                    "{}{}#{}",
                    prefix,
                    ctx.args[0].to_text(),
                    ctx.position
                ))]])
            },
        ));
        let columns = people_columns("p");
        let mut out_columns = columns.clone();
        out_columns.push(ColumnDesc::computed("Tag", Type::Text, false));
        let plan = QueryPlan::CrossApply {
            input: Box::new(scan("p", 0)),
            schema,
            method: "tags".into(),
            args: vec![bind_expr("Name", &columns)],
            alias: "t".into(),
            source_id: 1,
            columns: out_columns,
        };
        let mut env = HashMap::new();
        env.insert("prefix".to_string(), "x:".to_string());
        let ctx = ExecContext {
            environment: Arc::new(vec![HashMap::new(), env]),
            ..ExecContext::default()
        };
        let tags: Vec<Value> = run(plan, &ctx).await.into_iter().map(|r| r[2].clone()).collect();
        assert_eq!(
            tags,
            vec![
                Value::from("ann#0"),
                Value::from("x:bob#1"),
                Value::from("cy#2")
            ]
        );
    }

    #[tokio::test]
    async fn test_window_appends_columns() {
        let columns = people_columns("p");
        let plan = QueryPlan::Window {
            input: Box::new(scan("p", 0)),
            windows: vec![WindowOp {
                func: crate::executor::WindowFunction::RowNumber,
                args: vec![],
                partition_by: vec![],
                order_by: vec![SortItem::asc(bind_expr("Age", &columns))],
            }],
            columns: vec![],
        };
        let out = run(plan, &ExecContext::default()).await;
        let numbers: Vec<Value> = out.iter().map(|r| r[2].clone()).collect();
        assert_eq!(
            numbers,
            vec![Value::Bigint(2), Value::Bigint(1), Value::Bigint(3)]
        );
    }
}
