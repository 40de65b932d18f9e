//! Compiled queries and their runs.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::binder::Metadata;
use crate::executor::{ColumnDesc, CompilationOptions, ExecContext, QueryPlan};
use crate::pipeline::PipelineConfig;
use crate::table::{Table, TableColumn};

use super::error::QueryError;

/// Per-run settings.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Join strategy flags for this run.
    pub options: CompilationOptions,
    /// Raising this token ends the run with [`QueryOutcome::Cancelled`].
    pub cancel: CancellationToken,
    /// Environment maps for table-valued method calls, indexed by the
    /// position of the outer row.
    pub environment: Arc<Vec<HashMap<String, String>>>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(mut self, options: CompilationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_environment(mut self, environment: Vec<HashMap<String, String>>) -> Self {
        self.environment = Arc::new(environment);
        self
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Every row was produced.
    Completed(Table),
    /// The run's token was raised before the result was complete.
    Cancelled { rows_produced: usize },
}

impl QueryOutcome {
    /// Returns the table of a completed run.
    pub fn into_table(self) -> Option<Table> {
        match self {
            QueryOutcome::Completed(table) => Some(table),
            QueryOutcome::Cancelled { .. } => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueryOutcome::Cancelled { .. })
    }
}

/// A bound, lowered query. Runs any number of times, under any
/// [`CompilationOptions`], without re-binding.
#[derive(Clone)]
pub struct CompiledQuery {
    id: u64,
    text: String,
    plan: QueryPlan,
    metadata: Metadata,
    pipeline: PipelineConfig,
}

impl CompiledQuery {
    pub(super) fn new(
        id: u64,
        text: String,
        plan: QueryPlan,
        metadata: Metadata,
        pipeline: PipelineConfig,
    ) -> Self {
        Self {
            id,
            text,
            plan,
            metadata,
            pipeline,
        }
    }

    /// Process-unique identifier of this compilation.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Canonical text of the query.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Result columns.
    pub fn columns(&self) -> &[ColumnDesc] {
        self.metadata.output_columns()
    }

    /// Symbol table built while binding.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    /// Renders the plan with the default join strategy flags.
    pub fn explain(&self) -> String {
        self.plan.explain()
    }

    /// Renders the plan with the join strategies `options` would pick.
    pub fn explain_with(&self, options: &CompilationOptions) -> String {
        self.plan.explain_with(options)
    }

    /// Executes the query and materializes its result.
    ///
    /// Cancellation is checked before every row is pulled and once more after
    /// the last one; a raised token yields [`QueryOutcome::Cancelled`] rather
    /// than an error.
    pub async fn run(&self, ctx: &RunContext) -> Result<QueryOutcome, QueryError> {
        let exec = ExecContext {
            options: ctx.options,
            pipeline: self.pipeline,
            cancel: ctx.cancel.clone(),
            environment: Arc::clone(&ctx.environment),
        };
        debug!(query_id = self.id, options = ?ctx.options, "run started");

        let mut node = self.plan.clone().prepare_for_execute(&exec);
        let mut rows = Vec::new();
        loop {
            if ctx.cancel.is_cancelled() {
                return Ok(self.cancelled(rows.len()));
            }
            match node.next().await {
                Ok(Some(row)) => rows.push(row.values),
                Ok(None) => break,
                Err(_) if ctx.cancel.is_cancelled() => return Ok(self.cancelled(rows.len())),
                Err(e) => return Err(e.into()),
            }
        }
        if ctx.cancel.is_cancelled() {
            return Ok(self.cancelled(rows.len()));
        }

        debug!(query_id = self.id, rows = rows.len(), "run completed");
        let columns = self
            .columns()
            .iter()
            .map(|c| TableColumn {
                name: c.name.clone(),
                ty: c.ty,
                nullable: c.nullable,
            })
            .collect();
        Ok(QueryOutcome::Completed(Table::new(columns, rows)))
    }

    fn cancelled(&self, rows_produced: usize) -> QueryOutcome {
        info!(query_id = self.id, rows_produced, "run cancelled");
        QueryOutcome::Cancelled { rows_produced }
    }
}

impl std::fmt::Debug for CompiledQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledQuery")
            .field("id", &self.id)
            .field("text", &self.text)
            .finish_non_exhaustive()
    }
}
