//! Query engine entry point.
//!
//! The [`Engine`] ties the stages together:
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                           Engine                             |
//! |                                                              |
//! |  query text --parse--> Query --bind--> QueryPlan + Metadata  |
//! |                                   |                          |
//! |          Arc<dyn SchemaProvider> -+- Arc<FunctionRegistry>   |
//! +------------------------------+-------------------------------+
//!                                |
//!                                v
//!                         CompiledQuery
//!            run(RunContext) -> QueryOutcome (Table | Cancelled)
//! ```
//!
//! Compilation happens once. A [`CompiledQuery`] can then be run repeatedly,
//! concurrently, and with different join strategy flags.

mod compiled;
mod error;

pub use compiled::{CompiledQuery, QueryOutcome, RunContext};
pub use error::QueryError;

use std::sync::Arc;

use tracing::info;

use crate::binder::{self, FunctionRegistry};
use crate::executor::ScalarFunction;
use crate::ids::next_query_id;
use crate::pipeline::PipelineConfig;
use crate::schema::SchemaProvider;
use crate::sql::{Query, parse_query};

/// Engine-wide settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Chunking of rows delivered by sources.
    pub pipeline: PipelineConfig,
}

/// Compiles queries against one schema provider and function library.
pub struct Engine {
    provider: Arc<dyn SchemaProvider>,
    functions: Arc<FunctionRegistry>,
    config: EngineConfig,
}

impl Engine {
    /// Creates an engine with the built-in functions and default settings.
    pub fn new(provider: Arc<dyn SchemaProvider>) -> Self {
        Self::with_config(provider, EngineConfig::default())
    }

    pub fn with_config(provider: Arc<dyn SchemaProvider>, config: EngineConfig) -> Self {
        Self {
            provider,
            functions: Arc::new(FunctionRegistry::with_builtins()),
            config,
        }
    }

    /// Adds a scalar function overload. Affects queries compiled afterwards.
    pub fn register_function(&self, function: ScalarFunction) {
        self.functions.register(function);
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parses and compiles `sql`.
    pub fn compile(&self, sql: &str) -> Result<CompiledQuery, QueryError> {
        let query = parse_query(sql)?;
        self.compile_query(&query)
    }

    /// Compiles an already parsed query.
    pub fn compile_query(&self, query: &Query) -> Result<CompiledQuery, QueryError> {
        let id = next_query_id();
        let (plan, metadata) = binder::bind(query, self.provider.as_ref(), &self.functions)?;
        info!(
            query_id = id,
            aliases = metadata.aliases().len(),
            columns = metadata.output_columns().len(),
            "query compiled"
        );
        Ok(CompiledQuery::new(
            id,
            query.to_string(),
            plan,
            metadata,
            self.config.pipeline,
        ))
    }

    /// Compiles and runs `sql` once.
    pub async fn execute(&self, sql: &str, ctx: &RunContext) -> Result<QueryOutcome, QueryError> {
        self.compile(sql)?.run(ctx).await
    }
}
