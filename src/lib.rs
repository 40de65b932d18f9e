//! A compiler and execution engine for a SQL-like query language over
//! programmatically supplied row sources.
//!
//! ```text
//! query text -> sql (parse) -> binder (resolve, type, lower)
//!            -> executor (joins, aggregates, windows, pivot) -> Table
//! ```
//!
//! Sources implement [`schema::Schema`] and are found through a
//! [`schema::SchemaProvider`]; [`Engine`] is the entry point.

pub mod alias;
pub mod binder;
pub mod datum;
pub mod engine;
pub mod executor;
pub mod ids;
pub mod pipeline;
pub mod schema;
pub mod sql;
pub mod table;

pub use binder::{BindError, FunctionRegistry, Metadata};
pub use datum::{Type, Value};
pub use engine::{CompiledQuery, Engine, EngineConfig, QueryError, QueryOutcome, RunContext};
pub use executor::{CompilationOptions, ExecutorError, ScalarFunction, Signature};
pub use schema::{MemoryProvider, MemorySchema, Schema, SchemaProvider};
pub use table::{Table, TableColumn};
