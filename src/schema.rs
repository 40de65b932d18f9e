//! Row source collaborators.
//!
//! Queries run against [`Schema`]s handed out by a [`SchemaProvider`]. A
//! schema exposes named, typed columns, produces rows through a
//! [`RowSource`], and may offer table-valued methods that are invoked with
//! arguments (once for `FROM s.Method(...)`, once per outer row for
//! `CROSS APPLY`).
//!
//! The shape of a source is fixed when it is bound: every row it emits is an
//! [`EntityResolver`] sharing one name-to-index map.

mod entity;
mod memory;

pub use entity::{EntityResolver, RowOrigin};
pub use memory::{MemoryProvider, MemorySchema};

use std::collections::HashMap;
use std::sync::Arc;

use crate::datum::{Type, Value};

/// Errors raised by schema providers and row sources.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    /// The schema has no method with this name.
    #[error("schema \"{schema}\" has no method \"{method}\"")]
    UnknownMethod { schema: String, method: String },

    /// Arguments could not be used by the method.
    #[error("invalid arguments for \"{method}\": {message}")]
    InvalidArguments { method: String, message: String },

    /// A row source failed while producing rows.
    #[error("{0}")]
    Failed(String),
}

/// A named, typed column exposed by a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,
    /// Position of the column in every row of the source.
    pub index: usize,
    /// Column type.
    pub ty: Type,
    /// Whether the column may hold NULL.
    pub nullable: bool,
}

impl ColumnDescriptor {
    /// Creates a nullable column descriptor.
    pub fn new(name: impl Into<String>, index: usize, ty: Type) -> Self {
        Self {
            name: name.into(),
            index,
            ty,
            nullable: true,
        }
    }

    /// Sets whether the column may hold NULL.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

/// A table-valued method offered by a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMethod {
    /// Method name (matched case-insensitively).
    pub name: String,
    /// Declared parameter types.
    pub params: Vec<Type>,
    /// Shape of the rows the method yields.
    pub columns: Vec<ColumnDescriptor>,
}

/// Context handed to a table-valued method invocation.
#[derive(Debug, Clone)]
pub struct InvocationContext<'a> {
    /// Ordinal of the outer row the call belongs to (0 for a plain `FROM`).
    pub position: usize,
    /// Evaluated arguments, already coerced to the declared parameter types.
    pub args: &'a [Value],
    /// Per-position environment; empty when no environment exists for `position`.
    pub environment: &'a HashMap<String, String>,
}

/// Producer of raw rows for one FROM-clause entry.
pub trait RowSource: Send {
    /// Returns the next row, or `None` when the source is exhausted.
    fn next_row(&mut self) -> Result<Option<Vec<Value>>, SourceError>;
}

/// A [`RowSource`] over rows that are already in memory.
pub struct VecRowSource {
    rows: std::vec::IntoIter<Vec<Value>>,
}

impl VecRowSource {
    /// Creates a source yielding `rows` in order.
    pub fn new(rows: Vec<Vec<Value>>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }
}

impl RowSource for VecRowSource {
    fn next_row(&mut self) -> Result<Option<Vec<Value>>, SourceError> {
        Ok(self.rows.next())
    }
}

/// A queryable source of rows.
pub trait Schema: Send + Sync {
    /// Name the schema is registered under.
    fn name(&self) -> &str;

    /// Columns of the rows produced by [`Schema::rows`].
    fn columns(&self) -> &[ColumnDescriptor];

    /// Table-valued methods callable as `alias.Method(...)`.
    fn methods(&self) -> &[TableMethod] {
        &[]
    }

    /// Opens a fresh row source.
    fn rows(&self) -> Result<Box<dyn RowSource>, SourceError>;

    /// Invokes a table-valued method.
    fn invoke(
        &self,
        method: &str,
        ctx: &InvocationContext<'_>,
    ) -> Result<Vec<Vec<Value>>, SourceError> {
        let _ = ctx;
        Err(SourceError::UnknownMethod {
            schema: self.name().to_string(),
            method: method.to_string(),
        })
    }

    /// Looks up a method by name, case-insensitively.
    fn method(&self, name: &str) -> Option<&TableMethod> {
        self.methods()
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Debug for dyn Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Schema({})", self.name())
    }
}

/// Resolves source names used in FROM clauses.
pub trait SchemaProvider: Send + Sync {
    /// Returns the schema registered under `name`, if any.
    fn resolve(&self, name: &str) -> Option<Arc<dyn Schema>>;
}
