//! In-memory schema provider.
//!
//! [`MemorySchema`] holds its rows in a `Vec` and dispatches table-valued
//! methods to closures; [`MemoryProvider`] is a name-indexed registry of
//! schemas. Both are used by embedders with small data sets and by tests.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::datum::{Type, Value};

use super::{
    ColumnDescriptor, InvocationContext, RowSource, Schema, SchemaProvider, SourceError,
    TableMethod, VecRowSource,
};

type MethodFn =
    Arc<dyn Fn(&InvocationContext<'_>) -> Result<Vec<Vec<Value>>, SourceError> + Send + Sync>;

/// A schema whose rows live in memory.
pub struct MemorySchema {
    name: String,
    columns: Vec<ColumnDescriptor>,
    rows: Vec<Vec<Value>>,
    methods: Vec<TableMethod>,
    handlers: Vec<MethodFn>,
}

impl MemorySchema {
    /// Creates an empty schema with no columns.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            methods: Vec::new(),
            handlers: Vec::new(),
        }
    }

    /// Appends a nullable column.
    pub fn column(self, name: impl Into<String>, ty: Type) -> Self {
        self.column_with(name, ty, true)
    }

    /// Appends a column with explicit nullability.
    pub fn column_with(mut self, name: impl Into<String>, ty: Type, nullable: bool) -> Self {
        let index = self.columns.len();
        self.columns
            .push(ColumnDescriptor::new(name, index, ty).nullable(nullable));
        self
    }

    /// Appends a row. Values are positional.
    pub fn row(mut self, values: Vec<Value>) -> Self {
        self.rows.push(values);
        self
    }

    /// Appends several rows.
    pub fn rows_from(mut self, rows: impl IntoIterator<Item = Vec<Value>>) -> Self {
        self.rows.extend(rows);
        self
    }

    /// Registers a table-valued method.
    pub fn method<F>(mut self, method: TableMethod, handler: F) -> Self
    where
        F: Fn(&InvocationContext<'_>) -> Result<Vec<Vec<Value>>, SourceError>
            + Send
            + Sync
            + 'static,
    {
        self.methods.push(method);
        self.handlers.push(Arc::new(handler));
        self
    }
}

impl Schema for MemorySchema {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    fn methods(&self) -> &[TableMethod] {
        &self.methods
    }

    fn rows(&self) -> Result<Box<dyn RowSource>, SourceError> {
        Ok(Box::new(VecRowSource::new(self.rows.clone())))
    }

    fn invoke(
        &self,
        method: &str,
        ctx: &InvocationContext<'_>,
    ) -> Result<Vec<Vec<Value>>, SourceError> {
        let position = self
            .methods
            .iter()
            .position(|m| m.name.eq_ignore_ascii_case(method))
            .ok_or_else(|| SourceError::UnknownMethod {
                schema: self.name.clone(),
                method: method.to_string(),
            })?;
        (self.handlers[position])(ctx)
    }
}

/// Registry of schemas addressed by case-insensitive name.
#[derive(Default)]
pub struct MemoryProvider {
    schemas: RwLock<HashMap<String, Arc<dyn Schema>>>,
}

impl MemoryProvider {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `schema` under its own name, replacing any previous entry.
    pub fn register(&self, schema: impl Schema + 'static) {
        let schema: Arc<dyn Schema> = Arc::new(schema);
        self.schemas
            .write()
            .insert(schema.name().to_ascii_lowercase(), schema);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(self, schema: impl Schema + 'static) -> Self {
        self.register(schema);
        self
    }
}

impl SchemaProvider for MemoryProvider {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Schema>> {
        self.schemas.read().get(&name.to_ascii_lowercase()).cloned()
    }
}
