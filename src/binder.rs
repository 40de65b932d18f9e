//! Metadata and type binding.
//!
//! The binder walks a parsed [`Query`] top-down, binding producer scopes
//! (CTEs, FROM sources, method arguments) before the expressions that read
//! them, and lowers it into an executable [`QueryPlan`]. Alongside the plan
//! it fills a [`Metadata`] symbol table: alias bindings, inferred expression
//! types, and the overload chosen for every call.
//!
//! # Scoping
//!
//! Each SELECT sees exactly the columns its FROM clause produces. Column
//! references resolve against those columns by name, optionally qualified
//! by an alias or by the name the source was referenced with. CTE
//! definitions are visible to the query that declares them and to every
//! nested query; each reference binds an independent copy of the CTE body
//! under a fresh alias.

mod error;
mod expr;
mod from;
mod functions;
mod metadata;
mod scope;
mod select;

pub(crate) use expr::ExprBinder;
pub use error::BindError;
pub use functions::FunctionRegistry;
pub use metadata::{AliasBinding, Metadata, ResolvedCall};
pub use scope::Scope;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::executor::QueryPlan;
use crate::schema::{Schema, SchemaProvider};
use crate::sql::{Cte, Query};

/// Binds `query` against the sources of `provider` and the scalar functions
/// of `functions`.
pub fn bind(
    query: &Query,
    provider: &dyn SchemaProvider,
    functions: &FunctionRegistry,
) -> Result<(QueryPlan, Metadata), BindError> {
    let mut binder = Binder::new(provider, functions);
    let plan = binder.bind_query(query)?;
    binder.metadata.set_output(plan.columns().to_vec());
    debug!(
        aliases = binder.metadata.aliases().len(),
        calls = binder.metadata.resolved_calls().len(),
        "query bound"
    );
    Ok((plan, binder.metadata))
}

/// State of one compilation.
pub(crate) struct Binder<'a> {
    provider: &'a dyn SchemaProvider,
    functions: &'a FunctionRegistry,
    metadata: Metadata,
    /// Every alias bound so far in this compilation, for synthesis.
    used_aliases: HashSet<String>,
    /// CTE definitions, one frame per enclosing WITH.
    ctes: Vec<Vec<Cte>>,
    /// CTEs whose body is currently being bound.
    expanding: Vec<String>,
    /// Schema behind each table alias, for `alias.Method(...)` calls.
    alias_schemas: HashMap<String, Arc<dyn Schema>>,
    next_source_id: usize,
}

impl<'a> Binder<'a> {
    fn new(provider: &'a dyn SchemaProvider, functions: &'a FunctionRegistry) -> Self {
        Self {
            provider,
            functions,
            metadata: Metadata::default(),
            used_aliases: HashSet::new(),
            ctes: Vec::new(),
            expanding: Vec::new(),
            alias_schemas: HashMap::new(),
            next_source_id: 0,
        }
    }

    fn bind_query(&mut self, query: &Query) -> Result<QueryPlan, BindError> {
        self.ctes.push(query.with.clone());
        let result = self.bind_select(&query.body);
        self.ctes.pop();
        result
    }

    /// Finds the innermost CTE named `name` and the depth of its frame.
    fn find_cte(&self, name: &str) -> Option<(usize, Cte)> {
        self.ctes.iter().enumerate().rev().find_map(|(depth, frame)| {
            frame
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(name))
                .map(|c| (depth, c.clone()))
        })
    }

    /// Binds a fresh copy of a CTE body with only the frames visible where
    /// the CTE was declared.
    fn bind_cte(&mut self, depth: usize, cte: Cte) -> Result<QueryPlan, BindError> {
        if self
            .expanding
            .iter()
            .any(|n| n.eq_ignore_ascii_case(&cte.name))
        {
            return Err(BindError::Unsupported(format!(
                "recursive reference to CTE \"{}\"",
                cte.name
            )));
        }
        let hidden = self.ctes.split_off(depth + 1);
        self.expanding.push(cte.name.clone());
        let result = self.bind_query(&cte.query);
        self.expanding.pop();
        self.ctes.extend(hidden);
        result
    }

    fn next_source_id(&mut self) -> usize {
        let id = self.next_source_id;
        self.next_source_id += 1;
        id
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::datum::{Type, Value};
    use crate::executor::{ExecContext, ExecutorError};
    use crate::schema::{ColumnDescriptor, MemoryProvider, MemorySchema, TableMethod};
    use crate::sql::parse_query;

    /// Sources shared by the binder tests.
    pub fn provider() -> MemoryProvider {
        MemoryProvider::new()
            .with(
                MemorySchema::new("Cities")
                    .column_with("Name", Type::Text, false)
                    .column_with("Population", Type::Bigint, false)
                    .row(vec![Value::from("Oslo"), Value::Bigint(700)])
                    .row(vec![Value::from("Bergen"), Value::Bigint(290)])
                    .row(vec![Value::from("Tromso"), Value::Bigint(77)]),
            )
            .with(
                MemorySchema::new("People")
                    .column_with("Email", Type::Text, false)
                    .column("City", Type::Text)
                    .column("Age", Type::Integer)
                    .row(vec![
                        Value::from("david.jones@proseware.com"),
                        Value::from("Oslo"),
                        Value::Integer(41),
                    ])
                    .row(vec![
                        Value::from("alice.smith@example.com"),
                        Value::from("Bergen"),
                        Value::Integer(29),
                    ])
                    .row(vec![
                        Value::from("dora.lee@example.com"),
                        Value::from("Oslo"),
                        Value::Null,
                    ]),
            )
            .with(
                MemorySchema::new("Words")
                    .column("Text", Type::Text)
                    .row(vec![Value::from("a b")])
                    .method(
                        TableMethod {
                            name: "Split".into(),
                            params: vec![Type::Text],
                            columns: vec![ColumnDescriptor::new("Part", 0, Type::Text)],
                        },
                        |ctx| {
                            let text = ctx.args[0].to_text();
                            Ok(text
                                .split(' ')
                                .map(|p| vec![Value::from(p)])
                                .collect())
                        },
                    ),
            )
    }

    pub fn compile(sql: &str) -> Result<(QueryPlan, Metadata), BindError> {
        let query = parse_query(sql).unwrap();
        bind(&query, &provider(), &FunctionRegistry::default())
    }

    /// Compiles and runs `sql`, returning the result rows.
    pub async fn run(sql: &str) -> Result<Vec<Vec<Value>>, ExecutorError> {
        let (plan, _) = compile(sql).unwrap();
        let mut node = plan.prepare_for_execute(&ExecContext::default());
        let mut rows = Vec::new();
        while let Some(row) = node.next().await? {
            rows.push(row.values);
        }
        Ok(rows)
    }

    // ========================================================================
    // Scopes and aliases
    // ========================================================================

    #[test]
    fn test_metadata_records_aliases_and_output() {
        let (_, metadata) = compile("SELECT c.Name, Upper(c.Name) AS Big FROM Cities c").unwrap();
        let binding = metadata.alias("c").unwrap();
        assert_eq!(binding.source, "Cities");
        assert_eq!(binding.columns[1], ("Population".to_string(), Type::Bigint));

        let names: Vec<&str> = metadata
            .output_columns()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, ["Name", "Big"]);
        assert_eq!(metadata.type_of("Upper(c.Name)"), Some(Type::Text));
        assert_eq!(metadata.resolved_calls()[0].signature.name, "Upper");
    }

    #[test]
    fn test_unaliased_sources_get_synthesized_aliases() {
        let (_, metadata) = compile("SELECT Name FROM Cities").unwrap();
        let alias = &metadata.aliases()[0].alias;
        assert!(!alias.is_empty());
        assert_ne!(alias, "Cities");
    }

    #[test]
    fn test_binding_errors() {
        assert_eq!(
            compile("SELECT * FROM Nowhere").unwrap_err(),
            BindError::SourceNotFound("Nowhere".into())
        );
        assert_eq!(
            compile("SELECT * FROM Cities c JOIN People c ON true").unwrap_err(),
            BindError::DuplicateAlias("c".into())
        );
        assert!(matches!(
            compile("SELECT Nmae FROM Cities"),
            Err(BindError::ColumnNotFound { .. })
        ));
        assert!(matches!(
            compile("WITH r AS (SELECT * FROM r) SELECT * FROM r"),
            Err(BindError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_cte_references_bind_independently() {
        let rows = run(
            "WITH big AS (SELECT Name, Population FROM Cities WHERE Population > 100) \
             SELECT x.Name, y.Name FROM big x JOIN big y ON x.Population > y.Population",
        )
        .await
        .unwrap();
        assert_eq!(rows, vec![vec![Value::from("Oslo"), Value::from("Bergen")]]);
    }

    #[tokio::test]
    async fn test_cte_name_qualifies_columns() {
        let rows = run("WITH big AS (SELECT Name FROM Cities) SELECT big.Name FROM big ORDER BY 1")
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec![Value::from("Bergen")]);
    }
}
