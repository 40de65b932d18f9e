//! Column resolution, implicit coercions and table-valued methods through the
//! public engine API.


use std::collections::HashMap;

use quarry::schema::{ColumnDescriptor, InvocationContext, TableMethod};
use quarry::{
    CompilationOptions, Engine, ExecutorError, MemoryProvider, MemorySchema, QueryError,
    RunContext, ScalarFunction, Signature, Type, Value,
};

use query_test_support::{engine, query, text};

fn mail() -> Engine {
    engine(
        MemoryProvider::new().with(
            MemorySchema::new("Mail")
                .column_with("Email", Type::Text, false)
                .row(vec![text("david.jones@proseware.com")])
                .row(vec![text("alice.smith@example.com")]),
        ),
    )
}

#[tokio::test]
async fn test_direct_and_aliased_columns_agree() {
    let engine = mail();
    let expected = vec![vec![text("david.jones@proseware.com")]];

    for sql in [
        "SELECT Email FROM Mail WHERE Email[0] = 'd'",
        "SELECT m.Email FROM Mail m WHERE m.Email[0] = 'd'",
        "SELECT Mail.Email FROM Mail WHERE Mail.Email[0] = 'd'",
    ] {
        let rows = query(&engine, sql, CompilationOptions::default()).await;
        assert_eq!(rows, expected, "{sql}");
    }
}

#[tokio::test]
async fn test_direct_and_aliased_columns_agree_through_functions() {
    let engine = mail();
    let direct = query(
        &engine,
        "SELECT Email FROM Mail WHERE EndsWith(Email, 'example.com')",
        CompilationOptions::default(),
    )
    .await;
    let aliased = query(
        &engine,
        "SELECT x.Email FROM Mail x WHERE EndsWith(x.Email, 'example.com')",
        CompilationOptions::default(),
    )
    .await;
    assert_eq!(direct, aliased);
    assert_eq!(direct, vec![vec![text("alice.smith@example.com")]]);
}

// ========================================================================
// Implicit boolean coercion
// ========================================================================

fn with_predicates() -> Engine {
    let engine = mail();
    engine.register_function(ScalarFunction::new(
        Signature::new("IsAlice", vec![Type::Text], Type::Boolean),
        |args| Ok(Value::Boolean(args[0].to_text().starts_with("alice"))),
    ));
    engine.register_function(ScalarFunction::new(
        Signature::new("IsAliceText", vec![Type::Text], Type::Text),
        |args| {
            let flag = args[0].to_text().starts_with("alice");
            Ok(Value::from(if flag { "true" } else { "false" }))
        },
    ));
    engine
}

#[tokio::test]
async fn test_bare_predicate_call_equals_explicit_comparison() {
    let engine = with_predicates();
    let alice = vec![vec![text("alice.smith@example.com")]];

    for function in ["IsAlice", "IsAliceText"] {
        for sql in [
            format!("SELECT Email FROM Mail WHERE {function}(Email)"),
            format!("SELECT Email FROM Mail WHERE {function}(Email) = true"),
            format!("SELECT Email FROM Mail WHERE NOT {function}(Email) = false"),
        ] {
            let rows = query(&engine, &sql, CompilationOptions::default()).await;
            assert_eq!(rows, alice, "{sql}");
        }
    }
}

#[tokio::test]
async fn test_predicate_call_inside_case_when() {
    let engine = with_predicates();

    for function in ["IsAlice", "IsAliceText"] {
        let bare = query(
            &engine,
            &format!("SELECT CASE WHEN {function}(Email) THEN 1 ELSE 0 END FROM Mail"),
            CompilationOptions::default(),
        )
        .await;
        let explicit = query(
            &engine,
            &format!("SELECT CASE WHEN {function}(Email) = true THEN 1 ELSE 0 END FROM Mail"),
            CompilationOptions::default(),
        )
        .await;
        assert_eq!(bare, explicit, "{function}");
        assert_eq!(
            bare,
            vec![vec![Value::Integer(0)], vec![Value::Integer(1)]],
            "{function}"
        );
    }
}

// ========================================================================
// Runtime conversion failures
// ========================================================================

#[tokio::test]
async fn test_unparsable_text_fails_the_query() {
    let engine = engine(
        MemoryProvider::new().with(
            MemorySchema::new("Prices")
                .column_with("Amount", Type::Text, false)
                .row(vec![text("3,75")])
                .row(vec![text("not a number")]),
        ),
    );
    let err = engine
        .execute("SELECT Amount FROM Prices WHERE Amount > 1.5", &RunContext::new())
        .await
        .unwrap_err();
    match err {
        QueryError::Execution(ExecutorError::InvalidCast { value, .. }) => {
            assert!(value.contains("not a number"), "{value}");
        }
        other => panic!("unexpected error: {other}"),
    }

    let rows = query(
        &engine,
        "SELECT Amount FROM Prices WHERE Amount = '3,75'",
        CompilationOptions::default(),
    )
    .await;
    assert_eq!(rows, vec![vec![text("3,75")]]);
}

// ========================================================================
// Table-valued methods
// ========================================================================

/// Cities whose `Tags(TEXT)` method echoes its argument, the invocation
/// position and the `prefix` environment entry.
fn tagged_cities() -> Engine {
    let tags = TableMethod {
        name: "Tags".into(),
        params: vec![Type::Text],
        columns: vec![ColumnDescriptor::new("Tag", 0, Type::Text).nullable(false)],
    };
    let schema = MemorySchema::new("Cities")
        .column_with("Name", Type::Text, false)
        .row(vec![text("Oslo")])
        .row(vec![text("Bergen")])
        .row(vec![text("Tromso")])
        .method(tags, |ctx: &InvocationContext<'_>| {
            let prefix = ctx.environment.get("prefix").cloned().unwrap_or_default();
            Ok(vec![vec![Value::Text(format!(
                "{prefix}{}#{}",
                ctx.args[0].to_text(),
                ctx.position
            ))]])
        });
    engine(MemoryProvider::new().with(schema))
}

fn prefix(value: &str) -> HashMap<String, String> {
    HashMap::from([("prefix".to_string(), value.to_string())])
}

#[tokio::test]
async fn test_cross_apply_receives_position_and_environment() {
    let engine = tagged_cities();
    let ctx = RunContext::new().with_environment(vec![prefix("a:"), HashMap::new(), prefix("c:")]);
    let table = engine
        .execute(
            "SELECT c.Name, t.Tag FROM Cities c CROSS APPLY c.Tags(c.Name) t",
            &ctx,
        )
        .await
        .unwrap()
        .into_table()
        .unwrap();

    assert_eq!(
        table.column_values("Tag").unwrap(),
        vec![
            &text("a:Oslo#0"),
            &text("Bergen#1"),
            &text("c:Tromso#2")
        ]
    );
    assert_eq!(table.columns()[1].ty, Type::Text);
}

#[tokio::test]
async fn test_method_source_uses_first_environment() {
    let engine = tagged_cities();
    let ctx = RunContext::new().with_environment(vec![prefix("env:")]);
    let table = engine
        .execute("SELECT t.Tag FROM Cities.Tags('x') t", &ctx)
        .await
        .unwrap()
        .into_table()
        .unwrap();
    assert_eq!(table.rows(), &[vec![text("env:x#0")]]);
}

#[test]
fn test_method_metadata_names_the_method() {
    let engine = tagged_cities();
    let compiled = engine
        .compile("SELECT c.Name, t.Tag FROM Cities c CROSS APPLY c.Tags(c.Name) t")
        .unwrap();
    let binding = compiled.metadata().alias("t").unwrap();
    assert_eq!(binding.columns, vec![("Tag".to_string(), Type::Text)]);
}
