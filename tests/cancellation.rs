//! Cooperative cancellation and repeated runs of one compiled query.


use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use quarry::pipeline::{PipelineConfig, spawn_source};
use quarry::schema::{EntityResolver, RowSource, SourceError};
use quarry::{
    CompilationOptions, MemoryProvider, QueryOutcome, RunContext, ScalarFunction, Signature, Type,
    Value,
};
use tokio_util::sync::CancellationToken;

use query_test_support::{cities, engine, multiset, strategy_options};

#[tokio::test]
async fn test_cancel_raised_during_run() {
    let engine = engine(MemoryProvider::new().with(cities(
        "Cities",
        &[("Oslo", 700), ("Bergen", 290), ("Tromso", 77), ("Bodo", 52)],
    )));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    engine.register_function(ScalarFunction::new(
        Signature::new("Watch", vec![Type::Text], Type::Text),
        move |args| {
            if args[0].to_text() == "Bergen" {
                trigger.cancel();
            }
            Ok(args[0].clone())
        },
    ));

    let compiled = engine.compile("SELECT Watch(Name) FROM Cities").unwrap();
    let outcome = compiled
        .run(&RunContext::new().with_cancel(cancel))
        .await
        .unwrap();
    match outcome {
        QueryOutcome::Cancelled { rows_produced } => assert!(rows_produced <= 2),
        other => panic!("expected cancellation, got {other:?}"),
    }

    // A fresh token runs the same compiled query to completion.
    let table = compiled
        .run(&RunContext::new())
        .await
        .unwrap()
        .into_table()
        .unwrap();
    assert_eq!(table.len(), 4);
}

#[tokio::test]
async fn test_cancelled_join_is_not_an_error() {
    let engine = engine(
        MemoryProvider::new()
            .with(cities("A", &[("A1", 1), ("A2", 2)]))
            .with(cities("B", &[("B1", 1)])),
    );
    let compiled = engine
        .compile("SELECT a.Name FROM A a INNER JOIN B b ON a.Population = b.Population")
        .unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    for (label, options) in strategy_options() {
        let ctx = RunContext::new()
            .with_options(options)
            .with_cancel(cancel.clone());
        let outcome = compiled.run(&ctx).await.unwrap();
        assert!(outcome.is_cancelled(), "{label}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_share_one_compilation() {
    let rows: Vec<(String, i64)> = (0..200).map(|i| (format!("c{i}"), i % 13)).collect();
    let refs: Vec<(&str, i64)> = rows.iter().map(|(n, p)| (n.as_str(), *p)).collect();
    let engine = engine(
        MemoryProvider::new()
            .with(cities("A", &refs))
            .with(cities("B", &refs)),
    );
    let compiled = Arc::new(
        engine
            .compile(
                "SELECT a.Name, b.Name FROM A a LEFT JOIN B b \
                 ON a.Population = b.Population AND a.Name < b.Name",
            )
            .unwrap(),
    );

    let handles: Vec<_> = (0..12)
        .map(|i| {
            let compiled = Arc::clone(&compiled);
            let (_, options) = strategy_options()[i % 3];
            tokio::spawn(async move {
                let ctx = RunContext::new().with_options(options);
                compiled
                    .run(&ctx)
                    .await
                    .unwrap()
                    .into_table()
                    .unwrap()
                    .into_rows()
            })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(multiset(handle.await.unwrap()));
    }
    assert!(results.windows(2).all(|w| w[0] == w[1]));
    let nested = CompilationOptions::nested_loop_only();
    assert!(compiled.explain_with(&nested).contains("nested-loop"));
}

/// Yields `0..total` and counts how many rows the producer has read.
struct Counted {
    next: i32,
    total: i32,
    pulled: Arc<AtomicUsize>,
}

impl RowSource for Counted {
    fn next_row(&mut self) -> Result<Option<Vec<Value>>, SourceError> {
        if self.next == self.total {
            return Ok(None);
        }
        self.pulled.fetch_add(1, Ordering::SeqCst);
        self.next += 1;
        Ok(Some(vec![Value::Integer(self.next - 1)]))
    }
}

#[tokio::test]
async fn test_every_row_read_before_cancel_is_delivered() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let cancel = CancellationToken::new();
    let mut rows = spawn_source(
        Box::new(Counted {
            next: 0,
            total: 100,
            pulled: Arc::clone(&pulled),
        }),
        EntityResolver::name_map(["n"]),
        0,
        "numbers".into(),
        PipelineConfig {
            chunk_size: 1,
            channel_capacity: 3,
        },
        cancel.clone(),
    );

    let first = rows.next().await.unwrap().unwrap();
    assert_eq!(first.get(0), Some(&Value::Integer(0)));
    cancel.cancel();

    let mut seen = vec![Value::Integer(0)];
    while let Some(row) = rows.next().await.unwrap() {
        seen.push(row.get(0).cloned().unwrap());
    }

    let expected: Vec<Value> = (0..seen.len() as i32).map(Value::Integer).collect();
    assert_eq!(seen, expected);
    assert!(seen.len() < 100);
    assert_eq!(pulled.load(Ordering::SeqCst), seen.len());
}
