//! Join strategy equivalence and outer-join null extension.
//!
//! Every join must produce the same multiset of rows under hash,
//! sort-merge and nested-loop execution.


use quarry::{MemoryProvider, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use query_test_support::{cities, engine, multiset, query, strategy_options, text};

#[tokio::test]
async fn test_left_join_on_inequality() {
    let engine = engine(
        MemoryProvider::new()
            .with(cities("A", &[("A1", 100), ("A2", 10)]))
            .with(cities("B", &[("B1", 50)])),
    );
    let sql = "SELECT a.Name, b.Name FROM A a LEFT JOIN B b ON a.Population > b.Population";

    for (label, options) in strategy_options() {
        let rows = query(&engine, sql, options).await;
        assert_eq!(
            multiset(rows),
            multiset(vec![
                vec![text("A1"), text("B1")],
                vec![text("A2"), Value::Null],
            ]),
            "strategy {label}"
        );
    }
}

#[tokio::test]
async fn test_unconvertible_key_against_empty_side() {
    let engine = engine(
        MemoryProvider::new()
            .with(cities("A", &[("abc", 1)]))
            .with(cities("B", &[])),
    );
    let sql = "SELECT a.Name, b.Name FROM A a LEFT JOIN B b ON a.Name = b.Population";

    for (label, options) in strategy_options() {
        let rows = query(&engine, sql, options).await;
        assert_eq!(rows, vec![vec![text("abc"), Value::Null]], "strategy {label}");
    }
}

#[tokio::test]
async fn test_right_join_null_extends_left() {
    let engine = engine(
        MemoryProvider::new()
            .with(cities("A", &[("A1", 100)]))
            .with(cities("B", &[("B1", 50), ("B2", 200)])),
    );
    let sql = "SELECT a.Name, b.Name FROM A a RIGHT JOIN B b ON a.Population > b.Population";

    for (label, options) in strategy_options() {
        let rows = query(&engine, sql, options).await;
        assert_eq!(
            multiset(rows),
            multiset(vec![
                vec![text("A1"), text("B1")],
                vec![Value::Null, text("B2")],
            ]),
            "strategy {label}"
        );
    }
}

#[tokio::test]
async fn test_full_join_on_equality() {
    let engine = engine(
        MemoryProvider::new()
            .with(cities("A", &[("X", 1), ("Y", 2), ("Y", 3)]))
            .with(cities("B", &[("Y", 4), ("Z", 5)])),
    );
    let sql = "SELECT a.Population, b.Population FROM A a FULL JOIN B b ON a.Name = b.Name";

    for (label, options) in strategy_options() {
        let rows = query(&engine, sql, options).await;
        assert_eq!(
            multiset(rows),
            multiset(vec![
                vec![Value::Bigint(1), Value::Null],
                vec![Value::Bigint(2), Value::Bigint(4)],
                vec![Value::Bigint(3), Value::Bigint(4)],
                vec![Value::Null, Value::Bigint(5)],
            ]),
            "strategy {label}"
        );
    }
}

/// Random inputs, every join kind, equality and inequality predicates.
#[tokio::test]
async fn test_randomized_strategy_equivalence() {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for round in 0..20 {
        let mut side = |prefix: &str| -> Vec<(String, i64)> {
            let n = rng.gen_range(0..12);
            (0..n)
                .map(|i| (format!("{prefix}{i}"), rng.gen_range(0..8)))
                .collect()
        };
        let a = side("a");
        let b = side("b");
        let a_rows: Vec<(&str, i64)> = a.iter().map(|(n, p)| (n.as_str(), *p)).collect();
        let b_rows: Vec<(&str, i64)> = b.iter().map(|(n, p)| (n.as_str(), *p)).collect();

        let engine = engine(
            MemoryProvider::new()
                .with(cities("A", &a_rows))
                .with(cities("B", &b_rows)),
        );

        for kind in ["INNER", "LEFT", "RIGHT", "FULL"] {
            for predicate in [
                "a.Population = b.Population",
                "a.Population > b.Population",
                "a.Population <= b.Population",
                "a.Population = b.Population AND a.Name <> b.Name",
                "a.Population + b.Population = 7",
            ] {
                let sql = format!(
                    "SELECT a.Name, a.Population, b.Name, b.Population \
                     FROM A a {kind} JOIN B b ON {predicate}"
                );
                let mut results = Vec::new();
                for (label, options) in strategy_options() {
                    results.push((label, multiset(query(&engine, &sql, options).await)));
                }
                let (_, expected) = &results[1];
                for (label, rows) in &results {
                    assert_eq!(rows, expected, "round {round}, {label}: {sql}");
                }
            }
        }
    }
}
