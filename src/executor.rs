//! Query executor implementing the Volcano iterator model.
//!
//! This module evaluates bound query plans against schema row sources.
//!
//! # Architecture
//!
//! ```text
//! QueryPlan (built once by the binder)
//!       |
//! [prepare_for_execute] -- fresh node tree per run, join strategies
//!       |                   picked from the run's CompilationOptions
//! QueryNode tree:
//!   Projection
//!     └── Sort
//!           └── Join (hash / sort-merge / nested-loop)
//!                 ├── Scan (chunk pipeline)
//!                 └── Scan (chunk pipeline)
//! ```
//!
//! # Components
//!
//! - [`BoundExpr`]: bound expression tree with compile-time column resolution
//! - [`QueryPlan`]: logical plan, explainable and reusable across runs
//! - [`QueryNode`]: enum-dispatched executor nodes with async `next()`
//! - [`JoinSpec`]: join predicate analysis and the three join strategies
//! - [`AggregateOp`], [`WindowOp`], [`PivotOp`]: grouping, windowing and
//!   reshaping over materialized input
//! - [`ScalarFunction`]: invocable function overloads

mod aggregate;
mod column;
mod context;
mod error;
mod eval;
mod expr;
mod function;
mod join;
mod pivot;
mod plan;
mod row;
mod runner;
mod sort;
mod window;

pub use aggregate::{Accumulator, AggregateFunction, AggregateOp, GroupKey, aggregate_output_type};
pub use column::{ColumnDesc, ColumnSource};
pub use context::{CompilationOptions, ExecContext};
pub use error::ExecutorError;
pub use eval::cast_value;
pub use expr::{BoundExpr, BoundWhenClause};
pub(crate) use expr::wider_numeric;
pub use function::{ParamType, ReturnType, ScalarFunction, Signature};
pub use join::{JoinSpec, JoinStrategy};
pub use pivot::PivotOp;
pub use plan::{QueryPlan, ScanSource};
pub use row::Row;
pub use runner::QueryNode;
pub use sort::SortItem;
pub use window::{WindowFunction, WindowOp};
