//! Execution context shared by executor nodes.
//!
//! Each node owns a clone of the [`ExecContext`] (lightweight via `Arc`) and
//! consults it lazily during [`QueryNode::next()`](super::runner::QueryNode::next):
//! which join strategies are enabled, how rows are chunked, the cancellation
//! token, and the per-position environments handed to table-valued methods.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::pipeline::PipelineConfig;

/// Execution flags chosen per run. Changing them never requires re-binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilationOptions {
    /// Allow hash joins for predicates with an equality conjunct.
    pub use_hash_join: bool,
    /// Allow sort-merge joins for predicates with an orderable comparison.
    pub use_sort_merge_join: bool,
}

impl Default for CompilationOptions {
    fn default() -> Self {
        Self {
            use_hash_join: true,
            use_sort_merge_join: true,
        }
    }
}

impl CompilationOptions {
    /// Options that force every join to run as a nested loop.
    pub fn nested_loop_only() -> Self {
        Self {
            use_hash_join: false,
            use_sort_merge_join: false,
        }
    }
}

/// Runtime context for one execution of a plan.
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    /// Join strategy flags.
    pub options: CompilationOptions,
    /// Chunking parameters for row sources.
    pub pipeline: PipelineConfig,
    /// Cooperative cancellation signal.
    pub cancel: CancellationToken,
    /// Environment maps indexed by cross-apply position.
    pub environment: Arc<Vec<HashMap<String, String>>>,
}

impl ExecContext {
    /// Returns the environment for `position`, if one was supplied.
    pub fn environment_at(&self, position: usize) -> Option<&HashMap<String, String>> {
        self.environment.get(position)
    }
}
