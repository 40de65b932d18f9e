//! Executor-specific errors.

/// Errors that can occur while running a plan.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutorError {
    /// A value could not be converted to the target type.
    #[error("cannot convert {value} to {to}")]
    InvalidCast { value: String, to: String },

    /// Integer overflow.
    #[error("integer overflow")]
    IntegerOverflow,

    /// Division by zero in arithmetic expression.
    #[error("division by zero")]
    DivisionByZero,

    /// A row source or table-valued method failed.
    #[error("source \"{alias}\" failed: {message}")]
    Source { alias: String, message: String },

    /// Column index exceeds the number of values in the row.
    #[error("column index {index} out of bounds for row with {len} values")]
    ColumnIndexOutOfBounds { index: usize, len: usize },

    /// Type mismatch in expression evaluation.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// Unsupported operation.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl ExecutorError {
    pub(crate) fn mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        ExecutorError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}
