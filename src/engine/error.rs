//! Engine-level errors.

use crate::binder::BindError;
use crate::executor::ExecutorError;
use crate::sql::SyntaxError;

/// Errors that can occur while compiling or running a query.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The query text could not be parsed.
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),
    /// A source, column, alias or method could not be resolved.
    #[error("binding error: {0}")]
    Bind(#[from] BindError),
    /// Execution failed.
    #[error("execution error: {0}")]
    Execution(#[from] ExecutorError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes_layer() {
        let err = QueryError::from(BindError::AliasNotFound("x".into()));
        assert_eq!(
            err.to_string(),
            "binding error: alias \"x\" is not defined in this scope"
        );
        let err = QueryError::from(ExecutorError::DivisionByZero);
        assert!(err.to_string().starts_with("execution error: "));
    }
}
