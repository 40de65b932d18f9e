//! Binding errors.
//!
//! Every error here is raised before execution starts and carries the names
//! and types involved so the failing fragment can be located in the query.

use crate::datum::Type;

/// Errors raised while resolving sources, columns, methods and types.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BindError {
    /// A column reference matched nothing in scope.
    #[error(
        "column \"{}\" not found (available: {})",
        qualified(.qualifier, .name),
        .available.join(", ")
    )]
    ColumnNotFound {
        name: String,
        qualifier: Option<String>,
        available: Vec<String>,
    },

    /// A qualifier names no source in scope.
    #[error("alias \"{0}\" is not defined in this scope")]
    AliasNotFound(String),

    /// An unqualified column matched columns of several sources.
    #[error(
        "column reference \"{name}\" is ambiguous (candidates: {})",
        .aliases.join(", ")
    )]
    AmbiguousColumn { name: String, aliases: Vec<String> },

    /// Two sources of one FROM clause were given the same alias.
    #[error("alias \"{0}\" is used more than once in the same FROM clause")]
    DuplicateAlias(String),

    /// The schema provider knows no source by this name.
    #[error("source \"{0}\" does not exist")]
    SourceNotFound(String),

    /// No overload accepts the argument types.
    #[error(
        "method \"{name}({})\" cannot be resolved (candidates: {})",
        type_list(.arg_types),
        candidate_list(.candidates)
    )]
    MethodNotResolvable {
        name: String,
        arg_types: Vec<Type>,
        candidates: Vec<String>,
    },

    /// An expression has a type its context cannot use.
    #[error("type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
    },

    /// A column was looked up in a pivoted relation and is not part of it.
    #[error(
        "column \"{column}\" not found in pivot \"{pivot_alias}\" (available: {})",
        .available.join(", ")
    )]
    PivotColumnNotFound {
        column: String,
        pivot_alias: String,
        available: Vec<String>,
    },

    /// An aggregate call appeared in WHERE or a join condition.
    #[error("aggregate {0} is not allowed in WHERE")]
    AggregateInWhere(String),

    /// A column is used outside an aggregate but is not grouped.
    #[error("column \"{0}\" must appear in GROUP BY or be used in an aggregate")]
    NotGrouped(String),

    /// Construct the binder does not handle.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl BindError {
    pub(crate) fn mismatch(context: impl Into<String>, expected: impl Into<String>, found: Type) -> Self {
        BindError::TypeMismatch {
            context: context.into(),
            expected: expected.into(),
            found: found.display_name().to_string(),
        }
    }
}

fn qualified(qualifier: &Option<String>, name: &str) -> String {
    match qualifier {
        Some(q) => format!("{}.{}", q, name),
        None => name.to_string(),
    }
}

fn type_list(types: &[Type]) -> String {
    types
        .iter()
        .map(|t| t.display_name())
        .collect::<Vec<_>>()
        .join(", ")
}

fn candidate_list(candidates: &[String]) -> String {
    if candidates.is_empty() {
        "none".to_string()
    } else {
        candidates.join("; ")
    }
}
