//! Row type produced by executor nodes.
//!
//! A [`Row`] holds positional values plus, for rows read straight from a
//! source, the [`RowOrigin`] identifying the source and ordinal it came from.

use crate::datum::Value;
use crate::schema::{EntityResolver, RowOrigin};

/// A single row produced by the executor.
///
/// Rows from scans carry their origin. Computed rows (projections, joins,
/// aggregates) have `origin: None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Source and ordinal of the record this row was read from.
    pub origin: Option<RowOrigin>,
    /// The column values.
    pub values: Vec<Value>,
}

impl Row {
    /// Creates a row from a source record.
    pub fn from_entity(entity: EntityResolver) -> Self {
        Self {
            origin: Some(entity.origin()),
            values: entity.into_values(),
        }
    }

    /// Creates a computed row without an origin.
    pub fn computed(values: Vec<Value>) -> Self {
        Self {
            origin: None,
            values,
        }
    }
}
