//! Source rows with their origin.

use std::collections::HashMap;
use std::sync::Arc;

use crate::datum::Value;

/// Identifies where a row came from: the source it was read from and its
/// ordinal within that source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowOrigin {
    /// Identifier of the bound source (unique within one execution).
    pub source_id: usize,
    /// Zero-based ordinal of the row within its source.
    pub row_index: usize,
}

/// One raw source record, addressable by column position or name.
///
/// All resolvers produced by one source share the same name-to-index map,
/// so name lookups are consistent with positional access.
#[derive(Debug, Clone)]
pub struct EntityResolver {
    origin: RowOrigin,
    values: Vec<Value>,
    names: Arc<HashMap<String, usize>>,
}

impl EntityResolver {
    /// Wraps a raw record.
    pub fn new(origin: RowOrigin, values: Vec<Value>, names: Arc<HashMap<String, usize>>) -> Self {
        Self {
            origin,
            values,
            names,
        }
    }

    /// Builds the shared name map for a source's column names.
    ///
    /// Names are stored lower-cased; lookups through
    /// [`get_by_name`](Self::get_by_name) are case-insensitive.
    pub fn name_map<'a>(names: impl IntoIterator<Item = &'a str>) -> Arc<HashMap<String, usize>> {
        let mut map = HashMap::new();
        for (i, name) in names.into_iter().enumerate() {
            map.entry(name.to_ascii_lowercase()).or_insert(i);
        }
        Arc::new(map)
    }

    /// Returns where this record came from.
    pub fn origin(&self) -> RowOrigin {
        self.origin
    }

    /// Returns the value at `index`.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns the value of the column named `name`.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        let index = *self.names.get(&name.to_ascii_lowercase())?;
        self.values.get(index)
    }

    /// Number of values in the record.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the record has no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consumes the resolver, returning the raw values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_and_index_access_agree() {
        let names = EntityResolver::name_map(["Name", "Population"]);
        let origin = RowOrigin {
            source_id: 3,
            row_index: 7,
        };
        let row = EntityResolver::new(
            origin,
            vec![Value::from("Oslo"), Value::Bigint(700_000)],
            names,
        );

        assert_eq!(row.get(0), row.get_by_name("name"));
        assert_eq!(row.get(1), row.get_by_name("POPULATION"));
        assert_eq!(row.get_by_name("Missing"), None);
        assert_eq!(row.get(2), None);
        assert_eq!(row.origin(), origin);
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_duplicate_names_resolve_to_first() {
        let names = EntityResolver::name_map(["Id", "id"]);
        assert_eq!(names.get("id"), Some(&0));
    }
}
