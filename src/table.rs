//! Materialized query results.

use std::fmt;

use crate::datum::{Type, Value};

/// A named, typed output column.
#[derive(Debug, Clone, PartialEq)]
pub struct TableColumn {
    /// Column name as it appears in the result.
    pub name: String,
    /// Resolved column type.
    pub ty: Type,
    /// Whether the column may contain NULL.
    pub nullable: bool,
}

/// The result of running a query: ordered columns and ordered rows.
///
/// A table is built once after execution finishes and is immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<TableColumn>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Creates a table. Every row must have one value per column.
    pub fn new(columns: Vec<TableColumn>, rows: Vec<Vec<Value>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == columns.len()));
        Self { columns, rows }
    }

    /// Output columns in order.
    pub fn columns(&self) -> &[TableColumn] {
        &self.columns
    }

    /// Result rows in order.
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the first column named `name` (case-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Value at (`row`, column `name`).
    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let index = self.column_index(name)?;
        self.rows.get(row)?.get(index)
    }

    /// All values of column `name`, top to bottom.
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[index]).collect())
    }

    /// Consumes the table, returning its rows.
    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        writeln!(f, "{}", names.join(" | "))?;
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|v| v.to_text()).collect();
            writeln!(f, "{}", cells.join(" | "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new(
            vec![
                TableColumn {
                    name: "Name".into(),
                    ty: Type::Text,
                    nullable: false,
                },
                TableColumn {
                    name: "Population".into(),
                    ty: Type::Bigint,
                    nullable: true,
                },
            ],
            vec![
                vec![Value::from("A1"), Value::Bigint(100)],
                vec![Value::from("A2"), Value::Null],
            ],
        )
    }

    #[test]
    fn test_lookup_by_name() {
        let table = sample();
        assert_eq!(table.len(), 2);
        assert_eq!(table.column_index("population"), Some(1));
        assert_eq!(table.get(0, "NAME"), Some(&Value::from("A1")));
        assert_eq!(table.get(1, "Population"), Some(&Value::Null));
        assert_eq!(table.get(2, "Name"), None);
        assert_eq!(table.get(0, "Missing"), None);
    }

    #[test]
    fn test_column_values() {
        let table = sample();
        let names = table.column_values("name").unwrap();
        assert_eq!(names, vec![&Value::from("A1"), &Value::from("A2")]);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            sample().to_string(),
            "Name | Population\nA1 | 100\nA2 | \n"
        );
    }
}
