//! Column metadata types used by plan and executor nodes.
//!
//! A [`ColumnDesc`] describes one column of a relation flowing between plan
//! nodes (name, type, nullability, and where it came from via
//! [`ColumnSource`]). Qualified references such as `alias.Name` are resolved
//! against these descriptors.

use crate::datum::Type;

/// The FROM-clause source a column belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSource {
    /// Alias the source is bound to in its scope.
    pub alias: String,
    /// Name the source was referenced by (schema, CTE, or the alias the
    /// relation had before it was renamed). `None` for derived relations.
    pub name: Option<String>,
}

impl ColumnSource {
    /// Returns true if `qualifier` names this source, either by alias or by
    /// source name.
    pub fn matches(&self, qualifier: &str) -> bool {
        self.alias.eq_ignore_ascii_case(qualifier)
            || self
                .name
                .as_deref()
                .is_some_and(|n| n.eq_ignore_ascii_case(qualifier))
    }
}

/// Metadata describing a column of an intermediate or final relation.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDesc {
    /// Column name (or alias).
    pub name: String,
    /// Source info. `None` for computed/expression columns.
    pub source: Option<ColumnSource>,
    /// Type.
    pub ty: Type,
    /// Whether the column may hold NULL.
    pub nullable: bool,
}

impl ColumnDesc {
    /// Creates a computed column with no source.
    pub fn computed(name: impl Into<String>, ty: Type, nullable: bool) -> Self {
        Self {
            name: name.into(),
            source: None,
            ty,
            nullable,
        }
    }

    /// Returns the display name for this column.
    ///
    /// If the column has a source, returns `alias.column`, otherwise returns
    /// just the column name.
    pub fn display_name(&self) -> String {
        match &self.source {
            Some(s) => format!("{}.{}", s.alias, self.name),
            None => self.name.clone(),
        }
    }

    /// Returns this column re-homed under `alias`, remembering the previous
    /// alias as the source name so old qualifiers keep resolving.
    pub fn requalified(&self, alias: &str) -> Self {
        let name = self.source.as_ref().map(|s| s.alias.clone());
        Self {
            name: self.name.clone(),
            source: Some(ColumnSource {
                alias: alias.to_string(),
                name,
            }),
            ty: self.ty,
            nullable: self.nullable,
        }
    }
}
