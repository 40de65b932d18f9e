//! Column resolution against the relation a clause sees.

use crate::executor::ColumnDesc;
use crate::sql::Expr;

use super::error::BindError;

/// The columns visible to an expression, plus what the binder needs to
/// rewrite grouped and windowed expressions into column references.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    columns: &'a [ColumnDesc],
    /// Alias of a PIVOT producing `columns`, for descriptive lookup errors.
    pivot_alias: Option<&'a str>,
    /// Expressions already computed by an upstream node, by output position.
    substitutions: &'a [(Expr, usize)],
    /// Columns that existed before grouping; references that resolve only
    /// here are ungrouped.
    ungrouped: Option<&'a [ColumnDesc]>,
}

impl<'a> Scope<'a> {
    /// A plain scope over `columns`.
    pub fn new(columns: &'a [ColumnDesc]) -> Self {
        Self {
            columns,
            pivot_alias: None,
            substitutions: &[],
            ungrouped: None,
        }
    }

    pub(crate) fn with_pivot(mut self, alias: Option<&'a str>) -> Self {
        self.pivot_alias = alias;
        self
    }

    pub(crate) fn with_substitutions(mut self, substitutions: &'a [(Expr, usize)]) -> Self {
        self.substitutions = substitutions;
        self
    }

    pub(crate) fn with_ungrouped(mut self, ungrouped: Option<&'a [ColumnDesc]>) -> Self {
        self.ungrouped = ungrouped;
        self
    }

    pub fn columns(&self) -> &'a [ColumnDesc] {
        self.columns
    }

    /// Returns the output position of an upstream expression equal to `expr`.
    pub(crate) fn substitution(&self, expr: &Expr) -> Option<usize> {
        let expr = expr.unnested();
        self.substitutions
            .iter()
            .find(|(e, _)| e.unnested() == expr)
            .map(|(_, i)| *i)
    }

    /// Returns true if some column belongs to a source matching `qualifier`.
    pub fn knows_qualifier(&self, qualifier: &str) -> bool {
        self.columns
            .iter()
            .any(|c| c.source.as_ref().is_some_and(|s| s.matches(qualifier)))
    }

    /// Resolves `qualifier.column` (or bare `column`) to a position.
    ///
    /// Matching is case-insensitive. A qualifier matches a source by alias or
    /// by the name it was referenced with, so `People.Name` and `p.Name`
    /// resolve identically when `People` is aliased `p`.
    pub fn resolve(&self, qualifier: Option<&str>, column: &str) -> Result<usize, BindError> {
        if let Some(index) = find(self.columns, qualifier, column)? {
            return Ok(index);
        }

        if let Some(before) = self.ungrouped
            && find(before, qualifier, column)?.is_some()
        {
            return Err(BindError::NotGrouped(match qualifier {
                Some(q) => format!("{}.{}", q, column),
                None => column.to_string(),
            }));
        }

        if let Some(pivot) = self.pivot_alias
            && qualifier.is_none_or(|q| q.eq_ignore_ascii_case(pivot))
        {
            return Err(BindError::PivotColumnNotFound {
                column: column.to_string(),
                pivot_alias: pivot.to_string(),
                available: self.columns.iter().map(ColumnDesc::display_name).collect(),
            });
        }

        if let Some(q) = qualifier
            && !self.knows_qualifier(q)
            && self.ungrouped.is_none_or(|before| {
                !before
                    .iter()
                    .any(|c| c.source.as_ref().is_some_and(|s| s.matches(q)))
            })
        {
            return Err(BindError::AliasNotFound(q.to_string()));
        }

        Err(BindError::ColumnNotFound {
            name: column.to_string(),
            qualifier: qualifier.map(str::to_string),
            available: self.columns.iter().map(ColumnDesc::display_name).collect(),
        })
    }
}

/// Finds the single column matching `qualifier.column`.
fn find(
    columns: &[ColumnDesc],
    qualifier: Option<&str>,
    column: &str,
) -> Result<Option<usize>, BindError> {
    let mut matched: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.name.eq_ignore_ascii_case(column))
        .filter(|(_, c)| match qualifier {
            Some(q) => c.source.as_ref().is_some_and(|s| s.matches(q)),
            None => true,
        })
        .map(|(i, _)| i)
        .collect();

    // An alias match beats a match on the referenced name
    if matched.len() > 1
        && let Some(q) = qualifier
    {
        let by_alias: Vec<usize> = matched
            .iter()
            .copied()
            .filter(|&i| {
                columns[i]
                    .source
                    .as_ref()
                    .is_some_and(|s| s.alias.eq_ignore_ascii_case(q))
            })
            .collect();
        if !by_alias.is_empty() {
            matched = by_alias;
        }
    }

    match matched.as_slice() {
        [] => Ok(None),
        [i] => Ok(Some(*i)),
        many => Err(BindError::AmbiguousColumn {
            name: column.to_string(),
            aliases: many.iter().map(|&i| columns[i].display_name()).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::Type;
    use crate::executor::ColumnSource;

    fn col(alias: &str, source: &str, name: &str) -> ColumnDesc {
        ColumnDesc {
            name: name.into(),
            source: Some(ColumnSource {
                alias: alias.into(),
                name: Some(source.into()),
            }),
            ty: Type::Text,
            nullable: true,
        }
    }

    fn joined() -> Vec<ColumnDesc> {
        vec![
            col("a", "Cities", "Name"),
            col("a", "Cities", "Population"),
            col("b", "Cities", "Name"),
            col("p", "People", "Email"),
        ]
    }

    #[test]
    fn test_qualified_by_alias_or_source_name() {
        let columns = joined();
        let scope = Scope::new(&columns);
        assert_eq!(scope.resolve(Some("b"), "name").unwrap(), 2);
        assert_eq!(scope.resolve(Some("People"), "Email").unwrap(), 3);
        assert_eq!(scope.resolve(None, "Email").unwrap(), 3);
        assert_eq!(scope.resolve(None, "population").unwrap(), 1);
    }

    #[test]
    fn test_ambiguity() {
        let columns = joined();
        let scope = Scope::new(&columns);
        assert_eq!(
            scope.resolve(None, "Name").unwrap_err(),
            BindError::AmbiguousColumn {
                name: "Name".into(),
                aliases: vec!["a.Name".into(), "b.Name".into()],
            }
        );
        assert!(matches!(
            scope.resolve(Some("Cities"), "Name"),
            Err(BindError::AmbiguousColumn { .. })
        ));
    }

    #[test]
    fn test_unknown_alias_and_column() {
        let columns = joined();
        let scope = Scope::new(&columns);
        assert_eq!(
            scope.resolve(Some("zz"), "Name").unwrap_err(),
            BindError::AliasNotFound("zz".into())
        );
        assert!(matches!(
            scope.resolve(Some("p"), "Phone").unwrap_err(),
            BindError::ColumnNotFound { qualifier: Some(q), .. } if q == "p"
        ));
    }

    #[test]
    fn test_pivot_and_ungrouped_errors() {
        let columns = joined();
        let grouped = vec![col("a", "Cities", "Name")];
        let scope = Scope::new(&grouped).with_ungrouped(Some(&columns));
        assert_eq!(
            scope.resolve(None, "Email").unwrap_err(),
            BindError::NotGrouped("Email".into())
        );

        let pivoted = Scope::new(&grouped).with_pivot(Some("pv"));
        assert!(matches!(
            pivoted.resolve(None, "kiwi").unwrap_err(),
            BindError::PivotColumnNotFound { pivot_alias, .. } if pivot_alias == "pv"
        ));
    }
}
