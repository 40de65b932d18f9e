//! FROM clause binding: sources, derived tables, joins, cross apply, pivot.

use std::collections::HashSet;
use std::sync::Arc;

use crate::alias::create_alias_if_empty;
use crate::datum::Type;
use crate::executor::{
    AggregateFunction, BoundExpr, ColumnDesc, ColumnSource, JoinSpec, ParamType, PivotOp,
    QueryPlan, ScanSource,
};
use crate::schema::{ColumnDescriptor, Schema, TableMethod};
use crate::sql::{Expr, FromClause, JoinType, Pivot, TableRef};

use super::Binder;
use super::error::BindError;
use super::expr::ExprBinder;
use super::functions::conversion_cost;
use super::metadata::AliasBinding;
use super::scope::Scope;

/// A bound FROM clause.
pub(super) struct BoundFrom {
    pub plan: QueryPlan,
    /// Alias of the PIVOT that produced `plan`, if any.
    pub pivot_alias: Option<String>,
}

impl Binder<'_> {
    pub(super) fn bind_from(&mut self, from: &FromClause) -> Result<BoundFrom, BindError> {
        let mut local = HashSet::new();
        let plan = self.bind_table_ref(&from.source, &mut local)?;
        match &from.pivot {
            None => Ok(BoundFrom {
                plan,
                pivot_alias: None,
            }),
            Some(pivot) => {
                let (plan, alias) = self.bind_pivot(plan, pivot, &mut local)?;
                Ok(BoundFrom {
                    plan,
                    pivot_alias: Some(alias),
                })
            }
        }
    }

    fn bind_table_ref(
        &mut self,
        table: &TableRef,
        local: &mut HashSet<String>,
    ) -> Result<QueryPlan, BindError> {
        match table {
            TableRef::Source { name, args, alias } => {
                self.bind_source(name, args.as_deref(), alias.as_deref(), local)
            }

            TableRef::Subquery { query, alias } => {
                let input = self.bind_query(query)?;
                let alias = self.register_alias(alias, "subquery", local)?;
                let columns: Vec<ColumnDesc> = input
                    .columns()
                    .iter()
                    .map(|c| ColumnDesc {
                        name: c.name.clone(),
                        source: Some(ColumnSource {
                            alias: alias.clone(),
                            name: None,
                        }),
                        ty: c.ty,
                        nullable: c.nullable,
                    })
                    .collect();
                self.record_alias(&alias, "(subquery)", &columns);
                Ok(QueryPlan::Rename {
                    input: Box::new(input),
                    alias,
                    columns,
                })
            }

            TableRef::Join {
                left,
                join_type,
                right,
                condition,
            } => {
                let left = self.bind_table_ref(left, local)?;
                let right = self.bind_table_ref(right, local)?;
                self.bind_join(left, *join_type, right, condition.as_ref())
            }

            TableRef::CrossApply { left, call, alias } => {
                let left = self.bind_table_ref(left, local)?;
                self.bind_cross_apply(left, call, alias, local)
            }
        }
    }

    fn bind_source(
        &mut self,
        name: &[String],
        args: Option<&[Expr]>,
        alias: Option<&str>,
        local: &mut HashSet<String>,
    ) -> Result<QueryPlan, BindError> {
        let joined = name.join(".");

        if let [single] = name
            && args.is_none()
            && let Some((depth, cte)) = self.find_cte(single)
        {
            let input = self.bind_cte(depth, cte)?;
            let alias = self.register_alias(alias.unwrap_or(""), single, local)?;
            let columns: Vec<ColumnDesc> = input
                .columns()
                .iter()
                .map(|c| ColumnDesc {
                    name: c.name.clone(),
                    source: Some(ColumnSource {
                        alias: alias.clone(),
                        name: Some(single.clone()),
                    }),
                    ty: c.ty,
                    nullable: c.nullable,
                })
                .collect();
            self.record_alias(&alias, single, &columns);
            return Ok(QueryPlan::Rename {
                input: Box::new(input),
                alias,
                columns,
            });
        }

        match name {
            [schema_name] => {
                if args.is_some() {
                    return Err(BindError::Unsupported(format!(
                        "\"{}\" is a source, not a method",
                        schema_name
                    )));
                }
                let schema = self
                    .provider
                    .resolve(schema_name)
                    .ok_or_else(|| BindError::SourceNotFound(schema_name.clone()))?;
                let alias = self.register_alias(alias.unwrap_or(""), schema_name, local)?;
                let columns = source_columns(schema.columns(), &alias, schema_name);
                self.record_alias(&alias, schema.name(), &columns);
                self.alias_schemas
                    .insert(alias.to_ascii_lowercase(), schema.clone());
                Ok(QueryPlan::Scan {
                    alias,
                    source_id: self.next_source_id(),
                    source: ScanSource::Table(schema),
                    columns,
                })
            }

            [schema_name, method_name] => {
                let schema = self
                    .provider
                    .resolve(schema_name)
                    .ok_or_else(|| BindError::SourceNotFound(schema_name.clone()))?;
                let (method, args) = self.bind_method_args(
                    Scope::new(&[]),
                    schema.as_ref(),
                    method_name,
                    args.unwrap_or_default(),
                )?;
                let alias = self.register_alias(alias.unwrap_or(""), &joined, local)?;
                let columns = source_columns(&method.columns, &alias, &method.name);
                self.record_alias(&alias, &format!("{}.{}", schema.name(), method.name), &columns);
                Ok(QueryPlan::Scan {
                    alias,
                    source_id: self.next_source_id(),
                    source: ScanSource::Method {
                        schema,
                        method: method.name,
                        args,
                    },
                    columns,
                })
            }

            _ => Err(BindError::SourceNotFound(joined)),
        }
    }

    fn bind_join(
        &mut self,
        left: QueryPlan,
        kind: JoinType,
        right: QueryPlan,
        condition: Option<&Expr>,
    ) -> Result<QueryPlan, BindError> {
        let left_nullable = matches!(kind, JoinType::Right | JoinType::Full);
        let right_nullable = matches!(kind, JoinType::Left | JoinType::Full);
        let widen = |c: &ColumnDesc, nullable: bool| ColumnDesc {
            nullable: c.nullable || nullable,
            ..c.clone()
        };
        let columns: Vec<ColumnDesc> = left
            .columns()
            .iter()
            .map(|c| widen(c, left_nullable))
            .chain(right.columns().iter().map(|c| widen(c, right_nullable)))
            .collect();

        // The condition sees the columns before null-extension
        let scope_columns: Vec<ColumnDesc> = left
            .columns()
            .iter()
            .chain(right.columns())
            .cloned()
            .collect();
        let condition = match (kind, condition) {
            (JoinType::Cross, _) | (_, None) => None,
            (_, Some(cond)) => Some(
                ExprBinder::new(
                    Scope::new(&scope_columns),
                    self.functions,
                    &mut self.metadata,
                    "ON",
                )
                .bind_predicate(cond)?,
            ),
        };

        let spec = JoinSpec::analyze(
            kind,
            condition,
            left.columns().len(),
            right.columns().len(),
        );
        Ok(QueryPlan::Join {
            left: Box::new(left),
            right: Box::new(right),
            spec,
            columns,
        })
    }

    fn bind_cross_apply(
        &mut self,
        input: QueryPlan,
        call: &Expr,
        alias: &str,
        local: &mut HashSet<String>,
    ) -> Result<QueryPlan, BindError> {
        let Expr::Function {
            qualifier: Some(qualifier),
            name,
            args,
            ..
        } = call.unnested()
        else {
            return Err(BindError::Unsupported(format!(
                "CROSS APPLY expects a table-valued method call, found {}",
                call
            )));
        };

        let schema = match self.alias_schemas.get(&qualifier.to_ascii_lowercase()) {
            Some(schema) => schema.clone(),
            None => self
                .provider
                .resolve(qualifier)
                .ok_or_else(|| BindError::AliasNotFound(qualifier.clone()))?,
        };

        let outer = input.columns().to_vec();
        let (method, args) =
            self.bind_method_args(Scope::new(&outer), schema.as_ref(), name, args)?;
        let alias = self.register_alias(alias, name, local)?;
        let inner = source_columns(&method.columns, &alias, &method.name);
        self.record_alias(&alias, &format!("{}.{}", schema.name(), method.name), &inner);

        let columns = outer.into_iter().chain(inner).collect();
        Ok(QueryPlan::CrossApply {
            input: Box::new(input),
            schema,
            method: method.name,
            args,
            alias,
            source_id: self.next_source_id(),
            columns,
        })
    }

    /// Binds the arguments of a table-valued method call and converts them to
    /// the declared parameter types.
    fn bind_method_args(
        &mut self,
        scope: Scope<'_>,
        schema: &dyn Schema,
        method_name: &str,
        args: &[Expr],
    ) -> Result<(TableMethod, Vec<BoundExpr>), BindError> {
        let mut binder = ExprBinder::new(scope, self.functions, &mut self.metadata, "FROM");
        let bound = args
            .iter()
            .map(|a| binder.bind(a))
            .collect::<Result<Vec<_>, _>>()?;
        let arg_types: Vec<Type> = bound.iter().map(BoundExpr::ty).collect();

        let accepted = schema.method(method_name).filter(|m| {
            m.params.len() == arg_types.len()
                && m
                    .params
                    .iter()
                    .zip(&arg_types)
                    .all(|(p, a)| conversion_cost(*a, ParamType::Exact(*p)).is_some())
        });
        let Some(method) = accepted else {
            return Err(BindError::MethodNotResolvable {
                name: format!("{}.{}", schema.name(), method_name),
                arg_types,
                candidates: schema.methods().iter().map(describe_method).collect(),
            });
        };

        let args = bound
            .into_iter()
            .zip(&method.params)
            .map(|(arg, ty)| arg.coerce(*ty))
            .collect();
        Ok((method.clone(), args))
    }

    /// Binds a PIVOT over `input`. Returns the plan and the pivot's alias.
    fn bind_pivot(
        &mut self,
        input: QueryPlan,
        pivot: &Pivot,
        local: &mut HashSet<String>,
    ) -> Result<(QueryPlan, String), BindError> {
        let input_columns = input.columns().to_vec();
        let scope = Scope::new(&input_columns);

        let aggregate = self.bind_aggregate(scope, &pivot.aggregate, "PIVOT")?;
        let for_expr = ExprBinder::new(scope, self.functions, &mut self.metadata, "PIVOT")
            .bind(&pivot.for_column)?;

        let mut values = Vec::with_capacity(pivot.values.len());
        for value in &pivot.values {
            let bound = ExprBinder::new(Scope::new(&[]), self.functions, &mut self.metadata, "PIVOT")
                .bind(value)?
                .coerce(for_expr.ty());
            let value = bound.evaluate(&[]).map_err(|e| {
                BindError::mismatch(
                    format!("PIVOT value {} ({})", value, e),
                    for_expr.ty().display_name(),
                    bound.ty(),
                )
            })?;
            values.push(value);
        }

        let mut consumed = for_expr.column_indices();
        for arg in &aggregate.args {
            consumed.extend(arg.column_indices());
        }
        let group_columns: Vec<usize> = (0..input_columns.len())
            .filter(|i| !consumed.contains(i))
            .collect();

        let alias = self.register_alias(pivot.alias.as_deref().unwrap_or(""), "pivot", local)?;
        let value_ty = aggregate.output_type();
        let value_nullable = aggregate.func != AggregateFunction::Count;
        let columns: Vec<ColumnDesc> = group_columns
            .iter()
            .map(|&i| input_columns[i].requalified(&alias))
            .chain(values.iter().map(|v| ColumnDesc {
                name: v.to_text(),
                source: Some(ColumnSource {
                    alias: alias.clone(),
                    name: None,
                }),
                ty: value_ty,
                nullable: value_nullable,
            }))
            .collect();
        self.record_alias(&alias, "(pivot)", &columns);

        Ok((
            QueryPlan::Pivot {
                input: Box::new(input),
                pivot: PivotOp {
                    aggregate,
                    for_expr,
                    values,
                    group_columns,
                },
                columns,
            },
            alias,
        ))
    }

    /// Picks the alias for a source and claims it in the current FROM clause.
    fn register_alias(
        &mut self,
        given: &str,
        seed: &str,
        local: &mut HashSet<String>,
    ) -> Result<String, BindError> {
        let alias = create_alias_if_empty(given, &self.used_aliases, seed);
        if !local.insert(alias.to_ascii_lowercase()) {
            return Err(BindError::DuplicateAlias(alias));
        }
        self.used_aliases.insert(alias.clone());
        Ok(alias)
    }

    fn record_alias(&mut self, alias: &str, source: &str, columns: &[ColumnDesc]) {
        self.metadata.add_alias(AliasBinding {
            alias: alias.to_string(),
            source: source.to_string(),
            columns: columns.iter().map(|c| (c.name.clone(), c.ty)).collect(),
        });
    }
}

/// Column descriptors of a schema or method, in row order, under `alias`.
fn source_columns(descriptors: &[ColumnDescriptor], alias: &str, name: &str) -> Vec<ColumnDesc> {
    let mut ordered: Vec<&ColumnDescriptor> = descriptors.iter().collect();
    ordered.sort_by_key(|d| d.index);
    ordered
        .into_iter()
        .map(|d| ColumnDesc {
            name: d.name.clone(),
            source: Some(ColumnSource {
                alias: alias.to_string(),
                name: Some(name.to_string()),
            }),
            ty: d.ty,
            nullable: d.nullable,
        })
        .collect()
}

fn describe_method(method: &TableMethod) -> String {
    let params: Vec<&str> = method.params.iter().map(|p| p.display_name()).collect();
    format!("{}({})", method.name, params.join(", "))
}
