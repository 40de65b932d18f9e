//! Symbol table produced by binding.
//!
//! Built once per compilation and read-only afterwards.

use std::collections::HashMap;

use crate::datum::Type;
use crate::executor::{ColumnDesc, Signature};

/// One bound FROM-clause source.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasBinding {
    /// Alias the source is addressed by (given or synthesized).
    pub alias: String,
    /// What the alias is bound to: a schema name, `schema.Method`, a CTE
    /// name, or `(subquery)`.
    pub source: String,
    /// Columns the source contributes.
    pub columns: Vec<(String, Type)>,
}

/// A call site and the overload chosen for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCall {
    /// Canonical text of the call.
    pub call: String,
    pub signature: Signature,
}

/// Alias, type and method-resolution tables for one compiled query.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    aliases: Vec<AliasBinding>,
    output: Vec<ColumnDesc>,
    calls: Vec<ResolvedCall>,
    types: HashMap<String, Type>,
}

impl Metadata {
    /// Every source bound during compilation, in binding order. CTE bodies
    /// appear once per reference.
    pub fn aliases(&self) -> &[AliasBinding] {
        &self.aliases
    }

    /// Looks up a binding by alias (case-insensitive). With repeated aliases
    /// across nested scopes, the first bound wins.
    pub fn alias(&self, alias: &str) -> Option<&AliasBinding> {
        self.aliases
            .iter()
            .find(|b| b.alias.eq_ignore_ascii_case(alias))
    }

    /// Columns of the final result.
    pub fn output_columns(&self) -> &[ColumnDesc] {
        &self.output
    }

    /// Scalar calls and the overloads they resolved to.
    pub fn resolved_calls(&self) -> &[ResolvedCall] {
        &self.calls
    }

    /// Inferred type of an expression, keyed by its canonical text.
    pub fn type_of(&self, expr: &str) -> Option<Type> {
        self.types.get(expr).copied()
    }

    pub(crate) fn add_alias(&mut self, binding: AliasBinding) {
        self.aliases.push(binding);
    }

    pub(crate) fn set_output(&mut self, columns: Vec<ColumnDesc>) {
        self.output = columns;
    }

    pub(crate) fn add_call(&mut self, call: String, signature: Signature) {
        if !self.calls.iter().any(|c| c.call == call) {
            self.calls.push(ResolvedCall { call, signature });
        }
    }

    pub(crate) fn record_type(&mut self, expr: String, ty: Type) {
        self.types.insert(expr, ty);
    }
}
