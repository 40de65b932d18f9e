//! Abstract Syntax Tree (AST) for queries.
//!
//! This module defines the data structures produced by the parser and
//! consumed by the binder. Every node derives `Clone`, which is a full
//! structural copy: common table expressions rely on it to hand each
//! reference an independent subtree. The canonical text form of every node
//! lives in [`super::display`].

use crate::datum::Type;

/// A complete query: optional `WITH` definitions followed by a SELECT.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Common table expressions, in definition order.
    pub with: Vec<Cte>,
    /// The main SELECT.
    pub body: SelectStmt,
}

/// A common table expression (`name AS (query)`).
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    /// Name the CTE is referenced by.
    pub name: String,
    /// Defining query.
    pub query: Box<Query>,
}

/// SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStmt {
    /// Whether to select distinct rows only.
    pub distinct: bool,
    /// Selected columns/expressions.
    pub columns: Vec<SelectItem>,
    /// FROM clause.
    pub from: Option<FromClause>,
    /// WHERE clause.
    pub where_clause: Option<Expr>,
    /// GROUP BY expressions.
    pub group_by: Vec<Expr>,
    /// HAVING clause.
    pub having: Option<Expr>,
    /// ORDER BY clause.
    pub order_by: Vec<OrderByItem>,
    /// LIMIT clause.
    pub limit: Option<u64>,
    /// OFFSET clause.
    pub offset: Option<u64>,
}

/// An item in the SELECT list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// SELECT * - all columns.
    Wildcard,
    /// SELECT alias.* - all columns from one source.
    QualifiedWildcard(String),
    /// An expression with optional alias.
    Expr { expr: Expr, alias: Option<String> },
}

/// FROM clause: a source tree plus an optional PIVOT applied to it.
#[derive(Debug, Clone, PartialEq)]
pub struct FromClause {
    /// Root of the source tree (joins and cross applies nest to the left).
    pub source: TableRef,
    /// PIVOT applied to the joined source.
    pub pivot: Option<Pivot>,
}

/// A source reference in the FROM clause.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    /// A provider source or CTE reference: `name`, `schema.method`, or
    /// `schema.method(args)`.
    Source {
        /// Dotted name parts.
        name: Vec<String>,
        /// Table-valued method arguments, if the reference was called.
        args: Option<Vec<Expr>>,
        /// Explicit alias.
        alias: Option<String>,
    },
    /// Derived table: `(query) alias`.
    Subquery { query: Box<Query>, alias: String },
    /// Join between sources.
    Join {
        left: Box<TableRef>,
        join_type: JoinType,
        right: Box<TableRef>,
        condition: Option<Expr>,
    },
    /// Per-row invocation of a table-valued method: `left CROSS APPLY call alias`.
    CrossApply {
        left: Box<TableRef>,
        call: Expr,
        alias: String,
    },
}

/// Type of JOIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    /// INNER JOIN.
    Inner,
    /// LEFT [OUTER] JOIN.
    Left,
    /// RIGHT [OUTER] JOIN.
    Right,
    /// FULL [OUTER] JOIN.
    Full,
    /// CROSS JOIN.
    Cross,
}

impl JoinType {
    /// Returns the canonical keyword sequence (e.g., `"LEFT JOIN"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL JOIN",
            JoinType::Cross => "CROSS JOIN",
        }
    }
}

/// `PIVOT (aggregate FOR column IN (values)) AS alias`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pivot {
    /// Aggregate call computed per cell.
    pub aggregate: Expr,
    /// Categorical column whose values become output columns.
    pub for_column: Expr,
    /// Listed pivot values, one output column each.
    pub values: Vec<Expr>,
    /// Alias of the pivoted relation.
    pub alias: Option<String>,
}

/// ORDER BY item.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    /// Expression to order by.
    pub expr: Expr,
    /// Explicit sort direction; `None` sorts ascending.
    pub direction: Option<SortDirection>,
    /// NULL ordering.
    pub nulls: NullOrdering,
}

impl OrderByItem {
    /// Returns true when the item sorts descending.
    pub fn is_descending(&self) -> bool {
        matches!(self.direction, Some(SortDirection::Desc))
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

/// NULL ordering in ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullOrdering {
    /// NULLS FIRST.
    First,
    /// NULLS LAST.
    Last,
    /// Default: NULLS LAST for ASC, NULLS FIRST for DESC.
    #[default]
    Default,
}

/// `OVER (PARTITION BY ... ORDER BY ...)`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowSpec {
    /// Partition key expressions.
    pub partition_by: Vec<Expr>,
    /// Ordering within each partition.
    pub order_by: Vec<OrderByItem>,
}

/// Expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// NULL literal.
    Null,
    /// Boolean literal.
    Boolean(bool),
    /// Integer literal.
    Integer(i64),
    /// Float literal.
    Float(f64),
    /// String literal.
    String(String),
    /// Column reference (optionally qualified with a source alias).
    ColumnRef {
        table: Option<String>,
        column: String,
    },
    /// Character indexing: `expr[index]`.
    Index { expr: Box<Expr>, index: Box<Expr> },
    /// Parenthesized expression, kept so the canonical text round-trips.
    Nested(Box<Expr>),
    /// Binary operation.
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    /// Unary operation.
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    /// IS NULL / IS NOT NULL.
    IsNull { expr: Box<Expr>, negated: bool },
    /// IN list: expr [NOT] IN (value1, value2, ...).
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// BETWEEN: expr [NOT] BETWEEN low AND high.
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    /// LIKE: expr [NOT] LIKE pattern.
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    /// CASE expression.
    Case {
        operand: Option<Box<Expr>>,
        when_clauses: Vec<WhenClause>,
        else_result: Option<Box<Expr>>,
    },
    /// Type cast: CAST(expr AS type).
    Cast { expr: Box<Expr>, data_type: Type },
    /// Function or method call. `qualifier` is set for `alias.Method(...)`.
    Function {
        qualifier: Option<String>,
        name: String,
        args: Vec<Expr>,
        distinct: bool,
        /// `Count(*)`.
        star: bool,
        over: Option<WindowSpec>,
    },
}

impl Expr {
    /// Shorthand for an unqualified column reference.
    pub fn column(name: impl Into<String>) -> Self {
        Expr::ColumnRef {
            table: None,
            column: name.into(),
        }
    }

    /// Strips any number of enclosing parentheses.
    pub fn unnested(&self) -> &Expr {
        let mut expr = self;
        while let Expr::Nested(inner) = expr {
            expr = inner;
        }
        expr
    }

    /// Returns true if this expression contains a call with an OVER clause.
    pub fn contains_window(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if let Expr::Function { over: Some(_), .. } = e {
                found = true;
            }
        });
        found
    }

    /// Visits this expression and every sub-expression in pre-order.
    pub fn walk(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Null
            | Expr::Boolean(_)
            | Expr::Integer(_)
            | Expr::Float(_)
            | Expr::String(_)
            | Expr::ColumnRef { .. } => {}
            Expr::Index { expr, index } => {
                expr.walk(f);
                index.walk(f);
            }
            Expr::Nested(inner) => inner.walk(f),
            Expr::BinaryOp { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            Expr::UnaryOp { operand, .. } => operand.walk(f),
            Expr::IsNull { expr, .. } => expr.walk(f),
            Expr::InList { expr, list, .. } => {
                expr.walk(f);
                list.iter().for_each(|e| e.walk(f));
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                expr.walk(f);
                low.walk(f);
                high.walk(f);
            }
            Expr::Like { expr, pattern, .. } => {
                expr.walk(f);
                pattern.walk(f);
            }
            Expr::Case {
                operand,
                when_clauses,
                else_result,
            } => {
                if let Some(op) = operand {
                    op.walk(f);
                }
                for clause in when_clauses {
                    clause.condition.walk(f);
                    clause.result.walk(f);
                }
                if let Some(e) = else_result {
                    e.walk(f);
                }
            }
            Expr::Cast { expr, .. } => expr.walk(f),
            Expr::Function { args, over, .. } => {
                args.iter().for_each(|e| e.walk(f));
                if let Some(spec) = over {
                    spec.partition_by.iter().for_each(|e| e.walk(f));
                    spec.order_by.iter().for_each(|o| o.expr.walk(f));
                }
            }
        }
    }
}

/// A WHEN clause in a CASE expression.
#[derive(Debug, Clone, PartialEq)]
pub struct WhenClause {
    /// The condition (or value to match in simple CASE).
    pub condition: Expr,
    /// The result if condition is true.
    pub result: Expr,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    // Arithmetic
    /// +
    Add,
    /// -
    Sub,
    /// *
    Mul,
    /// /
    Div,
    /// %
    Mod,

    // Comparison
    /// =
    Eq,
    /// <> or !=
    Neq,
    /// <
    Lt,
    /// <=
    LtEq,
    /// >
    Gt,
    /// >=
    GtEq,

    // Logical
    /// AND
    And,
    /// OR
    Or,

    // String
    /// || (concatenation)
    Concat,
}

impl BinaryOperator {
    /// Returns the display string for this operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Eq => "=",
            BinaryOperator::Neq => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Concat => "||",
        }
    }

    /// Returns true for `=`, `<>`, `<`, `<=`, `>`, `>=`.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Neq
                | BinaryOperator::Lt
                | BinaryOperator::LtEq
                | BinaryOperator::Gt
                | BinaryOperator::GtEq
        )
    }

    /// Returns the operator with its operands swapped (`a < b` is `b > a`).
    pub fn flipped(&self) -> BinaryOperator {
        match self {
            BinaryOperator::Lt => BinaryOperator::Gt,
            BinaryOperator::LtEq => BinaryOperator::GtEq,
            BinaryOperator::Gt => BinaryOperator::Lt,
            BinaryOperator::GtEq => BinaryOperator::LtEq,
            other => *other,
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// NOT
    Not,
    /// - (negation)
    Minus,
    /// + (positive, no-op)
    Plus,
}

impl UnaryOperator {
    /// Returns the display string for this operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOperator::Not => "NOT",
            UnaryOperator::Minus => "-",
            UnaryOperator::Plus => "+",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_operator_str() {
        assert_eq!(BinaryOperator::Add.as_str(), "+");
        assert_eq!(BinaryOperator::And.as_str(), "AND");
        assert_eq!(BinaryOperator::Neq.as_str(), "<>");
    }

    #[test]
    fn test_flipped_comparison() {
        assert_eq!(BinaryOperator::Gt.flipped(), BinaryOperator::Lt);
        assert_eq!(BinaryOperator::LtEq.flipped(), BinaryOperator::GtEq);
        assert_eq!(BinaryOperator::Eq.flipped(), BinaryOperator::Eq);
    }

    #[test]
    fn test_unnested() {
        let expr = Expr::Nested(Box::new(Expr::Nested(Box::new(Expr::Integer(1)))));
        assert_eq!(expr.unnested(), &Expr::Integer(1));
    }

    #[test]
    fn test_contains_window() {
        let plain = Expr::Function {
            qualifier: None,
            name: "Sum".into(),
            args: vec![Expr::column("x")],
            distinct: false,
            star: false,
            over: None,
        };
        assert!(!plain.contains_window());

        let windowed = Expr::BinaryOp {
            left: Box::new(Expr::Function {
                qualifier: None,
                name: "Rank".into(),
                args: vec![],
                distinct: false,
                star: false,
                over: Some(WindowSpec::default()),
            }),
            op: BinaryOperator::Add,
            right: Box::new(Expr::Integer(1)),
        };
        assert!(windowed.contains_window());
    }
}
