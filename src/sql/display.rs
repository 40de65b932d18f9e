//! Canonical text form of the AST.
//!
//! Keywords are upper-case, tokens are separated by single spaces, and
//! parentheses appear only where the input had them ([`Expr::Nested`]), so
//! parsing a canonical string and printing it again yields the same bytes.

use std::fmt;

use super::ast::*;
use super::token::Keyword;

/// Writes an identifier, double-quoting it when it would not lex back as a
/// plain identifier.
struct Ident<'a>(&'a str);

impl fmt::Display for Ident<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.0;
        let mut chars = name.chars();
        let plain = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            && Keyword::parse(name).is_none();
        if plain {
            write!(f, "{}", name)
        } else {
            write!(f, "\"{}\"", name.replace('"', "\"\""))
        }
    }
}

fn comma_separated<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.with.is_empty() {
            write!(f, "WITH ")?;
            comma_separated(f, &self.with)?;
            write!(f, " ")?;
        }
        write!(f, "{}", self.body)
    }
}

impl fmt::Display for Cte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} AS ({})", Ident(&self.name), self.query)
    }
}

impl fmt::Display for SelectStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        comma_separated(f, &self.columns)?;
        if let Some(from) = &self.from {
            write!(f, " FROM {}", from)?;
        }
        if let Some(cond) = &self.where_clause {
            write!(f, " WHERE {}", cond)?;
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY ")?;
            comma_separated(f, &self.group_by)?;
        }
        if let Some(cond) = &self.having {
            write!(f, " HAVING {}", cond)?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY ")?;
            comma_separated(f, &self.order_by)?;
        }
        if let Some(n) = self.limit {
            write!(f, " LIMIT {}", n)?;
        }
        if let Some(n) = self.offset {
            write!(f, " OFFSET {}", n)?;
        }
        Ok(())
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectItem::Wildcard => write!(f, "*"),
            SelectItem::QualifiedWildcard(alias) => write!(f, "{}.*", Ident(alias)),
            SelectItem::Expr { expr, alias: None } => write!(f, "{}", expr),
            SelectItem::Expr {
                expr,
                alias: Some(alias),
            } => write!(f, "{} AS {}", expr, Ident(alias)),
        }
    }
}

impl fmt::Display for FromClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)?;
        if let Some(pivot) = &self.pivot {
            write!(f, " {}", pivot)?;
        }
        Ok(())
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableRef::Source { name, args, alias } => {
                for (i, part) in name.iter().enumerate() {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", Ident(part))?;
                }
                if let Some(args) = args {
                    write!(f, "(")?;
                    comma_separated(f, args)?;
                    write!(f, ")")?;
                }
                if let Some(alias) = alias {
                    write!(f, " {}", Ident(alias))?;
                }
                Ok(())
            }
            TableRef::Subquery { query, alias } => write!(f, "({}) {}", query, Ident(alias)),
            TableRef::Join {
                left,
                join_type,
                right,
                condition,
            } => {
                write!(f, "{} {} {}", left, join_type.as_str(), right)?;
                if let Some(cond) = condition {
                    write!(f, " ON {}", cond)?;
                }
                Ok(())
            }
            TableRef::CrossApply { left, call, alias } => {
                write!(f, "{} CROSS APPLY {} {}", left, call, Ident(alias))
            }
        }
    }
}

impl fmt::Display for Pivot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PIVOT ({} FOR {} IN (", self.aggregate, self.for_column)?;
        comma_separated(f, &self.values)?;
        write!(f, "))")?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {}", Ident(alias))?;
        }
        Ok(())
    }
}

impl fmt::Display for OrderByItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        match self.direction {
            Some(SortDirection::Asc) => write!(f, " ASC")?,
            Some(SortDirection::Desc) => write!(f, " DESC")?,
            None => {}
        }
        match self.nulls {
            NullOrdering::First => write!(f, " NULLS FIRST"),
            NullOrdering::Last => write!(f, " NULLS LAST"),
            NullOrdering::Default => Ok(()),
        }
    }
}

impl fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        if !self.partition_by.is_empty() {
            write!(f, "PARTITION BY ")?;
            comma_separated(f, &self.partition_by)?;
        }
        if !self.order_by.is_empty() {
            if !self.partition_by.is_empty() {
                write!(f, " ")?;
            }
            write!(f, "ORDER BY ")?;
            comma_separated(f, &self.order_by)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Null => write!(f, "NULL"),
            Expr::Boolean(true) => write!(f, "TRUE"),
            Expr::Boolean(false) => write!(f, "FALSE"),
            Expr::Integer(n) => write!(f, "{}", n),
            Expr::Float(n) => write!(f, "{:?}", n),
            Expr::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Expr::ColumnRef { table, column } => {
                if let Some(table) = table {
                    write!(f, "{}.", Ident(table))?;
                }
                write!(f, "{}", Ident(column))
            }
            Expr::Index { expr, index } => write!(f, "{}[{}]", expr, index),
            Expr::Nested(inner) => write!(f, "({})", inner),
            Expr::BinaryOp { left, op, right } => {
                write!(f, "{} {} {}", left, op.as_str(), right)
            }
            Expr::UnaryOp { op, operand } => match op {
                UnaryOperator::Not => write!(f, "NOT {}", operand),
                _ => write!(f, "{}{}", op.as_str(), operand),
            },
            Expr::IsNull { expr, negated } => {
                let neg = if *negated { " NOT" } else { "" };
                write!(f, "{} IS{} NULL", expr, neg)
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let neg = if *negated { " NOT" } else { "" };
                write!(f, "{}{} IN (", expr, neg)?;
                comma_separated(f, list)?;
                write!(f, ")")
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let neg = if *negated { " NOT" } else { "" };
                write!(f, "{}{} BETWEEN {} AND {}", expr, neg, low, high)
            }
            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                let neg = if *negated { " NOT" } else { "" };
                write!(f, "{}{} LIKE {}", expr, neg, pattern)
            }
            Expr::Case {
                operand,
                when_clauses,
                else_result,
            } => {
                write!(f, "CASE")?;
                if let Some(op) = operand {
                    write!(f, " {}", op)?;
                }
                for clause in when_clauses {
                    write!(f, " WHEN {} THEN {}", clause.condition, clause.result)?;
                }
                if let Some(e) = else_result {
                    write!(f, " ELSE {}", e)?;
                }
                write!(f, " END")
            }
            Expr::Cast { expr, data_type } => {
                write!(f, "CAST({} AS {})", expr, data_type.display_name())
            }
            Expr::Function {
                qualifier,
                name,
                args,
                distinct,
                star,
                over,
            } => {
                if let Some(q) = qualifier {
                    write!(f, "{}.", Ident(q))?;
                }
                write!(f, "{}(", Ident(name))?;
                if *distinct {
                    write!(f, "DISTINCT ")?;
                }
                if *star {
                    write!(f, "*")?;
                } else {
                    comma_separated(f, args)?;
                }
                write!(f, ")")?;
                if let Some(spec) = over {
                    write!(f, " OVER {}", spec)?;
                }
                Ok(())
            }
        }
    }
}
