//! Condition trees for WHERE, HAVING, JOIN ON and index predicates.
//!
//! A [`Condition`] is either a raw fragment, a hash of column/value pairs, or an
//! operator applied to a list of [`Operand`]s. The typed constructors
//! (`Condition::eq`, `Condition::in_list`, ...) all produce the operator form,
//! so conditions built dynamically with [`Condition::op`] compile the same way.

use std::fmt;

use super::expr::{Expression, LikeEscape, Operand};

/// Operator keyword of an operator-form condition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
    Not,
    Between,
    NotBetween,
    In,
    NotIn,
    Like,
    NotLike,
    OrLike,
    OrNotLike,
    /// Binary comparison; holds the upper-cased keyword (`=`, `>=`, `IS NOT`, ...).
    Compare(String),
}

impl Operator {
    /// Parse a keyword case-insensitively. Unknown keywords become comparisons.
    pub fn parse(keyword: &str) -> Self {
        let normalized = keyword.split_whitespace().collect::<Vec<_>>().join(" ");
        let upper = normalized.to_ascii_uppercase();
        match upper.as_str() {
            "AND" => Operator::And,
            "OR" => Operator::Or,
            "NOT" => Operator::Not,
            "BETWEEN" => Operator::Between,
            "NOT BETWEEN" => Operator::NotBetween,
            "IN" => Operator::In,
            "NOT IN" => Operator::NotIn,
            "LIKE" => Operator::Like,
            "NOT LIKE" => Operator::NotLike,
            "OR LIKE" => Operator::OrLike,
            "OR NOT LIKE" => Operator::OrNotLike,
            _ => Operator::Compare(upper),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Not => "NOT",
            Operator::Between => "BETWEEN",
            Operator::NotBetween => "NOT BETWEEN",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::OrLike => "OR LIKE",
            Operator::OrNotLike => "OR NOT LIKE",
            Operator::Compare(op) => op,
        }
    }
}

impl From<&str> for Operator {
    fn from(keyword: &str) -> Self {
        Operator::parse(keyword)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A predicate tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// Raw fragment with its own parameters.
    Raw(Expression),
    /// Pre-built text used verbatim. Nothing is bound or escaped.
    Literal(String),
    /// Column/value pairs: equality, `IS NULL` or `IN`, joined with AND.
    Hash(Vec<(String, Operand)>),
    /// Operator applied to operands.
    Operator { op: Operator, operands: Vec<Operand> },
}

impl Condition {
    /// Operator form from a keyword (case-insensitive) and operands.
    pub fn op(keyword: impl Into<Operator>, operands: Vec<Operand>) -> Self {
        Condition::Operator {
            op: keyword.into(),
            operands,
        }
    }

    /// Raw SQL fragment without parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Condition::Raw(Expression::new(sql))
    }

    /// Pre-built text spliced without binding.
    pub fn literal(sql: impl Into<String>) -> Self {
        Condition::Literal(sql.into())
    }

    /// Hash condition from column/value pairs.
    pub fn hash<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Operand>,
    {
        Condition::Hash(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn and(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self::op(Operator::And, conditions.into_iter().map(Operand::from).collect())
    }

    pub fn or(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self::op(Operator::Or, conditions.into_iter().map(Operand::from).collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: Condition) -> Self {
        Self::op(Operator::Not, vec![Operand::from(condition)])
    }

    /// `column <op> value`
    pub fn compare(column: impl Into<String>, op: &str, value: impl Into<Operand>) -> Self {
        Self::op(
            Operator::parse(op),
            vec![Operand::from(column.into()), value.into()],
        )
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Operand>) -> Self {
        Self::compare(column, "=", value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Operand>) -> Self {
        Self::compare(column, "<>", value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Operand>) -> Self {
        Self::compare(column, ">", value)
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Operand>) -> Self {
        Self::compare(column, ">=", value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Operand>) -> Self {
        Self::compare(column, "<", value)
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Operand>) -> Self {
        Self::compare(column, "<=", value)
    }

    /// `column IS NULL`
    pub fn is_null(column: impl Into<String>) -> Self {
        Condition::Hash(vec![(column.into(), Operand::Null)])
    }

    /// `column IS NOT NULL`
    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self::compare(column, "IS NOT", Operand::Null)
    }

    pub fn between(
        column: impl Into<String>,
        low: impl Into<Operand>,
        high: impl Into<Operand>,
    ) -> Self {
        Self::op(
            Operator::Between,
            vec![Operand::from(column.into()), low.into(), high.into()],
        )
    }

    pub fn not_between(
        column: impl Into<String>,
        low: impl Into<Operand>,
        high: impl Into<Operand>,
    ) -> Self {
        Self::op(
            Operator::NotBetween,
            vec![Operand::from(column.into()), low.into(), high.into()],
        )
    }

    /// `column IN [...]`, `(a, b) IN ((..), (..))` or `column IN (subquery)`.
    ///
    /// `columns` is a single name or a list of names.
    pub fn in_list(columns: impl Into<Operand>, values: impl Into<Operand>) -> Self {
        Self::op(Operator::In, vec![columns.into(), values.into()])
    }

    pub fn not_in(columns: impl Into<Operand>, values: impl Into<Operand>) -> Self {
        Self::op(Operator::NotIn, vec![columns.into(), values.into()])
    }

    /// `column LIKE %value%` for each value, joined with AND.
    pub fn like(column: impl Into<String>, values: impl Into<Operand>) -> Self {
        Self::op(Operator::Like, vec![Operand::from(column.into()), values.into()])
    }

    pub fn not_like(column: impl Into<String>, values: impl Into<Operand>) -> Self {
        Self::op(
            Operator::NotLike,
            vec![Operand::from(column.into()), values.into()],
        )
    }

    /// `column LIKE %value%` for each value, joined with OR.
    pub fn or_like(column: impl Into<String>, values: impl Into<Operand>) -> Self {
        Self::op(Operator::OrLike, vec![Operand::from(column.into()), values.into()])
    }

    pub fn or_not_like(column: impl Into<String>, values: impl Into<Operand>) -> Self {
        Self::op(
            Operator::OrNotLike,
            vec![Operand::from(column.into()), values.into()],
        )
    }

    /// LIKE with a per-condition escape table; [`LikeEscape::none`] binds values verbatim.
    pub fn like_with_escape(
        column: impl Into<String>,
        values: impl Into<Operand>,
        escape: LikeEscape,
    ) -> Self {
        Self::op(
            Operator::Like,
            vec![
                Operand::from(column.into()),
                values.into(),
                Operand::Escape(escape),
            ],
        )
    }

    /// Whether the condition trivially compiles to nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Condition::Raw(expr) => expr.sql().is_empty(),
            Condition::Literal(sql) => sql.is_empty(),
            Condition::Hash(pairs) => pairs.is_empty(),
            Condition::Operator { op, operands } => {
                matches!(op, Operator::And | Operator::Or) && operands.is_empty()
            }
        }
    }
}

impl From<Expression> for Condition {
    fn from(expr: Expression) -> Self {
        Condition::Raw(expr)
    }
}
