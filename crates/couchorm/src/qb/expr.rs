//! Raw expressions and condition operands.

use std::fmt;

use serde_json::Value;

use crate::error::OrmResult;

use super::condition::Condition;
use super::param::Params;
use super::query::Query;

/// A raw N1QL fragment spliced verbatim, carrying its own named parameters.
///
/// ```ignore
/// use couchorm::qb::Expression;
///
/// let e = Expression::new("ARRAY_LENGTH(tags) > $min").bind("min", 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Expression {
    sql: String,
    params: Params,
}

impl Expression {
    /// Create an expression without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Params::new(),
        }
    }

    /// Create an expression with a set of named parameters.
    pub fn with_params(sql: impl Into<String>, params: Params) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Add a named parameter (`$` prefix optional).
    pub fn bind(mut self, name: impl AsRef<str>, value: impl Into<Value>) -> Self {
        self.params.insert(name, value);
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Append the parameters to `params` and return the text.
    pub(crate) fn splice(&self, params: &mut Params) -> OrmResult<String> {
        params.merge(&self.params)?;
        Ok(self.sql.clone())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Replacement table applied to LIKE values before wrapping them in `%`.
///
/// An empty table disables both escaping and the `%` wrapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LikeEscape {
    replacements: Vec<(char, String)>,
}

impl LikeEscape {
    /// A table with no replacements: values are bound exactly as given.
    pub fn none() -> Self {
        Self {
            replacements: Vec::new(),
        }
    }

    /// Build a table from `(character, replacement)` pairs.
    pub fn new<S: Into<String>>(pairs: impl IntoIterator<Item = (char, S)>) -> Self {
        Self {
            replacements: pairs.into_iter().map(|(c, s)| (c, s.into())).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    /// Escape every configured character in one pass.
    pub fn apply(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len() + 4);
        for ch in value.chars() {
            match self.replacements.iter().find(|(c, _)| *c == ch) {
                Some((_, replacement)) => out.push_str(replacement),
                None => out.push(ch),
            }
        }
        out
    }

    /// Escape and wrap in `%` wildcards, or return the value untouched when
    /// the table is empty.
    pub fn to_pattern(&self, value: &str) -> String {
        if self.is_empty() {
            value.to_string()
        } else {
            format!("%{}%", self.apply(value))
        }
    }
}

impl Default for LikeEscape {
    /// Backslash-escapes `%`, `_` and `\`.
    fn default() -> Self {
        Self::new([('%', "\\%"), ('_', "\\_"), ('\\', "\\\\")])
    }
}

/// One operand of a condition: a column name, a literal, a list, a keyed row,
/// a raw expression, a subquery or a nested condition.
///
/// Which role an operand plays depends on its position in the operator form;
/// a text value in column position is a column name.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// `NULL`, rendered literally and never bound.
    Null,
    /// A scalar (or JSON) value bound as one parameter.
    Value(Value),
    /// Multiple values (IN lists, column lists, LIKE alternatives).
    List(Vec<Operand>),
    /// A keyed record: composite IN rows, or a hash condition inside AND/OR.
    Row(Vec<(String, Operand)>),
    /// Raw expression, spliced with its parameters.
    Expr(Expression),
    /// Subquery, inlined in parentheses.
    Query(Box<Query>),
    /// Nested condition (AND/OR/NOT operands).
    Condition(Box<Condition>),
    /// Escape table override (third LIKE operand).
    Escape(LikeEscape),
}

impl Operand {
    /// Build a keyed row.
    pub fn row<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Operand>,
    {
        Operand::Row(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Operand::Null | Operand::Value(Value::Null))
    }

    /// The text of a string value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Operand::Value(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Look up a field of a keyed row.
    pub fn field(&self, name: &str) -> Option<&Operand> {
        match self {
            Operand::Row(fields) => fields.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Convert plain data operands back into a JSON value.
    ///
    /// Returns `None` for expressions, subqueries, conditions and escape tables.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Operand::Null => Some(Value::Null),
            Operand::Value(v) => Some(v.clone()),
            Operand::List(items) => items
                .iter()
                .map(Operand::to_value)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            Operand::Row(fields) => fields
                .iter()
                .map(|(k, v)| v.to_value().map(|v| (k.clone(), v)))
                .collect::<Option<serde_json::Map<_, _>>>()
                .map(Value::Object),
            Operand::Expr(_) | Operand::Query(_) | Operand::Condition(_) | Operand::Escape(_) => {
                None
            }
        }
    }

    /// Short description used in error messages.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Operand::Null => "null",
            Operand::Value(Value::String(_)) => "text",
            Operand::Value(_) => "value",
            Operand::List(_) => "list",
            Operand::Row(_) => "row",
            Operand::Expr(_) => "expression",
            Operand::Query(_) => "subquery",
            Operand::Condition(_) => "condition",
            Operand::Escape(_) => "escape table",
        }
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Operand::Null,
            Value::Array(items) => Operand::List(items.into_iter().map(Operand::from).collect()),
            Value::Object(map) => {
                Operand::Row(map.into_iter().map(|(k, v)| (k, Operand::from(v))).collect())
            }
            other => Operand::Value(other),
        }
    }
}

macro_rules! impl_operand_from_scalar {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for Operand {
                fn from(value: $t) -> Self {
                    Operand::from(Value::from(value))
                }
            }
        )*
    };
}

impl_operand_from_scalar!(&str, String, bool, i32, i64, u32, u64, f32, f64);

impl From<&String> for Operand {
    fn from(value: &String) -> Self {
        Operand::Value(Value::String(value.clone()))
    }
}

impl<T: Into<Operand>> From<Option<T>> for Operand {
    fn from(value: Option<T>) -> Self {
        value.map_or(Operand::Null, Into::into)
    }
}

impl<T: Into<Operand>> From<Vec<T>> for Operand {
    fn from(values: Vec<T>) -> Self {
        Operand::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Operand>, const N: usize> From<[T; N]> for Operand {
    fn from(values: [T; N]) -> Self {
        Operand::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<Expression> for Operand {
    fn from(expr: Expression) -> Self {
        Operand::Expr(expr)
    }
}

impl From<Query> for Operand {
    fn from(query: Query) -> Self {
        Operand::Query(Box::new(query))
    }
}

impl From<Condition> for Operand {
    fn from(condition: Condition) -> Self {
        Operand::Condition(Box::new(condition))
    }
}

impl From<LikeEscape> for Operand {
    fn from(escape: LikeEscape) -> Self {
        Operand::Escape(escape)
    }
}
