//! Condition compiler.
//!
//! Walks a [`Condition`] depth-first, left to right, binding every literal leaf
//! as a fresh placeholder in the shared [`Params`]. NULL is rendered literally
//! and raw expressions are spliced with their own parameters, so compiling the
//! same tree twice yields identical text and bindings.

use serde_json::Value;

use crate::error::{OrmError, OrmResult};

use super::builder::QueryBuilder;
use super::condition::{Condition, Operator};
use super::expr::{LikeEscape, Operand};
use super::param::Params;

/// Always-false predicate used for an empty IN.
const FALSE_PREDICATE: &str = "0=1";

impl QueryBuilder {
    /// Compile a condition into predicate text, binding literals into `params`.
    ///
    /// Returns an empty string when the condition has no effect.
    pub fn build_condition(&self, condition: &Condition, params: &mut Params) -> OrmResult<String> {
        match condition {
            Condition::Raw(expr) => expr.splice(params),
            Condition::Literal(sql) => Ok(literal_fragment(sql)),
            Condition::Hash(pairs) => self.build_hash_condition(pairs, params),
            Condition::Operator { op, operands } => match op {
                Operator::And | Operator::Or => self.build_and_condition(op, operands, params),
                Operator::Not => self.build_not_condition(operands, params),
                Operator::Between | Operator::NotBetween => {
                    self.build_between_condition(op, operands, params)
                }
                Operator::In | Operator::NotIn => self.build_in_condition(op, operands, params),
                Operator::Like | Operator::NotLike | Operator::OrLike | Operator::OrNotLike => {
                    self.build_like_condition(op, operands, params)
                }
                Operator::Compare(_) => self.build_simple_condition(op, operands, params),
            },
        }
    }

    fn build_hash_condition(
        &self,
        pairs: &[(String, Operand)],
        params: &mut Params,
    ) -> OrmResult<String> {
        let mut parts = Vec::with_capacity(pairs.len());
        for (column, value) in pairs {
            let part = match value {
                Operand::List(_) | Operand::Query(_) => {
                    self.build_in(false, &[column.as_str()], value, params)?
                }
                v if v.is_null() => format!("{} IS NULL", self.column_sql(column)),
                Operand::Expr(expr) => {
                    format!("{}={}", self.column_sql(column), expr.splice(params)?)
                }
                Operand::Value(v) => {
                    format!("{}={}", self.column_sql(column), params.bind(v.clone()))
                }
                other => {
                    return Err(OrmError::invalid_condition(format!(
                        "hash condition value for '{column}' cannot be a {}",
                        other.kind()
                    )));
                }
            };
            parts.push(part);
        }

        Ok(match parts.len() {
            0 => String::new(),
            1 => parts.swap_remove(0),
            _ => format!("({})", parts.join(") AND (")),
        })
    }

    fn build_and_condition(
        &self,
        op: &Operator,
        operands: &[Operand],
        params: &mut Params,
    ) -> OrmResult<String> {
        let mut parts = Vec::with_capacity(operands.len());
        for operand in operands {
            let part = self.build_nested(op, operand, params)?;
            if !part.is_empty() {
                parts.push(part);
            }
        }
        if parts.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("({})", parts.join(&format!(") {op} ("))))
    }

    fn build_not_condition(&self, operands: &[Operand], params: &mut Params) -> OrmResult<String> {
        let [operand] = operands else {
            return Err(arity_error(&Operator::Not, "exactly one operand", operands.len()));
        };
        let inner = self.build_nested(&Operator::Not, operand, params)?;
        if inner.is_empty() {
            return Ok(inner);
        }
        Ok(format!("NOT ({inner})"))
    }

    fn build_between_condition(
        &self,
        op: &Operator,
        operands: &[Operand],
        params: &mut Params,
    ) -> OrmResult<String> {
        let [column, low, high] = operands else {
            return Err(arity_error(op, "three operands", operands.len()));
        };
        let column = self.column_sql(column_name(op, column)?);
        let low = self.bind_leaf(op, low, params)?;
        let high = self.bind_leaf(op, high, params)?;
        Ok(format!("{column} {op} {low} AND {high}"))
    }

    fn build_in_condition(
        &self,
        op: &Operator,
        operands: &[Operand],
        params: &mut Params,
    ) -> OrmResult<String> {
        let [columns, values] = operands else {
            return Err(arity_error(op, "two operands", operands.len()));
        };
        let columns: Vec<&str> = match columns {
            Operand::List(items) => items
                .iter()
                .map(|item| column_name(op, item))
                .collect::<OrmResult<_>>()?,
            single => vec![column_name(op, single)?],
        };
        self.build_in(*op == Operator::NotIn, &columns, values, params)
    }

    /// Shared IN compilation for the operator form and hash conditions.
    fn build_in(
        &self,
        negated: bool,
        columns: &[&str],
        values: &Operand,
        params: &mut Params,
    ) -> OrmResult<String> {
        let op = if negated { "NOT IN" } else { "IN" };
        let degenerate = || {
            if negated {
                String::new()
            } else {
                FALSE_PREDICATE.to_string()
            }
        };

        if columns.is_empty() {
            return Ok(degenerate());
        }

        if let Operand::Query(query) = values {
            let sql = self.build_into(query, params)?;
            return Ok(match columns {
                [column] => format!("{} {op} ({sql})", self.column_sql(column)),
                _ => format!("({}) {op} ({sql})", self.column_list(columns)),
            });
        }

        let items: Vec<&Operand> = match values {
            Operand::List(items) => items.iter().collect(),
            single => vec![single],
        };

        if let [column] = columns {
            let mut sql_values = Vec::with_capacity(items.len());
            for item in items {
                let value = match item {
                    Operand::Row(_) => item.field(column).unwrap_or(&Operand::Null),
                    other => other,
                };
                sql_values.push(self.in_value(value, params)?);
            }
            let column = self.column_sql(column);
            return Ok(match sql_values.len() {
                0 => degenerate(),
                1 => {
                    let eq = if negated { "<>" } else { "=" };
                    format!("{column}{eq}{}", sql_values[0])
                }
                _ => format!("{column} {op} [{}]", sql_values.join(", ")),
            });
        }

        self.build_composite_in(op, columns, &items, params)
            .map(|sql| sql.unwrap_or_else(degenerate))
    }

    /// `(a, b) IN ((..), (..))`; returns `None` when there are no rows.
    fn build_composite_in(
        &self,
        op: &str,
        columns: &[&str],
        rows: &[&Operand],
        params: &mut Params,
    ) -> OrmResult<Option<String>> {
        let mut tuples = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = Vec::with_capacity(columns.len());
            for (i, column) in columns.iter().enumerate() {
                let value = match row {
                    Operand::Row(_) => row.field(column),
                    Operand::List(items) => items.get(i),
                    other => {
                        return Err(OrmError::invalid_condition(format!(
                            "composite {op} expects rows of values, got {}",
                            other.kind()
                        )));
                    }
                };
                values.push(match value {
                    Some(value) if !value.is_null() => self.in_value(value, params)?,
                    _ => "NULL".to_string(),
                });
            }
            tuples.push(format!("({})", values.join(", ")));
        }
        if tuples.is_empty() {
            return Ok(None);
        }
        Ok(Some(format!(
            "({}) {op} ({})",
            self.column_list(columns),
            tuples.join(", ")
        )))
    }

    fn in_value(&self, value: &Operand, params: &mut Params) -> OrmResult<String> {
        match value {
            v if v.is_null() => Ok("NULL".to_string()),
            Operand::Expr(expr) => expr.splice(params),
            Operand::Value(v) => Ok(params.bind(v.clone())),
            other => Err(OrmError::invalid_condition(format!(
                "IN values must be scalars or expressions, got {}",
                other.kind()
            ))),
        }
    }

    fn build_like_condition(
        &self,
        op: &Operator,
        operands: &[Operand],
        params: &mut Params,
    ) -> OrmResult<String> {
        let (column, values, escape) = match operands {
            [column, values] => (column, values, None),
            [column, values, escape] => (column, values, Some(escape)),
            _ => return Err(arity_error(op, "two or three operands", operands.len())),
        };
        let escape: &LikeEscape = match escape {
            None => &self.like_escape,
            Some(Operand::Escape(escape)) => escape,
            Some(other) => {
                return Err(OrmError::invalid_condition(format!(
                    "operator '{op}' expects an escape table as third operand, got {}",
                    other.kind()
                )));
            }
        };

        let (conjunction, keyword) = match op {
            Operator::Like => (" AND ", "LIKE"),
            Operator::NotLike => (" AND ", "NOT LIKE"),
            Operator::OrLike => (" OR ", "LIKE"),
            _ => (" OR ", "NOT LIKE"),
        };
        let negated = matches!(op, Operator::NotLike | Operator::OrNotLike);

        let items: Vec<&Operand> = match values {
            Operand::List(items) => items.iter().collect(),
            single => vec![single],
        };
        if items.is_empty() {
            return Ok(if negated {
                String::new()
            } else {
                FALSE_PREDICATE.to_string()
            });
        }

        let column = self.column_sql(column_name(op, column)?);
        let escape_clause = self
            .like_escape_character
            .map(|c| format!(" ESCAPE '{}'", escape_char_literal(c)))
            .unwrap_or_default();

        let mut parts = Vec::with_capacity(items.len());
        for item in items {
            let placeholder = match item {
                Operand::Expr(expr) => expr.splice(params)?,
                Operand::Value(Value::String(s)) => params.bind(escape.to_pattern(s)),
                Operand::Value(v @ Value::Number(_)) => {
                    params.bind(escape.to_pattern(&v.to_string()))
                }
                other => {
                    return Err(OrmError::invalid_condition(format!(
                        "operator '{op}' expects text values, got {}",
                        other.kind()
                    )));
                }
            };
            parts.push(format!("{column} {keyword} {placeholder}{escape_clause}"));
        }
        Ok(parts.join(conjunction))
    }

    fn build_simple_condition(
        &self,
        op: &Operator,
        operands: &[Operand],
        params: &mut Params,
    ) -> OrmResult<String> {
        let [column, value] = operands else {
            return Err(arity_error(op, "two operands", operands.len()));
        };
        let column = self.column_sql(column_name(op, column)?);
        let value = match value {
            v if v.is_null() => "NULL".to_string(),
            other => self.bind_leaf(op, other, params)?,
        };
        Ok(format!("{column} {op} {value}"))
    }

    /// Operand of AND/OR/NOT: a nested condition, a hash row, an expression or literal text.
    fn build_nested(
        &self,
        op: &Operator,
        operand: &Operand,
        params: &mut Params,
    ) -> OrmResult<String> {
        match operand {
            Operand::Condition(condition) => self.build_condition(condition, params),
            Operand::Row(pairs) => self.build_hash_condition(pairs, params),
            Operand::Expr(expr) => expr.splice(params),
            Operand::Value(Value::String(sql)) => Ok(literal_fragment(sql)),
            other => Err(OrmError::invalid_condition(format!(
                "operator '{op}' expects conditions as operands, got {}",
                other.kind()
            ))),
        }
    }

    /// Render a value operand: NULL, spliced expression, inlined subquery or bound value.
    fn bind_leaf(
        &self,
        op: &Operator,
        operand: &Operand,
        params: &mut Params,
    ) -> OrmResult<String> {
        match operand {
            v if v.is_null() => Ok("NULL".to_string()),
            Operand::Expr(expr) => expr.splice(params),
            Operand::Query(query) => Ok(format!("({})", self.build_into(query, params)?)),
            other => match other.to_value() {
                Some(value) => Ok(params.bind(value)),
                None => Err(OrmError::invalid_condition(format!(
                    "operator '{op}' cannot bind a {}",
                    other.kind()
                ))),
            },
        }
    }

    fn column_list(&self, columns: &[&str]) -> String {
        columns
            .iter()
            .map(|c| self.column_sql(c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn literal_fragment(sql: &str) -> String {
    tracing::warn!(
        target: "couchorm.condition",
        fragment = sql,
        "literal condition text is used verbatim without parameter binding"
    );
    sql.to_string()
}

/// Body of a single-quoted one-character literal.
fn escape_char_literal(c: char) -> String {
    match c {
        '\'' => "''".to_string(),
        '\\' => "\\\\".to_string(),
        c => c.to_string(),
    }
}

fn column_name<'a>(op: &Operator, operand: &'a Operand) -> OrmResult<&'a str> {
    operand.as_text().ok_or_else(|| {
        OrmError::invalid_condition(format!(
            "operator '{op}' expects a column name, got {}",
            operand.kind()
        ))
    })
}

fn arity_error(op: &Operator, expected: &str, got: usize) -> OrmError {
    OrmError::invalid_condition(format!("operator '{op}' requires {expected}, got {got}"))
}
