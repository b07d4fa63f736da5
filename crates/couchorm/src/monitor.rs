//! Statement classification and the context attached to execution logs.
//!
//! Every executed command is logged under the `couchorm.n1ql` tracing target
//! with its [`QueryType`], parameter count, duration and [`QueryResult`].

use std::fmt;

/// The kind of N1QL statement being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Select,
    Insert,
    Upsert,
    Update,
    Delete,
    Merge,
    /// CREATE/DROP/BUILD INDEX and other DDL.
    Ddl,
    Other,
}

impl QueryType {
    /// Detect the statement kind from its leading keyword.
    ///
    /// Leading whitespace, comments and opening parentheses are skipped, so a
    /// `(SELECT ...) UNION (...)` statement is a SELECT.
    pub fn from_sql(sql: &str) -> Self {
        let trimmed = strip_sql_prefix(sql);
        if starts_with_keyword(trimmed, "SELECT") {
            QueryType::Select
        } else if starts_with_keyword(trimmed, "INSERT") {
            QueryType::Insert
        } else if starts_with_keyword(trimmed, "UPSERT") {
            QueryType::Upsert
        } else if starts_with_keyword(trimmed, "UPDATE") {
            QueryType::Update
        } else if starts_with_keyword(trimmed, "DELETE") {
            QueryType::Delete
        } else if starts_with_keyword(trimmed, "MERGE") {
            QueryType::Merge
        } else if ["CREATE", "DROP", "BUILD", "ALTER"]
            .iter()
            .any(|kw| starts_with_keyword(trimmed, kw))
        {
            QueryType::Ddl
        } else {
            QueryType::Other
        }
    }

    /// Whether the statement modifies documents.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            QueryType::Insert
                | QueryType::Upsert
                | QueryType::Update
                | QueryType::Delete
                | QueryType::Merge
        )
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryType::Select => "SELECT",
            QueryType::Insert => "INSERT",
            QueryType::Upsert => "UPSERT",
            QueryType::Update => "UPDATE",
            QueryType::Delete => "DELETE",
            QueryType::Merge => "MERGE",
            QueryType::Ddl => "DDL",
            QueryType::Other => "OTHER",
        };
        f.write_str(name)
    }
}

/// Context information about the statement being executed.
#[derive(Debug, Clone)]
pub struct QueryContext {
    /// Statement text with placeholders.
    pub sql: String,
    /// Number of bound parameters.
    pub param_count: usize,
    /// Detected statement kind.
    pub query_type: QueryType,
}

impl QueryContext {
    pub fn new(sql: &str, param_count: usize) -> Self {
        Self {
            sql: sql.to_string(),
            param_count,
            query_type: QueryType::from_sql(sql),
        }
    }
}

/// Maximum length for error messages in `QueryResult::Error`.
const MAX_ERROR_LEN: usize = 512;

/// Outcome of a statement, for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    /// Statement returned rows.
    Rows(usize),
    /// Statement mutated documents.
    Affected(u64),
    /// Statement failed (message truncated to 512 bytes).
    Error(String),
}

impl QueryResult {
    pub fn error(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        if msg.len() > MAX_ERROR_LEN {
            Self::Error(format!("{}...", truncate_sql_bytes(&msg, MAX_ERROR_LEN)))
        } else {
            Self::Error(msg)
        }
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryResult::Rows(n) => write!(f, "{n} rows"),
            QueryResult::Affected(n) => write!(f, "{n} affected"),
            QueryResult::Error(e) => write!(f, "error: {e}"),
        }
    }
}

/// Cut `sql` to at most `max_bytes`, backing off to a char boundary.
pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

/// Skip leading whitespace, `--`/`/* */` comments and opening parentheses.
pub(crate) fn strip_sql_prefix(sql: &str) -> &str {
    let mut s = sql;
    loop {
        let before = s;
        s = s.trim_start();
        if s.starts_with("--") {
            if let Some(pos) = s.find('\n') {
                s = &s[pos + 1..];
                continue;
            }
            return "";
        }
        if s.starts_with("/*") {
            if let Some(pos) = s.find("*/") {
                s = &s[pos + 2..];
                continue;
            }
            return "";
        }
        if let Some(rest) = s.strip_prefix('(') {
            s = rest;
            continue;
        }
        if s == before {
            break;
        }
    }
    s
}

pub(crate) fn starts_with_keyword(s: &str, keyword: &str) -> bool {
    match s.get(0..keyword.len()) {
        Some(prefix) => prefix.eq_ignore_ascii_case(keyword),
        None => false,
    }
}
