//! Identifier and literal quoting for N1QL.
//!
//! [`Quoter`] wraps bucket and column names in backticks. Dotted paths quote
//! each segment separately and a `*` segment stays bare:
//!
//! ```ignore
//! use couchorm::Quoter;
//!
//! let q = Quoter::with_prefix("app_");
//! assert_eq!(q.quote_column_name("address.city"), "`address`.`city`");
//! assert_eq!(q.quote_bucket_name("{{%users}}"), "`app_users`");
//! assert_eq!(q.quote_sql("SELECT [[name]] FROM {{%users}}"), "SELECT `name` FROM `app_users`");
//! ```
//!
//! A name that already contains a backtick is treated as a caller-supplied
//! fragment and returned unchanged, so quoting is idempotent.

use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Identifier delimiter.
pub const QUOTE: char = '`';

/// Prefix token replaced by the configured bucket prefix inside `{{...}}`.
pub const PREFIX_TOKEN: char = '%';

fn token_regex() -> &'static Regex {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    TOKEN_RE.get_or_init(|| {
        Regex::new(r"(\{\{(%?[\w\-\. ]+%?)\}\}|\[\[([\w\-\. ]+)\]\])")
            .expect("invalid built-in token regex")
    })
}

/// Quotes bucket names, column names and string literals.
///
/// The quoter is plain data and read-only once built; share it freely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Quoter {
    bucket_prefix: String,
}

impl Quoter {
    /// Create a quoter with an empty bucket prefix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a quoter that substitutes `%` in `{{%name}}` with `prefix`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            bucket_prefix: prefix.into(),
        }
    }

    /// The configured bucket prefix.
    pub fn bucket_prefix(&self) -> &str {
        &self.bucket_prefix
    }

    /// Quote a bucket (keyspace) name.
    ///
    /// `{{name}}` and `{{%name}}` tokens are unwrapped first, with `%` replaced by
    /// the bucket prefix.
    pub fn quote_bucket_name(&self, name: &str) -> String {
        match strip_wrapping(name, "{{", "}}") {
            Some(inner) => quote_identifier(&self.apply_prefix(inner)),
            None => quote_identifier(name),
        }
    }

    /// Quote a column (field path) name. `[[name]]` tokens are unwrapped first.
    pub fn quote_column_name(&self, name: &str) -> String {
        match strip_wrapping(name, "[[", "]]") {
            Some(inner) => quote_identifier(inner),
            None => quote_identifier(name),
        }
    }

    /// Rewrite `{{bucket}}` and `[[column]]` tokens embedded in raw N1QL text.
    pub fn quote_sql(&self, sql: &str) -> String {
        token_regex()
            .replace_all(sql, |caps: &Captures<'_>| {
                if let Some(column) = caps.get(3) {
                    quote_identifier(column.as_str())
                } else {
                    let bucket = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
                    quote_identifier(&self.apply_prefix(bucket))
                }
            })
            .into_owned()
    }

    fn apply_prefix(&self, name: &str) -> String {
        name.replace(PREFIX_TOKEN, &self.bucket_prefix)
    }
}

fn strip_wrapping<'a>(name: &'a str, open: &str, close: &str) -> Option<&'a str> {
    name.strip_prefix(open)?.strip_suffix(close)
}

/// Wrap every dotted segment of `name` in backticks.
///
/// Names already containing a backtick pass through unchanged.
pub fn quote_identifier(name: &str) -> String {
    if name.contains(QUOTE) {
        tracing::debug!(
            target: "couchorm.quote",
            identifier = name,
            "identifier already quoted, passing through"
        );
        return name.to_string();
    }

    let mut out = String::with_capacity(name.len() + 2);
    for (i, segment) in name.split('.').enumerate() {
        if i > 0 {
            out.push('.');
        }
        if segment == "*" {
            out.push('*');
        } else {
            out.push(QUOTE);
            out.push_str(segment);
            out.push(QUOTE);
        }
    }
    out
}

/// Render `value` as a double-quoted N1QL string literal.
pub fn quote_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\u0000"),
            '\u{1a}' => out.push_str("\\u001a"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
