//! Named parameter bindings.
//!
//! Placeholders are rendered as `$qp0`, `$qp1`, ... and stored in [`Params`]
//! without the `$` sigil, in the order they were bound.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::error::{OrmError, OrmResult};

/// Name prefix for generated placeholders.
pub const PARAM_PREFIX: &str = "qp";

/// Sigil that marks a named placeholder in statement text.
pub const PLACEHOLDER_SIGIL: char = '$';

/// Ordered map of placeholder name to value.
///
/// Names are unique; inserting an existing name replaces its value in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, Value)>,
}

impl Params {
    /// Create an empty binding map.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether no bindings exist.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a value by name (with or without the `$` sigil).
    pub fn get(&self, name: &str) -> Option<&Value> {
        let name = normalize_name(name);
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Check whether a name is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate bindings in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Bind `value` under a fresh generated name and return its placeholder text.
    ///
    /// The counter starts at the current map size and skips names that are
    /// already taken (e.g. merged from a raw expression).
    pub fn bind(&mut self, value: impl Into<Value>) -> String {
        let mut counter = self.entries.len();
        let mut name = format!("{PARAM_PREFIX}{counter}");
        while self.contains(&name) {
            counter += 1;
            name = format!("{PARAM_PREFIX}{counter}");
        }
        let placeholder = format!("{PLACEHOLDER_SIGIL}{name}");
        self.entries.push((name, value.into()));
        placeholder
    }

    /// Insert or replace an explicitly named binding.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<Value>) {
        let name = normalize_name(name.as_ref());
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    /// Merge all bindings of `other` into this map.
    ///
    /// Rebinding a name to the same value is accepted; a different value fails
    /// with [`OrmError::InvalidCondition`] and leaves earlier bindings intact.
    pub fn merge(&mut self, other: &Params) -> OrmResult<()> {
        for (name, value) in &other.entries {
            match self.get(name).cloned() {
                Some(existing) if existing == *value => {}
                Some(existing) => {
                    return Err(OrmError::invalid_condition(format!(
                        "parameter '{name}' is already bound to {existing}, \
                         cannot rebind it to {value}"
                    )));
                }
                None => self.entries.push((name.clone(), value.clone())),
            }
        }
        Ok(())
    }

    /// Convert into a JSON object keyed by name.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(n, v)| (n.clone(), v.clone()))
                .collect(),
        )
    }
}

fn normalize_name(name: &str) -> &str {
    name.strip_prefix(PLACEHOLDER_SIGIL).unwrap_or(name)
}

impl<K: AsRef<str>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        params.extend(iter);
        params
    }
}

impl<K: AsRef<str>, V: Into<Value>> Extend<(K, V)> for Params {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.insert(name, value);
        }
    }
}

impl Serialize for Params {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bind_generates_sequential_placeholders() {
        let mut params = Params::new();
        assert_eq!(params.bind(1), "$qp0");
        assert_eq!(params.bind("a"), "$qp1");
        assert_eq!(params.get("qp0"), Some(&json!(1)));
        assert_eq!(params.get("$qp1"), Some(&json!("a")));
    }

    #[test]
    fn bind_skips_taken_names() {
        let mut params = Params::new();
        params.insert("$qp1", 10);
        assert_eq!(params.bind(2), "$qp2");
        params.insert("qp3", 3);
        assert_eq!(params.bind(4), "$qp4");
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut params: Params = [("a", 1), ("b", 2)].into_iter().collect();
        params.insert("$a", 3);
        let names: Vec<_> = params.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(params.get("a"), Some(&json!(3)));
    }

    #[test]
    fn merge_rejects_conflicting_names() {
        let mut params = Params::new();
        params.bind(1);
        params.merge(&[("qp0", 1), ("min", 2)].into_iter().collect()).unwrap();
        assert_eq!(params.to_json(), json!({"qp0": 1, "min": 2}));

        let err = params.merge(&[("$qp0", "raw")].into_iter().collect()).unwrap_err();
        assert!(matches!(err, OrmError::InvalidCondition(_)));
        assert_eq!(params.get("qp0"), Some(&json!(1)));
    }

    #[test]
    fn serializes_as_object() {
        let mut params = Params::new();
        params.bind(true);
        params.bind(json!(null));
        assert_eq!(serde_json::to_value(&params).unwrap(), json!({"qp0": true, "qp1": null}));
        assert_eq!(params.to_json(), json!({"qp0": true, "qp1": null}));
    }
}
