//! Caller-supplied argument bags.
//!
//! Arguments are an explicit key/value mapping built by the caller. Keys are
//! matched case-insensitively; the original spelling of the first insertion
//! is kept for display.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Case-insensitive argument bag.
///
/// # Example
///
/// ```
/// use procdispatch_core::Args;
/// use serde_json::json;
///
/// let args = Args::new().with("Search", json!("ana")).with("page", json!(2));
/// assert_eq!(args.get("SEARCH"), Some(&json!("ana")));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    entries: BTreeMap<String, (String, Value)>,
}

impl Args {
    /// Empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let folded = key.to_lowercase();
        match self.entries.get_mut(&folded) {
            Some(slot) => slot.1 = value,
            None => {
                self.entries.insert(folded, (key, value));
            }
        }
    }

    /// Case-insensitive lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(&key.to_lowercase()).map(|(_, v)| v)
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no arguments are present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(original key, value)` pairs in case-folded key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.values().map(|(k, v)| (k.as_str(), v))
    }

    /// Build from any serializable struct or map.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidParameter`] if `value` does not serialize to a
    /// JSON object.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self> {
        match serde_json::to_value(value) {
            Ok(Value::Object(map)) => Ok(Self::from(map)),
            Ok(Value::Null) => Ok(Self::new()),
            Ok(other) => Err(Error::InvalidParameter {
                param: "args".into(),
                expected: "an object".into(),
                reason: format!("got {}", json_kind(&other)),
            }),
            Err(e) => Err(Error::InvalidParameter {
                param: "args".into(),
                expected: "an object".into(),
                reason: e.to_string(),
            }),
        }
    }
}

impl From<Map<String, Value>> for Args {
    fn from(map: Map<String, Value>) -> Self {
        let mut args = Args::new();
        for (k, v) in map {
            args.insert(k, v);
        }
        args
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Args {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut args = Args::new();
        for (k, v) in iter {
            args.insert(k, v);
        }
        args
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Filter {
        search: String,
        page: u32,
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let args = Args::new().with("TenantId", json!(7));
        assert_eq!(args.get("tenantid"), Some(&json!(7)));
        assert_eq!(args.get("TENANTID"), Some(&json!(7)));
        assert_eq!(args.get("other"), None);
    }

    #[test]
    fn test_insert_replaces_case_variant() {
        let mut args = Args::new();
        args.insert("Name", json!("a"));
        args.insert("NAME", json!("b"));
        assert_eq!(args.len(), 1);
        let (key, value) = args.iter().next().unwrap();
        assert_eq!(key, "Name");
        assert_eq!(value, &json!("b"));
    }

    #[test]
    fn test_from_serialize_struct() {
        let args = Args::from_serialize(&Filter {
            search: "ana".into(),
            page: 3,
        })
        .unwrap();
        assert_eq!(args.get("Search"), Some(&json!("ana")));
        assert_eq!(args.get("page"), Some(&json!(3)));
    }

    #[test]
    fn test_from_serialize_rejects_scalars() {
        let err = Args::from_serialize(&42).unwrap_err();
        assert!(err.to_string().contains("a number"));
    }

    #[test]
    fn test_from_json_map() {
        let map = json!({"a": 1, "B": null}).as_object().cloned().unwrap();
        let args = Args::from(map);
        assert_eq!(args.len(), 2);
        assert_eq!(args.get("b"), Some(&Value::Null));
    }

    proptest::proptest! {
        #[test]
        fn prop_lookup_ignores_case(key in "[a-zA-Z_][a-zA-Z0-9_]{0,15}", n in 0i64..1000) {
            let args = Args::new().with(key.clone(), json!(n));
            proptest::prop_assert_eq!(args.get(&key.to_uppercase()), Some(&json!(n)));
            proptest::prop_assert_eq!(args.get(&key.to_lowercase()), Some(&json!(n)));
        }
    }
}
