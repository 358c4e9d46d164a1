//! Tabular rows returned by procedures.
//!
//! A [`Row`] keeps the column order produced by the backend and answers
//! column lookups case-insensitively. [`NamedRows`] is an ordered map of
//! row lists (datasets, lookups) where a missing key reads as an empty list.

use std::ops::Index;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;

/// Ordered sequence of rows from one result set.
pub type RowList = Vec<Row>;

static EMPTY_ROWS: RowList = Vec::new();

/// One row: ordered `column -> value` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    /// Empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column append.
    pub fn with(mut self, column: impl Into<String>, value: Value) -> Self {
        self.set(column, value);
        self
    }

    /// Set a column, replacing an existing one with the same (case-folded) name.
    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        let column = column.into();
        match self
            .columns
            .iter_mut()
            .find(|(c, _)| c.eq_ignore_ascii_case(&column))
        {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column, value)),
        }
    }

    /// Case-insensitive column lookup.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(column))
            .map(|(_, v)| v)
    }

    /// Whether the column exists (case-insensitive).
    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Column names in backend order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(c, _)| c.as_str())
    }

    /// `(column, value)` pairs in backend order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(c, v)| (c.as_str(), v))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True when the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.set(k, v);
        }
        row
    }
}

impl From<serde_json::Map<String, Value>> for Row {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        map.into_iter().collect()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (c, v) in &self.columns {
            map.serialize_entry(c, v)?;
        }
        map.end()
    }
}

/// Ordered, case-insensitive map of named row lists.
///
/// Indexing by a key that is not present yields an empty list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedRows {
    entries: Vec<(String, RowList)>,
}

impl NamedRows {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the rows under `name`.
    pub fn insert(&mut self, name: impl Into<String>, rows: RowList) {
        let name = name.into();
        match self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = rows,
            None => self.entries.push((name, rows)),
        }
    }

    /// Rows under `name`, or an empty slice.
    pub fn get(&self, name: &str) -> &[Row] {
        self.find(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `name` is present.
    pub fn contains_key(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// `(name, rows)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RowList)> {
        self.entries.iter().map(|(n, r)| (n.as_str(), r))
    }

    /// Remove and return the rows under `name`.
    pub fn remove(&mut self, name: &str) -> Option<RowList> {
        let idx = self
            .entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(idx).1)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find(&self, name: &str) -> Option<&RowList> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, r)| r)
    }
}

impl Index<&str> for NamedRows {
    type Output = RowList;

    fn index(&self, name: &str) -> &RowList {
        self.find(name).unwrap_or(&EMPTY_ROWS)
    }
}

impl Serialize for NamedRows {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (n, r) in &self.entries {
            map.serialize_entry(n, r)?;
        }
        map.end()
    }
}

/// Dataset key for the result set at `ordinal` (0-based): `info`, `info2`, `info3`, ...
pub fn dataset_key(ordinal: usize) -> String {
    if ordinal == 0 {
        "info".to_string()
    } else {
        format!("info{}", ordinal + 1)
    }
}
