//! Logical connection names to connection strings.

use std::collections::{BTreeMap, HashMap};

use procdispatch_core::{Error, Result};

/// Resolves the logical connection name a definition refers to.
pub trait ConnectionResolver: Send + Sync {
    /// Connection string for `name`.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionNotConfigured`] when `name` is unknown.
    fn resolve(&self, name: &str) -> Result<String>;
}

/// Static, case-insensitive connection table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionMap {
    entries: HashMap<String, (String, String)>,
}

impl ConnectionMap {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, connection: impl Into<String>) -> Self {
        self.insert(name, connection);
        self
    }

    /// Add or replace a connection.
    pub fn insert(&mut self, name: impl Into<String>, connection: impl Into<String>) {
        let name = name.into();
        self.entries
            .insert(name.trim().to_lowercase(), (name, connection.into()));
    }

    /// Configured names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.values().map(|(n, _)| n.clone()).collect();
        names.sort();
        names
    }

    /// Number of configured connections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no connection is configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ConnectionResolver for ConnectionMap {
    fn resolve(&self, name: &str) -> Result<String> {
        self.entries
            .get(&name.trim().to_lowercase())
            .map(|(_, conn)| conn.clone())
            .ok_or_else(|| Error::ConnectionNotConfigured {
                name: name.to_string(),
                available: self.names(),
            })
    }
}

impl From<BTreeMap<String, String>> for ConnectionMap {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConnectionMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}
