//! Dispatcher configuration via `procdispatch.toml`
//!
//! One file configures the engine: default timeout, the transaction
//! contract column names, registry tuning, cache capacity and the logical
//! connection table. Every key is optional.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use procdispatch_core::{Error, Result, DEFAULT_TIMEOUT_SECS};
use procdispatch_registry::RegistrySettings;
use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_MAX_ENTRIES;
use crate::connections::ConnectionMap;

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "procdispatch.toml";

/// The columns a transactional procedure reports its outcome in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransactionSettings {
    /// Column holding the outcome code
    pub error_column: String,
    /// Column holding the human-readable message
    pub message_column: String,
    /// Outcome code that means success, compared as text ignoring case
    pub success_value: String,
}

impl Default for TransactionSettings {
    fn default() -> Self {
        Self {
            error_column: "ErrorCode".to_string(),
            message_column: "Message".to_string(),
            success_value: "0".to_string(),
        }
    }
}

/// Cache tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    /// Upper bound on cached entries
    pub max_entries: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

/// Dispatcher configuration loaded from `procdispatch.toml`.
///
/// # Example
///
/// ```toml
/// default_timeout_secs = 30
///
/// [transaction]
/// error_column = "ErrorCode"
///
/// [connections]
/// main = "Server=db1;Database=app"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Timeout for definitions that declare none
    pub default_timeout_secs: u64,
    /// Transaction contract columns
    pub transaction: TransactionSettings,
    /// Definition loading and hot reload
    pub registry: RegistrySettings,
    /// Result cache
    pub cache: CacheSettings,
    /// Logical connection name to connection string
    pub connections: BTreeMap<String, String>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            transaction: TransactionSettings::default(),
            registry: RegistrySettings::default(),
            cache: CacheSettings::default(),
            connections: BTreeMap::new(),
        }
    }
}

impl DispatcherConfig {
    /// Parse configuration text.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] on malformed TOML or invalid values.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: DispatcherConfig =
            toml::from_str(text).map_err(|e| Error::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Config { reason } => Error::config(format!("{} ({})", reason, path.display())),
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Timeout applied when a definition declares none.
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// The `[connections]` table as a resolver.
    pub fn connection_map(&self) -> ConnectionMap {
        ConnectionMap::from(self.connections.clone())
    }

    fn validate(&self) -> Result<()> {
        if self.default_timeout_secs == 0 {
            return Err(Error::config("default_timeout_secs must be greater than zero"));
        }
        if self.transaction.error_column.trim().is_empty() {
            return Err(Error::config("transaction.error_column must not be empty"));
        }
        if self.registry.extension.trim().trim_start_matches('.').is_empty() {
            return Err(Error::config("registry.extension must not be empty"));
        }
        if self.registry.reload_attempts == 0 {
            return Err(Error::config("registry.reload_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# procdispatch configuration

# Timeout in seconds for definitions that declare none (default: 30)
default_timeout_secs = 30

# Transaction contract: the first row of the first result set must carry
# an error column; success_value means commit, anything else rolls back.
[transaction]
error_column = "ErrorCode"
message_column = "Message"
success_value = "0"

# Definition files and hot reload
[registry]
extension = "json"
debounce_ms = 500
reload_attempts = 3
reload_backoff_ms = 100

# Result cache capacity
[cache]
max_entries = 10000

# Logical connection names used by definitions
[connections]
# main = "Server=localhost;Database=app"
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_toml_parses_to_default() {
        let config = DispatcherConfig::from_toml_str(DispatcherConfig::default_toml()).unwrap();
        assert_eq!(config, DispatcherConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = DispatcherConfig::from_toml_str(
            "[transaction]\nerror_column = \"Status\"\n\n[connections]\nMain = \"x\"\n",
        )
        .unwrap();
        assert_eq!(config.transaction.error_column, "Status");
        assert_eq!(config.transaction.message_column, "Message");
        assert_eq!(config.default_timeout_secs, 30);
        assert_eq!(config.connection_map().len(), 1);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        assert!(matches!(
            DispatcherConfig::from_toml_str("default_timeout_secs = 0"),
            Err(Error::Config { .. })
        ));
        assert!(matches!(
            DispatcherConfig::from_toml_str("default_timeout_secs = \"soon\""),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn write_default_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        DispatcherConfig::write_default_if_missing(&path).unwrap();
        assert!(path.exists());
        assert_eq!(DispatcherConfig::from_file(&path).unwrap(), DispatcherConfig::default());
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = DispatcherConfig::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
    }
}
