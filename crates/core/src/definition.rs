//! Command definitions as loaded from definition files.
//!
//! A definition file is a JSON object describing one stored-procedure call:
//!
//! ```json
//! {
//!   "id": "rh.candidates.list",
//!   "description": "Active candidates for the current tenant",
//!   "procedure": "rh.usp_candidates_list",
//!   "connection": "main",
//!   "strategy": "Query",
//!   "params": [
//!     { "name": "@UserId", "from": "@@userid@@", "type": "int" },
//!     { "name": "@Search", "from": "search", "optional": true }
//!   ],
//!   "includes": ["rh.status.lookup"],
//!   "timeout": 30,
//!   "cache": 60
//! }
//! ```
//!
//! Definitions are immutable once parsed. The strategy is kept as the raw
//! string from the file so an unknown tag only fails when the command runs.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Default per-command timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// One named stored-procedure operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDefinition {
    /// Unique, case-insensitive command id
    pub id: String,
    /// Informational description
    #[serde(default)]
    pub description: String,
    /// Target procedure name passed to the backend
    #[serde(default)]
    pub procedure: String,
    /// Logical connection name
    #[serde(default)]
    pub connection: String,
    /// Raw strategy tag, see [`Strategy::parse`]
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// Ordered parameter bindings
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    /// Ids of commands executed alongside this one
    #[serde(default)]
    pub includes: Vec<String>,
    /// Timeout in seconds; 0 means "use the global default"
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Cache time-to-live in seconds; 0 disables caching
    #[serde(default)]
    pub cache: u64,
    /// File this definition was loaded from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

fn default_strategy() -> String {
    Strategy::Query.as_str().to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl CommandDefinition {
    /// Parse and validate a definition from JSON text.
    ///
    /// `origin` only labels error messages.
    pub fn from_json(text: &str, origin: &str) -> Result<Self> {
        let definition: CommandDefinition =
            serde_json::from_str(text).map_err(|e| Error::InvalidDefinition {
                path: origin.to_string(),
                reason: e.to_string(),
            })?;
        definition.validate(origin)?;
        Ok(definition)
    }

    /// Parse a definition file, recording its path in [`CommandDefinition::source`].
    ///
    /// Read failures are reported as [`Error::TransientIo`] so the reload path
    /// can retry them; parse failures as [`Error::InvalidDefinition`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let origin = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|e| Error::TransientIo {
            path: origin.clone(),
            reason: e.to_string(),
        })?;
        let mut definition = Self::from_json(&text, &origin)?;
        definition.source = Some(path.to_path_buf());
        Ok(definition)
    }

    fn validate(&self, origin: &str) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidDefinition {
            path: origin.to_string(),
            reason: reason.to_string(),
        };
        if self.id.trim().is_empty() {
            return Err(invalid("'id' is missing or blank"));
        }
        if self.procedure.trim().is_empty() {
            return Err(invalid("'procedure' is missing or blank"));
        }
        if self.connection.trim().is_empty() {
            return Err(invalid("'connection' is missing or blank"));
        }
        if let Some(p) = self.params.iter().find(|p| p.name.trim().is_empty()) {
            return Err(invalid(&format!(
                "parameter with source '{}' has a blank name",
                p.from
            )));
        }
        Ok(())
    }

    /// Lower-cased id used as the index key.
    pub fn key(&self) -> String {
        normalize_id(&self.id)
    }

    /// Parsed strategy tag.
    pub fn parsed_strategy(&self) -> Result<Strategy> {
        Strategy::parse(&self.strategy)
    }

    /// Effective timeout, substituting `default` when the definition says 0.
    pub fn effective_timeout(&self, default: Duration) -> Duration {
        if self.timeout == 0 {
            default
        } else {
            Duration::from_secs(self.timeout)
        }
    }

    /// Cache TTL, or `None` when caching is disabled.
    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache > 0).then(|| Duration::from_secs(self.cache))
    }
}

/// Normalize a command id for case-insensitive indexing.
pub fn normalize_id(id: &str) -> String {
    id.trim().to_lowercase()
}

/// How a parameter is bound to the procedure call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Bind name passed to the backend (e.g. `@UserId`)
    pub name: String,
    /// Source key: an argument name or an `@@token@@`; defaults to `name`
    #[serde(default)]
    pub from: String,
    /// Declared value type
    #[serde(default, rename = "type")]
    pub ty: ParamType,
    /// Whether an absent value is acceptable
    #[serde(default)]
    pub optional: bool,
}

impl ParamSpec {
    /// The key used to look up the runtime value.
    pub fn source_key(&self) -> &str {
        if self.from.trim().is_empty() {
            self.name.trim_start_matches('@')
        } else {
            &self.from
        }
    }
}

/// Declared parameter types.
///
/// Unrecognised tags in definition files deserialize to [`ParamType::String`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// 32-bit integer
    Int,
    /// 64-bit integer
    BigInt,
    /// Text
    #[default]
    String,
    /// Calendar date
    Date,
    /// Date and time without zone
    DateTime,
    /// Boolean bit
    Bit,
    /// Exact decimal, carried as text
    Decimal,
    /// Double-precision float
    Float,
    /// JSON document, carried as text
    Json,
    /// UUID
    Guid,
}

impl ParamType {
    /// Parse a type tag, defaulting to `String` for anything unknown.
    pub fn parse_lenient(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" => ParamType::Int,
            "bigint" | "long" => ParamType::BigInt,
            "date" => ParamType::Date,
            "datetime" => ParamType::DateTime,
            "bit" | "bool" | "boolean" => ParamType::Bit,
            "decimal" | "money" => ParamType::Decimal,
            "float" | "double" | "real" => ParamType::Float,
            "json" => ParamType::Json,
            "guid" | "uuid" | "uniqueidentifier" => ParamType::Guid,
            _ => ParamType::String,
        }
    }

    /// Lower-case tag as written in definition files.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::Int => "int",
            ParamType::BigInt => "bigint",
            ParamType::String => "string",
            ParamType::Date => "date",
            ParamType::DateTime => "datetime",
            ParamType::Bit => "bit",
            ParamType::Decimal => "decimal",
            ParamType::Float => "float",
            ParamType::Json => "json",
            ParamType::Guid => "guid",
        }
    }
}

impl<'de> Deserialize<'de> for ParamType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let tag = Option::<String>::deserialize(deserializer)?;
        Ok(tag.map(|t| ParamType::parse_lenient(&t)).unwrap_or_default())
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// One result set, no transaction
    Query,
    /// One result set inside a transaction guarded by the error column
    Transaction,
    /// Every result set, no transaction
    MultiResult,
    /// Every result set inside a transaction guarded by the first set
    MultiTransaction,
}

impl Strategy {
    /// All strategies in declaration order.
    pub const ALL: [Strategy; 4] = [
        Strategy::Query,
        Strategy::Transaction,
        Strategy::MultiResult,
        Strategy::MultiTransaction,
    ];

    /// Case-insensitive parse.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnrecognizedStrategy`] listing the valid options.
    pub fn parse(tag: &str) -> Result<Self> {
        let wanted = tag.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::UnrecognizedStrategy {
                strategy: tag.to_string(),
                valid: Self::ALL.iter().map(|s| s.as_str().to_string()).collect(),
            })
    }

    /// Canonical tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Query => "Query",
            Strategy::Transaction => "Transaction",
            Strategy::MultiResult => "MultiResult",
            Strategy::MultiTransaction => "MultiTransaction",
        }
    }

    /// Whether the strategy runs inside a transaction.
    pub fn is_transactional(&self) -> bool {
        matches!(self, Strategy::Transaction | Strategy::MultiTransaction)
    }

    /// Whether the strategy reads every result set.
    pub fn is_multi(&self) -> bool {
        matches!(self, Strategy::MultiResult | Strategy::MultiTransaction)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
