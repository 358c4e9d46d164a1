//! Error types for command loading and execution.
//!
//! All failures in the dispatcher are represented by the [`Error`] enum.
//! These errors are:
//! - **Structured**: Each variant has typed fields for error details
//! - **Serializable**: Can be converted to/from JSON
//! - **Actionable**: Messages say what was missing, what was expected and what exists
//!
//! Errors never cross the executor boundary. The executor converts them into a
//! failed [`ExecutionResult`](crate::ExecutionResult) tagged with the
//! [`ErrorKind`] of the variant.

use serde::{Deserialize, Serialize};

/// Result type alias for dispatcher operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum number of known command ids listed in a not-found message.
pub const MAX_LISTED_IDS: usize = 10;

/// Dispatcher errors.
///
/// # Categories
///
/// | Category | Variants | Description |
/// |----------|----------|-------------|
/// | Lookup | `CommandNotFound` | Unknown command id |
/// | Load | `InvalidDefinition`, `TransientIo` | Definition file problems |
/// | Binding | `RequiredParameterMissing`, `UnknownToken`, `MissingContext`, `InvalidParameter` | Parameter resolution |
/// | Dispatch | `UnrecognizedStrategy`, `ConnectionNotConfigured` | Definition refers to something unknown |
/// | Contract | `ProcedureContractViolation`, `NoRows` | Procedure output breaks the transaction contract |
/// | System | `Timeout`, `Config`, `Backend` | Environment failures |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum Error {
    // ==================== Lookup ====================
    /// No definition is registered under the id
    #[error("command '{id}' not found. Known commands: {}", format_known(.known))]
    CommandNotFound { id: String, known: Vec<String> },

    // ==================== Load ====================
    /// Definition file could not be parsed or is structurally invalid
    #[error("invalid definition in '{path}': {reason}")]
    InvalidDefinition { path: String, reason: String },

    /// Definition file could not be read (retried during hot reload)
    #[error("I/O error reading '{path}': {reason}")]
    TransientIo { path: String, reason: String },

    // ==================== Binding ====================
    /// A non-optional parameter resolved to nothing
    #[error("command '{command}': required parameter '{param}' (from '{from_key}') has no value")]
    RequiredParameterMissing {
        command: String,
        param: String,
        from_key: String,
    },

    /// A custom `@@token@@` was not present in the execution context
    #[error("unknown token '{token}'. Available tokens: {}", format_list(.available))]
    UnknownToken {
        token: String,
        available: Vec<String>,
    },

    /// An identity token was used without an execution context
    #[error("token '{token}' requires an execution context but none was provided")]
    MissingContext { token: String },

    /// A value could not be converted to the declared parameter type
    #[error("parameter '{param}' expects {expected}: {reason}")]
    InvalidParameter {
        param: String,
        expected: String,
        reason: String,
    },

    // ==================== Dispatch ====================
    /// Strategy tag is not one of the known strategies
    #[error("unrecognized strategy '{strategy}'. Valid strategies: {}", .valid.join(", "))]
    UnrecognizedStrategy { strategy: String, valid: Vec<String> },

    /// Logical connection name has no configured connection string
    #[error("connection '{name}' is not configured. Configured connections: {}", format_list(.available))]
    ConnectionNotConfigured { name: String, available: Vec<String> },

    // ==================== Contract ====================
    /// Procedure output is missing a column the strategy requires
    #[error("procedure '{procedure}' violates the transaction contract: {reason}")]
    ProcedureContractViolation { procedure: String, reason: String },

    /// Transactional procedure returned an empty first result set
    #[error("SP returned no rows (procedure '{procedure}')")]
    NoRows { procedure: String },

    // ==================== System ====================
    /// Procedure call exceeded its timeout
    #[error("procedure '{procedure}' timed out after {seconds}s")]
    Timeout { procedure: String, seconds: u64 },

    /// Configuration file could not be read or parsed
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// Any other failure reported by the procedure backend
    #[error("backend error: {reason}")]
    Backend { reason: String },
}

/// Coarse classification of a failed execution.
///
/// Every [`Error`] variant maps to exactly one kind. `TransactionBusinessFailure`
/// has no error variant: it tags results where the procedure itself reported
/// an error and the transaction was rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Unknown command id
    CommandNotFound,
    /// Unparseable or blank-id definition
    InvalidDefinition,
    /// Non-optional parameter without a value
    RequiredParameterMissing,
    /// Custom token absent from the context
    UnknownToken,
    /// Operation requires state that is not available
    InvalidOperation,
    /// Value not convertible to the declared type
    InvalidParameter,
    /// Unknown strategy tag
    UnrecognizedStrategy,
    /// Unknown logical connection
    ConnectionNotConfigured,
    /// Missing error/message column or empty result
    ProcedureContractViolation,
    /// Procedure reported a business error, transaction rolled back
    TransactionBusinessFailure,
    /// File read failure during reload
    TransientIo,
    /// Call exceeded its timeout
    Timeout,
    /// Bad configuration file
    Config,
    /// Anything else from the backend
    Unhandled,
}

impl Error {
    /// Build a `CommandNotFound` error, keeping at most [`MAX_LISTED_IDS`] known ids.
    pub fn command_not_found(id: impl Into<String>, known: impl IntoIterator<Item = String>) -> Self {
        Error::CommandNotFound {
            id: id.into(),
            known: known.into_iter().take(MAX_LISTED_IDS).collect(),
        }
    }

    /// Build a `Backend` error from anything displayable.
    pub fn backend(reason: impl std::fmt::Display) -> Self {
        Error::Backend {
            reason: reason.to_string(),
        }
    }

    /// Build a `Config` error.
    pub fn config(reason: impl Into<String>) -> Self {
        Error::Config {
            reason: reason.into(),
        }
    }

    /// The taxonomy tag of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::CommandNotFound { .. } => ErrorKind::CommandNotFound,
            Error::InvalidDefinition { .. } => ErrorKind::InvalidDefinition,
            Error::TransientIo { .. } => ErrorKind::TransientIo,
            Error::RequiredParameterMissing { .. } => ErrorKind::RequiredParameterMissing,
            Error::UnknownToken { .. } => ErrorKind::UnknownToken,
            Error::MissingContext { .. } => ErrorKind::InvalidOperation,
            Error::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            Error::UnrecognizedStrategy { .. } => ErrorKind::UnrecognizedStrategy,
            Error::ConnectionNotConfigured { .. } => ErrorKind::ConnectionNotConfigured,
            Error::ProcedureContractViolation { .. } | Error::NoRows { .. } => {
                ErrorKind::ProcedureContractViolation
            }
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Config { .. } => ErrorKind::Config,
            Error::Backend { .. } => ErrorKind::Unhandled,
        }
    }

    /// Whether a reload should be retried after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientIo { .. })
    }
}

fn format_list(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

fn format_known(items: &[String]) -> String {
    let listed = format_list(items);
    if items.len() >= MAX_LISTED_IDS {
        format!("{}, ...", listed)
    } else {
        listed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_not_found_message() {
        let err = Error::command_not_found("rh.missing", vec!["a".to_string(), "b".to_string()]);
        let msg = err.to_string();
        assert!(msg.contains("rh.missing"));
        assert!(msg.contains("not found"));
        assert!(msg.contains("a, b"));
    }

    #[test]
    fn test_command_not_found_truncates_known_ids() {
        let known = (0..25).map(|i| format!("cmd.{}", i));
        let err = Error::command_not_found("x", known);
        match &err {
            Error::CommandNotFound { known, .. } => assert_eq!(known.len(), MAX_LISTED_IDS),
            other => panic!("unexpected {:?}", other),
        }
        assert!(err.to_string().ends_with("..."));
    }

    #[test]
    fn test_empty_lists_render_none() {
        let err = Error::UnknownToken {
            token: "tenant".into(),
            available: vec![],
        };
        assert!(err.to_string().contains("(none)"));
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            Error::NoRows {
                procedure: "p".into()
            }
            .kind(),
            ErrorKind::ProcedureContractViolation
        );
        assert_eq!(Error::backend("boom").kind(), ErrorKind::Unhandled);
        assert_eq!(
            Error::MissingContext {
                token: "@@userid@@".into()
            }
            .kind(),
            ErrorKind::InvalidOperation
        );
    }

    #[test]
    fn test_only_io_is_transient() {
        let io = Error::TransientIo {
            path: "a.json".into(),
            reason: "locked".into(),
        };
        assert!(io.is_transient());
        assert!(!Error::config("bad").is_transient());
    }

    #[test]
    fn test_error_roundtrips_through_json() {
        let err = Error::UnrecognizedStrategy {
            strategy: "Bulk".into(),
            valid: vec!["Query".into()],
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: Error = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
