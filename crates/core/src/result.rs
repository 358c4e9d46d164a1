//! The uniform outcome of one command execution.
//!
//! An [`ExecutionResult`] is always produced, whether the call succeeded,
//! failed inside the engine, or was rejected by the procedure itself. Build
//! one through the named constructors so that exactly one of success/failure
//! is set and every container starts empty.

use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::error::{Error, ErrorKind};
use crate::row::{NamedRows, RowList};

/// Message used when a procedure reports an error without a message column value.
pub const DEFAULT_BUSINESS_FAILURE_MESSAGE: &str = "procedure reported an error";

/// Outcome of executing a command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    /// True iff the call succeeded
    pub success: bool,
    /// Set iff the call failed
    pub error_message: Option<String>,
    /// Taxonomy tag, set iff the call failed
    pub error_kind: Option<ErrorKind>,
    /// Rows for `Query` / `Transaction`
    pub data: RowList,
    /// Result sets for `MultiResult` / `MultiTransaction`, keyed `info`, `info2`, ...
    pub datasets: NamedRows,
    /// Include id -> rows
    pub lookups: NamedRows,
    /// The procedure reported a business error and the transaction was rolled back
    pub has_transaction_error: bool,
    /// Message column of the first row for transactional strategies
    pub transaction_message: Option<String>,
    /// Fresh id per call
    pub trace_id: String,
    /// Command id as requested
    pub command_id: String,
    /// Wall-clock time spent in the call
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    /// Served from the result cache
    pub from_cache: bool,
}

fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl ExecutionResult {
    fn blank(success: bool) -> Self {
        Self {
            success,
            error_message: None,
            error_kind: None,
            data: RowList::new(),
            datasets: NamedRows::new(),
            lookups: NamedRows::new(),
            has_transaction_error: false,
            transaction_message: None,
            trace_id: String::new(),
            command_id: String::new(),
            elapsed: Duration::ZERO,
            from_cache: false,
        }
    }

    /// Successful single-result-set outcome.
    pub fn success(data: RowList) -> Self {
        Self {
            data,
            ..Self::blank(true)
        }
    }

    /// Successful multi-result-set outcome.
    pub fn success_multi(datasets: NamedRows) -> Self {
        Self {
            datasets,
            ..Self::blank(true)
        }
    }

    /// Committed transaction with a single result set.
    pub fn success_transaction(data: RowList, message: Option<String>) -> Self {
        Self {
            data,
            transaction_message: message,
            ..Self::blank(true)
        }
    }

    /// Committed transaction with several result sets.
    pub fn success_multi_transaction(datasets: NamedRows, message: Option<String>) -> Self {
        Self {
            datasets,
            transaction_message: message,
            ..Self::blank(true)
        }
    }

    /// Engine-level failure.
    pub fn fail(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            error_message: Some(message.into()),
            error_kind: Some(kind),
            ..Self::blank(false)
        }
    }

    /// Business failure: the procedure reported an error and nothing was committed.
    pub fn fail_transaction(message: Option<String>) -> Self {
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BUSINESS_FAILURE_MESSAGE.to_string());
        Self {
            error_message: Some(message.clone()),
            error_kind: Some(ErrorKind::TransactionBusinessFailure),
            has_transaction_error: true,
            transaction_message: Some(message),
            ..Self::blank(false)
        }
    }

    /// Failure carrying the message and kind of `err`.
    pub fn from_error(err: &Error) -> Self {
        Self::fail(err.to_string(), err.kind())
    }

    /// Whether the call failed.
    pub fn is_failure(&self) -> bool {
        !self.success
    }

    /// Rows of the named dataset, empty if absent.
    pub fn dataset(&self, name: &str) -> &RowList {
        &self.datasets[name]
    }

    /// Rows of the named include, empty if absent.
    pub fn lookup(&self, id: &str) -> &RowList {
        &self.lookups[id]
    }

    /// Rows that represent this result when it is used as an include:
    /// `data` for single-set strategies, the `info` dataset otherwise.
    pub fn primary_rows(&self) -> RowList {
        if self.data.is_empty() && !self.datasets.is_empty() {
            self.datasets["info"].clone()
        } else {
            self.data.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Row;
    use serde_json::json;

    #[test]
    fn test_success_has_no_error() {
        let r = ExecutionResult::success(vec![Row::new().with("a", json!(1))]);
        assert!(r.success);
        assert!(r.error_message.is_none());
        assert!(r.error_kind.is_none());
        assert!(r.datasets.is_empty());
        assert!(r.lookups.is_empty());
    }

    #[test]
    fn test_fail_sets_message_and_kind() {
        let r = ExecutionResult::fail("boom", ErrorKind::Unhandled);
        assert!(r.is_failure());
        assert_eq!(r.error_message.as_deref(), Some("boom"));
        assert!(r.data.is_empty());
        assert!(!r.has_transaction_error);
    }

    #[test]
    fn test_fail_transaction_defaults_message() {
        let r = ExecutionResult::fail_transaction(Some("  ".into()));
        assert!(r.has_transaction_error);
        assert_eq!(
            r.transaction_message.as_deref(),
            Some(DEFAULT_BUSINESS_FAILURE_MESSAGE)
        );
        assert_eq!(r.error_kind, Some(ErrorKind::TransactionBusinessFailure));
    }

    #[test]
    fn test_missing_dataset_is_empty() {
        let r = ExecutionResult::success_multi(NamedRows::new());
        assert!(r.dataset("info3").is_empty());
        assert!(r.lookup("anything").is_empty());
    }

    #[test]
    fn test_primary_rows_prefers_first_dataset_for_multi() {
        let mut sets = NamedRows::new();
        sets.insert("info", vec![Row::new().with("k", json!("v"))]);
        sets.insert("info2", vec![]);
        let r = ExecutionResult::success_multi(sets);
        assert_eq!(r.primary_rows().len(), 1);
    }

    #[test]
    fn test_serializes_elapsed_as_millis() {
        let mut r = ExecutionResult::success(vec![]);
        r.elapsed = Duration::from_millis(1500);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["elapsed_ms"], json!(1500));
    }
}
