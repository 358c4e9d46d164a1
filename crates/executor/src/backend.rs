//! The procedure backend seam.
//!
//! The executor never talks to a database directly. It hands a fully bound
//! [`ProcedureCall`] to a [`ProcedureBackend`], which owns connections,
//! pooling and the wire protocol, and gets back zero or more result sets.
//! Transactional strategies ask the backend for an explicit
//! [`ProcedureTransaction`] handle and finish it with `commit` or `rollback`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use procdispatch_core::{ParamType, Result, RowList};
use serde::Serialize;
use uuid::Uuid;

/// One result set as returned by the backend.
pub type RowSet = RowList;

/// Native parameter value, typed by the parameter's declared [`ParamType`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum SqlValue {
    /// SQL NULL
    Null,
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    BigInt(i64),
    /// Text
    String(String),
    /// Calendar date
    Date(NaiveDate),
    /// Date and time
    DateTime(NaiveDateTime),
    /// Boolean
    Bit(bool),
    /// Exact decimal as written
    Decimal(String),
    /// Double
    Float(f64),
    /// JSON text
    Json(String),
    /// UUID
    Guid(Uuid),
}

impl SqlValue {
    /// Whether the value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

/// A parameter ready to be sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundParam {
    /// Bind name from the definition
    pub name: String,
    /// Declared type
    pub ty: ParamType,
    /// Coerced value
    pub value: SqlValue,
}

/// A fully resolved procedure invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureCall {
    /// Id of the command that produced the call
    pub command_id: String,
    /// Procedure name
    pub procedure: String,
    /// Parameters in definition order
    pub params: Vec<BoundParam>,
    /// Time budget the backend should enforce
    pub timeout: Duration,
}

impl ProcedureCall {
    /// Bound value by parameter name (case-insensitive).
    pub fn param(&self, name: &str) -> Option<&SqlValue> {
        self.params
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| &p.value)
    }
}

/// Executes procedure calls against a physical connection.
///
/// Implementations must be safe to share across tasks. Failures should be
/// reported as [`procdispatch_core::Error::Backend`] (or `Timeout`) with the
/// original message embedded; the executor converts them into failed
/// results.
#[async_trait]
pub trait ProcedureBackend: Send + Sync {
    /// Run `call` outside any transaction and return every result set.
    async fn execute(&self, connection: &str, call: &ProcedureCall) -> Result<Vec<RowSet>>;

    /// Open a transaction on `connection`.
    async fn begin(&self, connection: &str) -> Result<Box<dyn ProcedureTransaction>>;
}

/// An open backend transaction.
///
/// The executor always finishes a handle with exactly one of
/// [`commit`](Self::commit) or [`rollback`](Self::rollback). A handle that is
/// dropped unfinished must not commit.
#[async_trait]
pub trait ProcedureTransaction: Send {
    /// Run `call` inside the transaction.
    async fn execute(&mut self, call: &ProcedureCall) -> Result<Vec<RowSet>>;

    /// Make the transaction's effects durable.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard the transaction's effects.
    async fn rollback(self: Box<Self>) -> Result<()>;
}
