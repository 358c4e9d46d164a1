//! Transaction scope and the outcome contract.
//!
//! A [`TransactionScope`] owns an open backend transaction and is finished
//! with exactly one of [`commit`](TransactionScope::commit) or
//! [`rollback`](TransactionScope::rollback). If the scope is dropped while
//! still open (a timeout cancelled the call, for instance) the transaction is
//! rolled back on the runtime in the background.

use procdispatch_core::{Error, Result, Row};
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{ProcedureBackend, ProcedureCall, ProcedureTransaction, RowSet};
use crate::config::TransactionSettings;

pub(crate) struct TransactionScope {
    txn: Option<Box<dyn ProcedureTransaction>>,
    procedure: String,
}

impl TransactionScope {
    pub(crate) async fn begin(
        backend: &dyn ProcedureBackend,
        connection: &str,
        procedure: &str,
    ) -> Result<Self> {
        let txn = backend.begin(connection).await?;
        debug!(target: "procdispatch::executor", procedure, "Transaction opened");
        Ok(Self {
            txn: Some(txn),
            procedure: procedure.to_string(),
        })
    }

    pub(crate) async fn execute(&mut self, call: &ProcedureCall) -> Result<Vec<RowSet>> {
        match self.txn.as_mut() {
            Some(txn) => txn.execute(call).await,
            None => Err(Error::backend("transaction is already finished")),
        }
    }

    pub(crate) async fn commit(mut self) -> Result<()> {
        match self.txn.take() {
            Some(txn) => txn.commit().await,
            None => Err(Error::backend("transaction is already finished")),
        }
    }

    /// Roll back. Failures are logged; the caller is already failing.
    pub(crate) async fn rollback(mut self) {
        if let Some(txn) = self.txn.take() {
            if let Err(e) = txn.rollback().await {
                warn!(
                    target: "procdispatch::executor",
                    procedure = %self.procedure,
                    error = %e,
                    "Rollback failed"
                );
            }
        }
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        let Some(txn) = self.txn.take() else {
            return;
        };
        warn!(
            target: "procdispatch::executor",
            procedure = %self.procedure,
            "Transaction abandoned, rolling back"
        );
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let procedure = std::mem::take(&mut self.procedure);
                runtime.spawn(async move {
                    if let Err(e) = txn.rollback().await {
                        warn!(
                            target: "procdispatch::executor",
                            procedure = %procedure,
                            error = %e,
                            "Rollback of abandoned transaction failed"
                        );
                    }
                });
            }
            // Backend handles must not commit when dropped unfinished
            Err(_) => drop(txn),
        }
    }
}

/// What the first row of a transactional procedure asks for.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Verdict {
    Commit { message: Option<String> },
    Rollback { message: Option<String> },
}

/// Read the outcome columns from the first row of the first result set.
///
/// # Errors
///
/// - [`Error::NoRows`] when there is no first row
/// - [`Error::ProcedureContractViolation`] when the error column is missing
pub(crate) fn inspect(
    sets: &[RowSet],
    settings: &TransactionSettings,
    procedure: &str,
) -> Result<Verdict> {
    let row: &Row = sets
        .first()
        .and_then(|set| set.first())
        .ok_or_else(|| Error::NoRows {
            procedure: procedure.to_string(),
        })?;

    let code = row
        .get(&settings.error_column)
        .ok_or_else(|| Error::ProcedureContractViolation {
            procedure: procedure.to_string(),
            reason: format!(
                "first row has no '{}' column (columns: {})",
                settings.error_column,
                row.columns().collect::<Vec<_>>().join(", ")
            ),
        })?;
    let message = row.get(&settings.message_column).and_then(message_text);

    if as_text(code).eq_ignore_ascii_case(settings.success_value.trim()) {
        Ok(Verdict::Commit { message })
    } else {
        Ok(Verdict::Rollback { message })
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
