//! `Transaction` and `MultiTransaction`.
//!
//! Both open a transaction, run the procedure, and read the outcome
//! contract from the first row of the first result set. Every path out of
//! [`run`] finishes the scope explicitly: commit on the success code,
//! rollback on any other code and on every error.

use procdispatch_core::{ExecutionResult, Result};
use tracing::debug;

use super::multi::name_sets;
use crate::backend::{ProcedureBackend, ProcedureCall};
use crate::config::TransactionSettings;
use crate::transaction::{inspect, TransactionScope, Verdict};

pub(crate) async fn run(
    backend: &dyn ProcedureBackend,
    connection: &str,
    call: &ProcedureCall,
    settings: &TransactionSettings,
    multi: bool,
) -> Result<ExecutionResult> {
    let mut scope = TransactionScope::begin(backend, connection, &call.procedure).await?;

    let sets = match scope.execute(call).await {
        Ok(sets) => sets,
        Err(e) => {
            scope.rollback().await;
            return Err(e);
        }
    };

    let verdict = match inspect(&sets, settings, &call.procedure) {
        Ok(verdict) => verdict,
        Err(e) => {
            scope.rollback().await;
            return Err(e);
        }
    };

    match verdict {
        Verdict::Commit { message } => {
            scope.commit().await?;
            debug!(target: "procdispatch::executor", procedure = %call.procedure, "Committed");
            if multi {
                Ok(ExecutionResult::success_multi_transaction(name_sets(sets), message))
            } else {
                let data = sets.into_iter().next().unwrap_or_default();
                Ok(ExecutionResult::success_transaction(data, message))
            }
        }
        Verdict::Rollback { message } => {
            scope.rollback().await;
            debug!(target: "procdispatch::executor", procedure = %call.procedure, "Rolled back");
            Ok(ExecutionResult::fail_transaction(message))
        }
    }
}
