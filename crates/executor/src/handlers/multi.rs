//! `MultiResult`: every result set, keyed by ordinal.

use procdispatch_core::{dataset_key, ExecutionResult, NamedRows, Result};

use crate::backend::{ProcedureBackend, ProcedureCall, RowSet};

pub(crate) async fn run(
    backend: &dyn ProcedureBackend,
    connection: &str,
    call: &ProcedureCall,
) -> Result<ExecutionResult> {
    let sets = backend.execute(connection, call).await?;
    Ok(ExecutionResult::success_multi(name_sets(sets)))
}

/// `info`, `info2`, `info3`, … in result order.
pub(crate) fn name_sets(sets: Vec<RowSet>) -> NamedRows {
    let mut datasets = NamedRows::new();
    for (ordinal, rows) in sets.into_iter().enumerate() {
        datasets.insert(dataset_key(ordinal), rows);
    }
    datasets
}
