//! `Query`: one call, first result set only.

use procdispatch_core::{ExecutionResult, Result};

use crate::backend::{ProcedureBackend, ProcedureCall};

pub(crate) async fn run(
    backend: &dyn ProcedureBackend,
    connection: &str,
    call: &ProcedureCall,
) -> Result<ExecutionResult> {
    let sets = backend.execute(connection, call).await?;
    let data = sets.into_iter().next().unwrap_or_default();
    Ok(ExecutionResult::success(data))
}
