//! Strategy handlers.
//!
//! | Module | Strategies | Result shape |
//! |--------|------------|--------------|
//! | `query` | `Query` | `data` = first result set |
//! | `multi` | `MultiResult` | `datasets` keyed `info`, `info2`, … |
//! | `transactional` | `Transaction`, `MultiTransaction` | as above, behind the outcome contract |

pub(crate) mod multi;
pub(crate) mod query;
pub(crate) mod transactional;

use std::sync::Arc;

use procdispatch_core::{ExecutionResult, Result, Strategy};

use crate::backend::{ProcedureBackend, ProcedureCall};
use crate::config::TransactionSettings;

/// Run `call` with the handler for `strategy`.
pub(crate) async fn dispatch(
    backend: Arc<dyn ProcedureBackend>,
    strategy: Strategy,
    connection: String,
    call: ProcedureCall,
    settings: TransactionSettings,
) -> Result<ExecutionResult> {
    match strategy {
        Strategy::Query => query::run(backend.as_ref(), &connection, &call).await,
        Strategy::MultiResult => multi::run(backend.as_ref(), &connection, &call).await,
        Strategy::Transaction => {
            transactional::run(backend.as_ref(), &connection, &call, &settings, false).await
        }
        Strategy::MultiTransaction => {
            transactional::run(backend.as_ref(), &connection, &call, &settings, true).await
        }
    }
}
