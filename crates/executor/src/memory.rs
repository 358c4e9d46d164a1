//! In-process procedure backend.
//!
//! [`MemoryBackend`] maps procedure names to Rust closures. It records every
//! call and keeps transactional calls in a per-transaction buffer that is
//! only published to [`MemoryBackend::committed_calls`] on commit, so tests
//! can observe commit and rollback behaviour directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use procdispatch_core::{Error, Result};
use tracing::trace;

use crate::backend::{ProcedureBackend, ProcedureCall, ProcedureTransaction, RowSet};

/// Procedure body: maps a call to its result sets.
pub type Handler = Arc<dyn Fn(&ProcedureCall) -> Result<Vec<RowSet>> + Send + Sync>;

#[derive(Clone)]
struct Procedure {
    handler: Handler,
    latency: Duration,
}

#[derive(Default)]
struct Journal {
    calls: Mutex<Vec<(String, ProcedureCall)>>,
    committed: Mutex<Vec<ProcedureCall>>,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// A backend whose procedures are registered closures.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    procedures: Arc<RwLock<HashMap<String, Procedure>>>,
    journal: Arc<Journal>,
}

impl MemoryBackend {
    /// Empty backend: every call fails until procedures are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `procedure` with a handler.
    pub fn on<F>(&self, procedure: &str, handler: F) -> &Self
    where
        F: Fn(&ProcedureCall) -> Result<Vec<RowSet>> + Send + Sync + 'static,
    {
        self.procedures.write().insert(
            procedure.to_lowercase(),
            Procedure {
                handler: Arc::new(handler),
                latency: Duration::ZERO,
            },
        );
        self
    }

    /// Register `procedure` to always return `sets`.
    pub fn on_rows(&self, procedure: &str, sets: Vec<RowSet>) -> &Self {
        self.on(procedure, move |_| Ok(sets.clone()))
    }

    /// Make an already registered procedure sleep before answering.
    pub fn with_latency(&self, procedure: &str, latency: Duration) -> &Self {
        if let Some(p) = self.procedures.write().get_mut(&procedure.to_lowercase()) {
            p.latency = latency;
        }
        self
    }

    /// Total procedure invocations, transactional or not.
    pub fn call_count(&self) -> usize {
        self.journal.calls.lock().len()
    }

    /// Invocations of one procedure.
    pub fn calls_to(&self, procedure: &str) -> usize {
        self.journal
            .calls
            .lock()
            .iter()
            .filter(|(_, c)| c.procedure.eq_ignore_ascii_case(procedure))
            .count()
    }

    /// Every call in arrival order.
    pub fn calls(&self) -> Vec<ProcedureCall> {
        self.journal.calls.lock().iter().map(|(_, c)| c.clone()).collect()
    }

    /// Connection strings seen, in arrival order.
    pub fn connections_used(&self) -> Vec<String> {
        self.journal.calls.lock().iter().map(|(conn, _)| conn.clone()).collect()
    }

    /// Calls made inside transactions that were committed.
    pub fn committed_calls(&self) -> Vec<ProcedureCall> {
        self.journal.committed.lock().clone()
    }

    /// Transactions opened.
    pub fn begins(&self) -> usize {
        self.journal.begins.load(Ordering::SeqCst)
    }

    /// Transactions committed.
    pub fn commits(&self) -> usize {
        self.journal.commits.load(Ordering::SeqCst)
    }

    /// Transactions rolled back.
    pub fn rollbacks(&self) -> usize {
        self.journal.rollbacks.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were executing at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.journal.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn invoke(&self, connection: &str, call: &ProcedureCall) -> Result<Vec<RowSet>> {
        let procedure = self
            .procedures
            .read()
            .get(&call.procedure.to_lowercase())
            .cloned();
        self.journal
            .calls
            .lock()
            .push((connection.to_string(), call.clone()));
        let Some(procedure) = procedure else {
            return Err(Error::backend(format!(
                "could not find stored procedure '{}'",
                call.procedure
            )));
        };

        let now = self.journal.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.journal.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.journal);

        trace!(target: "procdispatch::backend", procedure = %call.procedure, "Invoking");
        if !procedure.latency.is_zero() {
            tokio::time::sleep(procedure.latency).await;
        }
        (procedure.handler)(call)
    }
}

struct InFlight<'a>(&'a Journal);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProcedureBackend for MemoryBackend {
    async fn execute(&self, connection: &str, call: &ProcedureCall) -> Result<Vec<RowSet>> {
        self.invoke(connection, call).await
    }

    async fn begin(&self, connection: &str) -> Result<Box<dyn ProcedureTransaction>> {
        self.journal.begins.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryTransaction {
            backend: self.clone(),
            connection: connection.to_string(),
            pending: Vec::new(),
        }))
    }
}

struct MemoryTransaction {
    backend: MemoryBackend,
    connection: String,
    pending: Vec<ProcedureCall>,
}

#[async_trait]
impl ProcedureTransaction for MemoryTransaction {
    async fn execute(&mut self, call: &ProcedureCall) -> Result<Vec<RowSet>> {
        let sets = self.backend.invoke(&self.connection, call).await?;
        self.pending.push(call.clone());
        Ok(sets)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction { backend, pending, .. } = *self;
        backend.journal.commits.fetch_add(1, Ordering::SeqCst);
        backend.journal.committed.lock().extend(pending);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.backend.journal.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procdispatch_core::Row;
    use serde_json::json;

    fn call(procedure: &str) -> ProcedureCall {
        ProcedureCall {
            command_id: "t".into(),
            procedure: procedure.into(),
            params: Vec::new(),
            timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_unknown_procedure_is_backend_error() {
        let backend = MemoryBackend::new();
        let err = backend.execute("c", &call("missing")).await.unwrap_err();
        assert!(err.to_string().contains("missing"));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_pending_calls() {
        let backend = MemoryBackend::new();
        backend.on_rows("p", vec![vec![Row::new().with("a", json!(1))]]);

        let mut txn = backend.begin("c").await.unwrap();
        txn.execute(&call("p")).await.unwrap();
        txn.rollback().await.unwrap();
        assert!(backend.committed_calls().is_empty());

        let mut txn = backend.begin("c").await.unwrap();
        txn.execute(&call("P")).await.unwrap();
        txn.commit().await.unwrap();
        assert_eq!(backend.committed_calls().len(), 1);
        assert_eq!((backend.begins(), backend.commits(), backend.rollbacks()), (2, 1, 1));
    }
}
