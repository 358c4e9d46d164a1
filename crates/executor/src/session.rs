//! Caller-scoped execution.
//!
//! A [`Session`] pairs an [`Executor`] with the [`ExecutionContext`] of one
//! caller, so `@@userid@@`, `@@username@@` and custom tokens resolve without
//! passing the context on every call.
//!
//! # Usage
//!
//! ```ignore
//! use procdispatch_executor::Session;
//!
//! let mut session = Session::new(executor.clone(), ExecutionContext::new(42, "ann"));
//! session.set_token("tenant", json!("acme"));
//!
//! let result = session.execute("orders.mine", None).await;
//! ```

use procdispatch_core::{Args, ExecutionContext, ExecutionResult};
use serde_json::Value;

use crate::Executor;

/// An executor bound to one caller's context.
#[derive(Clone)]
pub struct Session {
    executor: Executor,
    context: ExecutionContext,
}

impl Session {
    /// Create a session for `context`.
    pub fn new(executor: Executor, context: ExecutionContext) -> Self {
        Self { executor, context }
    }

    /// The caller context.
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Add or replace a custom token for subsequent calls.
    pub fn set_token(&mut self, name: impl Into<String>, value: Value) {
        self.context.set_token(name, value);
    }

    /// Execute a command as this caller.
    pub async fn execute(&self, id: &str, args: Option<&Args>) -> ExecutionResult {
        self.executor.execute_with(Some(&self.context), id, args).await
    }

    /// Execute several commands as this caller. Results keep input order.
    pub async fn execute_many(&self, calls: Vec<(String, Option<Args>)>) -> Vec<ExecutionResult> {
        self.executor.execute_many(Some(&self.context), calls).await
    }

    /// Get a reference to the underlying executor.
    pub fn executor(&self) -> &Executor {
        &self.executor
    }
}
