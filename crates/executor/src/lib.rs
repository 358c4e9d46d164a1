//! # procdispatch executor
//!
//! Runs registered command definitions against a procedure backend.
//!
//! - [`Executor`] - dispatch a command by id, with strategy handlers,
//!   parameter binding, result caching and include fan-out
//! - [`Session`] - an executor bound to one caller's [`ExecutionContext`]
//! - [`ProcedureBackend`] - the seam to the database
//! - [`MemoryBackend`] - closure-backed backend for tests and demos
//! - [`DispatcherConfig`] - `procdispatch.toml`
//!
//! ## Strategies
//!
//! | Strategy | Transaction | Result |
//! |----------|-------------|--------|
//! | **Query** | no | first result set in `data` |
//! | **Transaction** | yes | first result set in `data` |
//! | **MultiResult** | no | every set in `datasets` |
//! | **MultiTransaction** | yes | every set in `datasets` |
//!
//! Transactional strategies commit only when the first row of the first
//! result set carries the configured success code.

#![warn(missing_docs)]

mod backend;
mod bind;
mod cache;
mod config;
mod connections;
mod executor;
mod memory;
mod session;
mod transaction;

// Handler modules
mod handlers;

// Test modules
#[cfg(test)]
mod tests;

pub use backend::{BoundParam, ProcedureBackend, ProcedureCall, ProcedureTransaction, RowSet, SqlValue};
pub use bind::{bind_params, ParamSource, CALLER_ID_TOKEN, CALLER_NAME_TOKEN, TOKEN_DELIMITER};
pub use cache::{cache_key, CachedValue, MokaResultCache, ResultCache, DEFAULT_MAX_ENTRIES};
pub use config::{CacheSettings, DispatcherConfig, TransactionSettings, CONFIG_FILE_NAME};
pub use connections::{ConnectionMap, ConnectionResolver};
pub use executor::{Executor, ExecutorBuilder};
pub use memory::{Handler, MemoryBackend};
pub use session::Session;

pub use procdispatch_core::{Args, Error, ErrorKind, ExecutionContext, ExecutionResult, Result};
