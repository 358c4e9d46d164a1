//! Core types for procdispatch
//!
//! This crate defines the data model shared by the registry and the executor:
//! - CommandDefinition / ParamSpec: one named stored-procedure operation
//! - Strategy / ParamType: execution mode and declared parameter types
//! - Args: caller-supplied, case-insensitive argument bag
//! - ExecutionContext: caller identity and custom tokens
//! - Row / NamedRows: tabular results
//! - ExecutionResult: the never-failing outcome of a call
//! - Error / ErrorKind: error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod args;
pub mod context;
pub mod definition;
pub mod error;
pub mod result;
pub mod row;

pub use args::Args;
pub use context::ExecutionContext;
pub use definition::{
    normalize_id, CommandDefinition, ParamSpec, ParamType, Strategy, DEFAULT_TIMEOUT_SECS,
};
pub use error::{Error, ErrorKind, Result, MAX_LISTED_IDS};
pub use result::{ExecutionResult, DEFAULT_BUSINESS_FAILURE_MESSAGE};
pub use row::{dataset_key, NamedRows, Row, RowList};
