//! procdispatch - declarative stored-procedure dispatcher
//!
//! Commands are described in JSON definition files: which procedure to call,
//! on which logical connection, with which parameters, under which
//! execution strategy, with which lookups and cache lifetime. The registry
//! loads a directory of definitions and keeps it live; the executor runs a
//! command by id and always answers with an [`ExecutionResult`].
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use procdispatch::{Args, CommandRegistry, DispatcherConfig, Executor};
//!
//! let config = DispatcherConfig::from_file("procdispatch.toml".as_ref())?;
//! let registry = Arc::new(CommandRegistry::new(config.registry.clone()));
//! registry.load_from_directory("commands", true);
//!
//! let executor = Executor::from_config(&config, registry, backend);
//! let result = executor
//!     .execute("orders.list", Some(&Args::new().with("status", "open".into())))
//!     .await;
//! ```
//!
//! # Architecture
//!
//! Definitions live in the [`CommandRegistry`]. Every call goes through the
//! [`Executor`], which talks to the database only through a
//! [`ProcedureBackend`].

pub use procdispatch_executor::*;
pub use procdispatch_registry::{CommandRegistry, InvalidationSignal, RegistrySettings};

pub use procdispatch_core::{
    dataset_key, normalize_id, CommandDefinition, NamedRows, ParamSpec, ParamType, Row, RowList,
    Strategy, DEFAULT_BUSINESS_FAILURE_MESSAGE, DEFAULT_TIMEOUT_SECS,
};
