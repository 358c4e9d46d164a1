//! Test modules for the executor crate.

pub mod execute_many;
pub mod failures;
pub mod session;

use std::sync::Arc;

use procdispatch_core::{CommandDefinition, Row};
use procdispatch_registry::{CommandRegistry, RegistrySettings};
use serde_json::{json, Value};

use crate::{ConnectionMap, Executor, MemoryBackend};

/// Registry, backend and executor wired together.
pub(crate) struct Fixture {
    pub registry: Arc<CommandRegistry>,
    pub backend: MemoryBackend,
    pub executor: Executor,
}

impl Fixture {
    pub fn register(&self, json: &str) {
        self.registry.register(def(json));
    }
}

/// Fixture with one `main` connection and the given JSON definitions.
pub(crate) fn fixture(defs: &[&str]) -> Fixture {
    let registry = Arc::new(CommandRegistry::new(RegistrySettings::default()));
    for json in defs {
        registry.register(def(json));
    }
    let backend = MemoryBackend::new();
    let executor = Executor::builder(Arc::clone(&registry), Arc::new(backend.clone()))
        .connections(ConnectionMap::new().with("main", "memory://main"))
        .build();
    Fixture {
        registry,
        backend,
        executor,
    }
}

pub(crate) fn def(json: &str) -> CommandDefinition {
    CommandDefinition::from_json(json, "test").unwrap()
}

pub(crate) fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .fold(Row::new(), |r, (k, v)| r.with(*k, v.clone()))
}

/// Outcome row for transactional procedures.
pub(crate) fn status(code: Value, message: &str) -> Row {
    row(&[("ErrorCode", code), ("Message", json!(message))])
}
