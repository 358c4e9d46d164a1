//! Command registry for procdispatch
//!
//! Loads command definitions from a directory tree, keeps them in a
//! lock-guarded index, and optionally watches the directory so edits,
//! deletions and renames are applied live:
//!
//! - [`CommandRegistry`]: the index and its public operations
//! - [`InvalidationSignal`]: one-shot per-command signal fired on every
//!   replacement or removal, used by caches to drop dependent entries
//! - [`RegistrySettings`]: file extension, debounce and retry tuning

#![warn(missing_docs)]

mod loader;
mod registry;
mod settings;
mod signal;
mod watcher;

pub use registry::CommandRegistry;
pub use settings::RegistrySettings;
pub use signal::InvalidationSignal;
