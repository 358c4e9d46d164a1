//! The live command index.
//!
//! [`CommandRegistry`] owns every loaded [`CommandDefinition`], the map from
//! source file to command id, and one [`InvalidationSignal`] per id.
//!
//! # Locking
//!
//! The index and the file map sit behind a single `parking_lot::Mutex`, so a
//! reader never sees one updated without the other. Full directory loads
//! build the replacement map without the lock and publish it in one swap.
//! Signals and pending debounce timers live in `DashMap`s outside that lock;
//! signals are always fired after the index lock has been released.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use procdispatch_core::{normalize_id, CommandDefinition, Error, Result};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::loader;
use crate::settings::RegistrySettings;
use crate::signal::InvalidationSignal;
use crate::watcher::{self, WatchHandle};

#[derive(Default)]
struct IndexState {
    index: HashMap<String, Arc<CommandDefinition>>,
    files: HashMap<PathBuf, String>,
}

/// A debounce timer waiting to reload one file.
pub(crate) struct PendingReload {
    pub generation: u64,
    pub handle: AbortHandle,
}

/// State shared between the registry handle and its watcher tasks.
pub(crate) struct Shared {
    state: Mutex<IndexState>,
    signals: DashMap<String, InvalidationSignal>,
    pub(crate) pending: DashMap<PathBuf, PendingReload>,
    pub(crate) settings: RegistrySettings,
}

impl Shared {
    fn new(settings: RegistrySettings) -> Self {
        Self {
            state: Mutex::new(IndexState::default()),
            signals: DashMap::new(),
            pending: DashMap::new(),
            settings,
        }
    }

    /// Replace the whole index and invalidate every id present before or after.
    fn publish(&self, snapshot: loader::Snapshot) {
        let affected: BTreeSet<String> = {
            let mut state = self.state.lock();
            let mut affected: BTreeSet<String> = state.index.keys().cloned().collect();
            affected.extend(snapshot.index.keys().cloned());
            state.index = snapshot.index;
            state.files = snapshot.files;
            affected
        };
        for key in affected {
            self.invalidate(&key);
        }
    }

    /// Install a definition loaded from `path`.
    pub(crate) fn apply_file(&self, path: &Path, def: CommandDefinition) {
        let key = def.key();
        let id = def.id.clone();
        let mut affected = vec![key.clone()];
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let previous_key = state.files.insert(path.to_path_buf(), key.clone());
            if let Some(old_key) = previous_key.filter(|k| *k != key) {
                if Self::owned_by(state, &old_key, path) {
                    state.index.remove(&old_key);
                }
                info!(target: "procdispatch::registry", old = %old_key, new = %id, file = %path.display(), "Command id changed on reload");
                affected.push(old_key);
            }
            let displaced = state
                .index
                .get(&key)
                .and_then(|existing| existing.source.clone())
                .filter(|other| other.as_path() != path);
            if let Some(other) = displaced {
                warn!(target: "procdispatch::registry", id = %id, file = %path.display(), previous = %other.display(), "Duplicate command id, reloaded file wins");
                state.files.remove(&other);
            }
            state.index.insert(key, Arc::new(def));
        }
        info!(target: "procdispatch::registry", id = %id, file = %path.display(), "Reloaded command definition");
        for key in affected {
            self.invalidate(&key);
        }
    }

    /// Forget the definition loaded from `path`. Returns the removed key.
    pub(crate) fn remove_file(&self, path: &Path) -> Option<String> {
        let key = {
            let mut state = self.state.lock();
            let key = state.files.remove(path)?;
            if Self::owned_by(&state, &key, path) {
                state.index.remove(&key);
            }
            key
        };
        info!(target: "procdispatch::registry", id = %key, file = %path.display(), "Removed command definition");
        self.invalidate(&key);
        Some(key)
    }

    /// Forget every definition loaded from a file under `dir`.
    pub(crate) fn remove_under(&self, dir: &Path) -> usize {
        let paths: Vec<PathBuf> = {
            let state = self.state.lock();
            state
                .files
                .keys()
                .filter(|p| p.starts_with(dir))
                .cloned()
                .collect()
        };
        paths.iter().filter_map(|p| self.remove_file(p)).count()
    }

    fn owned_by(state: &IndexState, key: &str, path: &Path) -> bool {
        state
            .index
            .get(key)
            .and_then(|d| d.source.as_deref())
            .map_or(true, |source| source == path)
    }

    /// Fire and retire the live signal for `key`, if any.
    pub(crate) fn invalidate(&self, key: &str) -> bool {
        match self.signals.remove(key) {
            Some((_, signal)) => {
                debug!(target: "procdispatch::registry", id = %key, "Invalidation signal fired");
                signal.fire()
            }
            None => false,
        }
    }

    fn signal(&self, key: String) -> InvalidationSignal {
        self.signals
            .entry(key)
            .or_insert_with(InvalidationSignal::new)
            .clone()
    }

    fn cancel_pending(&self) {
        for entry in self.pending.iter() {
            entry.value().handle.abort();
        }
        self.pending.clear();
    }
}

/// Thread-safe, hot-reloadable index of command definitions.
///
/// # Example
///
/// ```ignore
/// let registry = CommandRegistry::new(RegistrySettings::default());
/// registry.load_from_directory("commands", true);
///
/// let def = registry.get("RH.Candidates.List")?;
/// let signal = registry.invalidation_signal(&def.id);
/// ```
pub struct CommandRegistry {
    shared: Arc<Shared>,
    watch: Mutex<Option<WatchHandle>>,
}

impl CommandRegistry {
    /// Empty registry.
    pub fn new(settings: RegistrySettings) -> Self {
        Self {
            shared: Arc::new(Shared::new(settings)),
            watch: Mutex::new(None),
        }
    }

    /// Settings in effect.
    pub fn settings(&self) -> &RegistrySettings {
        &self.shared.settings
    }

    /// Load every definition file under `path`, replacing the current index.
    ///
    /// Invalid files are logged and skipped. A missing directory is logged and
    /// leaves the index empty. With `enable_watch`, subsequent file changes are
    /// applied live; this needs a tokio runtime, and without one the registry
    /// logs a warning and serves the loaded snapshot.
    ///
    /// Returns the number of definitions loaded.
    pub fn load_from_directory(&self, path: impl AsRef<Path>, enable_watch: bool) -> usize {
        let path = path.as_ref();
        self.stop_watching();

        let root = match loader::canonical_root(path) {
            Ok(root) if root.is_dir() => root,
            _ => {
                warn!(target: "procdispatch::registry", dir = %path.display(), "Command directory does not exist");
                self.shared.publish(loader::Snapshot::default());
                return 0;
            }
        };

        let snapshot = loader::load_snapshot(&root, &self.shared.settings);
        let loaded = snapshot.index.len();
        let skipped = snapshot.skipped;
        self.shared.publish(snapshot);
        info!(target: "procdispatch::registry", dir = %root.display(), loaded, skipped, "Loaded command definitions");

        if enable_watch {
            match watcher::spawn(Arc::clone(&self.shared), &root) {
                Ok(handle) => {
                    info!(target: "procdispatch::registry", dir = %root.display(), "Watching for definition changes");
                    *self.watch.lock() = Some(handle);
                }
                Err(e) => {
                    warn!(target: "procdispatch::registry", dir = %root.display(), error = %e, "Hot reload disabled");
                }
            }
        }
        loaded
    }

    /// Install or replace one definition without a backing file.
    pub fn register(&self, def: CommandDefinition) {
        let key = def.key();
        {
            let mut state = self.shared.state.lock();
            state.index.insert(key.clone(), Arc::new(def));
        }
        self.shared.invalidate(&key);
    }

    /// Case-insensitive lookup.
    ///
    /// # Errors
    ///
    /// [`Error::CommandNotFound`] listing up to ten known ids.
    pub fn get(&self, id: &str) -> Result<Arc<CommandDefinition>> {
        let key = normalize_id(id);
        let state = self.shared.state.lock();
        match state.index.get(&key) {
            Some(def) => Ok(Arc::clone(def)),
            None => {
                let mut known: Vec<String> = state.index.values().map(|d| d.id.clone()).collect();
                known.sort();
                Err(Error::command_not_found(id, known))
            }
        }
    }

    /// Case-insensitive lookup returning `None` when absent.
    pub fn try_get(&self, id: &str) -> Option<Arc<CommandDefinition>> {
        self.shared.state.lock().index.get(&normalize_id(id)).cloned()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.shared.state.lock().index.contains_key(&normalize_id(id))
    }

    /// Snapshot of every id, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .shared
            .state
            .lock()
            .index
            .values()
            .map(|d| d.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Snapshot of every definition, sorted by id.
    pub fn all(&self) -> Vec<Arc<CommandDefinition>> {
        let mut defs: Vec<Arc<CommandDefinition>> =
            self.shared.state.lock().index.values().cloned().collect();
        defs.sort_by(|a, b| a.key().cmp(&b.key()));
        defs
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.shared.state.lock().index.len()
    }

    /// True when nothing is loaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The live invalidation signal for `id`.
    ///
    /// Repeated calls return the same signal until the command is next
    /// replaced, removed or explicitly invalidated.
    pub fn invalidation_signal(&self, id: &str) -> InvalidationSignal {
        self.shared.signal(normalize_id(id))
    }

    /// Fire the signal for `id` so dependent cache entries are dropped.
    ///
    /// Returns `true` if a live signal was fired.
    pub fn invalidate(&self, id: &str) -> bool {
        self.shared.invalidate(&normalize_id(id))
    }

    /// Whether a filesystem watch is active.
    pub fn is_watching(&self) -> bool {
        self.watch.lock().is_some()
    }

    /// Number of file reloads waiting on their debounce timer or still running.
    pub fn pending_reloads(&self) -> usize {
        self.shared.pending.len()
    }

    /// Stop watching, cancel pending reloads and release every signal.
    pub fn shutdown(&self) {
        self.stop_watching();
        self.shared.signals.clear();
    }

    fn stop_watching(&self) {
        if let Some(handle) = self.watch.lock().take() {
            drop(handle);
            debug!(target: "procdispatch::registry", "Stopped watching definition directory");
        }
        self.shared.cancel_pending();
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new(RegistrySettings::default())
    }
}

impl Drop for CommandRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
