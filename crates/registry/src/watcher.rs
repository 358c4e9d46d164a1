//! Filesystem watch and debounced reload pipeline.
//!
//! The OS watcher (via `notify`) pushes raw events into an unbounded channel.
//! A tokio task drains the channel and turns each event into one of two
//! actions per definition file:
//!
//! - **reload**: (re)start a debounce timer for the path. When it expires the
//!   file is read with bounded retry and installed in the index.
//! - **remove**: drop the definition tracked for the path and cancel its timer.
//!
//! Timers are keyed by path in [`Shared::pending`]; each carries a generation
//! number so a finished timer only clears its own entry.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use procdispatch_core::{Error, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::loader;
use crate::registry::{PendingReload, Shared};

static GENERATION: AtomicU64 = AtomicU64::new(1);

/// A running watch. Dropping it stops the OS watcher and the event loop.
pub(crate) struct WatchHandle {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// What one filesystem event means for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FileAction {
    Reload(PathBuf),
    Remove(PathBuf),
}

/// Start watching `root` recursively.
///
/// # Errors
///
/// [`Error::Config`] when called outside a tokio runtime or when the OS
/// watcher cannot be created.
pub(crate) fn spawn(shared: Arc<Shared>, root: &Path) -> Result<WatchHandle> {
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|_| Error::config("hot reload requires a running tokio runtime"))?;

    let (tx, rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        // Receiver gone means the registry is shutting down
        let _ = tx.send(res);
    })
    .map_err(|e| Error::config(format!("cannot create file watcher: {}", e)))?;
    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| Error::config(format!("cannot watch '{}': {}", root.display(), e)))?;

    let task = runtime.spawn(event_loop(Arc::downgrade(&shared), rx));
    Ok(WatchHandle {
        _watcher: watcher,
        task,
    })
}

async fn event_loop(shared: Weak<Shared>, mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>) {
    while let Some(res) = rx.recv().await {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        match res {
            Ok(event) => {
                for action in classify(&event) {
                    dispatch(&shared, action);
                }
            }
            Err(e) => {
                warn!(target: "procdispatch::registry", error = %e, "File watcher error");
            }
        }
    }
}

/// Map a raw event to per-path actions.
///
/// Extension filtering happens in [`dispatch`] so directory removals can
/// still drop the files they contained.
pub(crate) fn classify(event: &Event) -> Vec<FileAction> {
    let paths = &event.paths;
    match &event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => vec![
            FileAction::Remove(paths[0].clone()),
            FileAction::Reload(paths[1].clone()),
        ],
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.iter().cloned().map(FileAction::Remove).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.iter().cloned().map(FileAction::Reload).collect()
        }
        // Rename without a side: decide by what is on disk now
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .iter()
            .cloned()
            .map(|p| {
                if p.exists() {
                    FileAction::Reload(p)
                } else {
                    FileAction::Remove(p)
                }
            })
            .collect(),
        EventKind::Remove(_) => paths.iter().cloned().map(FileAction::Remove).collect(),
        EventKind::Create(_) | EventKind::Modify(_) => {
            paths.iter().cloned().map(FileAction::Reload).collect()
        }
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

pub(crate) fn dispatch(shared: &Arc<Shared>, action: FileAction) {
    match action {
        FileAction::Reload(path) => {
            if shared.settings.matches(&path) && !path.is_dir() {
                schedule_reload(shared, path);
            }
        }
        FileAction::Remove(path) => {
            if !shared.settings.matches(&path) {
                let removed = shared.remove_under(&path);
                if removed > 0 {
                    debug!(target: "procdispatch::registry", dir = %path.display(), removed, "Directory removed");
                }
                return;
            }
            // Rename-over saves report a remove for a path that exists again
            if path.exists() {
                schedule_reload(shared, path);
                return;
            }
            if let Some((_, pending)) = shared.pending.remove(&path) {
                pending.handle.abort();
            }
            shared.remove_file(&path);
        }
    }
}

/// Start or restart the debounce timer for `path`.
///
/// The timer's entry stays in [`Shared::pending`] until its reload has
/// finished, so [`pending_reloads`](crate::CommandRegistry::pending_reloads)
/// also counts reloads in flight.
pub(crate) fn schedule_reload(shared: &Arc<Shared>, path: PathBuf) {
    let generation = GENERATION.fetch_add(1, Ordering::Relaxed);
    let delay = shared.settings.debounce();
    let weak = Arc::downgrade(shared);
    let task_path = path.clone();

    debug!(target: "procdispatch::registry", file = %path.display(), "Reload scheduled");
    // The shard stays locked until the entry is in place, so the task's
    // removal below can never run ahead of this insert
    let slot = shared.pending.entry(path);
    let task = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let Some(shared) = weak.upgrade() else {
            return;
        };
        reload(&shared, &task_path).await;
        shared
            .pending
            .remove_if(&task_path, |_, p| p.generation == generation);
    });
    let pending = PendingReload {
        generation,
        handle: task.abort_handle(),
    };
    match slot {
        Entry::Occupied(mut occupied) => occupied.insert(pending).handle.abort(),
        Entry::Vacant(vacant) => {
            vacant.insert(pending);
        }
    }
}

async fn reload(shared: &Arc<Shared>, path: &Path) {
    match loader::read_with_retry(path, &shared.settings).await {
        Ok(def) => shared.apply_file(path, def),
        Err(_) if !path.exists() => {
            shared.remove_file(path);
        }
        Err(e) => {
            warn!(
                target: "procdispatch::registry",
                file = %path.display(),
                error = %e,
                "Reload failed, keeping previous definition"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut e = Event::new(kind);
        for p in paths {
            e = e.add_path(PathBuf::from(p));
        }
        e
    }

    #[test]
    fn test_classify_rename_both() {
        let e = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/d/old.json", "/d/new.json"],
        );
        assert_eq!(
            classify(&e),
            vec![
                FileAction::Remove(PathBuf::from("/d/old.json")),
                FileAction::Reload(PathBuf::from("/d/new.json")),
            ]
        );
    }

    #[test]
    fn test_classify_writes_and_removes() {
        let create = event(EventKind::Create(CreateKind::File), &["/d/a.json"]);
        assert_eq!(classify(&create), vec![FileAction::Reload("/d/a.json".into())]);

        let write = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/d/a.json"],
        );
        assert_eq!(classify(&write), vec![FileAction::Reload("/d/a.json".into())]);

        let remove = event(EventKind::Remove(RemoveKind::File), &["/d/a.json"]);
        assert_eq!(classify(&remove), vec![FileAction::Remove("/d/a.json".into())]);
    }

    #[test]
    fn test_classify_ignores_access() {
        let e = event(
            EventKind::Access(notify::event::AccessKind::Any),
            &["/d/a.json"],
        );
        assert!(classify(&e).is_empty());
    }
}
