//! Reading definition files from disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use procdispatch_core::{CommandDefinition, Error, Result};
use tracing::warn;

use crate::settings::RegistrySettings;

/// A fully-built index, ready to be published in one swap.
#[derive(Debug, Default)]
pub(crate) struct Snapshot {
    pub index: HashMap<String, Arc<CommandDefinition>>,
    pub files: HashMap<PathBuf, String>,
    pub skipped: usize,
}

/// Recursively collect definition files under `root`, sorted by path.
pub(crate) fn scan_directory(root: &Path, settings: &RegistrySettings) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(target: "procdispatch::registry", dir = %dir.display(), error = %e, "Cannot read directory");
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if settings.matches(&path) {
                found.push(path);
            }
        }
    }
    found.sort();
    found
}

/// Parse every definition file under `root` into a snapshot.
///
/// Invalid files are logged and counted in `skipped`. When two files share an
/// id the later path wins.
pub(crate) fn load_snapshot(root: &Path, settings: &RegistrySettings) -> Snapshot {
    let mut snapshot = Snapshot::default();
    for path in scan_directory(root, settings) {
        match CommandDefinition::from_file(&path) {
            Ok(def) => {
                let key = def.key();
                if let Some(previous) = snapshot.index.get(&key) {
                    warn!(
                        target: "procdispatch::registry",
                        id = %def.id,
                        file = %path.display(),
                        previous = ?previous.source,
                        "Duplicate command id, later file wins"
                    );
                    if let Some(old_path) = previous.source.clone() {
                        snapshot.files.remove(&old_path);
                    }
                }
                snapshot.files.insert(path, key.clone());
                snapshot.index.insert(key, Arc::new(def));
            }
            Err(e) => {
                warn!(target: "procdispatch::registry", file = %path.display(), error = %e, "Skipping definition file");
                snapshot.skipped += 1;
            }
        }
    }
    snapshot
}

/// Read one definition, retrying I/O failures with increasing backoff.
///
/// Parse errors are returned immediately. A file that no longer exists is not
/// retried.
pub(crate) async fn read_with_retry(
    path: &Path,
    settings: &RegistrySettings,
) -> Result<CommandDefinition> {
    let attempts = settings.reload_attempts.max(1);
    let mut attempt = 1;
    loop {
        match CommandDefinition::from_file(path) {
            Ok(def) => return Ok(def),
            Err(e) if e.is_transient() && attempt < attempts && path.exists() => {
                warn!(
                    target: "procdispatch::registry",
                    file = %path.display(),
                    attempt,
                    error = %e,
                    "Definition read failed, retrying"
                );
                tokio::time::sleep(settings.backoff(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Canonical form of a watched root so event paths and tracked paths agree.
pub(crate) fn canonical_root(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).map_err(|e| Error::TransientIo {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}
