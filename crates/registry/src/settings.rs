//! Registry tuning knobs, read from the `[registry]` section of the
//! dispatcher configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for loading and hot-reloading definition files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Definition file extension, without the dot (matched case-insensitively)
    pub extension: String,
    /// Quiet period after the last write event before a file is reloaded
    pub debounce_ms: u64,
    /// Read attempts per reload before giving up
    pub reload_attempts: u32,
    /// Base backoff between read attempts; attempt `n` waits `n * backoff`
    pub reload_backoff_ms: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            extension: "json".to_string(),
            debounce_ms: 500,
            reload_attempts: 3,
            reload_backoff_ms: 100,
        }
    }
}

impl RegistrySettings {
    /// Debounce delay.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.reload_backoff_ms.saturating_mul(attempt as u64))
    }

    /// Whether `path` has the definition extension.
    pub fn matches(&self, path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(self.extension.trim_start_matches('.')))
            .unwrap_or(false)
    }
}
