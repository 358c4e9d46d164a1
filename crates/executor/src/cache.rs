//! Result cache.
//!
//! Entries are keyed by command id plus the resolved parameter values and
//! carry the command's [`InvalidationSignal`] captured before execution. An
//! entry whose signal has fired is treated as absent and evicted on read, so
//! a definition change is never served from cache even if the entry's TTL
//! has not run out.

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::sync::Cache;
use moka::Expiry;
use procdispatch_core::{CommandDefinition, ExecutionResult, RowList};
use procdispatch_registry::InvalidationSignal;

use crate::backend::BoundParam;

/// Default capacity of [`MokaResultCache`].
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Key prefix for top-level results.
pub const PRIMARY_PREFIX: &str = "cmd";

/// Key prefix for include rows.
pub const INCLUDE_PREFIX: &str = "inc";

/// What a cache entry holds.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    /// A complete top-level result
    Result(ExecutionResult),
    /// The rows an include contributed
    Rows(RowList),
}

/// Storage for cached results.
pub trait ResultCache: Send + Sync {
    /// Live value under `key`, if any.
    fn get(&self, key: &str) -> Option<CachedValue>;

    /// Store `value` for `ttl`, tied to `signal`.
    fn insert(&self, key: String, value: CachedValue, ttl: Duration, signal: &InvalidationSignal);

    /// Drop `key`.
    fn invalidate(&self, key: &str);

    /// Drop everything.
    fn clear(&self);

    /// Approximate number of stored entries.
    fn len(&self) -> u64;

    /// Whether the cache holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Canonical cache key: prefix, normalized id, then parameters sorted by
/// lower-cased bind name.
pub fn cache_key(prefix: &str, def: &CommandDefinition, params: &[BoundParam]) -> String {
    let mut sorted: Vec<(String, &BoundParam)> = params
        .iter()
        .map(|p| (p.name.to_lowercase(), p))
        .collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut key = format!("{}:{}", prefix, def.key());
    for (name, param) in sorted {
        // SqlValue serialization is infallible
        let value = serde_json::to_string(&param.value).unwrap_or_default();
        key.push('|');
        key.push_str(&name);
        key.push('=');
        key.push_str(&value);
    }
    key
}

struct Entry {
    value: CachedValue,
    ttl: Duration,
    expires_at: Instant,
    signal: InvalidationSignal,
}

impl Entry {
    fn is_live(&self) -> bool {
        !self.signal.is_fired() && Instant::now() < self.expires_at
    }
}

struct PerEntryTtl;

impl Expiry<String, Arc<Entry>> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Arc<Entry>, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Arc<Entry>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// [`ResultCache`] backed by a bounded `moka` cache with per-entry TTL.
#[derive(Clone)]
pub struct MokaResultCache {
    entries: Cache<String, Arc<Entry>>,
}

impl MokaResultCache {
    /// Cache holding up to `max_entries` results.
    pub fn new(max_entries: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { entries }
    }
}

impl Default for MokaResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl ResultCache for MokaResultCache {
    fn get(&self, key: &str) -> Option<CachedValue> {
        let entry = self.entries.get(key)?;
        if entry.is_live() {
            Some(entry.value.clone())
        } else {
            self.entries.invalidate(key);
            None
        }
    }

    fn insert(&self, key: String, value: CachedValue, ttl: Duration, signal: &InvalidationSignal) {
        if ttl.is_zero() || signal.is_fired() {
            return;
        }
        let entry = Entry {
            value,
            ttl,
            expires_at: Instant::now() + ttl,
            signal: signal.clone(),
        };
        self.entries.insert(key, Arc::new(entry));
    }

    fn invalidate(&self, key: &str) {
        self.entries.invalidate(key);
    }

    fn clear(&self) {
        self.entries.invalidate_all();
    }

    fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }
}
