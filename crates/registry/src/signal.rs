//! Per-command invalidation signals.
//!
//! A signal is a one-shot broadcast: once fired it stays fired, and every
//! subscriber callback runs exactly once. The registry hands out one live
//! signal per command id and retires it (fires it and forgets it) whenever
//! the command's definition is replaced or removed. Dependents that captured
//! the old signal observe `is_fired() == true` from then on.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type Callback = Box<dyn FnOnce() + Send>;

struct SignalInner {
    fired: AtomicBool,
    subscribers: Mutex<Vec<Callback>>,
}

/// Cloneable handle to a one-shot invalidation signal.
#[derive(Clone)]
pub struct InvalidationSignal {
    inner: Arc<SignalInner>,
}

impl InvalidationSignal {
    /// A fresh, unfired signal.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                fired: AtomicBool::new(false),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Whether the signal has fired.
    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// Fire the signal.
    ///
    /// Returns `true` for the call that actually fired it; later calls are
    /// no-ops returning `false`.
    pub fn fire(&self) -> bool {
        // Hold the subscriber lock across the flag flip so a concurrent
        // subscribe() either lands before the drain or sees the flag.
        let callbacks = {
            let mut subscribers = self.inner.subscribers.lock();
            if self.inner.fired.swap(true, Ordering::AcqRel) {
                return false;
            }
            std::mem::take(&mut *subscribers)
        };
        for callback in callbacks {
            callback();
        }
        true
    }

    /// Run `callback` when the signal fires, or immediately if it already has.
    pub fn subscribe(&self, callback: impl FnOnce() + Send + 'static) {
        {
            let mut subscribers = self.inner.subscribers.lock();
            if !self.inner.fired.load(Ordering::Acquire) {
                subscribers.push(Box::new(callback));
                return;
            }
        }
        callback();
    }

    /// Whether two handles refer to the same signal.
    pub fn same_as(&self, other: &InvalidationSignal) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of callbacks waiting for the signal.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

impl Default for InvalidationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InvalidationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidationSignal")
            .field("fired", &self.is_fired())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_fire_runs_subscribers_once() {
        let signal = InvalidationSignal::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            signal.subscribe(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(signal.fire());
        assert!(!signal.fire());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(signal.is_fired());
    }

    #[test]
    fn test_subscribe_after_fire_runs_immediately() {
        let signal = InvalidationSignal::new();
        signal.fire();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        signal.subscribe(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let a = InvalidationSignal::new();
        let b = a.clone();
        assert!(a.same_as(&b));
        b.fire();
        assert!(a.is_fired());
        assert!(!a.same_as(&InvalidationSignal::new()));
    }

    #[test]
    fn test_concurrent_fire_is_exactly_once() {
        let signal = InvalidationSignal::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        signal.subscribe(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        let winners: usize = (0..8)
            .map(|_| {
                let s = signal.clone();
                std::thread::spawn(move || s.fire() as usize)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .sum();

        assert_eq!(winners, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
