//! Timer primitives for the studio loop.
//!
//! Input coalescing and completion timeouts are deliberately separate: a
//! [`DebounceQueue`] batches rapid edits per key, while a [`Deadline`] is a
//! single cancellable timeout. Both are pure over [`Instant`] so the loop can
//! drive them from one `select!` arm and tests can drive them by hand.

use core::hash::Hash;

use hashbrown::HashMap;
use tokio::time::{Duration, Instant};

struct PendingEntry<V> {
    value: V,
    due: Instant,
}

/// Last-writer-wins coalescer with a fixed quiet window per key.
///
/// A push replaces the key's value and restarts its window; earlier values
/// inside the window are discarded, never merged.
pub struct DebounceQueue<K, V> {
    window: Duration,
    entries: HashMap<K, PendingEntry<V>>,
}

impl<K: Eq + Hash + Clone, V> DebounceQueue<K, V> {
    /// Creates a queue with the given quiet window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: HashMap::new(),
        }
    }

    /// Records `value` for `key` and resets the key's deadline to
    /// `now + window`. Non-blocking; returns immediately.
    pub fn push(&mut self, key: K, value: V, now: Instant) {
        self.entries.insert(
            key,
            PendingEntry {
                value,
                due: now + self.window,
            },
        );
    }

    /// Earliest armed deadline, if any entry is pending.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|e| e.due).min()
    }

    /// Drains every entry whose quiet window has elapsed.
    pub fn take_due(&mut self, now: Instant) -> Vec<(K, V)> {
        let due_keys: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, e)| e.due <= now)
            .map(|(k, _)| k.clone())
            .collect();
        due_keys
            .into_iter()
            .filter_map(|k| self.entries.remove(&k).map(|e| (k, e.value)))
            .collect()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A single cancellable timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// Unarmed deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms (or re-arms) the deadline.
    pub fn arm(&mut self, at: Instant) {
        self.at = Some(at);
    }

    /// Cancels the deadline.
    pub fn clear(&mut self) {
        self.at = None;
    }

    /// Armed instant, if any.
    pub fn at(&self) -> Option<Instant> {
        self.at
    }

    /// True when armed and elapsed.
    pub fn is_due(&self, now: Instant) -> bool {
        self.at.is_some_and(|at| at <= now)
    }
}
