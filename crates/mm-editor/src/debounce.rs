//! Keyed trailing-edge debouncing.
//!
//! [`Coalescer`] holds the latest value per key and releases it once that
//! key has been quiet for the configured period. Each push restarts the
//! key's timer, so a burst of edits to one node produces one outbound
//! value carrying the final state.
//!
//! Time is passed in explicitly. The coalescer never sleeps; the caller
//! asks for [`next_deadline`](Coalescer::next_deadline), waits, and then
//! calls [`drain_due`](Coalescer::drain_due).

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Pending<V> {
    value: V,
    deadline: Instant,
}

/// Latest-value-wins debouncer keyed by `K`.
#[derive(Debug, Clone)]
pub struct Coalescer<K, V> {
    quiet: Duration,
    pending: HashMap<K, Pending<V>>,
}

impl<K: Eq + Hash + Clone, V> Coalescer<K, V> {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: HashMap::new(),
        }
    }

    /// Record `value` for `key`, replacing any pending value and
    /// restarting the key's quiet period at `now`.
    pub fn push(&mut self, key: K, value: V, now: Instant) {
        self.pending.insert(
            key,
            Pending {
                value,
                deadline: now + self.quiet,
            },
        );
    }

    /// Drop the pending value for `key`.
    pub fn cancel(&mut self, key: &K) -> Option<V> {
        self.pending.remove(key).map(|p| p.value)
    }

    /// Earliest instant at which some key becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Remove and return every value whose quiet period has elapsed,
    /// earliest deadline first.
    pub fn drain_due(&mut self, now: Instant) -> Vec<(K, V)> {
        let due: Vec<K> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(k, _)| k.clone())
            .collect();
        self.take_sorted(due)
    }

    /// Remove and return everything, regardless of deadlines.
    pub fn flush(&mut self) -> Vec<(K, V)> {
        let all: Vec<K> = self.pending.keys().cloned().collect();
        self.take_sorted(all)
    }

    /// Keys with a pending value, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.pending.keys()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn take_sorted(&mut self, keys: Vec<K>) -> Vec<(K, V)> {
        let mut taken: Vec<(K, Pending<V>)> = keys
            .into_iter()
            .filter_map(|k| self.pending.remove(&k).map(|p| (k, p)))
            .collect();
        taken.sort_by_key(|(_, p)| p.deadline);
        taken.into_iter().map(|(k, p)| (k, p.value)).collect()
    }
}
