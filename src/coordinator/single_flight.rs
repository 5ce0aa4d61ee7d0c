//! Single-Flight Deduplication
//!
//! At most one in-flight fill per key. Late callers join the existing shared
//! future instead of starting a second fill; every caller observes the same
//! result. The underlying future is polled by its waiters, so if every
//! waiter abandons it the fill stops, and a later caller resumes it from
//! where it left off.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;

/// The shared handle every caller of one fill awaits.
pub type SharedFill<T> = Shared<BoxFuture<'static, T>>;

struct Entry<T: Clone> {
    fill: SharedFill<T>,
    generation: u64,
}

/// Per-key single-flight table.
pub struct SingleFlight<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    entries: Mutex<HashMap<K, Entry<T>>>,
    next_generation: Mutex<u64>,
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_generation: Mutex::new(0),
        }
    }

    /// Join the in-flight fill for `key`, or start one with `make`.
    ///
    /// Returns the shared future, its generation (pass back to
    /// [`complete`](Self::complete) after awaiting), and whether this caller
    /// joined an existing fill.
    pub fn join_or_start<F>(&self, key: &K, make: F) -> (SharedFill<T>, u64, bool)
    where
        F: FnOnce() -> BoxFuture<'static, T>,
    {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(entry) = entries.get(key) {
            return (entry.fill.clone(), entry.generation, true);
        }

        let generation = {
            let mut next = self
                .next_generation
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *next += 1;
            *next
        };
        let fill = make().shared();
        entries.insert(
            key.clone(),
            Entry {
                fill: fill.clone(),
                generation,
            },
        );
        (fill, generation, false)
    }

    /// Retire a finished fill. Generation-guarded so a caller finishing late
    /// cannot remove a newer fill that reused the key; any caller of the
    /// same fill may call this, redundant calls are no-ops.
    pub fn complete(&self, key: &K, generation: u64) {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if entries.get(key).is_some_and(|e| e.generation == generation) {
            entries.remove(key);
        }
    }

    /// Number of keys with an in-flight fill.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

impl<K, T> Default for SingleFlight<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
