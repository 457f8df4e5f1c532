//! Generic LRU store with deterministic eviction order.

use serde::Serialize;
use std::collections::HashMap;

/// The three stores of the cache bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Store {
    Programs,
    Stdlib,
    Imports,
}

impl Store {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Programs => "programs",
            Self::Stdlib => "stdlib",
            Self::Imports => "imports",
        }
    }
}

/// The process-wide access counter.
///
/// Every cache read and write draws the next value and stamps it into the
/// touched entry, which gives a deterministic LRU order independent of
/// wall-clock resolution. The counter is 64 bits wide and starts at 1, so it
/// cannot wrap within a session; the eviction tie-break on equal stamps is
/// still implemented so tests stay deterministic.
#[derive(Debug)]
pub struct AccessClock {
    next: u64,
}

impl Default for AccessClock {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl AccessClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draws the next counter value.
    pub fn tick(&mut self) -> u64 {
        let stamp = self.next;
        self.next = self.next.saturating_add(1);
        stamp
    }

    /// The value the next [`Self::tick`] will return.
    pub fn peek(&self) -> u64 {
        self.next
    }
}

/// Per-store statistics exposed through `stats()`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub capacity: usize,
    /// Faults swallowed by the no-panic policy.
    pub internal_errors: u64,
}

#[derive(Debug)]
struct Slot<V> {
    value: V,
    last_access: u64,
}

/// A bounded key-value store with strict LRU eviction.
///
/// Reads and writes both stamp the shared access counter into the entry.
/// When full, `put` of a new key evicts the entry with the smallest stamp;
/// ties (only possible after a counter reset) break toward the
/// lexicographically smallest key. Operations never panic; a state that
/// should be impossible is recorded in `internal_errors` and degrades to a
/// miss or no-op.
#[derive(Debug)]
pub struct LruStore<V> {
    store: Store,
    capacity: usize,
    entries: HashMap<String, Slot<V>>,
    hits: u64,
    misses: u64,
    internal_errors: u64,
}

impl<V> LruStore<V> {
    pub fn new(store: Store, capacity: usize) -> Self {
        Self {
            store,
            capacity,
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
            internal_errors: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Looks at `key` without touching statistics or recency.
    pub fn peek(&self, key: &str) -> Option<&V> {
        self.entries.get(key).map(|slot| &slot.value)
    }

    /// Looks up `key`, stamping the entry on a hit.
    pub fn get(&mut self, clock: &mut AccessClock, key: &str) -> Option<&V> {
        match self.entries.get_mut(key) {
            Some(slot) => {
                slot.last_access = clock.tick();
                self.hits += 1;
                trace!(store = self.store.as_str(), key, "cache hit");
                Some(&slot.value)
            }
            None => {
                self.misses += 1;
                trace!(store = self.store.as_str(), key, "cache miss");
                None
            }
        }
    }

    /// Inserts `value` under `key`, evicting the least recently used entry
    /// first if the store is full and the key is new. Re-putting an existing
    /// key never evicts.
    pub fn put(&mut self, clock: &mut AccessClock, key: impl Into<String>, value: V) {
        let key = key.into();
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.evict_lru();
        }
        self.entries.insert(key, Slot { value, last_access: clock.tick() });
    }

    /// Removes the entry if present.
    pub fn invalidate(&mut self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|slot| slot.value)
    }

    /// Wipes the contents. Statistics survive.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            hits: self.hits,
            misses: self.misses,
            size: self.entries.len(),
            capacity: self.capacity,
            internal_errors: self.internal_errors,
        }
    }

    pub fn clear_stats(&mut self) {
        self.hits = 0;
        self.misses = 0;
        self.internal_errors = 0;
    }

    /// Iterates over the stored keys in unspecified order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    fn evict_lru(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by(|(ka, a), (kb, b)| a.last_access.cmp(&b.last_access).then_with(|| ka.cmp(kb)))
            .map(|(k, _)| k.clone());
        match victim {
            Some(key) => {
                trace!(store = self.store.as_str(), key = %key, "evicting lru entry");
                self.entries.remove(&key);
            }
            None => {
                // len >= capacity > 0 guarantees a victim; reaching this
                // branch means the invariant broke
                self.internal_errors += 1;
            }
        }
    }
}
