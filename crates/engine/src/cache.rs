//! In-process cache of match results.

use crate::matcher::Match;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

enum Entries {
    Unbounded(HashMap<String, Match>),
    Bounded(LruCache<String, Match>),
}

/// Match results keyed by the exact User-Agent string, negative results
/// included.
///
/// Unbounded by default: entries live until [`clear`](Self::clear) is
/// called. With a capacity, the least recently used entry is evicted once
/// the capacity is reached.
///
/// Every operation takes the lock for the duration of a single map access.
/// Nothing is awaited while it is held.
///
/// Each [`clear`](Self::clear) starts a new generation. A result computed
/// before a clear is offered with [`insert_at`](Self::insert_at) and the
/// generation read before computing it, and is dropped if the cache was
/// cleared in between.
pub struct VolatileCache {
    entries: Mutex<Entries>,
    generation: AtomicU64,
}
impl VolatileCache {
    pub fn new(capacity: Option<NonZeroUsize>) -> Self {
        let entries = match capacity {
            Some(capacity) => Entries::Bounded(LruCache::new(capacity)),
            None => Entries::Unbounded(HashMap::new()),
        };
        Self { entries: Mutex::new(entries), generation: AtomicU64::new(0) }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn bounded(capacity: NonZeroUsize) -> Self {
        Self::new(Some(capacity))
    }

    // A panic while holding the lock can't leave a map half-updated, so a
    // poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, user_agent: &str) -> Option<Match> {
        match &mut *self.lock() {
            Entries::Unbounded(map) => map.get(user_agent).cloned(),
            Entries::Bounded(lru) => lru.get(user_agent).cloned(),
        }
    }

    /// Store a result unless one is already cached for the User-Agent.
    ///
    /// Returns whichever result ends up cached, so concurrent callers
    /// resolving the same miss all observe the first stored value.
    pub fn insert(&self, user_agent: &str, result: Match) -> Match {
        self.insert_at(self.generation(), user_agent, result)
    }

    /// Number of times the cache has been cleared.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Like [`insert`](Self::insert), but only while the cache is still at
    /// `generation`. Otherwise `result` is returned without being stored.
    pub fn insert_at(&self, generation: u64, user_agent: &str, result: Match) -> Match {
        let mut entries = self.lock();
        // Checked under the lock; clear bumps the generation while holding it.
        if self.generation.load(Ordering::Acquire) != generation {
            return result;
        }
        match &mut *entries {
            Entries::Unbounded(map) => map.entry(user_agent.to_string()).or_insert(result).clone(),
            Entries::Bounded(lru) => lru.get_or_insert(user_agent.to_string(), || result).clone(),
        }
    }

    pub fn len(&self) -> usize {
        match &*self.lock() {
            Entries::Unbounded(map) => map.len(),
            Entries::Bounded(lru) => lru.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> Option<NonZeroUsize> {
        match &*self.lock() {
            Entries::Unbounded(_) => None,
            Entries::Bounded(lru) => Some(lru.cap()),
        }
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        match &mut *entries {
            Entries::Unbounded(map) => map.clear(),
            Entries::Bounded(lru) => lru.clear(),
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}
impl Default for VolatileCache {
    fn default() -> Self {
        Self::unbounded()
    }
}
impl std::fmt::Debug for VolatileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolatileCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
