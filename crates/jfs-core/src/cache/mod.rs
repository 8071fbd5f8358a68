//! In-memory shadows of database tables.
//!
//! Every cache is a [`ShadowCache`]: a `HashMap` behind a single
//! `parking_lot::RwLock`. Lookups take the read lock and clone the value out,
//! mutations take the write lock. There is no eviction; entries live until
//! they are removed, rekeyed, or the whole cache is cleared at unmount.
//!
//! Writers that just committed a change call `add`/`remove`, which bump the
//! cache generation. Readers filling a miss from the database take a
//! [`ShadowCache::generation`] snapshot before the query and store through
//! [`ShadowCache::fill`], which refuses the value if any write landed in
//! between. A stale read can therefore never overwrite a committed value.

mod tables;

pub use tables::{
    create_caches, Caches, DataFile, DatapathCache, KeyCache, MetaCache, SharedCaches,
    SymlinkCache,
};

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::trace;

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of `add` calls that stored a value.
    pub inserts: u64,
    /// Number of `add` calls that replaced an existing value.
    pub replacements: u64,
    /// Number of entries removed by `remove`, `rekey`, or `retain`.
    pub removals: u64,
    /// Number of entries currently in cache.
    pub entries: usize,
}

impl CacheStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Internal stats tracker for atomic updates.
#[derive(Debug, Default)]
struct StatsTracker {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    replacements: AtomicU64,
    removals: AtomicU64,
}

impl StatsTracker {
    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn insert(&self, replaced: bool) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
        if replaced {
            self.replacements.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn removed(&self, count: u64) {
        self.removals.fetch_add(count, Ordering::Relaxed);
    }

    fn to_stats(&self, entries: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            replacements: self.replacements.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            entries,
        }
    }
}

/// A keyed shadow of one database table.
///
/// Keys are unique: `add` on an existing key replaces the previous value, so
/// at most one entry per key is ever observable. A disabled cache misses on
/// every `get` and ignores every `add`.
#[derive(Debug)]
pub struct ShadowCache<K, V> {
    name: &'static str,
    enabled: bool,
    map: RwLock<HashMap<K, V>>,
    /// Bumped under the write lock by every mutation except `fill`.
    generation: AtomicU64,
    stats: StatsTracker,
}

impl<K, V> ShadowCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(name: &'static str, enabled: bool, capacity_hint: usize) -> Self {
        let capacity = if enabled { capacity_hint } else { 0 };
        ShadowCache {
            name,
            enabled,
            map: RwLock::new(HashMap::with_capacity(capacity)),
            generation: AtomicU64::new(0),
            stats: StatsTracker::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Look up a key, returning an owned copy of the value.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        if !self.enabled {
            self.stats.miss();
            return None;
        }
        let value = self.map.read().get(key).cloned();
        match value {
            Some(_) => self.stats.hit(),
            None => self.stats.miss(),
        }
        value
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.enabled && self.map.read().contains_key(key)
    }

    /// Current write generation. Take it before reading the backing table
    /// and hand it to [`fill`](Self::fill).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Insert or replace. Returns the value previously stored under `key`.
    pub fn add(&self, key: K, value: V) -> Option<V> {
        if !self.enabled {
            return None;
        }
        let mut map = self.map.write();
        self.bump();
        let old = map.insert(key, value);
        drop(map);
        self.stats.insert(old.is_some());
        trace!(cache = self.name, replaced = old.is_some(), "cache add");
        old
    }

    /// Store a value read from the database, unless the cache changed since
    /// `generation` was taken. Returns whether the value was stored.
    pub fn fill(&self, key: K, value: V, generation: u64) -> bool {
        if !self.enabled {
            return false;
        }
        let mut map = self.map.write();
        if self.generation.load(Ordering::SeqCst) != generation {
            trace!(cache = self.name, "stale fill skipped");
            return false;
        }
        let old = map.insert(key, value);
        drop(map);
        self.stats.insert(old.is_some());
        true
    }

    /// Remove a key. Absence is not an error.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let mut map = self.map.write();
        self.bump();
        let old = map.remove(key);
        drop(map);
        if old.is_some() {
            self.stats.removed(1);
        }
        old
    }

    /// Move the entry at `old` to `new` under one write lock, evicting
    /// whatever was stored at `new`. Returns false if `old` was absent, in
    /// which case `new` is still evicted.
    pub fn rekey<Q>(&self, old: &Q, new: K) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let mut map = self.map.write();
        self.bump();
        match map.remove(old) {
            Some(value) => {
                map.insert(new, value);
                self.stats.removed(1);
                true
            }
            None => {
                if map.remove::<K>(&new).is_some() {
                    self.stats.removed(1);
                }
                false
            }
        }
    }

    /// Keep only the entries for which `keep` returns true.
    pub fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&K, &V) -> bool,
    {
        let mut map = self.map.write();
        self.bump();
        let before = map.len();
        map.retain(|k, v| keep(k, v));
        let removed = before - map.len();
        self.stats.removed(removed as u64);
        removed
    }

    /// Drop every entry. The cache stays usable.
    pub fn clear(&self) {
        let mut map = self.map.write();
        self.bump();
        let count = map.len();
        map.clear();
        map.shrink_to_fit();
        trace!(cache = self.name, count, "cache cleared");
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats(self.len())
    }
}
