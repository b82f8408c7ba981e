//! Path-keyed cache with subtree invalidation.
//!
//! Directory IDs are expensive to resolve (one marker download per path
//! segment) but never change, so the vault keeps every resolved id here.
//! Deleting or moving a folder affects its whole subtree, which is why
//! invalidation is by path prefix.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::trace;

use crate::path::{CloudPath, DirectoryId};

/// Cache from cleartext folder path to its directory id.
pub type DirectoryIdCache = PrefixInvalidatingCache<DirectoryId>;

/// A map from [`CloudPath`] to `V` whose root entry is pinned.
///
/// # Thread Safety
///
/// All mutations take the single write lock, so a reader never observes a
/// half-applied `invalidate` or `move_subtree`. Reads share the lock.
#[derive(Debug)]
pub struct PrefixInvalidatingCache<V> {
    entries: RwLock<HashMap<CloudPath, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> PrefixInvalidatingCache<V> {
    /// Create a cache holding only `root_value` under the root path.
    pub fn new(root_value: V) -> Self {
        let mut entries = HashMap::new();
        entries.insert(CloudPath::root(), root_value);
        PrefixInvalidatingCache {
            entries: RwLock::new(entries),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a path.
    pub fn get(&self, path: &CloudPath) -> Option<V> {
        let value = self.entries.read().get(path).cloned();
        let counter = if value.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        value
    }

    /// Insert or replace the value for `path`. Last writer wins.
    pub fn put(&self, path: CloudPath, value: V) {
        self.entries.write().insert(path, value);
    }

    /// Remove `path` and every path below it.
    ///
    /// Invalidating the root clears all descendants but keeps the root entry.
    pub fn invalidate(&self, path: &CloudPath) {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| key.is_root() || !(key == path || path.is_ancestor_of(key)));
        trace!(path = %path, removed = before - entries.len(), "Invalidated cache subtree");
    }

    /// Re-key `from` and every path below it under `to`, keeping the values.
    ///
    /// Entries already cached under `to` are dropped first. Moving the root is
    /// a no-op.
    pub fn move_subtree(&self, from: &CloudPath, to: &CloudPath) {
        if from.is_root() || from == to {
            return;
        }
        let mut entries = self.entries.write();
        entries.retain(|key, _| key.is_root() || !(key == to || to.is_ancestor_of(key)));

        let moved: Vec<_> = entries
            .keys()
            .filter(|key| *key == from || from.is_ancestor_of(key))
            .cloned()
            .collect();
        for old in moved {
            if let (Some(value), Some(new)) = (entries.remove(&old), old.rebase(from, to)) {
                entries.insert(new, value);
            }
        }
        trace!(from = %from, to = %to, "Re-keyed cache subtree");
    }

    /// Remove `path` and every path below it, returning the removed entries.
    ///
    /// Pair with [`attach_subtree`](Self::attach_subtree) when the re-keying
    /// has to wait for steps that may still fail.
    pub fn detach_subtree(&self, path: &CloudPath) -> Vec<(CloudPath, V)> {
        if path.is_root() {
            return Vec::new();
        }
        let mut entries = self.entries.write();
        let keys: Vec<_> = entries
            .keys()
            .filter(|key| *key == path || path.is_ancestor_of(key))
            .cloned()
            .collect();
        keys.into_iter()
            .filter_map(|key| entries.remove(&key).map(|value| (key, value)))
            .collect()
    }

    /// Insert entries detached from under `from` beneath `to`.
    ///
    /// Entries already cached under `to` are dropped first.
    pub fn attach_subtree(&self, from: &CloudPath, to: &CloudPath, detached: Vec<(CloudPath, V)>) {
        if detached.is_empty() || to.is_root() {
            return;
        }
        let mut entries = self.entries.write();
        entries.retain(|key, _| key.is_root() || !(key == to || to.is_ancestor_of(key)));
        for (old, value) in detached {
            if let Some(new) = old.rebase(from, to) {
                entries.insert(new, value);
            }
        }
        trace!(from = %from, to = %to, "Re-attached cache subtree");
    }

    /// Number of cached paths, root included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Always false: the root entry cannot be removed.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Get cache statistics for monitoring and debugging.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached paths, root included
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> CloudPath {
        CloudPath::new(s)
    }

    fn populated() -> PrefixInvalidatingCache<u32> {
        let cache = PrefixInvalidatingCache::new(0);
        cache.put(p("/foo"), 1);
        cache.put(p("/foo/bar"), 2);
        cache.put(p("/foo/bar/baz"), 3);
        cache.put(p("/foobar"), 4);
        cache.put(p("/other/foo"), 5);
        cache
    }

    #[test]
    fn test_invalidate_removes_subtree_only() {
        let cache = populated();
        cache.invalidate(&p("/foo"));

        assert_eq!(cache.get(&p("/foo")), None);
        assert_eq!(cache.get(&p("/foo/bar")), None);
        assert_eq!(cache.get(&p("/foo/bar/baz")), None);
        assert_eq!(cache.get(&p("/foobar")), Some(4));
        assert_eq!(cache.get(&p("/other/foo")), Some(5));
        assert_eq!(cache.get(&CloudPath::root()), Some(0));
    }

    #[test]
    fn test_root_survives_invalidation() {
        let cache = populated();
        cache.invalidate(&CloudPath::root());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&CloudPath::root()), Some(0));

        cache.put(CloudPath::root(), 7);
        assert_eq!(cache.get(&CloudPath::root()), Some(7));
    }

    #[test]
    fn test_move_subtree() {
        let cache = populated();
        cache.put(p("/moved/stale"), 9);
        cache.move_subtree(&p("/foo"), &p("/moved"));

        assert_eq!(cache.get(&p("/foo")), None);
        assert_eq!(cache.get(&p("/moved")), Some(1));
        assert_eq!(cache.get(&p("/moved/bar/baz")), Some(3));
        assert_eq!(cache.get(&p("/moved/stale")), None);
        assert_eq!(cache.get(&p("/foobar")), Some(4));
    }

    #[test]
    fn test_detach_then_attach() {
        let cache = populated();
        let detached = cache.detach_subtree(&p("/foo"));
        assert_eq!(detached.len(), 3);
        assert_eq!(cache.get(&p("/foo/bar")), None);
        assert_eq!(cache.get(&p("/foobar")), Some(4));

        cache.put(p("/target/stale"), 9);
        cache.attach_subtree(&p("/foo"), &p("/target"), detached);
        assert_eq!(cache.get(&p("/target")), Some(1));
        assert_eq!(cache.get(&p("/target/bar/baz")), Some(3));
        assert_eq!(cache.get(&p("/target/stale")), None);

        assert!(cache.detach_subtree(&CloudPath::root()).is_empty());
        assert_eq!(cache.get(&CloudPath::root()), Some(0));
    }

    #[test]
    fn test_stats() {
        let cache = PrefixInvalidatingCache::new(());
        let _ = cache.get(&CloudPath::root());
        let _ = cache.get(&p("/missing"));
        assert_eq!(
            cache.stats(),
            CacheStats {
                entries: 1,
                hits: 1,
                misses: 1
            }
        );
    }
}
