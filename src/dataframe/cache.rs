//! Keyed result store backing the rank and permutation caches.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// A plain keyed store with no eviction.
///
/// Entries only ever leave through [`KeyedCache::clear`]: invalidation is
/// wholesale on a data-change notification, never per key, so capacity
/// management would be dead weight. A disabled cache turns every insert
/// into a no-op, which keeps recomputation paths easy to exercise in
/// tests.
#[derive(Debug)]
pub struct KeyedCache<K: Hash + Eq + Clone, V> {
    entries: HashMap<K, V>,
    enabled: bool,
}

impl<K: Hash + Eq + Clone, V> KeyedCache<K, V> {
    /// Create an enabled cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            enabled: true,
        }
    }

    /// Create a cache that stores nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            entries: HashMap::new(),
            enabled: false,
        }
    }

    /// Look up a value by key. Returns `None` if absent or disabled.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if !self.enabled {
            return None;
        }
        self.entries.get(key)
    }

    /// Insert a key-value pair. If the key already exists, the value is
    /// NOT updated. Returns `true` if the entry was newly inserted.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        if !self.enabled || self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, value);
        true
    }

    /// Check if a key is present.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<K: Hash + Eq + Clone, V> Default for KeyedCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_insert_get() {
        let mut cache: KeyedCache<String, i32> = KeyedCache::new();
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);

        assert_eq!(cache.get(&"a".to_string()), Some(&1));
        assert_eq!(cache.get(&"b".to_string()), Some(&2));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_disabled() {
        let mut cache: KeyedCache<String, i32> = KeyedCache::disabled();
        assert!(!cache.insert("a".to_string(), 1));
        assert_eq!(cache.get(&"a".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_duplicate_insert() {
        let mut cache: KeyedCache<String, i32> = KeyedCache::new();
        assert!(cache.insert("a".to_string(), 1));
        assert!(!cache.insert("a".to_string(), 2)); // should not update
        assert_eq!(cache.get(&"a".to_string()), Some(&1)); // original value
    }

    #[test]
    fn test_clear() {
        let mut cache: KeyedCache<String, i32> = KeyedCache::new();
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&"a".to_string()), None);
    }
}
