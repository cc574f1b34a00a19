//! Type-erased concurrent cache.
//!
//! [`TypedCache`] maps keys to values of arbitrary `'static` types and checks
//! the type again on the way out. Reading a key back as the wrong type is
//! treated the same as reading a key that was never stored.
//!
//! There is no eviction, expiry, or size bound. Entries live until they are
//! overwritten, removed, or the cache is cleared.
//!
//! # Example
//!
//! ```rust
//! use tenant_secrets::secrets::TypedCache;
//!
//! let cache: TypedCache<String> = TypedCache::new();
//! cache.store("client1".to_string(), 42u32);
//!
//! assert_eq!(cache.load::<u32, _>("client1").as_deref(), Some(&42));
//! assert!(cache.load::<String, _>("client1").is_none());
//! ```

use dashmap::DashMap;
use std::any::Any;
use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

type Entry = Arc<dyn Any + Send + Sync>;

/// Concurrent map from keys to values of any type, with type-checked reads.
pub struct TypedCache<K> {
    entries: DashMap<K, Entry>,
}

impl<K: Eq + Hash> TypedCache<K> {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// Returns the value stored under `key` if it exists and has type `V`.
    pub fn load<V, Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        V: Any + Send + Sync,
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        // Clone the Arc out so the shard guard is released before downcasting.
        let entry = Arc::clone(self.entries.get(key)?.value());
        entry.downcast::<V>().ok()
    }

    /// Stores `value` under `key`, replacing any previous value of any type.
    pub fn store<V>(&self, key: K, value: V)
    where
        V: Any + Send + Sync,
    {
        self.entries.insert(key, Arc::new(value));
    }

    /// Stores an already shared value without another allocation.
    pub fn store_shared<V>(&self, key: K, value: Arc<V>)
    where
        V: Any + Send + Sync,
    {
        self.entries.insert(key, value);
    }

    /// Removes `key`. Returns whether an entry was present.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash> Default for TypedCache<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> fmt::Debug for TypedCache<K>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedCache").field("entries", &self.entries.len()).finish()
    }
}
