//! Bounded in-memory cache of decoded tiles.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, RwLock},
};

use tessera_decode::{ParsedTile, TileKey};

/// An in-memory cache of parsed tiles.
///
/// Tiles are stored behind `Arc` so renderers can hold on to one while the
/// cache moves on. When the entry count exceeds the capacity, the oldest
/// insertions are evicted first.
///
/// Cloning the cache yields a handle to the same storage.
#[derive(Debug)]
pub struct TileCache {
    data: Arc<RwLock<TileCacheInner>>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct TileCacheInner {
    entries: HashMap<TileKey, Arc<ParsedTile>>,
    /// Insertion order for eviction.
    order: VecDeque<TileKey>,
}

impl TileCache {
    /// Create a cache holding at most `capacity` tiles.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(TileCacheInner::default())),
            capacity: capacity.max(1),
        }
    }

    /// Maximum number of tiles held at once.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the number of cached tiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().unwrap().entries.len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn get(&self, key: TileKey) -> Option<Arc<ParsedTile>> {
        self.data.read().unwrap().entries.get(&key).cloned()
    }

    #[must_use]
    pub fn contains(&self, key: TileKey) -> bool {
        self.data.read().unwrap().entries.contains_key(&key)
    }

    /// Store a tile, returning the keys evicted to make room.
    pub fn insert(&self, tile: Arc<ParsedTile>) -> Vec<TileKey> {
        let key = tile.key;
        let mut cache = self.data.write().unwrap();

        // Re-inserting refreshes the entry's position.
        if cache.entries.remove(&key).is_some() {
            cache.order.retain(|k| *k != key);
        }

        let mut evicted = Vec::new();
        while cache.entries.len() >= self.capacity {
            let Some(oldest) = cache.order.pop_front() else {
                break;
            };
            cache.entries.remove(&oldest);
            evicted.push(oldest);
        }

        cache.entries.insert(key, tile);
        cache.order.push_back(key);
        evicted
    }

    pub fn remove(&self, key: TileKey) -> Option<Arc<ParsedTile>> {
        let mut cache = self.data.write().unwrap();
        let removed = cache.entries.remove(&key);
        if removed.is_some() {
            cache.order.retain(|k| *k != key);
        }
        removed
    }

    /// Clear all cached tiles.
    pub fn clear(&self) {
        let mut cache = self.data.write().unwrap();
        cache.entries.clear();
        cache.order.clear();
    }
}

impl Clone for TileCache {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn tile(z: u8, x: u32, y: u32) -> Arc<ParsedTile> {
        Arc::new(ParsedTile {
            key: TileKey::new(z, x, y).unwrap(),
            layers: HashMap::new(),
        })
    }

    #[test]
    fn test_cache_basic() {
        let cache = TileCache::new(4);
        assert!(cache.is_empty());

        let a = tile(1, 0, 0);
        assert!(cache.insert(Arc::clone(&a)).is_empty());
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(a.key));
        assert!(Arc::ptr_eq(&cache.get(a.key).unwrap(), &a));

        assert!(cache.remove(a.key).is_some());
        assert!(cache.is_empty());
        assert!(cache.remove(a.key).is_none());
    }

    #[test]
    fn test_cache_eviction() {
        let cache = TileCache::new(2);
        let (a, b, c) = (tile(1, 0, 0), tile(1, 1, 0), tile(1, 0, 1));

        cache.insert(Arc::clone(&a));
        cache.insert(Arc::clone(&b));
        assert_eq!(cache.len(), 2);

        // Adding a third tile evicts the oldest.
        let evicted = cache.insert(Arc::clone(&c));
        assert_eq!(evicted, vec![a.key]);
        assert!(!cache.contains(a.key));
        assert!(cache.contains(b.key));
        assert!(cache.contains(c.key));
    }

    #[test]
    fn test_cache_reinsert_refreshes() {
        let cache = TileCache::new(2);
        let (a, b, c) = (tile(1, 0, 0), tile(1, 1, 0), tile(1, 0, 1));

        cache.insert(Arc::clone(&a));
        cache.insert(Arc::clone(&b));
        assert!(cache.insert(Arc::clone(&a)).is_empty());
        assert_eq!(cache.len(), 2);

        // `b` is now the oldest.
        assert_eq!(cache.insert(c), vec![b.key]);
    }

    #[test]
    fn test_cache_clear_shared() {
        let cache = TileCache::new(8);
        let handle = cache.clone();

        cache.insert(tile(0, 0, 0));
        assert_eq!(handle.len(), 1);

        handle.clear();
        assert!(cache.is_empty());
    }
}
