//! Fetch, decode and cache tiles with failure bookkeeping.

use std::sync::{Arc, Mutex};

use tessera_decode::{ParsedTile, TileKey, decode_tile};
use tracing::{debug, warn};

use crate::cache::TileCache;
use crate::cancel::{CancelToken, run_until_cancelled};
use crate::client::TileFetcher;
use crate::error::{Error, FailureKind, Result};
use crate::tracker::{FetchState, FetchTracker, TrackerStats};

/// Snapshot of a store's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    /// Tiles currently held by the cache.
    pub cached_tiles: usize,
    /// Per-state tile counts.
    pub states: TrackerStats,
}

/// Instance-scoped tile storage: one per map.
///
/// Combines a [`TileFetcher`], the fetch state machine and a bounded
/// [`TileCache`]. Safe to share between the concurrent fetches of a batch;
/// no lock is held across an await point.
pub struct TileStore {
    fetcher: Arc<dyn TileFetcher>,
    tracker: Mutex<FetchTracker>,
    cache: TileCache,
}

impl std::fmt::Debug for TileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileStore")
            .field("tracker", &self.tracker)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl TileStore {
    #[must_use]
    pub fn new(fetcher: Arc<dyn TileFetcher>, cache_capacity: usize, retry_limit: u32) -> Self {
        Self {
            fetcher,
            tracker: Mutex::new(FetchTracker::new(retry_limit)),
            cache: TileCache::new(cache_capacity),
        }
    }

    /// The tile if it is already decoded and cached.
    #[must_use]
    pub fn cached(&self, key: TileKey) -> Option<Arc<ParsedTile>> {
        self.cache.get(key)
    }

    #[must_use]
    pub fn state(&self, key: TileKey) -> FetchState {
        self.tracker.lock().unwrap().state(key)
    }

    /// Load one tile, from the cache if possible.
    ///
    /// Returns `Ok(None)` if another load is already fetching this tile; the
    /// caller should skip it rather than request it twice.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `cancel` fires first; the tile returns to
    ///   the state it had before this call.
    /// - [`Error::Unavailable`] for tiles that are not found or have
    ///   exhausted their retries, without touching the network.
    /// - The fetch or decode error of this attempt otherwise.
    pub async fn load(&self, key: TileKey, cancel: &CancelToken) -> Result<Option<Arc<ParsedTile>>> {
        if let Some(tile) = self.cache.get(key) {
            return Ok(Some(tile));
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        {
            let mut tracker = self.tracker.lock().unwrap();
            match tracker.state(key) {
                FetchState::Fetching { .. } => return Ok(None),
                FetchState::NotFound | FetchState::Unavailable => {
                    return Err(Error::Unavailable { key });
                }
                _ => {}
            }
            if !tracker.begin(key) {
                return Err(Error::Unavailable { key });
            }
        }

        // Dropping this future mid-fetch must not strand the tile in `Fetching`.
        let guard = FetchGuard {
            tracker: &self.tracker,
            key,
        };

        debug!(tile = %key, "loading tile");
        let Some(fetched) = run_until_cancelled(cancel, self.fetcher.fetch(key)).await else {
            debug!(tile = %key, "load cancelled");
            return Err(Error::Cancelled);
        };
        std::mem::forget(guard);

        let decoded = fetched.and_then(|bytes| decode_tile(key, &bytes).map_err(Error::from));
        match decoded {
            Ok(tile) => {
                let tile = Arc::new(tile);
                let evicted = self.cache.insert(Arc::clone(&tile));

                let mut tracker = self.tracker.lock().unwrap();
                tracker.complete(key);
                for old in evicted {
                    tracker.evicted(old);
                }
                debug!(
                    tile = %key,
                    features = tile.feature_count(),
                    skipped = tile.skipped_count(),
                    "tile cached"
                );
                Ok(Some(tile))
            }
            Err(e) if e.kind() == FailureKind::NotFound => {
                self.tracker.lock().unwrap().not_found(key);
                debug!(tile = %key, "tile not found");
                Err(e)
            }
            Err(e) => {
                let state = self.tracker.lock().unwrap().fail(key);
                let attempt = match state {
                    FetchState::Errored { attempts } => attempts,
                    _ => self.retry_limit(),
                };
                warn!(tile = %key, attempt, error = %e, "tile load failed");
                Err(e)
            }
        }
    }

    /// Number of attempts before a tile is given up on.
    #[must_use]
    pub fn retry_limit(&self) -> u32 {
        self.tracker.lock().unwrap().retry_limit()
    }

    /// Drop every cached tile and forget all failure history.
    pub fn clear(&self) {
        self.cache.clear();
        self.tracker.lock().unwrap().clear();
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            cached_tiles: self.cache.len(),
            states: self.tracker.lock().unwrap().stats(),
        }
    }
}

/// Reverts a tile from `Fetching` when a load ends without an outcome.
struct FetchGuard<'a> {
    tracker: &'a Mutex<FetchTracker>,
    key: TileKey,
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut tracker) = self.tracker.lock() {
            tracker.cancel(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use prost::Message;
    use tessera_proto::{Tile, tile};

    use super::*;
    use crate::client::FetchFuture;

    /// Serves canned responses and counts requests per tile.
    struct MockFetcher {
        responses: HashMap<TileKey, std::result::Result<Vec<u8>, u16>>,
        calls: Mutex<HashMap<TileKey, usize>>,
        pending: AtomicUsize,
    }

    impl MockFetcher {
        fn new(responses: HashMap<TileKey, std::result::Result<Vec<u8>, u16>>) -> Self {
            Self {
                responses,
                calls: Mutex::new(HashMap::new()),
                pending: AtomicUsize::new(0),
            }
        }

        fn calls(&self, key: TileKey) -> usize {
            self.calls.lock().unwrap().get(&key).copied().unwrap_or(0)
        }
    }

    impl TileFetcher for MockFetcher {
        fn fetch(&self, key: TileKey) -> FetchFuture<'_> {
            *self.calls.lock().unwrap().entry(key).or_default() += 1;
            let response = self.responses.get(&key).cloned();
            Box::pin(async move {
                match response {
                    None => {
                        self.pending.fetch_add(1, Ordering::SeqCst);
                        std::future::pending().await
                    }
                    Some(Ok(bytes)) => Ok(bytes),
                    Some(Err(404)) => Err(Error::NotFound { key }),
                    Some(Err(status)) => Err(Error::HttpStatus {
                        url: key.to_string(),
                        status,
                    }),
                }
            })
        }
    }

    fn tile_bytes() -> Vec<u8> {
        Tile {
            layers: vec![tile::Layer {
                version: 2,
                name: "water".to_string(),
                features: Vec::new(),
                keys: Vec::new(),
                values: Vec::new(),
                extent: Some(4096),
            }],
        }
        .encode_to_vec()
    }

    fn key(x: u32) -> TileKey {
        TileKey::new(3, x, 2).unwrap()
    }

    fn store(responses: HashMap<TileKey, std::result::Result<Vec<u8>, u16>>) -> (Arc<MockFetcher>, TileStore) {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let fetcher = Arc::new(MockFetcher::new(responses));
        let store = TileStore::new(Arc::clone(&fetcher) as Arc<dyn TileFetcher>, 2, 3);
        (fetcher, store)
    }

    #[tokio::test]
    async fn test_load_caches() {
        let (fetcher, store) = store(HashMap::from([(key(0), Ok(tile_bytes()))]));
        let cancel = CancelToken::new();

        let tile = store.load(key(0), &cancel).await.unwrap().unwrap();
        assert!(tile.layer("water").is_some());
        assert_eq!(store.state(key(0)), FetchState::Cached);

        store.load(key(0), &cancel).await.unwrap().unwrap();
        assert_eq!(fetcher.calls(key(0)), 1);
        assert_eq!(store.stats().cached_tiles, 1);
    }

    #[tokio::test]
    async fn test_not_found_never_retried() {
        let (fetcher, store) = store(HashMap::from([(key(1), Err(404))]));
        let cancel = CancelToken::new();

        let err = store.load(key(1), &cancel).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::NotFound);
        let err = store.load(key(1), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Unavailable { .. }));
        assert_eq!(fetcher.calls(key(1)), 1);
    }

    #[tokio::test]
    async fn test_errors_retry_until_limit() {
        let (fetcher, store) = store(HashMap::from([(key(2), Err(503))]));
        let cancel = CancelToken::new();

        for _ in 0..3 {
            let err = store.load(key(2), &cancel).await.unwrap_err();
            assert_eq!(err.kind(), FailureKind::NetworkFailure);
        }
        assert_eq!(store.state(key(2)), FetchState::Unavailable);

        let err = store.load(key(2), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Unavailable { .. }));
        assert_eq!(fetcher.calls(key(2)), 3);
    }

    #[tokio::test]
    async fn test_decode_failure_counts_as_error() {
        let (_, store) = store(HashMap::from([(key(3), Ok(vec![0xff, 0xff, 0xff, 0x01]))]));
        let err = store.load(key(3), &CancelToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::DecodeFailure);
        assert_eq!(store.state(key(3)), FetchState::Errored { attempts: 1 });
    }

    #[tokio::test]
    async fn test_cancel_returns_to_unrequested() {
        let (fetcher, store) = store(HashMap::new());
        let store = Arc::new(store);
        let cancel = CancelToken::new();

        let task = {
            let store = Arc::clone(&store);
            let cancel = cancel.clone();
            tokio::spawn(async move { store.load(key(4), &cancel).await })
        };

        while fetcher.pending.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(store.state(key(4)), FetchState::Fetching { attempts: 0 });
        // A second load while in flight is skipped, not re-requested.
        assert!(store.load(key(4), &CancelToken::new()).await.unwrap().is_none());

        cancel.cancel();
        let result = task.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(store.state(key(4)), FetchState::Unrequested);
        assert_eq!(fetcher.calls(key(4)), 1);
    }

    #[tokio::test]
    async fn test_dropped_load_reverts() {
        let (fetcher, store) = store(HashMap::new());
        let cancel = CancelToken::new();
        let load = store.load(key(5), &cancel);
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(10), load).await;

        assert!(timed_out.is_err());
        assert_eq!(store.state(key(5)), FetchState::Unrequested);
        assert_eq!(fetcher.calls(key(5)), 1);
    }

    #[tokio::test]
    async fn test_eviction_allows_refetch() {
        let (fetcher, store) = store(HashMap::from([
            (key(0), Ok(tile_bytes())),
            (key(1), Ok(tile_bytes())),
            (key(2), Ok(tile_bytes())),
        ]));
        let cancel = CancelToken::new();

        for x in 0..3 {
            store.load(key(x), &cancel).await.unwrap();
        }
        // Capacity 2: the first tile was evicted.
        assert_eq!(store.state(key(0)), FetchState::Unrequested);
        assert!(store.cached(key(0)).is_none());

        store.load(key(0), &cancel).await.unwrap();
        assert_eq!(fetcher.calls(key(0)), 2);

        store.clear();
        assert_eq!(store.stats(), StoreStats::default());
    }
}
