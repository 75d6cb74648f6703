//! Per-tile fetch state machine.
//!
//! ```text
//! unrequested ──begin──▶ fetching ──complete──▶ cached
//!      ▲                   │  │ └──not_found──▶ not-found
//!      │                   │  └────fail───────▶ errored(n) ──(n == limit)──▶ unavailable
//!      └──cancel/evict─────┘
//! ```
//!
//! `errored(n)` tiles may begin again while `n` is below the retry limit.
//! `not-found` and `unavailable` are terminal until the tracker is cleared.

use std::collections::HashMap;

use tessera_decode::TileKey;

/// Where a tile is in its fetch lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FetchState {
    #[default]
    Unrequested,
    /// A request is in flight. `attempts` counts earlier failures.
    Fetching { attempts: u32 },
    Cached,
    NotFound,
    Errored { attempts: u32 },
    Unavailable,
}

/// Counts of tiles per state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackerStats {
    pub fetching: usize,
    pub cached: usize,
    pub not_found: usize,
    pub errored: usize,
    pub unavailable: usize,
}

/// Tracks the fetch state of every tile a store has touched.
#[derive(Debug, Clone)]
pub struct FetchTracker {
    states: HashMap<TileKey, FetchState>,
    retry_limit: u32,
}

impl FetchTracker {
    /// Create a tracker that gives up on a tile after `retry_limit` failed
    /// attempts.
    #[must_use]
    pub fn new(retry_limit: u32) -> Self {
        Self {
            states: HashMap::new(),
            retry_limit: retry_limit.max(1),
        }
    }

    #[must_use]
    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    #[must_use]
    pub fn state(&self, key: TileKey) -> FetchState {
        self.states.get(&key).copied().unwrap_or_default()
    }

    /// Whether a request for `key` may be started now.
    #[must_use]
    pub fn can_begin(&self, key: TileKey) -> bool {
        match self.state(key) {
            FetchState::Unrequested => true,
            FetchState::Errored { attempts } => attempts < self.retry_limit,
            _ => false,
        }
    }

    /// Mark `key` as fetching. Returns `false` (and changes nothing) if a
    /// request may not be started.
    pub fn begin(&mut self, key: TileKey) -> bool {
        if !self.can_begin(key) {
            return false;
        }
        let attempts = match self.state(key) {
            FetchState::Errored { attempts } => attempts,
            _ => 0,
        };
        self.states.insert(key, FetchState::Fetching { attempts });
        true
    }

    pub fn complete(&mut self, key: TileKey) {
        self.states.insert(key, FetchState::Cached);
    }

    pub fn not_found(&mut self, key: TileKey) {
        self.states.insert(key, FetchState::NotFound);
    }

    /// Record a failed attempt and return the resulting state.
    pub fn fail(&mut self, key: TileKey) -> FetchState {
        let attempts = match self.state(key) {
            FetchState::Fetching { attempts } | FetchState::Errored { attempts } => attempts + 1,
            _ => 1,
        };
        let state = if attempts >= self.retry_limit {
            FetchState::Unavailable
        } else {
            FetchState::Errored { attempts }
        };
        self.states.insert(key, state);
        state
    }

    /// Undo a `begin` without counting it as a failure.
    pub fn cancel(&mut self, key: TileKey) {
        if let FetchState::Fetching { attempts } = self.state(key) {
            if attempts == 0 {
                self.states.remove(&key);
            } else {
                self.states.insert(key, FetchState::Errored { attempts });
            }
        }
    }

    /// A cached tile was evicted and may be fetched again.
    pub fn evicted(&mut self, key: TileKey) {
        if self.state(key) == FetchState::Cached {
            self.states.remove(&key);
        }
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    #[must_use]
    pub fn stats(&self) -> TrackerStats {
        let mut stats = TrackerStats::default();
        for state in self.states.values() {
            match state {
                FetchState::Unrequested => {}
                FetchState::Fetching { .. } => stats.fetching += 1,
                FetchState::Cached => stats.cached += 1,
                FetchState::NotFound => stats.not_found += 1,
                FetchState::Errored { .. } => stats.errored += 1,
                FetchState::Unavailable => stats.unavailable += 1,
            }
        }
        stats
    }
}

impl Default for FetchTracker {
    fn default() -> Self {
        Self::new(3)
    }
}
