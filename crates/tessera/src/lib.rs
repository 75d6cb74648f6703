//! Async fetching, decoding and caching of vector tiles.
//!
//! This crate downloads Mapbox Vector Tiles over HTTP, decodes them into
//! [`ParsedTile`]s and keeps them in a bounded per-instance cache. A fetch
//! state machine remembers which tiles are missing or failing so they are
//! not requested over and over.
//!
//! # Design principles
//!
//! - **Web-compatible**: Works on desktop and WASM via reqwest
//! - **Instance-scoped**: Every [`TileStore`] owns its cache and fetch state
//! - **Cancellable**: Loads stop at the next await point once their
//!   [`CancelToken`] fires, and leave no half-updated state behind
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tessera::{CancelToken, Client, TileKey, TileSource, TileStore};
//!
//! let client = Client::new(TileSource::new("https://tiles.example/{z}/{x}/{y}.pbf"))?;
//! let store = TileStore::new(Arc::new(client), 256, 3);
//!
//! let key = TileKey::new(14, 8190, 5447)?;
//! if let Some(tile) = store.load(key, &CancelToken::new()).await? {
//!     println!("{} features", tile.feature_count());
//! }
//! ```

pub mod cache;
mod cancel;
mod client;
mod error;
mod store;
pub mod tracker;
pub mod types;
mod viewport;

pub use cache::TileCache;
pub use cancel::{CancelToken, run_until_cancelled};
pub use client::{Client, FetchFuture, TileFetcher};
pub use error::{Error, FailureKind, Result};
pub use store::{StoreStats, TileStore};
pub use tracker::{FetchState, FetchTracker, TrackerStats};
pub use types::{TileSource, Viewport};
pub use viewport::{MAX_TILES_PER_AXIS, target_zoom, visible_tiles};

// Re-export decode types for convenience.
pub use tessera_decode::{Feature, Geometry, ParsedLayer, ParsedTile, PropertyValue, TileKey};
