//! Live feature lookup for picking.

use std::collections::HashMap;
use std::sync::Arc;

use tessera_decode::{Feature, ParsedTile, Properties, TileKey};
use tessera_geometry::FeatureIdCode;

/// A feature with live GPU buffers, as resolved from a picked pixel.
#[derive(Debug, Clone)]
pub struct FeatureRef {
    pub key: TileKey,
    /// Style layer the feature was drawn by.
    pub layer_id: String,
    pub source_layer: String,
    pub feature_id: u64,
    tile: Arc<ParsedTile>,
    index: usize,
}

impl FeatureRef {
    #[must_use]
    pub fn new(
        tile: Arc<ParsedTile>,
        layer_id: impl Into<String>,
        source_layer: impl Into<String>,
        index: usize,
    ) -> Option<Self> {
        let source_layer = source_layer.into();
        let feature_id = tile.layer(&source_layer)?.features.get(index)?.id;
        Some(Self {
            key: tile.key,
            layer_id: layer_id.into(),
            source_layer,
            feature_id,
            tile,
            index,
        })
    }

    /// The decoded feature.
    #[must_use]
    pub fn feature(&self) -> &Feature {
        // The constructor checked the index against this same immutable tile.
        &self.tile.layers[&self.source_layer].features[self.index]
    }

    #[must_use]
    pub fn properties(&self) -> &Properties {
        &self.feature().properties
    }
}

/// Per-frame handle of a registered feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureHandle(u64);

#[derive(Debug)]
struct Registered {
    code: FeatureIdCode,
    feature: FeatureRef,
}

/// Maps picking codes back to the features whose buffers are resident.
///
/// Only valid while the corresponding buffers are live: the resource
/// manager releases a tile's entries in the same call that destroys its
/// buffers.
#[derive(Debug, Default)]
pub struct FeatureRegistry {
    next_handle: u64,
    entries: HashMap<FeatureHandle, Registered>,
    by_id: HashMap<u16, Vec<FeatureHandle>>,
    by_tile: HashMap<TileKey, Vec<FeatureHandle>>,
}

impl FeatureRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register a feature drawn with `code`. Codes without a valid id are
    /// not registered.
    pub fn register(&mut self, code: FeatureIdCode, feature: FeatureRef) -> Option<FeatureHandle> {
        let id = code.feature_id()?;
        self.next_handle += 1;
        let handle = FeatureHandle(self.next_handle);

        self.by_id.entry(id).or_default().push(handle);
        self.by_tile.entry(feature.key).or_default().push(handle);
        self.entries.insert(handle, Registered { code, feature });
        Some(handle)
    }

    #[must_use]
    pub fn get(&self, handle: FeatureHandle) -> Option<&FeatureRef> {
        self.entries.get(&handle).map(|r| &r.feature)
    }

    /// Resolve a picked code to a live feature.
    ///
    /// Among features sharing the encoded id, one whose layer hash matches
    /// wins; ties and misses go to the most recently registered.
    #[must_use]
    pub fn resolve(&self, code: FeatureIdCode) -> Option<&FeatureRef> {
        let handles = self.by_id.get(&code.feature_id()?)?;
        let newest_matching = handles
            .iter()
            .rev()
            .find(|h| {
                self.entries
                    .get(*h)
                    .is_some_and(|r| r.code.layer_hash() == code.layer_hash())
            });
        let handle = newest_matching.or_else(|| handles.last())?;
        self.get(*handle)
    }

    /// Drop every entry of `key`. Returns how many were removed.
    pub fn release_tile(&mut self, key: TileKey) -> usize {
        let Some(handles) = self.by_tile.remove(&key) else {
            return 0;
        };
        for handle in &handles {
            let Some(registered) = self.entries.remove(handle) else {
                continue;
            };
            let Some(id) = registered.code.feature_id() else {
                continue;
            };
            if let Some(ids) = self.by_id.get_mut(&id) {
                ids.retain(|h| h != handle);
                if ids.is_empty() {
                    self.by_id.remove(&id);
                }
            }
        }
        handles.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_id.clear();
        self.by_tile.clear();
    }
}
