//! GPU buffer ownership for resident tiles.
//!
//! [`GpuResourceManager`] is the only place tile buffers are created or
//! destroyed. Every buffer it creates belongs to exactly one resident tile
//! until that tile is evicted, so `created - destroyed` always equals the
//! number of buffers the resident tiles reference.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tessera_decode::{ParsedTile, TileKey};
use tessera_geometry::{DrapedPolygon, FeatureIdCode, RenderGeometry, Splatmap, Vertex};
use tracing::{debug, warn};
use web_time::Instant;

use crate::error::RenderResult;
use crate::gpu::{BufferHandle, BufferKind, GpuBackend};
use crate::registry::{FeatureRef, FeatureRegistry};

/// A vertex buffer and the index buffer drawing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshBuffers {
    pub vertex: BufferHandle,
    pub index: BufferHandle,
    pub vertex_count: u32,
    pub index_count: u32,
}

/// The buffers of one feature drawn by one style layer.
#[derive(Debug, Clone)]
pub struct TileBufferEntry {
    pub key: TileKey,
    pub layer_id: String,
    pub feature_id: u64,
    pub code: FeatureIdCode,
    pub visible: MeshBuffers,
    /// `None` when the feature has no picking geometry.
    pub picking: Option<MeshBuffers>,
    pub is_filled: bool,
    pub is_line: bool,
    pub created_at: Instant,
}

impl TileBufferEntry {
    fn handles(&self) -> impl Iterator<Item = BufferHandle> + '_ {
        let visible = [self.visible.vertex, self.visible.index];
        let picking = self.picking.iter().flat_map(|m| [m.vertex, m.index]);
        visible.into_iter().chain(picking)
    }

    #[must_use]
    pub fn buffer_count(&self) -> usize {
        if self.picking.is_some() { 4 } else { 2 }
    }
}

/// Everything resident for one tile.
#[derive(Debug)]
pub struct ResidentTile {
    pub key: TileKey,
    pub entries: Vec<TileBufferEntry>,
    /// Texels of the draped polygons, if any were registered.
    pub splatmap: Option<BufferHandle>,
    pub installed_at: Instant,
}

impl ResidentTile {
    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.entries
            .iter()
            .map(TileBufferEntry::buffer_count)
            .sum::<usize>()
            + usize::from(self.splatmap.is_some())
    }

    fn handles(&self) -> impl Iterator<Item = BufferHandle> + '_ {
        self.entries
            .iter()
            .flat_map(TileBufferEntry::handles)
            .chain(self.splatmap)
    }
}

/// A feature's geometry, with its position in the source layer.
#[derive(Debug, Clone)]
pub struct BuiltFeature {
    pub geometry: RenderGeometry,
    /// Index of the feature in its source layer of the parsed tile.
    pub source_index: usize,
}

/// Geometry built for one style layer of a tile.
#[derive(Debug, Clone)]
pub struct LayerGeometry {
    pub layer_id: String,
    pub source_layer: String,
    pub features: Vec<BuiltFeature>,
}

/// All CPU-side geometry of a tile, ready to install.
#[derive(Debug, Clone)]
pub struct TileGeometry {
    pub tile: Arc<ParsedTile>,
    pub layers: Vec<LayerGeometry>,
    pub draped: Vec<DrapedPolygon>,
}

impl TileGeometry {
    #[must_use]
    pub fn new(tile: Arc<ParsedTile>) -> Self {
        Self {
            tile,
            layers: Vec::new(),
            draped: Vec::new(),
        }
    }

    #[must_use]
    pub fn key(&self) -> TileKey {
        self.tile.key
    }
}

/// What [`GpuResourceManager::install_tile`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstallReport {
    /// Features now resident.
    pub features: usize,
    /// Features dropped because a buffer could not be created.
    pub failed: usize,
    pub buffers: usize,
    /// A previous installation of the tile was destroyed first.
    pub replaced: bool,
}

/// Buffer bookkeeping counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferStats {
    pub created: u64,
    pub destroyed: u64,
    /// `created - destroyed`.
    pub live: u64,
    /// Buffers referenced by resident tiles.
    pub resident: u64,
}

impl BufferStats {
    /// Live buffers no resident tile accounts for. Zero unless there is a bug.
    #[must_use]
    pub fn leaked(&self) -> u64 {
        self.live.saturating_sub(self.resident)
    }
}

/// Owns every tile buffer and the registry of features drawn with them.
///
/// Dropping the manager destroys everything still resident.
#[derive(Debug)]
pub struct GpuResourceManager<B: GpuBackend> {
    backend: B,
    tiles: BTreeMap<TileKey, ResidentTile>,
    registry: FeatureRegistry,
    splatmap_size: u32,
    created: u64,
    destroyed: u64,
}

impl<B: GpuBackend> GpuResourceManager<B> {
    /// Create a manager uploading through `backend`. Draped polygons are
    /// rasterized into `splatmap_size x splatmap_size` textures.
    #[must_use]
    pub fn new(backend: B, splatmap_size: u32) -> Self {
        Self {
            backend,
            tiles: BTreeMap::new(),
            registry: FeatureRegistry::new(),
            splatmap_size: splatmap_size.max(1),
            created: 0,
            destroyed: 0,
        }
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[must_use]
    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    #[must_use]
    pub fn tile(&self, key: TileKey) -> Option<&ResidentTile> {
        self.tiles.get(&key)
    }

    #[must_use]
    pub fn is_resident(&self, key: TileKey) -> bool {
        self.tiles.contains_key(&key)
    }

    /// Resident tile keys in ascending order.
    pub fn resident_keys(&self) -> impl Iterator<Item = TileKey> + '_ {
        self.tiles.keys().copied()
    }

    #[must_use]
    pub fn resident_tiles(&self) -> usize {
        self.tiles.len()
    }

    /// Create the buffers of a tile and make it resident.
    ///
    /// A tile that is already resident is destroyed first. Features whose
    /// buffers cannot all be created are left out entirely; their partial
    /// buffers are destroyed before this returns.
    pub fn install_tile(&mut self, geometry: TileGeometry) -> InstallReport {
        let key = geometry.key();
        let mut report = InstallReport {
            replaced: self.evict(key),
            ..InstallReport::default()
        };

        let mut entries = Vec::new();
        for layer in &geometry.layers {
            for built in &layer.features {
                if built.geometry.is_empty() {
                    continue;
                }
                match self.upload_feature(key, &layer.layer_id, &built.geometry) {
                    Ok(entry) => {
                        let feature = FeatureRef::new(
                            Arc::clone(&geometry.tile),
                            layer.layer_id.as_str(),
                            layer.source_layer.as_str(),
                            built.source_index,
                        );
                        if let Some(feature) = feature {
                            self.registry.register(entry.code, feature);
                        }
                        report.buffers += entry.buffer_count();
                        report.features += 1;
                        entries.push(entry);
                    }
                    Err(e) => {
                        warn!(
                            tile = %key,
                            layer = %layer.layer_id,
                            feature = built.geometry.feature_id,
                            error = %e,
                            "dropping feature"
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        let splatmap = self.upload_splatmap(key, &geometry.draped);
        report.buffers += usize::from(splatmap.is_some());

        self.tiles.insert(
            key,
            ResidentTile {
                key,
                entries,
                splatmap,
                installed_at: Instant::now(),
            },
        );
        debug!(
            tile = %key,
            features = report.features,
            failed = report.failed,
            buffers = report.buffers,
            "tile installed"
        );
        report
    }

    /// Destroy a resident tile. Returns whether it was resident.
    pub fn evict(&mut self, key: TileKey) -> bool {
        let Some(tile) = self.tiles.remove(&key) else {
            return false;
        };
        for handle in tile.handles() {
            self.destroy(handle);
        }
        self.registry.release_tile(key);
        true
    }

    /// Destroy every tile not at `zoom`. Returns the evicted keys.
    pub fn evict_for_zoom(&mut self, zoom: u8) -> Vec<TileKey> {
        let stale: Vec<TileKey> = self.resident_keys().filter(|k| k.z() != zoom).collect();
        self.evict_all(stale)
    }

    /// Destroy every tile not in `visible`. Returns the evicted keys.
    pub fn evict_offscreen(&mut self, visible: &[TileKey]) -> Vec<TileKey> {
        let visible: HashSet<TileKey> = visible.iter().copied().collect();
        let stale: Vec<TileKey> = self
            .resident_keys()
            .filter(|k| !visible.contains(k))
            .collect();
        self.evict_all(stale)
    }

    fn evict_all(&mut self, keys: Vec<TileKey>) -> Vec<TileKey> {
        for &key in &keys {
            self.evict(key);
        }
        if !keys.is_empty() {
            debug!(evicted = keys.len(), remaining = self.tiles.len(), "tiles evicted");
        }
        keys
    }

    #[must_use]
    pub fn stats(&self) -> BufferStats {
        let resident: usize = self.tiles.values().map(ResidentTile::buffer_count).sum();
        BufferStats {
            created: self.created,
            destroyed: self.destroyed,
            live: self.created - self.destroyed,
            resident: resident as u64,
        }
    }

    /// Destroy everything and return the final counters.
    pub fn dispose(&mut self) -> BufferStats {
        let keys: Vec<TileKey> = self.resident_keys().collect();
        self.evict_all(keys);
        self.registry.clear();
        self.stats()
    }

    fn create(
        &mut self,
        label: &str,
        kind: BufferKind,
        contents: &[u8],
    ) -> RenderResult<BufferHandle> {
        let handle = self.backend.create_buffer(label, kind, contents)?;
        self.created += 1;
        Ok(handle)
    }

    fn destroy(&mut self, handle: BufferHandle) {
        self.backend.destroy_buffer(handle);
        self.destroyed += 1;
    }

    fn upload_mesh(
        &mut self,
        label: &str,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> RenderResult<MeshBuffers> {
        let vertex = self.create(
            &format!("{label} vbo"),
            BufferKind::Vertex,
            bytemuck::cast_slice(vertices),
        )?;
        let index = match self.create(
            &format!("{label} ibo"),
            BufferKind::Index,
            bytemuck::cast_slice(indices),
        ) {
            Ok(index) => index,
            Err(e) => {
                self.destroy(vertex);
                return Err(e);
            }
        };

        #[allow(clippy::cast_possible_truncation)]
        let counts = (vertices.len() as u32, indices.len() as u32);
        Ok(MeshBuffers {
            vertex,
            index,
            vertex_count: counts.0,
            index_count: counts.1,
        })
    }

    fn upload_feature(
        &mut self,
        key: TileKey,
        layer_id: &str,
        geometry: &RenderGeometry,
    ) -> RenderResult<TileBufferEntry> {
        let label = format!("{key} {layer_id} #{}", geometry.feature_id);
        let visible = self.upload_mesh(
            &label,
            &geometry.visible_vertices,
            &geometry.visible_indices,
        )?;

        let picking = if geometry.picking_indices.is_empty() {
            None
        } else {
            match self.upload_mesh(
                &format!("{label} picking"),
                &geometry.picking_vertices,
                &geometry.picking_indices,
            ) {
                Ok(mesh) => Some(mesh),
                Err(e) => {
                    self.destroy(visible.vertex);
                    self.destroy(visible.index);
                    return Err(e);
                }
            }
        };

        Ok(TileBufferEntry {
            key,
            layer_id: layer_id.to_string(),
            feature_id: geometry.feature_id,
            code: geometry.code,
            visible,
            picking,
            is_filled: geometry.is_filled,
            is_line: geometry.is_line,
            created_at: Instant::now(),
        })
    }

    fn upload_splatmap(&mut self, key: TileKey, draped: &[DrapedPolygon]) -> Option<BufferHandle> {
        if draped.is_empty() {
            return None;
        }
        let mut splatmap = Splatmap::new(key, self.splatmap_size);
        for polygon in draped {
            splatmap.rasterize(polygon);
        }
        match self.create(&format!("{key} splatmap"), BufferKind::Splatmap, splatmap.as_bytes()) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(tile = %key, error = %e, "dropping splatmap");
                None
            }
        }
    }
}

impl<B: GpuBackend> Drop for GpuResourceManager<B> {
    fn drop(&mut self) {
        if !self.tiles.is_empty() {
            self.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use glam::DVec2;
    use tessera_decode::{Feature, Geometry, ParsedLayer, Polygon, Properties};
    use tessera_geometry::{BuildOutcome, GeometryBuilder, LayerKind, LayerStyle, PaintValues};

    use super::*;
    use crate::gpu::HeadlessBackend;

    fn square(min: f64, max: f64) -> Polygon {
        Polygon {
            exterior: vec![
                DVec2::new(min, min),
                DVec2::new(max, min),
                DVec2::new(max, max),
                DVec2::new(min, max),
            ],
            holes: Vec::new(),
        }
    }

    fn parsed_tile(key: TileKey, count: u64) -> Arc<ParsedTile> {
        let features = (1..=count)
            .map(|id| {
                #[allow(clippy::cast_precision_loss)]
                let offset = id as f64 * 100.0;
                Feature {
                    id,
                    geometry: Geometry::Polygon(square(offset, offset + 50.0)),
                    properties: Properties::new(),
                }
            })
            .collect();
        let layer = ParsedLayer {
            name: "building".to_string(),
            extent: 4096,
            features,
            skipped_features: 0,
        };
        Arc::new(ParsedTile {
            key,
            layers: HashMap::from([("building".to_string(), layer)]),
        })
    }

    fn tile_geometry(key: TileKey, count: u64) -> TileGeometry {
        let tile = parsed_tile(key, count);
        let style = LayerStyle::new("buildings", "building", LayerKind::Fill);
        let builder = GeometryBuilder::default();
        let mut batch = builder.batch(key, 4096, &style, None);

        let mut layer = LayerGeometry {
            layer_id: style.id.clone(),
            source_layer: style.source_layer.clone(),
            features: Vec::new(),
        };
        for (index, feature) in tile.layers["building"].features.iter().enumerate() {
            if let BuildOutcome::Geometry(geometry) = batch.build(feature, &PaintValues::default()) {
                layer.features.push(BuiltFeature {
                    geometry,
                    source_index: index,
                });
            }
        }

        let mut geometry = TileGeometry::new(tile);
        geometry.layers.push(layer);
        geometry
    }

    fn key(z: u8, x: u32, y: u32) -> TileKey {
        TileKey::new(z, x, y).unwrap()
    }

    fn assert_parity(manager: &GpuResourceManager<HeadlessBackend>) {
        let stats = manager.stats();
        assert_eq!(stats.leaked(), 0);
        assert_eq!(stats.live, stats.resident);
        assert_eq!(manager.backend().live_buffers() as u64, stats.live);
    }

    #[test]
    fn test_install_creates_buffers_and_registers() {
        let mut manager = GpuResourceManager::new(HeadlessBackend::new(), 64);
        let k = key(5, 10, 12);
        let report = manager.install_tile(tile_geometry(k, 3));

        assert_eq!(report.features, 3);
        assert_eq!(report.failed, 0);
        // Visible and picking, vertex and index, per feature.
        assert_eq!(report.buffers, 12);
        assert!(!report.replaced);

        let tile = manager.tile(k).unwrap();
        assert_eq!(tile.entries.len(), 3);
        assert_eq!(tile.entries[0].visible.index_count, 6);
        assert_eq!(manager.registry().len(), 3);

        let code = tile.entries[1].code;
        let feature = manager.registry().resolve(code).unwrap();
        assert_eq!(feature.feature_id, 2);
        assert_eq!(feature.layer_id, "buildings");
        assert_parity(&manager);
    }

    #[test]
    fn test_reinstall_replaces() {
        let mut manager = GpuResourceManager::new(HeadlessBackend::new(), 64);
        let k = key(5, 10, 12);
        manager.install_tile(tile_geometry(k, 3));
        let report = manager.install_tile(tile_geometry(k, 1));

        assert!(report.replaced);
        assert_eq!(manager.tile(k).unwrap().entries.len(), 1);
        assert_eq!(manager.registry().len(), 1);
        assert_eq!(manager.stats().destroyed, 12);
        assert_parity(&manager);
    }

    #[test]
    fn test_failed_feature_leaves_nothing_behind() {
        // Room for the visible buffers of one feature plus part of its picking set.
        let geometry = tile_geometry(key(5, 10, 12), 2);
        let first = &geometry.layers[0].features[0].geometry;
        let visible_bytes =
            first.visible_vertices.len() * Vertex::STRIDE + first.visible_indices.len() * 4;
        let picking_vertex_bytes = first.picking_vertices.len() * Vertex::STRIDE;
        let backend = HeadlessBackend::with_memory_limit(visible_bytes + picking_vertex_bytes);

        let mut manager = GpuResourceManager::new(backend, 64);
        let report = manager.install_tile(geometry);

        assert_eq!(report.features, 0);
        assert_eq!(report.failed, 2);
        assert!(manager.registry().is_empty());
        assert_eq!(manager.backend().live_buffers(), 0);
        assert_parity(&manager);
        assert!(manager.stats().created > 0);
    }

    #[test]
    fn test_zoom_eviction() {
        let mut manager = GpuResourceManager::new(HeadlessBackend::new(), 64);
        manager.install_tile(tile_geometry(key(4, 5, 6), 1));
        manager.install_tile(tile_geometry(key(5, 10, 12), 1));
        manager.install_tile(tile_geometry(key(5, 11, 12), 1));

        let evicted = manager.evict_for_zoom(5);
        assert_eq!(evicted, vec![key(4, 5, 6)]);
        assert!(manager.resident_keys().all(|k| k.z() == 5));
        assert_parity(&manager);
    }

    #[test]
    fn test_offscreen_eviction() {
        let mut manager = GpuResourceManager::new(HeadlessBackend::new(), 64);
        for x in 10..13 {
            manager.install_tile(tile_geometry(key(5, x, 12), 2));
        }

        let visible = [key(5, 11, 12), key(5, 12, 12), key(5, 13, 12)];
        let evicted = manager.evict_offscreen(&visible);
        assert_eq!(evicted, vec![key(5, 10, 12)]);
        assert!(manager.resident_keys().all(|k| visible.contains(&k)));
        assert_eq!(manager.registry().len(), 4);
        assert_parity(&manager);
    }

    #[test]
    fn test_draped_polygons_get_a_splatmap() {
        let k = key(12, 655, 1583);
        let (min, max) = tessera_geometry::transform::tile_bounds_clip(k, 4096);
        let mut geometry = TileGeometry::new(parsed_tile(k, 0));
        geometry.draped.push(DrapedPolygon {
            feature_id: 1,
            rings: vec![vec![
                min,
                DVec2::new(max.x, min.y),
                max,
                DVec2::new(min.x, max.y),
            ]],
            color: [0.2, 0.6, 0.2, 1.0],
        });

        let mut manager = GpuResourceManager::new(HeadlessBackend::new(), 16);
        let report = manager.install_tile(geometry);
        assert_eq!(report.buffers, 1);
        assert!(manager.tile(k).unwrap().splatmap.is_some());
        assert_eq!(manager.backend().live_bytes(), 16 * 16 * 4);
        assert_parity(&manager);
    }

    #[test]
    fn test_dispose_releases_everything() {
        let mut manager = GpuResourceManager::new(HeadlessBackend::new(), 64);
        manager.install_tile(tile_geometry(key(5, 10, 12), 2));
        manager.install_tile(tile_geometry(key(5, 11, 12), 2));

        let stats = manager.dispose();
        assert_eq!(stats.created, 16);
        assert_eq!(stats.destroyed, 16);
        assert_eq!(stats.live, 0);
        assert_eq!(manager.resident_tiles(), 0);
        assert!(manager.registry().is_empty());
        assert_eq!(manager.backend().live_buffers(), 0);
    }
}
