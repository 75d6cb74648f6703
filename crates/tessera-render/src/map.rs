//! Map instance lifecycle.

use std::sync::Arc;

use futures::future::join_all;
use glam::{DMat4, DVec2};
use tessera::{
    CancelToken, FailureKind, StoreStats, TileFetcher, TileSource, TileStore, Viewport,
    run_until_cancelled, target_zoom, visible_tiles,
};
use tessera_decode::{Feature, ParsedTile, TileKey};
use tessera_geometry::{GeometryBuilder, LayerStyle, StyleEvaluator, StyleValue, TerrainSample};
use tracing::{debug, info};
use web_time::Instant;

use crate::config::RendererConfig;
use crate::gpu::{GpuBackend, HeadlessBackend};
use crate::loader::{LoadReport, LoadSupervisor, build_tile_geometry};
use crate::picking::{PickResult, pick};
use crate::resources::{BufferStats, GpuResourceManager};
use crate::terrain::{NoTerrain, TerrainProvider};

/// Counters of a map instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MapStats {
    pub buffers: BufferStats,
    pub store: StoreStats,
    pub resident_tiles: usize,
}

type TileFetch = (
    TileKey,
    tessera::Result<Option<Arc<ParsedTile>>>,
    Option<Arc<TerrainSample>>,
);

/// One map: its tile store, GPU resources and the active load.
///
/// All caches are scoped to the instance, so two maps never share tiles,
/// buffers or failure history. GPU buffers are only created and destroyed
/// through `&mut self`, which keeps them on the thread driving the map.
pub struct MapInstance<B: GpuBackend = HeadlessBackend> {
    config: RendererConfig,
    source: TileSource,
    store: TileStore,
    terrain: Arc<dyn TerrainProvider>,
    style: Arc<dyn StyleEvaluator>,
    layers: Vec<LayerStyle>,
    builder: GeometryBuilder,
    resources: GpuResourceManager<B>,
    supervisor: LoadSupervisor,
    zoom: Option<u8>,
}

impl<B: GpuBackend + std::fmt::Debug> std::fmt::Debug for MapInstance<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapInstance")
            .field("config", &self.config)
            .field("source", &self.source)
            .field("store", &self.store)
            .field("layers", &self.layers)
            .field("resources", &self.resources)
            .field("zoom", &self.zoom)
            .finish_non_exhaustive()
    }
}

fn unstyled(_: &Feature, _: &str, _: &str, _: f64) -> Option<StyleValue> {
    None
}

impl<B: GpuBackend> MapInstance<B> {
    /// Create a map with no style layers and no terrain.
    #[must_use]
    pub fn new(
        config: RendererConfig,
        source: TileSource,
        fetcher: Arc<dyn TileFetcher>,
        backend: B,
    ) -> Self {
        let store = TileStore::new(fetcher, config.cache_capacity, config.retry_limit);
        let resources = GpuResourceManager::new(backend, config.splatmap_size);
        Self {
            builder: GeometryBuilder::new(config.builder.clone()),
            config,
            source,
            store,
            terrain: Arc::new(NoTerrain),
            style: Arc::new(unstyled),
            layers: Vec::new(),
            resources,
            supervisor: LoadSupervisor::new(),
            zoom: None,
        }
    }

    /// Draw `layers`, in order, with paint from `style`.
    #[must_use]
    pub fn with_style(mut self, layers: Vec<LayerStyle>, style: Arc<dyn StyleEvaluator>) -> Self {
        self.layers = layers;
        self.style = style;
        self
    }

    #[must_use]
    pub fn with_terrain(mut self, terrain: Arc<dyn TerrainProvider>) -> Self {
        self.terrain = terrain;
        self
    }

    #[must_use]
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    #[must_use]
    pub fn source(&self) -> &TileSource {
        &self.source
    }

    #[must_use]
    pub fn store(&self) -> &TileStore {
        &self.store
    }

    #[must_use]
    pub fn resources(&self) -> &GpuResourceManager<B> {
        &self.resources
    }

    /// A handle that can supersede or cancel this map's active load from
    /// another task.
    #[must_use]
    pub fn supervisor(&self) -> LoadSupervisor {
        self.supervisor.clone()
    }

    /// Zoom of the most recent load, if any.
    #[must_use]
    pub fn zoom(&self) -> Option<u8> {
        self.zoom
    }

    /// Load and install every tile covering `viewport`.
    ///
    /// Supersedes any load still running. On a zoom change every tile not
    /// at the new zoom is evicted; otherwise only tiles that left the
    /// visible set are. Tiles are fetched in batches of
    /// [`RendererConfig::batch_size`] with their terrain fetched alongside;
    /// a batch is installed only if the load was not cancelled while it was
    /// in flight, so a superseded load never leaves partial results behind.
    pub async fn load_visible_tiles(&mut self, viewport: &Viewport) -> LoadReport {
        let started = Instant::now();
        let cancel = self.supervisor.supersede();

        let zoom = target_zoom(viewport, &self.source);
        let visible = visible_tiles(viewport, &self.source);
        let mut report = LoadReport {
            zoom,
            visible: visible.len(),
            ..LoadReport::default()
        };

        let evicted = if self.zoom == Some(zoom) {
            self.resources.evict_offscreen(&visible)
        } else {
            self.resources.evict_for_zoom(zoom)
        };
        report.evicted = evicted.len();
        self.zoom = Some(zoom);

        let pending: Vec<TileKey> = visible
            .iter()
            .copied()
            .filter(|&key| !self.resources.is_resident(key))
            .collect();
        report.resident = visible.len() - pending.len();

        for batch in pending.chunks(self.config.batch_size.max(1)) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let fetches = batch.iter().map(|&key| self.fetch_with_terrain(key, &cancel));
            let results: Vec<TileFetch> = join_all(fetches).await;

            if cancel.is_cancelled() {
                debug!(batch = batch.len(), "discarding cancelled batch");
                report.cancelled = true;
                break;
            }
            for (key, tile, terrain) in results {
                self.install(key, tile, terrain.as_deref(), &mut report);
            }
        }

        report.elapsed = started.elapsed();
        info!(
            zoom,
            visible = report.visible,
            installed = report.installed,
            features = report.features,
            unavailable = report.unavailable,
            failed = report.failed,
            evicted = report.evicted,
            cancelled = report.cancelled,
            elapsed = ?report.elapsed,
            "visible tiles loaded"
        );
        report
    }

    async fn fetch_with_terrain(&self, key: TileKey, cancel: &CancelToken) -> TileFetch {
        let terrain = async {
            run_until_cancelled(cancel, self.terrain.terrain(key))
                .await
                .flatten()
        };
        let (tile, terrain) = futures::join!(self.store.load(key, cancel), terrain);
        (key, tile, terrain)
    }

    fn install(
        &mut self,
        key: TileKey,
        tile: tessera::Result<Option<Arc<ParsedTile>>>,
        terrain: Option<&TerrainSample>,
        report: &mut LoadReport,
    ) {
        match tile {
            Ok(Some(tile)) => {
                let (geometry, _) = build_tile_geometry(
                    &self.builder,
                    &self.layers,
                    self.style.as_ref(),
                    tile,
                    terrain,
                );
                let installed = self.resources.install_tile(geometry);
                report.installed += 1;
                report.features += installed.features;
            }
            Ok(None) => report.in_flight += 1,
            Err(e) => match e.kind() {
                FailureKind::NotFound | FailureKind::PermanentUnavailable => {
                    debug!(tile = %key, error = %e, "tile unavailable");
                    report.unavailable += 1;
                }
                FailureKind::Cancellation => report.cancelled = true,
                FailureKind::NetworkFailure | FailureKind::DecodeFailure => report.failed += 1,
            },
        }
    }

    /// Resolve a pixel read back from the picking target.
    ///
    /// `screen` is in pixels from the top-left of a `viewport_size` canvas.
    #[must_use]
    pub fn pick(
        &self,
        rgba: [u8; 4],
        screen: DVec2,
        viewport_size: DVec2,
        inverse_view_proj: DMat4,
    ) -> PickResult {
        pick(
            self.resources.registry(),
            rgba,
            screen,
            viewport_size,
            inverse_view_proj,
            self.config.builder.max_pick_height,
        )
    }

    #[must_use]
    pub fn stats(&self) -> MapStats {
        MapStats {
            buffers: self.resources.stats(),
            store: self.store.stats(),
            resident_tiles: self.resources.resident_tiles(),
        }
    }

    /// Cancel the active load, destroy every buffer and forget all cached
    /// tiles and failure history. The instance stays usable.
    pub fn clear(&mut self) {
        self.supervisor.cancel();
        self.resources.dispose();
        self.store.clear();
        self.zoom = None;
    }

    /// Tear the map down, returning the final buffer counters.
    pub fn dispose(mut self) -> BufferStats {
        self.supervisor.cancel();
        let stats = self.resources.dispose();
        self.store.clear();
        stats
    }
}

#[cfg(test)]
mod tests {
    use tessera::{Error, FetchFuture};

    use super::*;

    struct NothingFetcher;

    impl TileFetcher for NothingFetcher {
        fn fetch(&self, key: TileKey) -> FetchFuture<'_> {
            Box::pin(async move { Err(Error::NotFound { key }) })
        }
    }

    fn viewport(zoom: f64) -> Viewport {
        Viewport::new(DVec2::new(-0.2, -0.2), DVec2::new(0.2, 0.2), zoom)
    }

    #[tokio::test]
    async fn test_missing_tiles_render_as_gaps() {
        let mut map = MapInstance::new(
            RendererConfig::default(),
            TileSource::new("memory://{z}/{x}/{y}"),
            Arc::new(NothingFetcher),
            HeadlessBackend::new(),
        );

        let report = map.load_visible_tiles(&viewport(2.0)).await;
        assert_eq!(report.zoom, 2);
        assert_eq!(report.visible, 4);
        assert_eq!(report.unavailable, 4);
        assert_eq!(report.installed, 0);
        assert!(!report.cancelled);
        assert_eq!(map.zoom(), Some(2));
        assert_eq!(map.stats().store.states.not_found, 4);

        // Not-found tiles are not requested again.
        let report = map.load_visible_tiles(&viewport(2.0)).await;
        assert_eq!(report.unavailable, 4);

        map.clear();
        assert_eq!(map.zoom(), None);
        assert_eq!(map.stats().store, StoreStats::default());
    }
}
