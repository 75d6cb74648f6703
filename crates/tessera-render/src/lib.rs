//! GPU resource lifecycle, feature picking and visible-tile loading.
//!
//! A [`MapInstance`] ties the pipeline together: it computes the tiles
//! covering a viewport, loads them through a [`tessera::TileStore`] in
//! batches with their terrain, builds geometry with
//! [`tessera_geometry::GeometryBuilder`] and hands it to the
//! [`GpuResourceManager`], which owns every tile buffer until the tile
//! leaves the zoom level or the viewport.
//!
//! # Design principles
//!
//! - **Single owner**: Only the resource manager creates or destroys
//!   buffers, so `created - destroyed` always equals what is resident
//! - **No partial merges**: A tile's buffers become resident in one
//!   synchronous call, after the load that produced them was confirmed live
//! - **Backend-agnostic**: `wgpu` behind a feature; a headless backend for
//!   tests and servers
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tessera::{Client, TileSource, Viewport};
//! use tessera_render::{HeadlessBackend, MapInstance, RendererConfig};
//!
//! let source = TileSource::new("https://tiles.example/{z}/{x}/{y}.pbf");
//! let client = Arc::new(Client::new(source.clone())?);
//! let mut map = MapInstance::new(RendererConfig::default(), source, client, HeadlessBackend::new());
//!
//! let report = map.load_visible_tiles(&Viewport::new(min, max, 14.5)).await;
//! assert_eq!(map.stats().buffers.leaked(), 0);
//! ```

mod config;
mod error;
pub mod gpu;
mod loader;
mod map;
pub mod picking;
mod registry;
mod resources;
mod terrain;

pub use config::RendererConfig;
pub use error::{RenderError, RenderResult};
#[cfg(feature = "wgpu")]
pub use gpu::WgpuBackend;
pub use gpu::{BufferHandle, BufferKind, GpuBackend, HeadlessBackend};
pub use loader::{BuildStats, LoadReport, LoadSupervisor, build_tile_geometry};
pub use map::{MapInstance, MapStats};
pub use picking::PickResult;
pub use registry::{FeatureHandle, FeatureRef, FeatureRegistry};
pub use resources::{
    BufferStats, BuiltFeature, GpuResourceManager, InstallReport, LayerGeometry, MeshBuffers,
    ResidentTile, TileBufferEntry, TileGeometry,
};
pub use terrain::{NoTerrain, TerrainFuture, TerrainProvider};
