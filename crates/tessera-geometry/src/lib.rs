//! Build GPU-ready geometry from decoded vector tile features.
//!
//! This crate turns [`tessera_decode::Feature`]s into vertex and index
//! arrays in Mercator clip space: triangulated fills, width-extruded
//! lines, extruded buildings with shaded walls, and polygons draped onto
//! terrain. Every visible mesh has a parallel picking mesh whose vertex
//! colors encode the feature it came from.
//!
//! # Design principles
//!
//! - **Synchronous**: Pure CPU work, no async and no GPU handles
//! - **Per-feature isolation**: A feature that fails to triangulate
//!   degrades or is skipped without affecting its siblings
//! - **Deterministic**: The coordinate transform is bit-for-bit repeatable

mod builder;
mod error;
pub mod extrude;
pub mod line;
mod picking;
mod style;
mod terrain;
pub mod transform;
mod triangulate;
mod vertex;

pub use builder::{
    BuildBatch, BuildOutcome, BuilderConfig, GeometryBuilder, RenderGeometry, SkipReason,
};
pub use error::{GeometryError, GeometryResult};
pub use line::LineCap;
pub use picking::{FeatureIdCode, MAX_FEATURE_ID, MIN_FEATURE_ID, clamp_feature_id, layer_hash};
pub use style::{LayerKind, LayerStyle, PaintValues, StyleEvaluator, StyleValue};
pub use terrain::{DrapedPolygon, Splatmap, TerrainSample};
pub use triangulate::{flatten_rings, ring_centroid, triangulate};
pub use vertex::Vertex;
