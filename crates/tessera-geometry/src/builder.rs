//! Per-feature geometry construction.

use std::collections::HashSet;

use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};
use tessera_decode::{Feature, Geometry, GeometryType, TileKey};
use tracing::debug;

use crate::extrude::build_walls;
use crate::line::{LineCap, tessellate_line};
use crate::picking::{FeatureIdCode, layer_hash};
use crate::style::{LayerKind, LayerStyle, PaintValues, StyleEvaluator};
use crate::terrain::{DrapedPolygon, TerrainSample};
use crate::transform::{
    meters_to_clip, pixels_to_clip, tile_center_latitude, tile_to_clip, transform_ring,
};
use crate::triangulate::{flatten_rings, ring_centroid, triangulate};
use crate::vertex::Vertex;

/// Tunables for geometry construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Longest miter, in half line widths, before a join bevels.
    pub miter_limit: f64,
    pub line_cap: LineCap,
    /// Constant multiplier on extrusion heights.
    pub exaggeration: f64,
    /// Light direction for wall shading, in degrees.
    pub sun_azimuth: f64,
    /// Clamp tile-local coordinates into `[0, extent]` before transforming.
    pub clamp_to_extent: bool,
    /// Height in meters that maps to a full picking alpha channel.
    pub max_pick_height: f64,
    /// Lowest zoom at which fills drape onto terrain instead of being
    /// built as flat geometry.
    pub drape_min_zoom: u8,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            miter_limit: 2.0,
            line_cap: LineCap::Butt,
            exaggeration: 1.0,
            sun_azimuth: 315.0,
            clamp_to_extent: true,
            max_pick_height: 500.0,
            drape_min_zoom: 12,
        }
    }
}

/// GPU-ready geometry for one feature.
///
/// The visible and picking sets are parallel: for fills and lines they
/// share index topology and differ only in vertex color. For extrusions
/// the picking set is the roof.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderGeometry {
    pub feature_id: u64,
    pub code: FeatureIdCode,
    pub visible_vertices: Vec<Vertex>,
    pub visible_indices: Vec<u32>,
    pub picking_vertices: Vec<Vertex>,
    pub picking_indices: Vec<u32>,
    pub is_filled: bool,
    pub is_line: bool,
}

impl RenderGeometry {
    fn new(feature_id: u64, code: FeatureIdCode) -> Self {
        Self {
            feature_id,
            code,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.visible_indices.is_empty()
    }

    fn push_visible(
        &mut self,
        positions: &[DVec3],
        colors: impl Iterator<Item = [f32; 4]>,
        indices: &[u32],
    ) {
        let base = index_base(&self.visible_vertices);
        self.visible_vertices.extend(
            positions
                .iter()
                .zip(colors)
                .map(|(&p, color)| Vertex::new(p, color)),
        );
        self.visible_indices.extend(indices.iter().map(|i| i + base));
    }

    fn push_picking(&mut self, positions: &[DVec3], indices: &[u32]) {
        let color = self.code.to_normalized();
        let base = index_base(&self.picking_vertices);
        self.picking_vertices
            .extend(positions.iter().map(|&p| Vertex::new(p, color)));
        self.picking_indices.extend(indices.iter().map(|i| i + base));
    }

    fn push_both(&mut self, positions: &[DVec3], color: [f32; 4], indices: &[u32]) {
        self.push_visible(positions, std::iter::repeat(color), indices);
        self.push_picking(positions, indices);
    }
}

fn index_base(vertices: &[Vertex]) -> u32 {
    #[allow(clippy::cast_possible_truncation)]
    let base = vertices.len() as u32;
    base
}

/// Why a feature produced no geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// The style's visibility or filter rejected it.
    Hidden,
    /// Another feature with the same id was already built in this batch.
    Duplicate,
    /// Every part degenerated to nothing.
    Empty,
    /// The layer kind cannot draw this geometry type.
    Unsupported,
}

/// Result of building one feature.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    Geometry(RenderGeometry),
    /// Registered for splatmap rasterization instead of flat geometry.
    Draped(DrapedPolygon),
    Skipped(SkipReason),
}

/// Builds render geometry from tile features.
#[derive(Debug, Clone, Default)]
pub struct GeometryBuilder {
    config: BuilderConfig,
}

impl GeometryBuilder {
    #[must_use]
    pub fn new(config: BuilderConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Start a build pass over one style layer of one tile.
    ///
    /// Feature id deduplication is scoped to the returned batch.
    #[must_use]
    pub fn batch<'a>(
        &'a self,
        key: TileKey,
        extent: u32,
        layer: &'a LayerStyle,
        terrain: Option<&'a TerrainSample>,
    ) -> BuildBatch<'a> {
        let height_scale =
            meters_to_clip(1.0, tile_center_latitude(key), key.z()) * self.config.exaggeration;
        BuildBatch {
            config: &self.config,
            key,
            extent,
            layer,
            layer_hash: layer_hash(&layer.id),
            terrain,
            height_scale,
            seen_ids: HashSet::new(),
        }
    }
}

/// One `(tile, style layer)` build pass.
#[derive(Debug)]
pub struct BuildBatch<'a> {
    config: &'a BuilderConfig,
    key: TileKey,
    extent: u32,
    layer: &'a LayerStyle,
    layer_hash: u8,
    terrain: Option<&'a TerrainSample>,
    /// Clip units per meter, exaggeration included.
    height_scale: f64,
    seen_ids: HashSet<u64>,
}

impl BuildBatch<'_> {
    /// Resolve the feature's paint through `style`, then build it.
    pub fn build_styled(&mut self, feature: &Feature, style: &dyn StyleEvaluator) -> BuildOutcome {
        let zoom = f64::from(self.key.z());
        match PaintValues::resolve(style, self.layer, feature, zoom) {
            Some(paint) => self.build(feature, &paint),
            None => BuildOutcome::Skipped(SkipReason::Hidden),
        }
    }

    /// Build one feature with already resolved paint values.
    pub fn build(&mut self, feature: &Feature, paint: &PaintValues) -> BuildOutcome {
        match (self.layer.kind, feature.geometry_type()) {
            (_, GeometryType::Point | GeometryType::MultiPoint) => {
                BuildOutcome::Skipped(SkipReason::Unsupported)
            }
            (LayerKind::Line, _) => self.build_lines(feature, paint),
            (_, GeometryType::LineString | GeometryType::MultiLineString) => {
                BuildOutcome::Skipped(SkipReason::Unsupported)
            }
            (kind, _) => {
                // First occurrence wins; id 0 means the tile assigned none.
                if feature.id != 0 && !self.seen_ids.insert(feature.id) {
                    debug!(tile = %self.key, layer = %self.layer.id, feature = feature.id, "dropping duplicate feature id");
                    return BuildOutcome::Skipped(SkipReason::Duplicate);
                }
                if kind == LayerKind::Fill && self.drapes() {
                    return self.drape(feature, paint);
                }
                if kind == LayerKind::FillExtrusion && paint.height > 0.0 {
                    self.build_extrusion(feature, paint)
                } else {
                    self.build_fill(feature, paint)
                }
            }
        }
    }

    fn drapes(&self) -> bool {
        self.terrain.is_some() && self.key.z() >= self.config.drape_min_zoom
    }

    fn to_clip(&self, point: DVec2) -> DVec2 {
        tile_to_clip(point, self.key, self.extent, self.config.clamp_to_extent)
    }

    /// Terrain height under a clip-space point, in clip units.
    fn ground(&self, clip: DVec2) -> f64 {
        self.terrain
            .map_or(0.0, |terrain| terrain.sample(clip) * self.height_scale)
    }

    fn code(&self, feature: &Feature, height: f64) -> FeatureIdCode {
        FeatureIdCode::encode(feature.id, self.layer_hash, height, self.config.max_pick_height)
    }

    fn drape(&self, feature: &Feature, paint: &PaintValues) -> BuildOutcome {
        let rings: Vec<Vec<DVec2>> = feature
            .geometry
            .polygons()
            .iter()
            .flat_map(|polygon| polygon.rings())
            .map(|ring| transform_ring(ring, self.key, self.extent, self.config.clamp_to_extent))
            .collect();
        BuildOutcome::Draped(DrapedPolygon {
            feature_id: feature.id,
            rings,
            color: paint.color,
        })
    }

    fn build_fill(&self, feature: &Feature, paint: &PaintValues) -> BuildOutcome {
        let mut geometry = RenderGeometry::new(feature.id, self.code(feature, 0.0));
        geometry.is_filled = true;

        for polygon in feature.geometry.polygons() {
            let indices = match triangulate(polygon) {
                Ok(indices) => indices,
                Err(e) => {
                    debug!(tile = %self.key, feature = feature.id, error = %e, "skipping polygon");
                    continue;
                }
            };
            let positions: Vec<DVec3> = flatten_rings(polygon)
                .into_iter()
                .map(|p| {
                    let clip = self.to_clip(p);
                    clip.extend(self.ground(clip))
                })
                .collect();
            geometry.push_both(&positions, paint.color, &indices);
        }

        finish(geometry)
    }

    fn build_extrusion(&self, feature: &Feature, paint: &PaintValues) -> BuildOutcome {
        let mut geometry = RenderGeometry::new(feature.id, self.code(feature, paint.height));
        geometry.is_filled = true;

        for polygon in feature.geometry.polygons() {
            let footprint = transform_ring(
                &polygon.exterior,
                self.key,
                self.extent,
                self.config.clamp_to_extent,
            );
            let lift = self.ground(ring_centroid(&footprint));
            let base = lift + paint.base * self.height_scale;
            let top = lift + paint.height * self.height_scale;

            let walls = build_walls(&footprint, base, top, self.config.sun_azimuth);
            let [r, g, b, a] = paint.color;
            #[allow(clippy::cast_possible_truncation)]
            let wall_colors = walls.shades.iter().map(|&s| {
                let s = s as f32;
                [r * s, g * s, b * s, a]
            });
            geometry.push_visible(&walls.positions, wall_colors, &walls.indices);

            match triangulate(polygon) {
                Ok(indices) => {
                    let roof: Vec<DVec3> = flatten_rings(polygon)
                        .into_iter()
                        .map(|p| self.to_clip(p).extend(top))
                        .collect();
                    geometry.push_both(&roof, paint.color, &indices);
                }
                Err(e) => {
                    // Walls alone still need to be pickable.
                    debug!(tile = %self.key, feature = feature.id, error = %e, "extruding without roof");
                    geometry.push_picking(&walls.positions, &walls.indices);
                }
            }
        }

        finish(geometry)
    }

    fn build_lines(&self, feature: &Feature, paint: &PaintValues) -> BuildOutcome {
        let lines: Vec<Vec<DVec2>> = match &feature.geometry {
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => feature
                .geometry
                .polygons()
                .iter()
                .flat_map(|polygon| polygon.rings())
                .map(|ring| {
                    let mut closed = ring.to_vec();
                    if let Some(&first) = ring.first() {
                        closed.push(first);
                    }
                    closed
                })
                .collect(),
            other => other.lines().into_iter().map(<[DVec2]>::to_vec).collect(),
        };

        let half_width = pixels_to_clip(paint.width, self.key.z()) / 2.0;
        let mut geometry = RenderGeometry::new(feature.id, self.code(feature, 0.0));
        geometry.is_line = true;

        for line in &lines {
            let clip = transform_ring(line, self.key, self.extent, self.config.clamp_to_extent);
            let Some(mesh) =
                tessellate_line(&clip, half_width, self.config.miter_limit, self.config.line_cap)
            else {
                continue;
            };
            let positions: Vec<DVec3> = mesh
                .positions
                .iter()
                .map(|&p| p.extend(self.ground(p)))
                .collect();
            geometry.push_both(&positions, paint.color, &mesh.indices);
        }

        finish(geometry)
    }
}

fn finish(geometry: RenderGeometry) -> BuildOutcome {
    if geometry.is_empty() {
        BuildOutcome::Skipped(SkipReason::Empty)
    } else {
        BuildOutcome::Geometry(geometry)
    }
}
