//! Visible-tile loading: supersede handle, per-tile geometry baking and
//! load reports.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tessera::CancelToken;
use tessera_decode::ParsedTile;
use tessera_geometry::{
    BuildOutcome, GeometryBuilder, LayerStyle, SkipReason, StyleEvaluator, TerrainSample,
};
use tracing::debug;

use crate::resources::{BuiltFeature, LayerGeometry, TileGeometry};

/// Shared handle on the active load of a map instance.
///
/// Clones control the same load, so a UI task can supersede or cancel it
/// while the map instance itself is mutably borrowed by the load.
#[derive(Debug, Clone, Default)]
pub struct LoadSupervisor {
    active: Arc<Mutex<CancelToken>>,
}

impl LoadSupervisor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the active load and return the token for its replacement.
    #[must_use]
    pub fn supersede(&self) -> CancelToken {
        let mut active = self.active.lock().unwrap();
        active.cancel();
        *active = CancelToken::new();
        active.clone()
    }

    /// Cancel the active load without starting another.
    pub fn cancel(&self) {
        self.active.lock().unwrap().cancel();
    }

    /// Token of the active load.
    #[must_use]
    pub fn active(&self) -> CancelToken {
        self.active.lock().unwrap().clone()
    }
}

/// Summary of one visible-tile load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadReport {
    /// Zoom the visible set was computed at.
    pub zoom: u8,
    /// Tiles in the visible set.
    pub visible: usize,
    /// Visible tiles that were already resident and not reloaded.
    pub resident: usize,
    pub installed: usize,
    /// Features made resident across all installed tiles.
    pub features: usize,
    /// Tiles skipped because another load was already fetching them.
    pub in_flight: usize,
    /// Tiles that are missing or have exhausted their retries.
    pub unavailable: usize,
    /// Tiles whose fetch or decode failed this time.
    pub failed: usize,
    pub evicted: usize,
    /// The load was superseded before it finished.
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// Per-tile counts from [`build_tile_geometry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildStats {
    pub built: usize,
    pub draped: usize,
    pub hidden: usize,
    pub duplicate: usize,
    pub empty: usize,
    pub unsupported: usize,
}

impl BuildStats {
    fn skipped(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Hidden => self.hidden += 1,
            SkipReason::Duplicate => self.duplicate += 1,
            SkipReason::Empty => self.empty += 1,
            SkipReason::Unsupported => self.unsupported += 1,
        }
    }
}

/// Build every style layer of a parsed tile into installable geometry.
///
/// Pure CPU work; nothing here touches the GPU or the network. Each style
/// layer is its own build batch, so feature id deduplication never spans
/// layers.
#[must_use]
pub fn build_tile_geometry(
    builder: &GeometryBuilder,
    layers: &[LayerStyle],
    style: &dyn StyleEvaluator,
    tile: Arc<ParsedTile>,
    terrain: Option<&TerrainSample>,
) -> (TileGeometry, BuildStats) {
    let key = tile.key;
    let mut geometry = TileGeometry::new(Arc::clone(&tile));
    let mut stats = BuildStats::default();

    for layer_style in layers {
        let Some(source) = tile.layer(&layer_style.source_layer) else {
            continue;
        };

        let mut layer = LayerGeometry {
            layer_id: layer_style.id.clone(),
            source_layer: layer_style.source_layer.clone(),
            features: Vec::new(),
        };
        let mut batch = builder.batch(key, source.extent, layer_style, terrain);
        for (source_index, feature) in source.features.iter().enumerate() {
            match batch.build_styled(feature, style) {
                BuildOutcome::Geometry(built) => {
                    stats.built += 1;
                    layer.features.push(BuiltFeature {
                        geometry: built,
                        source_index,
                    });
                }
                BuildOutcome::Draped(polygon) => {
                    stats.draped += 1;
                    geometry.draped.push(polygon);
                }
                BuildOutcome::Skipped(reason) => stats.skipped(reason),
            }
        }

        if !layer.features.is_empty() {
            geometry.layers.push(layer);
        }
    }

    debug!(
        tile = %key,
        built = stats.built,
        draped = stats.draped,
        hidden = stats.hidden,
        duplicate = stats.duplicate,
        "tile geometry built"
    );
    (geometry, stats)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use glam::DVec2;
    use tessera_decode::{Feature, Geometry, ParsedLayer, Polygon, Properties, PropertyValue, TileKey};
    use tessera_geometry::{BuilderConfig, LayerKind, StyleValue};

    use super::*;

    fn polygon_feature(id: u64, class: &str) -> Feature {
        Feature {
            id,
            geometry: Geometry::Polygon(Polygon {
                exterior: vec![
                    DVec2::new(0.0, 0.0),
                    DVec2::new(100.0, 0.0),
                    DVec2::new(100.0, 100.0),
                    DVec2::new(0.0, 100.0),
                ],
                holes: Vec::new(),
            }),
            properties: Properties::from([(
                "class".to_string(),
                PropertyValue::String(class.to_string()),
            )]),
        }
    }

    fn parsed_tile(key: TileKey) -> Arc<ParsedTile> {
        let layer = ParsedLayer {
            name: "landuse".to_string(),
            extent: 4096,
            features: vec![
                polygon_feature(1, "park"),
                polygon_feature(1, "park"),
                polygon_feature(2, "industrial"),
                Feature {
                    id: 3,
                    geometry: Geometry::Point(DVec2::new(5.0, 5.0)),
                    properties: Properties::new(),
                },
            ],
            skipped_features: 0,
        };
        Arc::new(ParsedTile {
            key,
            layers: HashMap::from([("landuse".to_string(), layer)]),
        })
    }

    /// Hides industrial land.
    fn style(feature: &Feature, _layer: &str, property: &str, _zoom: f64) -> Option<StyleValue> {
        match property {
            "filter" => {
                let class = feature.property("class").and_then(PropertyValue::as_str);
                Some(StyleValue::Bool(class != Some("industrial")))
            }
            _ => None,
        }
    }

    #[test]
    fn test_supersede_cancels_previous() {
        let supervisor = LoadSupervisor::new();
        let first = supervisor.supersede();
        let second = supervisor.clone().supersede();

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(!supervisor.active().is_cancelled());

        supervisor.cancel();
        assert!(second.is_cancelled());
    }

    #[test]
    fn test_build_tile_geometry() {
        let key = TileKey::new(10, 163, 395).unwrap();
        let builder = GeometryBuilder::new(BuilderConfig::default());
        let layers = [
            LayerStyle::new("parks", "landuse", LayerKind::Fill),
            LayerStyle::new("parks-outline", "landuse", LayerKind::Line),
            LayerStyle::new("missing", "water", LayerKind::Fill),
        ];

        let (geometry, stats) = build_tile_geometry(&builder, &layers, &style, parsed_tile(key), None);

        assert_eq!(geometry.key(), key);
        assert_eq!(geometry.layers.len(), 2);
        // The duplicate id is dropped by the fill layer only.
        assert_eq!(geometry.layers[0].features.len(), 1);
        assert_eq!(geometry.layers[1].features.len(), 2);
        assert_eq!(geometry.layers[1].features[1].source_index, 1);
        assert_eq!(stats.built, 3);
        assert_eq!(stats.duplicate, 1);
        assert_eq!(stats.hidden, 2);
        assert_eq!(stats.unsupported, 2);
        assert!(geometry.draped.is_empty());
    }

    #[test]
    fn test_build_drapes_on_terrain() {
        let key = TileKey::new(13, 4093, 2723).unwrap();
        let builder = GeometryBuilder::new(BuilderConfig::default());
        let layers = [LayerStyle::new("parks", "landuse", LayerKind::Fill)];
        let terrain = TerrainSample::uniform(key, 300.0);

        let (geometry, stats) =
            build_tile_geometry(&builder, &layers, &style, parsed_tile(key), Some(&terrain));

        assert!(geometry.layers.is_empty());
        assert_eq!(geometry.draped.len(), 1);
        assert_eq!(stats.draped, 1);
    }
}
