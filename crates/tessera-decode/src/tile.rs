//! Whole-tile decoding.

use std::collections::HashMap;
use std::io::Read;

use flate2::read::GzDecoder;
use prost::Message;
use tessera_proto::{Tile, tile};

use crate::command::decode_commands;
use crate::error::{DecodeError, DecodeResult};
use crate::geometry::{
    Geometry, GeometryType, lines_from_paths, points_from_paths, polygons_from_paths,
};
use crate::key::TileKey;
use crate::value::{Properties, PropertyValue, decode_properties};

/// Default layer extent when a layer omits it.
pub const DEFAULT_EXTENT: u32 = 4096;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A decoded feature.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Numeric feature id (0 when the tile did not assign one).
    pub id: u64,
    /// Geometry in tile-local coordinates.
    pub geometry: Geometry,
    /// Property bag.
    pub properties: Properties,
}

impl Feature {
    /// The feature's geometry type.
    #[must_use]
    pub fn geometry_type(&self) -> GeometryType {
        self.geometry.geometry_type()
    }

    /// Look up a property by key.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
}

/// One source layer of a tile.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLayer {
    /// Source-layer name.
    pub name: String,
    /// Coordinate extent of the layer (tile-local coordinates span `0..extent`).
    pub extent: u32,
    /// Features that decoded cleanly.
    pub features: Vec<Feature>,
    /// Number of malformed features that were skipped.
    pub skipped_features: usize,
}

/// A decoded vector tile.
///
/// Immutable once produced; shared as `Arc<ParsedTile>` between the cache
/// and whatever is building geometry from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTile {
    pub key: TileKey,
    pub layers: HashMap<String, ParsedLayer>,
}

impl ParsedTile {
    /// Look up a source layer by name.
    #[must_use]
    pub fn layer(&self, name: &str) -> Option<&ParsedLayer> {
        self.layers.get(name)
    }

    /// Total number of decoded features across all layers.
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.layers.values().map(|l| l.features.len()).sum()
    }

    /// Total number of malformed features skipped across all layers.
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.layers.values().map(|l| l.skipped_features).sum()
    }
}

/// Decode a (possibly gzip-compressed) vector tile payload.
///
/// Malformed features are counted and skipped; only a payload that cannot
/// be read as a tile at all is an error.
///
/// # Errors
///
/// Returns an error if gzip inflation or protobuf decoding fails.
pub fn decode_tile(key: TileKey, data: &[u8]) -> DecodeResult<ParsedTile> {
    let inflated;
    let bytes = if data.starts_with(&GZIP_MAGIC) {
        inflated = inflate(data)?;
        inflated.as_slice()
    } else {
        data
    };

    let proto = Tile::decode(bytes)?;

    let mut layers: HashMap<String, ParsedLayer> = HashMap::with_capacity(proto.layers.len());
    for layer in &proto.layers {
        let decoded = decode_layer(layer);
        match layers.get_mut(&decoded.name) {
            // Repeated layer names are merged into the first occurrence.
            Some(existing) => {
                existing.features.extend(decoded.features);
                existing.skipped_features += decoded.skipped_features;
            }
            None => {
                layers.insert(decoded.name.clone(), decoded);
            }
        }
    }

    Ok(ParsedTile { key, layers })
}

fn inflate(data: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 4);
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| DecodeError::Decompress {
            message: e.to_string(),
        })?;
    Ok(out)
}

fn decode_layer(layer: &tile::Layer) -> ParsedLayer {
    let extent = match layer.extent() {
        0 => DEFAULT_EXTENT,
        e => e,
    };

    // A bad value poisons only the features that reference it.
    let values: Vec<Option<PropertyValue>> = layer
        .values
        .iter()
        .map(|v| PropertyValue::try_from(v).ok())
        .collect();

    let mut features = Vec::with_capacity(layer.features.len());
    let mut skipped_features = 0;

    for feature in &layer.features {
        match decode_feature(feature, &layer.keys, &values) {
            Ok(f) => features.push(f),
            Err(_) => skipped_features += 1,
        }
    }

    ParsedLayer {
        name: layer.name.clone(),
        extent,
        features,
        skipped_features,
    }
}

fn decode_feature(
    feature: &tile::Feature,
    keys: &[String],
    values: &[Option<PropertyValue>],
) -> DecodeResult<Feature> {
    let paths = decode_commands(&feature.geometry)?;
    let geometry = match feature.r#type() {
        tile::GeomType::Point => points_from_paths(paths)?,
        tile::GeomType::Linestring => lines_from_paths(paths)?,
        tile::GeomType::Polygon => polygons_from_paths(paths)?,
        tile::GeomType::Unknown => {
            return Err(DecodeError::InvalidFormat {
                context: "feature",
                detail: "unknown geometry type".to_string(),
            });
        }
    };
    let properties = decode_properties(&feature.tags, keys, values)?;

    Ok(Feature {
        id: feature.id(),
        geometry,
        properties,
    })
}
