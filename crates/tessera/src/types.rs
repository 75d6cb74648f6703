//! Tile source configuration and viewport types.

use std::time::Duration;

use glam::DVec2;
use serde::{Deserialize, Serialize};
use tessera_decode::{MAX_ZOOM, TileKey};
use tessera_geometry::transform::tile_bounds_lon_lat;

use crate::error::{Error, Result};

const fn default_max_zoom() -> u8 {
    14
}

const fn default_timeout_ms() -> u64 {
    10_000
}

const fn default_tile_size() -> u32 {
    512
}

/// Where and how tiles are fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileSource {
    /// URL with `{z}`, `{x}` and `{y}` placeholders.
    pub url_template: String,
    #[serde(default)]
    pub min_zoom: u8,
    /// Deepest zoom the source serves; deeper views reuse these tiles.
    #[serde(default = "default_max_zoom")]
    pub max_zoom: u8,
    /// Declared coverage as `[west, south, east, north]` in degrees.
    #[serde(default)]
    pub bounds: Option<[f64; 4]>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
}

/// The subset of a TileJSON document a source is built from.
#[derive(Debug, Deserialize)]
struct TileJson {
    tiles: Vec<String>,
    #[serde(default)]
    minzoom: Option<u8>,
    #[serde(default)]
    maxzoom: Option<u8>,
    #[serde(default)]
    bounds: Option<[f64; 4]>,
}

impl TileSource {
    /// A source with default zoom range, timeout and tile size.
    #[must_use]
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            min_zoom: 0,
            max_zoom: default_max_zoom(),
            bounds: None,
            timeout_ms: default_timeout_ms(),
            tile_size: default_tile_size(),
        }
    }

    /// Build a source from a TileJSON document, using its first tile URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not parse, has no tile URLs,
    /// or describes an invalid zoom range.
    pub fn from_tilejson(json: &str) -> Result<Self> {
        let doc: TileJson = serde_json::from_str(json)?;
        let url = doc.tiles.into_iter().next().ok_or(Error::InvalidConfig {
            context: "tilejson",
            detail: "no tile urls".to_string(),
        })?;

        let mut source = Self::new(url);
        if let Some(min) = doc.minzoom {
            source.min_zoom = min;
        }
        if let Some(max) = doc.maxzoom {
            source.max_zoom = max;
        }
        source.bounds = doc.bounds;
        source.validate()?;
        Ok(source)
    }

    /// Check the template and zoom range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        for placeholder in ["{z}", "{x}", "{y}"] {
            if !self.url_template.contains(placeholder) {
                return Err(Error::InvalidConfig {
                    context: "tile source",
                    detail: format!("url template is missing {placeholder}"),
                });
            }
        }
        if self.min_zoom > self.max_zoom || self.max_zoom > MAX_ZOOM {
            return Err(Error::InvalidConfig {
                context: "tile source",
                detail: format!("zoom range {}..={} is invalid", self.min_zoom, self.max_zoom),
            });
        }
        Ok(())
    }

    /// The URL of one tile.
    #[must_use]
    pub fn url(&self, key: TileKey) -> String {
        self.url_template
            .replace("{z}", &key.z().to_string())
            .replace("{x}", &key.x().to_string())
            .replace("{y}", &key.y().to_string())
    }

    /// Whether the source claims to serve `key`: inside the zoom range and
    /// overlapping the declared bounds.
    #[must_use]
    pub fn serves(&self, key: TileKey) -> bool {
        if key.z() < self.min_zoom || key.z() > self.max_zoom {
            return false;
        }
        let Some([west, south, east, north]) = self.bounds else {
            return true;
        };
        let (min, max) = tile_bounds_lon_lat(key);
        min.x < east && max.x > west && min.y < north && max.y > south
    }

    /// Per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// The visible region of the map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Clip-space corner with the smallest coordinates (north-west).
    pub min: DVec2,
    /// Clip-space corner with the largest coordinates (south-east).
    pub max: DVec2,
    /// Continuous camera zoom.
    pub zoom: f64,
}

impl Viewport {
    #[must_use]
    pub fn new(min: DVec2, max: DVec2, zoom: f64) -> Self {
        Self { min, max, zoom }
    }

    #[must_use]
    pub fn center(&self) -> DVec2 {
        (self.min + self.max) / 2.0
    }
}
