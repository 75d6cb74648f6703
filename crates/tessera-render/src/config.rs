//! Renderer configuration.

use serde::{Deserialize, Serialize};
use tessera_geometry::BuilderConfig;

/// Tunables for a [`MapInstance`](crate::MapInstance).
///
/// Missing fields take their defaults, so a partial JSON document is a
/// valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Tiles fetched concurrently per batch.
    pub batch_size: usize,
    /// Failed attempts before a tile is given up on.
    pub retry_limit: u32,
    /// Parsed tiles kept in memory.
    pub cache_capacity: usize,
    /// Edge length in texels of the splatmap draped polygons are
    /// rasterized into.
    pub splatmap_size: u32,
    pub builder: BuilderConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            batch_size: 6,
            retry_limit: 3,
            cache_capacity: 256,
            splatmap_size: 256,
            builder: BuilderConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use tessera_geometry::LineCap;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.batch_size, 6);
        assert_eq!(config.retry_limit, 3);
        assert_eq!(config.cache_capacity, 256);
        assert_eq!(config.builder.drape_min_zoom, 12);
    }

    #[test]
    fn test_partial_json() {
        let config: RendererConfig = serde_json::from_str(
            r#"{"batch_size": 4, "builder": {"line_cap": "round", "sun_azimuth": 270.0}}"#,
        )
        .unwrap();
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.retry_limit, 3);
        assert_eq!(config.builder.line_cap, LineCap::Round);
        assert_eq!(config.builder.miter_limit, 2.0);
    }
}
