//! Terrain collaborator interface.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tessera_decode::TileKey;
use tessera_geometry::TerrainSample;

/// Future type for terrain requests.
#[cfg(not(target_family = "wasm"))]
pub type TerrainFuture<'a> = Pin<Box<dyn Future<Output = Option<Arc<TerrainSample>>> + Send + 'a>>;

/// Future type for terrain requests.
#[cfg(target_family = "wasm")]
pub type TerrainFuture<'a> = Pin<Box<dyn Future<Output = Option<Arc<TerrainSample>>> + 'a>>;

/// Supplies height grids for tiles.
///
/// Resolving to `None` means terrain is unavailable for that tile and
/// features are built flat. Implementations must not block the caller.
pub trait TerrainProvider: Send + Sync {
    fn terrain(&self, key: TileKey) -> TerrainFuture<'_>;
}

/// A provider that never has terrain.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTerrain;

impl TerrainProvider for NoTerrain {
    fn terrain(&self, _key: TileKey) -> TerrainFuture<'_> {
        Box::pin(std::future::ready(None))
    }
}

/// Preloaded samples, keyed by tile.
impl TerrainProvider for HashMap<TileKey, Arc<TerrainSample>> {
    fn terrain(&self, key: TileKey) -> TerrainFuture<'_> {
        Box::pin(std::future::ready(self.get(&key).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_providers() {
        let key = TileKey::new(12, 655, 1583).unwrap();
        assert!(NoTerrain.terrain(key).await.is_none());

        let samples = HashMap::from([(key, Arc::new(TerrainSample::uniform(key, 120.0)))]);
        let sample = samples.terrain(key).await.unwrap();
        assert_eq!(sample.key(), key);
        assert!(samples.terrain(TileKey::new(0, 0, 0).unwrap()).await.is_none());
    }
}
