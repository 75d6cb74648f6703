//! Terrain height grids and polygon draping.

use glam::DVec2;
use tessera_decode::{DEFAULT_EXTENT, TileKey};

use crate::error::{GeometryError, GeometryResult};
use crate::transform::tile_bounds_clip;

/// A per-tile grid of terrain heights in meters.
///
/// Row 0 is the northern edge (smallest clip y), column 0 the western edge.
/// Samples sit on the grid corners, so a `w x h` grid spans the bounds
/// exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainSample {
    key: TileKey,
    width: usize,
    height: usize,
    heights: Vec<f32>,
    min: DVec2,
    max: DVec2,
}

impl TerrainSample {
    /// Wrap a height grid covering `bounds` (clip-space `min`, `max`).
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Degenerate`] if the grid is smaller than
    /// 2x2, `heights` does not hold `width * height` samples, or the bounds
    /// are empty.
    pub fn new(
        key: TileKey,
        width: usize,
        height: usize,
        heights: Vec<f32>,
        bounds: (DVec2, DVec2),
    ) -> GeometryResult<Self> {
        let (min, max) = bounds;
        if width < 2 || height < 2 || heights.len() != width * height {
            return Err(GeometryError::Degenerate {
                context: "terrain grid",
            });
        }
        if max.x <= min.x || max.y <= min.y {
            return Err(GeometryError::Degenerate {
                context: "terrain bounds",
            });
        }
        Ok(Self {
            key,
            width,
            height,
            heights,
            min,
            max,
        })
    }

    /// A flat grid at a constant height over the whole tile.
    #[must_use]
    pub fn uniform(key: TileKey, meters: f32) -> Self {
        let (min, max) = tile_bounds_clip(key, DEFAULT_EXTENT);
        Self {
            key,
            width: 2,
            height: 2,
            heights: vec![meters; 4],
            min,
            max,
        }
    }

    #[must_use]
    pub fn key(&self) -> TileKey {
        self.key
    }

    /// Clip-space `(min, max)` covered by the grid.
    #[must_use]
    pub fn bounds(&self) -> (DVec2, DVec2) {
        (self.min, self.max)
    }

    /// Grid `(width, height)` in samples.
    #[must_use]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Bilinearly interpolated height in meters at a clip-space point.
    ///
    /// Points outside the bounds are clamped to the nearest edge.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn sample(&self, clip: DVec2) -> f64 {
        let t = ((clip - self.min) / (self.max - self.min)).clamp(DVec2::ZERO, DVec2::ONE);
        let gx = t.x * (self.width - 1) as f64;
        let gy = t.y * (self.height - 1) as f64;

        let x0 = (gx.floor() as usize).min(self.width - 2);
        let y0 = (gy.floor() as usize).min(self.height - 2);
        let fx = gx - x0 as f64;
        let fy = gy - y0 as f64;

        let at = |x: usize, y: usize| f64::from(self.heights[y * self.width + x]);
        let top = at(x0, y0) * (1.0 - fx) + at(x0 + 1, y0) * fx;
        let bottom = at(x0, y0 + 1) * (1.0 - fx) + at(x0 + 1, y0 + 1) * fx;
        top * (1.0 - fy) + bottom * fy
    }
}

/// A polygon registered for draping onto the terrain mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct DrapedPolygon {
    pub feature_id: u64,
    /// Exterior ring followed by holes, in clip space.
    pub rings: Vec<Vec<DVec2>>,
    pub color: [f32; 4],
}

/// An RGBA8 texture over a tile's clip bounds that draped polygons are
/// rasterized into. The terrain pass samples it by texture coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct Splatmap {
    key: TileKey,
    size: u32,
    min: DVec2,
    max: DVec2,
    pixels: Vec<[u8; 4]>,
}

impl Splatmap {
    /// An empty (fully transparent) `size x size` splatmap over `key`.
    #[must_use]
    pub fn new(key: TileKey, size: u32) -> Self {
        let (min, max) = tile_bounds_clip(key, DEFAULT_EXTENT);
        let texels = size as usize * size as usize;
        Self {
            key,
            size,
            min,
            max,
            pixels: vec![[0; 4]; texels],
        }
    }

    #[must_use]
    pub fn key(&self) -> TileKey {
        self.key
    }

    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// The texel at column `x`, row `y` (row 0 is north).
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixels[y as usize * self.size as usize + x as usize]
    }

    /// Raw RGBA8 bytes, row-major, ready for texture upload.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// Number of texels covered by at least one polygon.
    #[must_use]
    pub fn covered(&self) -> usize {
        self.pixels.iter().filter(|p| p[3] > 0).count()
    }

    /// Fill every texel whose center lies inside the polygon (even-odd
    /// rule across all rings). Later polygons overwrite earlier ones.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn rasterize(&mut self, polygon: &DrapedPolygon) {
        let color = polygon
            .color
            .map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        let size = f64::from(self.size);
        let texel = (self.max - self.min) / size;
        let last = f64::from(self.size) - 1.0;

        let mut crossings: Vec<f64> = Vec::new();
        for row in 0..self.size {
            let y = self.min.y + (f64::from(row) + 0.5) * texel.y;

            crossings.clear();
            for ring in &polygon.rings {
                for (i, &a) in ring.iter().enumerate() {
                    let b = ring[(i + 1) % ring.len()];
                    if (a.y <= y) != (b.y <= y) {
                        crossings.push(a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y));
                    }
                }
            }
            crossings.sort_by(f64::total_cmp);

            for span in crossings.chunks_exact(2) {
                let start = ((span[0] - self.min.x) / texel.x - 0.5).ceil().max(0.0);
                let end = ((span[1] - self.min.x) / texel.x - 0.5).floor().min(last);
                if start > end {
                    continue;
                }
                let offset = row as usize * self.size as usize;
                for col in start as usize..=end as usize {
                    self.pixels[offset + col] = color;
                }
            }
        }
    }
}
