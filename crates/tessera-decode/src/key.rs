//! Tile addressing.

use std::fmt;
use std::str::FromStr;

use crate::error::{DecodeError, DecodeResult};

/// Deepest zoom level a [`TileKey`] can address.
pub const MAX_ZOOM: u8 = 30;

/// A quadtree cell identified by `(zoom, x, y)`.
///
/// The invariant `0 <= x, y < 2^zoom` is checked on construction, so every
/// key in circulation addresses a real tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    z: u8,
    x: u32,
    y: u32,
}

impl TileKey {
    /// Create a tile key, validating the coordinate range.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidTileKey`] if `z` exceeds [`MAX_ZOOM`] or
    /// `x`/`y` fall outside `0..2^z`.
    pub fn new(z: u8, x: u32, y: u32) -> DecodeResult<Self> {
        if z > MAX_ZOOM {
            return Err(DecodeError::InvalidTileKey { z, x, y });
        }
        let side = 1u32 << z;
        if x >= side || y >= side {
            return Err(DecodeError::InvalidTileKey { z, x, y });
        }
        Ok(Self { z, x, y })
    }

    /// Zoom level.
    #[must_use]
    pub fn z(&self) -> u8 {
        self.z
    }

    /// Column index.
    #[must_use]
    pub fn x(&self) -> u32 {
        self.x
    }

    /// Row index (0 is the northernmost row).
    #[must_use]
    pub fn y(&self) -> u32 {
        self.y
    }

    /// Number of tiles along one axis at this key's zoom.
    #[must_use]
    pub fn tiles_per_side(&self) -> u32 {
        1u32 << self.z
    }

    /// The tile one zoom level up that contains this one.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.z == 0 {
            return None;
        }
        Some(Self {
            z: self.z - 1,
            x: self.x >> 1,
            y: self.y >> 1,
        })
    }

    /// The four tiles one zoom level down, in row-major order.
    #[must_use]
    pub fn children(&self) -> Option<[Self; 4]> {
        if self.z >= MAX_ZOOM {
            return None;
        }
        let (z, x, y) = (self.z + 1, self.x << 1, self.y << 1);
        Some([
            Self { z, x, y },
            Self { z, x: x + 1, y },
            Self { z, x, y: y + 1 },
            Self {
                z,
                x: x + 1,
                y: y + 1,
            },
        ])
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

impl FromStr for TileKey {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DecodeError::InvalidFormat {
            context: "tile key",
            detail: format!("expected \"z/x/y\", got {s:?}"),
        };

        let mut parts = s.split('/');
        let (Some(z), Some(x), Some(y), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let z = z.parse().map_err(|_| invalid())?;
        let x = x.parse().map_err(|_| invalid())?;
        let y = y.parse().map_err(|_| invalid())?;
        Self::new(z, x, y)
    }
}
