//! Tile-local to Mercator clip-space transform.
//!
//! Clip space spans `[-1, 1]` on both axes: `x = lon / 180` and
//! `y = -ln(tan(pi/4 + lat/2)) / pi`, so north is `-1` and y grows
//! southward like tile rows do.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use glam::DVec2;
use tessera_decode::TileKey;

/// Pixel size of one tile at its native zoom.
pub const TILE_SIZE: f64 = 512.0;

/// Equatorial circumference of the spherical Mercator earth, in meters.
pub const EARTH_CIRCUMFERENCE: f64 = 40_075_016.686;

const ROUNDING: f64 = 1e10;

/// Map a tile-local point to clip space.
///
/// The steps run in a fixed order so the same input always yields the same
/// bits: optional clamp to `[0, extent]`, tile-local to world `[0, 1]`,
/// inverse Mercator to lon/lat, forward Mercator to clip space, then
/// rounding to 10 decimal digits.
#[must_use]
pub fn tile_to_clip(point: DVec2, key: TileKey, extent: u32, clamp: bool) -> DVec2 {
    let extent = f64::from(extent);
    let point = if clamp {
        point.clamp(DVec2::ZERO, DVec2::splat(extent))
    } else {
        point
    };

    let n = f64::from(key.tiles_per_side());
    let world = DVec2::new(
        (f64::from(key.x()) + point.x / extent) / n,
        (f64::from(key.y()) + point.y / extent) / n,
    );

    let lon = world.x * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * world.y)).sinh().atan().to_degrees();

    let clip = DVec2::new(
        lon / 180.0,
        -(FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln() / PI,
    );
    DVec2::new(round(clip.x), round(clip.y))
}

/// Map a whole ring (or line) to clip space.
#[must_use]
pub fn transform_ring(ring: &[DVec2], key: TileKey, extent: u32, clamp: bool) -> Vec<DVec2> {
    ring.iter()
        .map(|&p| tile_to_clip(p, key, extent, clamp))
        .collect()
}

/// Inverse of the forward Mercator step: clip space to `(lon, lat)` degrees.
#[must_use]
pub fn clip_to_lon_lat(clip: DVec2) -> DVec2 {
    let lon = clip.x * 180.0;
    let lat = (2.0 * (-clip.y * PI).exp().atan() - FRAC_PI_2).to_degrees();
    DVec2::new(lon, lat)
}

/// Clip space to world coordinates in `[0, 1]`, origin at the north-west corner.
#[must_use]
pub fn clip_to_world(clip: DVec2) -> DVec2 {
    (clip + DVec2::ONE) / 2.0
}

/// Geographic bounds of a tile as `(west/south, east/north)` in degrees.
#[must_use]
pub fn tile_bounds_lon_lat(key: TileKey) -> (DVec2, DVec2) {
    let n = f64::from(key.tiles_per_side());
    let lon = |x: f64| x / n * 360.0 - 180.0;
    let lat = |y: f64| (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees();

    let (x, y) = (f64::from(key.x()), f64::from(key.y()));
    (
        DVec2::new(lon(x), lat(y + 1.0)),
        DVec2::new(lon(x + 1.0), lat(y)),
    )
}

/// Clip-space bounds of a tile as `(min, max)`.
#[must_use]
pub fn tile_bounds_clip(key: TileKey, extent: u32) -> (DVec2, DVec2) {
    let e = f64::from(extent);
    (
        tile_to_clip(DVec2::ZERO, key, extent, false),
        tile_to_clip(DVec2::splat(e), key, extent, false),
    )
}

/// Latitude of a tile's center, in degrees.
#[must_use]
pub fn tile_center_latitude(key: TileKey) -> f64 {
    let n = f64::from(key.tiles_per_side());
    let y = f64::from(key.y()) + 0.5;
    (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees()
}

/// Convert a screen width in pixels to a clip-space width at `zoom`.
///
/// Keeps on-screen line thickness constant as the map zooms.
#[must_use]
pub fn pixels_to_clip(pixels: f64, zoom: u8) -> f64 {
    pixels * 2.0 / (TILE_SIZE * f64::from(1u32 << zoom))
}

/// Zoom at and above which heights are drawn at true scale.
pub const TRUE_HEIGHT_ZOOM: u8 = 16;

/// Height multiplier for geometry built at `zoom`.
///
/// Each zoom level out halves ground distances on screen, but heights only
/// shrink by `sqrt(2)`, so buildings stay readable on overview maps.
#[must_use]
pub fn height_zoom_factor(zoom: u8) -> f64 {
    let levels = TRUE_HEIGHT_ZOOM.saturating_sub(zoom);
    std::f64::consts::SQRT_2.powi(i32::from(levels))
}

/// Convert a height in meters to clip units at `latitude` degrees for
/// geometry built at `zoom`.
///
/// Mercator stretches ground distances by `1 / cos(lat)`; heights get the
/// same stretch, times [`height_zoom_factor`].
#[must_use]
pub fn meters_to_clip(meters: f64, latitude: f64, zoom: u8) -> f64 {
    meters * 2.0 / EARTH_CIRCUMFERENCE / latitude.to_radians().cos() * height_zoom_factor(zoom)
}

fn round(value: f64) -> f64 {
    (value * ROUNDING).round() / ROUNDING
}
