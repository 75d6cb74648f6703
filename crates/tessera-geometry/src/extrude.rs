//! Extruded building footprints.

use glam::{DVec2, DVec3};

/// Shade factor of a wall in `[0.0, 0.8]`.
///
/// `edge_angle` is the direction of the footprint edge in radians,
/// `sun_azimuth` the light direction in degrees.
#[must_use]
pub fn wall_shade(edge_angle: f64, sun_azimuth: f64) -> f64 {
    0.4 + 0.4 * (edge_angle - sun_azimuth.to_radians()).cos()
}

/// Vertical walls around a footprint ring.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Walls {
    pub positions: Vec<DVec3>,
    /// Per-vertex shade factor, constant across each quad.
    pub shades: Vec<f64>,
    pub indices: Vec<u32>,
}

/// Build one quad (two triangles) per edge of a closed footprint ring.
///
/// The ring is given open; the closing edge from the last vertex back to
/// the first is included.
#[must_use]
pub fn build_walls(ring: &[DVec2], base: f64, top: f64, sun_azimuth: f64) -> Walls {
    let mut walls = Walls::default();
    if ring.len() < 2 {
        return walls;
    }

    for (i, &a) in ring.iter().enumerate() {
        let b = ring[(i + 1) % ring.len()];
        let edge = b - a;
        if edge.length_squared() == 0.0 {
            continue;
        }
        let shade = wall_shade(edge.y.atan2(edge.x), sun_azimuth);

        #[allow(clippy::cast_possible_truncation)]
        let start = walls.positions.len() as u32;
        walls.positions.extend_from_slice(&[
            a.extend(base),
            b.extend(base),
            b.extend(top),
            a.extend(top),
        ]);
        walls.shades.extend_from_slice(&[shade; 4]);
        walls
            .indices
            .extend_from_slice(&[start, start + 1, start + 2, start, start + 2, start + 3]);
    }
    walls
}
