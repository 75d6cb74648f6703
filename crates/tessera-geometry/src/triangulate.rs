//! Polygon triangulation by ear clipping.

use glam::DVec2;
use tessera_decode::Polygon;

use crate::error::{GeometryError, GeometryResult};

/// Triangulate a polygon with holes.
///
/// Returns indices into the polygon's vertices flattened in
/// [`Polygon::rings`] order (exterior first, then each hole).
pub fn triangulate(polygon: &Polygon) -> GeometryResult<Vec<u32>> {
    if polygon.exterior.len() < 3 {
        return Err(GeometryError::Degenerate { context: "polygon" });
    }

    let mut flat = Vec::with_capacity(polygon.vertex_count() * 2);
    let mut hole_starts = Vec::with_capacity(polygon.holes.len());
    for (i, ring) in polygon.rings().enumerate() {
        if i > 0 {
            hole_starts.push(flat.len() / 2);
        }
        for p in ring {
            flat.extend_from_slice(&[p.x, p.y]);
        }
    }

    let indices = earcutr::earcut(&flat, &hole_starts, 2).map_err(|e| {
        GeometryError::Triangulation {
            rings: polygon.holes.len() + 1,
            message: format!("{e:?}"),
        }
    })?;
    if indices.is_empty() {
        return Err(GeometryError::Degenerate { context: "polygon" });
    }

    #[allow(clippy::cast_possible_truncation)]
    let indices = indices.into_iter().map(|i| i as u32).collect();
    Ok(indices)
}

/// Vertices of a polygon in the order [`triangulate`] indexes them.
#[must_use]
pub fn flatten_rings(polygon: &Polygon) -> Vec<DVec2> {
    polygon.rings().flatten().copied().collect()
}

/// Area-weighted centroid of a ring, falling back to the vertex average
/// for degenerate rings.
#[must_use]
pub fn ring_centroid(ring: &[DVec2]) -> DVec2 {
    if ring.is_empty() {
        return DVec2::ZERO;
    }

    let mut area = 0.0;
    let mut sum = DVec2::ZERO;
    for (i, a) in ring.iter().enumerate() {
        let b = ring[(i + 1) % ring.len()];
        let cross = a.perp_dot(b);
        area += cross;
        sum += (*a + b) * cross;
    }

    if area.abs() < f64::EPSILON {
        #[allow(clippy::cast_precision_loss)]
        let n = ring.len() as f64;
        return ring.iter().copied().sum::<DVec2>() / n;
    }
    sum / (3.0 * area)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(min: f64, max: f64) -> Vec<DVec2> {
        vec![
            DVec2::new(min, min),
            DVec2::new(max, min),
            DVec2::new(max, max),
            DVec2::new(min, max),
        ]
    }

    #[test]
    fn test_square_two_triangles() {
        let polygon = Polygon {
            exterior: square(0.0, 4096.0),
            holes: Vec::new(),
        };
        let indices = triangulate(&polygon).unwrap();
        assert_eq!(indices.len(), 6);
        assert!(indices.iter().all(|&i| i < 4));
    }

    #[test]
    fn test_square_with_hole() {
        let mut hole = square(1024.0, 3072.0);
        hole.reverse();
        let polygon = Polygon {
            exterior: square(0.0, 4096.0),
            holes: vec![hole],
        };
        let indices = triangulate(&polygon).unwrap();
        // A square frame needs eight triangles.
        assert_eq!(indices.len(), 24);
        assert!(indices.iter().all(|&i| i < 8));
        assert_eq!(flatten_rings(&polygon).len(), 8);
    }

    #[test]
    fn test_degenerate_polygons() {
        let line = Polygon {
            exterior: vec![DVec2::ZERO, DVec2::ONE],
            holes: Vec::new(),
        };
        assert!(matches!(
            triangulate(&line),
            Err(GeometryError::Degenerate { .. })
        ));

        let collinear = Polygon {
            exterior: vec![DVec2::ZERO, DVec2::ONE, DVec2::splat(2.0)],
            holes: Vec::new(),
        };
        assert!(triangulate(&collinear).is_err());
    }

    #[test]
    fn test_ring_centroid() {
        let c = ring_centroid(&square(0.0, 10.0));
        assert!((c - DVec2::splat(5.0)).length() < 1e-9);

        let flat = [DVec2::ZERO, DVec2::new(2.0, 0.0), DVec2::new(4.0, 0.0)];
        assert!((ring_centroid(&flat) - DVec2::new(2.0, 0.0)).length() < 1e-9);
    }
}
