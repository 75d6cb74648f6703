//! Feature geometry and ring classification.

use glam::DVec2;

use crate::command::Path;
use crate::error::{DecodeError, DecodeResult};

/// A polygon: one exterior ring plus zero or more holes.
///
/// Rings are stored open (the first vertex is not repeated at the end).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polygon {
    pub exterior: Vec<DVec2>,
    pub holes: Vec<Vec<DVec2>>,
}

impl Polygon {
    /// Iterate over the exterior ring followed by every hole.
    pub fn rings(&self) -> impl Iterator<Item = &[DVec2]> {
        std::iter::once(self.exterior.as_slice()).chain(self.holes.iter().map(Vec::as_slice))
    }

    /// Total vertex count across all rings.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.exterior.len() + self.holes.iter().map(Vec::len).sum::<usize>()
    }
}

/// Decoded feature geometry in tile-local coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(DVec2),
    MultiPoint(Vec<DVec2>),
    LineString(Vec<DVec2>),
    MultiLineString(Vec<Vec<DVec2>>),
    Polygon(Polygon),
    MultiPolygon(Vec<Polygon>),
}

/// Geometry type tag of a [`Geometry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryType {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
}

impl Geometry {
    /// The type tag of this geometry.
    #[must_use]
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Self::Point(_) => GeometryType::Point,
            Self::MultiPoint(_) => GeometryType::MultiPoint,
            Self::LineString(_) => GeometryType::LineString,
            Self::MultiLineString(_) => GeometryType::MultiLineString,
            Self::Polygon(_) => GeometryType::Polygon,
            Self::MultiPolygon(_) => GeometryType::MultiPolygon,
        }
    }

    /// Polygons of this geometry, empty for non-polygonal types.
    #[must_use]
    pub fn polygons(&self) -> &[Polygon] {
        match self {
            Self::Polygon(p) => std::slice::from_ref(p),
            Self::MultiPolygon(ps) => ps,
            _ => &[],
        }
    }

    /// Line strings of this geometry, empty for non-linear types.
    #[must_use]
    pub fn lines(&self) -> Vec<&[DVec2]> {
        match self {
            Self::LineString(l) => vec![l.as_slice()],
            Self::MultiLineString(ls) => ls.iter().map(Vec::as_slice).collect(),
            _ => Vec::new(),
        }
    }
}

/// Signed area of a ring by the surveyor's formula.
///
/// In tile coordinates (y pointing down) a clockwise ring has positive area,
/// which is how exterior rings are wound.
#[must_use]
pub fn signed_area(ring: &[DVec2]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for (i, a) in ring.iter().enumerate() {
        let b = ring[(i + 1) % ring.len()];
        sum += a.x * b.y - b.x * a.y;
    }
    sum / 2.0
}

/// Build point geometry from decoded paths.
pub(crate) fn points_from_paths(paths: Vec<Path>) -> DecodeResult<Geometry> {
    let mut points: Vec<DVec2> = paths.into_iter().flat_map(|p| p.points).collect();
    match points.len() {
        0 => Err(empty("point")),
        1 => Ok(Geometry::Point(points.remove(0))),
        _ => Ok(Geometry::MultiPoint(points)),
    }
}

/// Build line geometry from decoded paths.
pub(crate) fn lines_from_paths(paths: Vec<Path>) -> DecodeResult<Geometry> {
    let mut lines: Vec<Vec<DVec2>> = paths
        .into_iter()
        .map(|p| p.points)
        .filter(|points| points.len() >= 2)
        .collect();
    match lines.len() {
        0 => Err(empty("linestring")),
        1 => Ok(Geometry::LineString(lines.remove(0))),
        _ => Ok(Geometry::MultiLineString(lines)),
    }
}

/// Build polygon geometry from decoded rings.
///
/// The first ring with non-zero area fixes the exterior winding. Every
/// later ring with the same winding starts a new polygon; rings with the
/// opposite winding are holes of the polygon before them. Zero-area rings
/// and holes that precede any exterior are dropped.
pub(crate) fn polygons_from_paths(paths: Vec<Path>) -> DecodeResult<Geometry> {
    let mut polygons: Vec<Polygon> = Vec::new();
    let mut exterior_positive: Option<bool> = None;

    for path in paths {
        let mut ring = path.points;
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        let area = signed_area(&ring);
        if area == 0.0 {
            continue;
        }

        let positive = area > 0.0;
        let exterior_sign = *exterior_positive.get_or_insert(positive);
        if positive == exterior_sign {
            polygons.push(Polygon {
                exterior: ring,
                holes: Vec::new(),
            });
        } else if let Some(polygon) = polygons.last_mut() {
            polygon.holes.push(ring);
        }
    }

    match polygons.len() {
        0 => Err(empty("polygon")),
        1 => Ok(Geometry::Polygon(polygons.remove(0))),
        _ => Ok(Geometry::MultiPolygon(polygons)),
    }
}

fn empty(context: &'static str) -> DecodeError {
    DecodeError::InvalidFormat {
        context,
        detail: "no usable geometry".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(points: &[(f64, f64)]) -> Path {
        Path {
            points: points.iter().map(|&(x, y)| DVec2::new(x, y)).collect(),
            closed: true,
        }
    }

    #[test]
    fn test_signed_area_winding() {
        // Clockwise on screen (y down) is positive.
        let cw = [
            DVec2::new(0.0, 0.0),
            DVec2::new(10.0, 0.0),
            DVec2::new(10.0, 10.0),
            DVec2::new(0.0, 10.0),
        ];
        assert!((signed_area(&cw) - 100.0).abs() < 1e-9);

        let ccw: Vec<DVec2> = cw.iter().rev().copied().collect();
        assert!((signed_area(&ccw) + 100.0).abs() < 1e-9);

        assert_eq!(signed_area(&cw[..2]), 0.0);
    }

    #[test]
    fn test_polygon_with_hole() {
        let paths = vec![
            ring(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]),
            ring(&[(2.0, 2.0), (2.0, 8.0), (8.0, 8.0), (8.0, 2.0)]),
        ];
        let Geometry::Polygon(polygon) = polygons_from_paths(paths).unwrap() else {
            panic!("expected single polygon");
        };
        assert_eq!(polygon.exterior.len(), 4);
        assert_eq!(polygon.holes.len(), 1);
        assert_eq!(polygon.vertex_count(), 8);
        assert_eq!(polygon.rings().count(), 2);
    }

    #[test]
    fn test_multi_polygon() {
        let paths = vec![
            ring(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]),
            ring(&[(20.0, 0.0), (30.0, 0.0), (30.0, 10.0), (20.0, 10.0)]),
        ];
        let geometry = polygons_from_paths(paths).unwrap();
        assert_eq!(geometry.geometry_type(), GeometryType::MultiPolygon);
        assert_eq!(geometry.polygons().len(), 2);
    }

    #[test]
    fn test_zero_area_rings_dropped() {
        let paths = vec![
            ring(&[(0.0, 0.0), (5.0, 5.0), (10.0, 10.0)]),
            ring(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]),
        ];
        let geometry = polygons_from_paths(paths).unwrap();
        assert_eq!(geometry.polygons().len(), 1);

        let degenerate = vec![ring(&[(0.0, 0.0), (5.0, 5.0), (10.0, 10.0)])];
        assert!(polygons_from_paths(degenerate).is_err());
    }

    #[test]
    fn test_repeated_closing_vertex_removed() {
        let paths = vec![ring(&[
            (0.0, 0.0),
            (10.0, 0.0),
            (10.0, 10.0),
            (0.0, 10.0),
            (0.0, 0.0),
        ])];
        let geometry = polygons_from_paths(paths).unwrap();
        assert_eq!(geometry.polygons()[0].exterior.len(), 4);
    }

    #[test]
    fn test_lines_drop_single_vertex_paths() {
        let paths = vec![
            Path {
                points: vec![DVec2::ZERO],
                closed: false,
            },
            Path {
                points: vec![DVec2::ZERO, DVec2::ONE],
                closed: false,
            },
        ];
        let geometry = lines_from_paths(paths).unwrap();
        assert_eq!(geometry.geometry_type(), GeometryType::LineString);
        assert_eq!(geometry.lines().len(), 1);
    }
}
