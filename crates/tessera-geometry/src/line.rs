//! Line tessellation into width-extruded triangle strips.

use std::f64::consts::PI;

use glam::DVec2;
use serde::{Deserialize, Serialize};

const EPSILON: f64 = 1e-12;
const ROUND_CAP_SEGMENTS: u32 = 8;

/// How the two ends of a line are finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineCap {
    /// Stop flush with the end vertex.
    #[default]
    Butt,
    /// Extend past the end vertex by half the width.
    Square,
    /// Add a half disc around the end vertex.
    Round,
}

/// Triangles of a tessellated line in the plane.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineMesh {
    pub positions: Vec<DVec2>,
    pub indices: Vec<u32>,
}

impl LineMesh {
    fn next_index(&self) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        let index = self.positions.len() as u32;
        index
    }

    /// Push a left/right vertex pair and stitch it to the previous pair.
    fn push_pair(&mut self, center: DVec2, offset: DVec2) {
        let base = self.next_index();
        self.positions.push(center + offset);
        self.positions.push(center - offset);
        if base >= 2 {
            let prev = base - 2;
            self.indices
                .extend_from_slice(&[prev, prev + 1, base, prev + 1, base + 1, base]);
        }
    }

    /// Fan a half disc around `center`, sweeping from `+normal` through
    /// `outward` to `-normal`.
    fn push_round_cap(&mut self, center: DVec2, normal: DVec2, outward: DVec2) {
        let c = self.next_index();
        self.positions.push(center);
        for step in 0..=ROUND_CAP_SEGMENTS {
            let t = PI * f64::from(step) / f64::from(ROUND_CAP_SEGMENTS);
            self.positions
                .push(center + normal * t.cos() + outward * t.sin());
        }
        for step in 0..ROUND_CAP_SEGMENTS {
            self.indices.extend_from_slice(&[c, c + 1 + step, c + 2 + step]);
        }
    }
}

/// Drop consecutive duplicate vertices.
#[must_use]
pub fn dedupe_points(points: &[DVec2]) -> Vec<DVec2> {
    let mut out: Vec<DVec2> = Vec::with_capacity(points.len());
    for &p in points {
        if out
            .last()
            .is_none_or(|last| last.distance_squared(p) > EPSILON * EPSILON)
        {
            out.push(p);
        }
    }
    out
}

/// Tessellate a polyline of the given half width.
///
/// Interior vertices are joined along the bisector of the adjacent segment
/// normals, pushed out by `1 / cos(half angle)` half widths. When that
/// miter would be longer than `miter_limit` half widths, or the bisector
/// vanishes because the line doubles back on itself, the join falls back
/// to a bevel.
///
/// Returns `None` if fewer than two distinct vertices remain.
#[must_use]
pub fn tessellate_line(
    points: &[DVec2],
    half_width: f64,
    miter_limit: f64,
    cap: LineCap,
) -> Option<LineMesh> {
    let mut points = dedupe_points(points);
    if points.len() < 2 || half_width <= 0.0 {
        return None;
    }

    let last = points.len() - 1;
    let start_dir = (points[1] - points[0]).normalize();
    let end_dir = (points[last] - points[last - 1]).normalize();
    if cap == LineCap::Square {
        points[0] -= start_dir * half_width;
        points[last] += end_dir * half_width;
    }

    let normals: Vec<DVec2> = points
        .windows(2)
        .map(|w| (w[1] - w[0]).normalize().perp())
        .collect();

    let mut mesh = LineMesh::default();
    mesh.push_pair(points[0], normals[0] * half_width);

    for i in 1..last {
        let (n0, n1) = (normals[i - 1], normals[i]);
        match miter_offset(n0, n1, miter_limit) {
            Some(miter) => mesh.push_pair(points[i], miter * half_width),
            None => {
                mesh.push_pair(points[i], n0 * half_width);
                mesh.push_pair(points[i], n1 * half_width);
            }
        }
    }

    mesh.push_pair(points[last], normals[last - 1] * half_width);

    if cap == LineCap::Round {
        mesh.push_round_cap(
            points[0],
            normals[0] * half_width,
            -start_dir * half_width,
        );
        mesh.push_round_cap(
            points[last],
            normals[last - 1] * half_width,
            end_dir * half_width,
        );
    }

    Some(mesh)
}

/// Unit-width miter vector for a join, or `None` if it should bevel.
fn miter_offset(n0: DVec2, n1: DVec2, miter_limit: f64) -> Option<DVec2> {
    let bisector = n0 + n1;
    if bisector.length_squared() <= EPSILON {
        return None;
    }
    let bisector = bisector.normalize();
    let cos_half = bisector.dot(n1);
    if cos_half <= EPSILON || 1.0 / cos_half > miter_limit {
        return None;
    }
    Some(bisector / cos_half)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(points: &[(f64, f64)]) -> Vec<DVec2> {
        points.iter().map(|&(x, y)| DVec2::new(x, y)).collect()
    }

    #[test]
    fn test_straight_segment() {
        let mesh = tessellate_line(&pts(&[(0.0, 0.0), (10.0, 0.0)]), 1.0, 2.0, LineCap::Butt)
            .unwrap();
        assert_eq!(
            mesh.positions,
            pts(&[(0.0, 1.0), (0.0, -1.0), (10.0, 1.0), (10.0, -1.0)])
        );
        assert_eq!(mesh.indices, vec![0, 1, 2, 1, 3, 2]);
    }

    #[test]
    fn test_right_angle_miter() {
        let mesh = tessellate_line(
            &pts(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]),
            1.0,
            2.0,
            LineCap::Butt,
        )
        .unwrap();
        assert_eq!(mesh.positions.len(), 6);
        assert!((mesh.positions[2] - DVec2::new(9.0, 1.0)).length() < 1e-9);
        assert!((mesh.positions[3] - DVec2::new(11.0, -1.0)).length() < 1e-9);
        assert_eq!(mesh.indices.len(), 12);
    }

    #[test]
    fn test_miter_limit_in_half_widths() {
        // A right angle needs a miter of sqrt(2) half widths.
        let corner = pts(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        let mitered = tessellate_line(&corner, 1.0, 1.5, LineCap::Butt).unwrap();
        assert_eq!(mitered.positions.len(), 6);
        let beveled = tessellate_line(&corner, 1.0, 1.4, LineCap::Butt).unwrap();
        assert_eq!(beveled.positions.len(), 8);

        // The miter vertex sits sqrt(2) half widths from the corner.
        let miter = mitered.positions[2].distance(DVec2::new(10.0, 0.0));
        assert!((miter - std::f64::consts::SQRT_2).abs() < 1e-9);
    }

    #[test]
    fn test_sharp_angle_bevels() {
        let mesh = tessellate_line(
            &pts(&[(0.0, 0.0), (10.0, 0.0), (0.0, 1.0)]),
            1.0,
            2.0,
            LineCap::Butt,
        )
        .unwrap();
        // The join vertex is emitted twice, once per segment normal.
        assert_eq!(mesh.positions.len(), 8);
        for p in &mesh.positions[2..6] {
            assert!((p.distance(DVec2::new(10.0, 0.0)) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_reversal_bevels() {
        let mesh = tessellate_line(
            &pts(&[(0.0, 0.0), (10.0, 0.0), (0.0, 0.0)]),
            1.0,
            10.0,
            LineCap::Butt,
        )
        .unwrap();
        assert_eq!(mesh.positions.len(), 8);
        assert!(mesh.positions.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_duplicates_removed() {
        let mesh = tessellate_line(
            &pts(&[(0.0, 0.0), (0.0, 0.0), (10.0, 0.0), (10.0, 0.0)]),
            1.0,
            2.0,
            LineCap::Butt,
        )
        .unwrap();
        assert_eq!(mesh.positions.len(), 4);

        assert!(tessellate_line(&pts(&[(1.0, 1.0), (1.0, 1.0)]), 1.0, 2.0, LineCap::Butt).is_none());
        assert!(tessellate_line(&pts(&[(1.0, 1.0)]), 1.0, 2.0, LineCap::Butt).is_none());
    }

    #[test]
    fn test_square_cap_extends() {
        let mesh = tessellate_line(&pts(&[(0.0, 0.0), (10.0, 0.0)]), 1.0, 2.0, LineCap::Square)
            .unwrap();
        assert!((mesh.positions[0].x + 1.0).abs() < 1e-9);
        assert!((mesh.positions[3].x - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_round_cap_fans() {
        let mesh = tessellate_line(&pts(&[(0.0, 0.0), (10.0, 0.0)]), 1.0, 2.0, LineCap::Round)
            .unwrap();
        let per_cap = 2 + ROUND_CAP_SEGMENTS as usize;
        assert_eq!(mesh.positions.len(), 4 + 2 * per_cap);
        assert_eq!(mesh.indices.len(), 6 + 2 * 3 * ROUND_CAP_SEGMENTS as usize);
        // The start cap bulges behind the first vertex.
        assert!(mesh.positions.iter().any(|p| (p.x + 1.0).abs() < 1e-9));
    }

    #[test]
    fn test_cap_deserialize() {
        let cap: LineCap = serde_json::from_str("\"round\"").unwrap();
        assert_eq!(cap, LineCap::Round);
    }
}
