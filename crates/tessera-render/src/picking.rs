//! Resolving a picked pixel to a feature and a map position.

use glam::{DMat4, DVec2, DVec3};
use tessera_geometry::FeatureIdCode;
use tessera_geometry::transform::clip_to_lon_lat;

use crate::registry::{FeatureRef, FeatureRegistry};

/// Result of a pick query.
#[derive(Debug, Clone)]
pub struct PickResult {
    /// The live feature under the pixel, if any.
    pub feature: Option<FeatureRef>,
    /// The raw code read back from the picking target.
    pub code: FeatureIdCode,
    /// Height of the picked surface in meters, from the alpha channel.
    pub height: f64,
    /// Where the screen ray meets the ground plane, in degrees.
    pub lon_lat: DVec2,
}

/// Screen position in pixels (origin top-left) to normalized device
/// coordinates.
#[must_use]
pub fn screen_to_ndc(screen: DVec2, viewport_size: DVec2) -> DVec2 {
    DVec2::new(
        screen.x / viewport_size.x * 2.0 - 1.0,
        1.0 - screen.y / viewport_size.y * 2.0,
    )
}

/// Unproject a screen position onto the `z = 0` plane of clip space.
///
/// The ray runs from the near to the far plane through the pixel. A ray
/// parallel to the ground falls back to its near-plane point.
#[must_use]
pub fn screen_to_clip(screen: DVec2, viewport_size: DVec2, inverse_view_proj: DMat4) -> DVec2 {
    let ndc = screen_to_ndc(screen, viewport_size);
    let near = inverse_view_proj.project_point3(DVec3::new(ndc.x, ndc.y, 0.0));
    let far = inverse_view_proj.project_point3(DVec3::new(ndc.x, ndc.y, 1.0));

    let dz = far.z - near.z;
    if dz.abs() < f64::EPSILON {
        return near.truncate();
    }
    let t = -near.z / dz;
    near.lerp(far, t).truncate()
}

/// Decode a pixel read back from the picking target.
///
/// A pixel with no encoded id (cleared background) yields no feature, as
/// does one whose feature has since been evicted.
#[must_use]
pub fn pick(
    registry: &FeatureRegistry,
    rgba: [u8; 4],
    screen: DVec2,
    viewport_size: DVec2,
    inverse_view_proj: DMat4,
    max_pick_height: f64,
) -> PickResult {
    let code = FeatureIdCode::from_rgba(rgba);
    let clip = screen_to_clip(screen, viewport_size, inverse_view_proj);
    PickResult {
        feature: registry.resolve(code).cloned(),
        code,
        height: code.height(max_pick_height),
        lon_lat: clip_to_lon_lat(clip),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_to_ndc() {
        let size = DVec2::new(800.0, 600.0);
        assert_eq!(screen_to_ndc(DVec2::ZERO, size), DVec2::new(-1.0, 1.0));
        assert_eq!(screen_to_ndc(size, size), DVec2::new(1.0, -1.0));
        assert_eq!(screen_to_ndc(size / 2.0, size), DVec2::ZERO);
    }

    #[test]
    fn test_identity_camera() {
        // With an identity view-projection, clip space is the screen.
        let size = DVec2::new(512.0, 512.0);
        let clip = screen_to_clip(DVec2::new(384.0, 128.0), size, DMat4::IDENTITY);
        assert!((clip - DVec2::new(0.5, 0.5)).length() < 1e-12);
    }

    #[test]
    fn test_zoomed_orthographic_camera() {
        // A camera showing clip x, y in [0, 0.5] (the north-east quarter).
        let view_proj = DMat4::orthographic_rh(0.0, 0.5, 0.0, 0.5, -1.0, 1.0);
        let size = DVec2::new(100.0, 100.0);
        let clip = screen_to_clip(DVec2::new(50.0, 50.0), size, view_proj.inverse());
        assert!((clip - DVec2::new(0.25, 0.25)).length() < 1e-12);
    }

    #[test]
    fn test_pick_background() {
        let registry = FeatureRegistry::new();
        let result = pick(
            &registry,
            [0, 0, 0, 0],
            DVec2::new(256.0, 256.0),
            DVec2::new(512.0, 512.0),
            DMat4::IDENTITY,
            500.0,
        );
        assert!(result.feature.is_none());
        assert_eq!(result.code.feature_id(), None);
        assert!(result.lon_lat.length() < 1e-9);
        assert_eq!(result.height, 0.0);
    }
}
