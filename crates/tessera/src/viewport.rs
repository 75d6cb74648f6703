//! Visible tile set computation.

use glam::DVec2;
use tessera_decode::TileKey;
use tessera_geometry::transform::clip_to_world;

use tracing::debug;

use crate::types::{TileSource, Viewport};

/// Widest run of tiles requested along either axis of a viewport.
pub const MAX_TILES_PER_AXIS: u32 = 32;

/// Narrow `lo..=hi` to at most [`MAX_TILES_PER_AXIS`] tiles around `center`.
fn limit_span(lo: u32, hi: u32, center: u32) -> (u32, u32) {
    if hi - lo < MAX_TILES_PER_AXIS {
        return (lo, hi);
    }
    let center = center.clamp(lo, hi);
    let start = center
        .saturating_sub(MAX_TILES_PER_AXIS / 2)
        .clamp(lo, hi + 1 - MAX_TILES_PER_AXIS);
    (start, start + MAX_TILES_PER_AXIS - 1)
}

/// The zoom level tiles are requested at for a viewport.
///
/// The camera zoom is floored, then clamped into the source's zoom range.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn target_zoom(viewport: &Viewport, source: &TileSource) -> u8 {
    let zoom = viewport.zoom.floor().clamp(0.0, f64::from(u8::MAX)) as u8;
    zoom.clamp(source.min_zoom, source.max_zoom)
}

/// Tiles covering `viewport` at its target zoom, nearest the center first.
///
/// A viewport far wider than its zoom warrants is cut down to the
/// [`MAX_TILES_PER_AXIS`] square of tiles around its center.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn visible_tiles(viewport: &Viewport, source: &TileSource) -> Vec<TileKey> {
    let z = target_zoom(viewport, source);
    let n = 1u32 << z;
    let scale = f64::from(n);

    let world = |clip: DVec2| (clip_to_world(clip) * scale).clamp(DVec2::ZERO, DVec2::splat(scale));
    let min = world(viewport.min.min(viewport.max));
    let max = world(viewport.max.max(viewport.min));

    let x0 = (min.x.floor() as u32).min(n - 1);
    let y0 = (min.y.floor() as u32).min(n - 1);
    let x1 = ((max.x.ceil() as u32).max(x0 + 1) - 1).min(n - 1);
    let y1 = ((max.y.ceil() as u32).max(y0 + 1) - 1).min(n - 1);

    let center = clip_to_world(viewport.center()) * scale;
    let (cx, cy) = (center.x.max(0.0) as u32, center.y.max(0.0) as u32);
    let (xs, ys) = (limit_span(x0, x1, cx), limit_span(y0, y1, cy));
    if xs != (x0, x1) || ys != (y0, y1) {
        debug!(
            zoom = z,
            columns = x1 - x0 + 1,
            rows = y1 - y0 + 1,
            "visible tile span limited"
        );
    }
    let ((x0, x1), (y0, y1)) = (xs, ys);
    let mut tiles: Vec<(f64, TileKey)> = (y0..=y1)
        .flat_map(|y| (x0..=x1).map(move |x| (x, y)))
        .filter_map(|(x, y)| {
            let key = TileKey::new(z, x, y).ok()?;
            let tile_center = DVec2::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
            Some((tile_center.distance_squared(center), key))
        })
        .collect();

    tiles.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    tiles.into_iter().map(|(_, key)| key).collect()
}
