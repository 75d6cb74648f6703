//! GPU vertex layout shared by visible and picking geometry.

use bytemuck::{Pod, Zeroable};
use glam::DVec3;

/// A position in clip space plus a flat RGBA color.
///
/// Visible geometry carries the paint color (walls pre-shaded); picking
/// geometry carries a [`FeatureIdCode`](crate::FeatureIdCode) in
/// normalized form.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl Vertex {
    /// Byte stride of one vertex.
    pub const STRIDE: usize = std::mem::size_of::<Self>();

    #[must_use]
    pub fn new(position: DVec3, color: [f32; 4]) -> Self {
        Self {
            position: position.as_vec3().to_array(),
            color,
        }
    }
}
