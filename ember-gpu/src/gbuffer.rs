use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Surface attributes of a single pixel, as produced by the geometry pass.
///
/// Packs all of the geometry pass' attachments (world position, normal,
/// albedo & material id, depth) into a single structured entry.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GBufferEntry {
    pub position: Vec3,

    /// Distance from the camera; zero means there's no surface at this pixel.
    pub depth: f32,

    pub normal: Vec3,
    pub material_id: u32,
    pub albedo: Vec3,
    _padding0: u32,
}

impl GBufferEntry {
    pub fn new(position: Vec3, normal: Vec3, depth: f32) -> Self {
        Self {
            position,
            depth,
            normal,
            material_id: 0,
            albedo: Vec3::ONE,
            _padding0: 0,
        }
    }

    pub fn is_some(&self) -> bool {
        self.depth > 0.0
    }
}
