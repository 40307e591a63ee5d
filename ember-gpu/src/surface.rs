use glam::Vec3;

use crate::GBufferEntry;

/// Decides whether two surfaces are similar enough to share their reservoirs;
/// used both when looking at the previous frame and at the neighbouring
/// pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimilarityGate {
    /// Maximum distance between surface points, in world units (exclusive).
    pub position_threshold: f32,

    /// Maximum angle between surface normals, in degrees (exclusive).
    pub normal_threshold: f32,
}

impl SimilarityGate {
    pub fn accepts(&self, lhs: &GBufferEntry, rhs: &GBufferEntry) -> bool {
        if !lhs.is_some() || !rhs.is_some() {
            return false;
        }

        if !(lhs.position.distance(rhs.position) < self.position_threshold) {
            return false;
        }

        angle_between(lhs.normal, rhs.normal) < self.normal_threshold
    }
}

/// Returns angle between two normals, in degrees.
fn angle_between(lhs: Vec3, rhs: Vec3) -> f32 {
    lhs.dot(rhs).clamp(-1.0, 1.0).acos().to_degrees()
}
