use bytemuck::{Pod, Zeroable};

use crate::{
    AliasBucket, AliasTableView, Camera, Light, LightsView, SimilarityGate,
};

/// Push constants shared by all resampling passes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PassParams {
    pub seed: u32,

    /// Number of frames rendered since the history got reset; zero means
    /// there's no history to reuse.
    pub frame: u32,
}

/// Per-slot uniforms, written once per frame.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct RestirUniforms {
    pub camera: Camera,
    pub prev_camera: Camera,
    pub light_sample_count: u32,
    pub flags: u32,
    pub spatial_neighbours: u32,

    /// Number of valid entries in the lights and alias-table buffers; devices
    /// are free to allocate those buffers larger than that.
    pub light_count: u32,

    pub position_threshold: f32,
    pub normal_threshold: f32,
    pub spatial_radius: f32,
    pub temporal_history_multiplier: f32,
}

impl RestirUniforms {
    pub const FLAG_TEMPORAL_REUSE: u32 = 1;
    pub const FLAG_VISIBILITY_REUSE: u32 = 1 << 1;

    pub fn is_temporal_reuse_enabled(&self) -> bool {
        self.flags & Self::FLAG_TEMPORAL_REUSE != 0
    }

    pub fn is_visibility_reuse_enabled(&self) -> bool {
        self.flags & Self::FLAG_VISIBILITY_REUSE != 0
    }

    pub fn lights<'a>(&self, lights: &'a [Light]) -> LightsView<'a> {
        let len = lights.len().min(self.light_count as usize);

        LightsView::new(&lights[..len])
    }

    pub fn alias_table<'a>(
        &self,
        buckets: &'a [AliasBucket],
    ) -> AliasTableView<'a> {
        let len = buckets.len().min(self.light_count as usize);

        AliasTableView::new(&buckets[..len])
    }

    pub fn gate(&self) -> SimilarityGate {
        SimilarityGate {
            position_threshold: self.position_threshold,
            normal_threshold: self.normal_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        assert_eq!(0, core::mem::size_of::<RestirUniforms>() % 16);
        assert_eq!(8, core::mem::size_of::<PassParams>());
    }

    #[test]
    fn flags() {
        let target = RestirUniforms {
            flags: RestirUniforms::FLAG_VISIBILITY_REUSE,
            ..Default::default()
        };

        assert!(!target.is_temporal_reuse_enabled());
        assert!(target.is_visibility_reuse_enabled());
    }

    #[test]
    fn padded_buffers() {
        let lights = [Light::point(glam::Vec3::ZERO, glam::Vec3::ONE); 3];
        let buckets = [AliasBucket::default(); 3];

        let target = RestirUniforms {
            light_count: 2,
            ..Default::default()
        };

        assert_eq!(2, target.lights(&lights).len());
        assert_eq!(2, target.alias_table(&buckets).len());

        // ---

        let target = RestirUniforms {
            light_count: 10,
            ..Default::default()
        };

        assert_eq!(3, target.lights(&lights).len());
    }
}
