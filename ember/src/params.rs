use std::ops::RangeInclusive;
use std::time::Duration;

use crate::{gpu, Error, Result};

/// Runtime-tunable parameters of the resampling pipeline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RestirParams {
    /// Number of candidates drawn per pixel by the initial pass.
    pub light_sample_count: u32,

    pub temporal_reuse: bool,

    /// Whether reused samples get their visibility re-tested from the
    /// surface that reuses them.
    pub visibility_reuse: bool,

    /// History's confidence is clamped to this many times the current
    /// frame's confidence.
    pub temporal_history_multiplier: f32,

    /// Number of spatial-reuse passes; zero disables spatial reuse.
    pub spatial_iterations: u32,

    /// Number of neighbours examined per spatial-reuse pass.
    pub spatial_neighbours: u32,

    /// Maximum world-space distance between surfaces sharing reservoirs.
    pub position_threshold: f32,

    /// Maximum angle between normals of surfaces sharing reservoirs, in
    /// degrees.
    pub normal_threshold: f32,

    /// Radius of the disk spatial neighbours are drawn from, in pixels.
    pub spatial_radius: f32,
}

impl RestirParams {
    pub const LIGHT_SAMPLE_COUNT: RangeInclusive<u32> = 1..=1024;
    pub const TEMPORAL_HISTORY_MULTIPLIER: RangeInclusive<f32> = 0.0..=100.0;
    pub const SPATIAL_ITERATIONS: RangeInclusive<u32> = 0..=10;
    pub const SPATIAL_NEIGHBOURS: RangeInclusive<u32> = 1..=100;

    pub fn validate(&self) -> Result<()> {
        fn fail(msg: String) -> Result<()> {
            Err(Error::InvalidParams(msg))
        }

        if !Self::LIGHT_SAMPLE_COUNT.contains(&self.light_sample_count) {
            return fail(format!(
                "light_sample_count must be in {:?}, got {}",
                Self::LIGHT_SAMPLE_COUNT,
                self.light_sample_count
            ));
        }

        if !Self::TEMPORAL_HISTORY_MULTIPLIER
            .contains(&self.temporal_history_multiplier)
        {
            return fail(format!(
                "temporal_history_multiplier must be in {:?}, got {}",
                Self::TEMPORAL_HISTORY_MULTIPLIER,
                self.temporal_history_multiplier
            ));
        }

        if !Self::SPATIAL_ITERATIONS.contains(&self.spatial_iterations) {
            return fail(format!(
                "spatial_iterations must be in {:?}, got {}",
                Self::SPATIAL_ITERATIONS,
                self.spatial_iterations
            ));
        }

        if !Self::SPATIAL_NEIGHBOURS.contains(&self.spatial_neighbours) {
            return fail(format!(
                "spatial_neighbours must be in {:?}, got {}",
                Self::SPATIAL_NEIGHBOURS,
                self.spatial_neighbours
            ));
        }

        for (name, value) in [
            ("position_threshold", self.position_threshold),
            ("normal_threshold", self.normal_threshold),
            ("spatial_radius", self.spatial_radius),
        ] {
            if !value.is_finite() || value < 0.0 {
                return fail(format!(
                    "{name} must be finite and non-negative, got {value}"
                ));
            }
        }

        Ok(())
    }

    pub fn double_light_samples(&mut self) {
        self.set_light_samples(self.light_sample_count.saturating_mul(2));
    }

    pub fn halve_light_samples(&mut self) {
        self.set_light_samples(self.light_sample_count / 2);
    }

    fn set_light_samples(&mut self, count: u32) {
        let range = Self::LIGHT_SAMPLE_COUNT;

        self.light_sample_count = count.clamp(*range.start(), *range.end());
    }

    pub fn nudge_temporal_history_multiplier(&mut self, steps: i32) {
        self.temporal_history_multiplier = (self.temporal_history_multiplier
            + 10.0 * steps as f32)
            .clamp(0.0, 100.0);
    }

    pub fn nudge_spatial_iterations(&mut self, steps: i32) {
        self.spatial_iterations = (self.spatial_iterations as i32)
            .saturating_add(steps)
            .clamp(0, 10) as u32;
    }

    pub fn nudge_spatial_neighbours(&mut self, steps: i32) {
        self.spatial_neighbours = (self.spatial_neighbours as i32)
            .saturating_add(steps)
            .clamp(1, 100) as u32;
    }

    pub fn nudge_position_threshold(&mut self, steps: i32) {
        self.position_threshold =
            (self.position_threshold + 0.1 * steps as f32).clamp(0.0, 1.0);
    }

    pub fn nudge_normal_threshold(&mut self, steps: i32) {
        self.normal_threshold =
            (self.normal_threshold + 5.0 * steps as f32).clamp(5.0, 45.0);
    }

    /// Returns whether switching from `self` to `other` requires re-recording
    /// the passes and dropping the history.
    pub(crate) fn is_invalidated_by(&self, other: &Self) -> bool {
        let lhs = Self {
            temporal_history_multiplier: 0.0,
            ..*self
        };

        let rhs = Self {
            temporal_history_multiplier: 0.0,
            ..*other
        };

        lhs != rhs
    }

    pub(crate) fn serialize(
        &self,
        camera: gpu::Camera,
        prev_camera: gpu::Camera,
        light_count: u32,
    ) -> gpu::RestirUniforms {
        let mut flags = 0;

        if self.temporal_reuse {
            flags |= gpu::RestirUniforms::FLAG_TEMPORAL_REUSE;
        }

        if self.visibility_reuse {
            flags |= gpu::RestirUniforms::FLAG_VISIBILITY_REUSE;
        }

        gpu::RestirUniforms {
            camera,
            prev_camera,
            light_sample_count: self.light_sample_count,
            flags,
            spatial_neighbours: self.spatial_neighbours,
            light_count,
            position_threshold: self.position_threshold,
            normal_threshold: self.normal_threshold,
            spatial_radius: self.spatial_radius,
            temporal_history_multiplier: self.temporal_history_multiplier,
        }
    }
}

impl Default for RestirParams {
    fn default() -> Self {
        Self {
            light_sample_count: 32,
            temporal_reuse: true,
            visibility_reuse: true,
            temporal_history_multiplier: 20.0,
            spatial_iterations: 1,
            spatial_neighbours: 4,
            position_threshold: 0.1,
            normal_threshold: 25.0,
            spatial_radius: 30.0,
        }
    }
}

/// Parameters fixed for the renderer's lifetime.
#[derive(Clone, Debug, PartialEq)]
pub struct RendererConfig {
    /// Upper bound for every wait on the device; exceeding it is treated as
    /// losing the device.
    pub fence_timeout: Duration,

    /// Seed for the per-frame random numbers; `None` draws one from the
    /// operating system.
    pub seed: Option<u64>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            fence_timeout: Duration::from_secs(5),
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(Ok(()), RestirParams::default().validate());
    }

    #[test]
    fn validate() {
        let cases = [
            RestirParams {
                light_sample_count: 0,
                ..Default::default()
            },
            RestirParams {
                light_sample_count: 1025,
                ..Default::default()
            },
            RestirParams {
                temporal_history_multiplier: -1.0,
                ..Default::default()
            },
            RestirParams {
                spatial_iterations: 11,
                ..Default::default()
            },
            RestirParams {
                spatial_neighbours: 0,
                ..Default::default()
            },
            RestirParams {
                position_threshold: f32::NAN,
                ..Default::default()
            },
            RestirParams {
                normal_threshold: -5.0,
                ..Default::default()
            },
            RestirParams {
                spatial_radius: f32::INFINITY,
                ..Default::default()
            },
        ];

        for case in cases {
            assert!(
                matches!(case.validate(), Err(Error::InvalidParams(_))),
                "case = {case:?}"
            );
        }

        // Extreme, but valid
        let params = RestirParams {
            spatial_iterations: 0,
            position_threshold: f32::MAX,
            normal_threshold: f32::MAX,
            ..Default::default()
        };

        assert_eq!(Ok(()), params.validate());
    }

    #[test]
    fn nudges() {
        let mut target = RestirParams::default();

        for _ in 0..20 {
            target.double_light_samples();
        }

        assert_eq!(1024, target.light_sample_count);

        for _ in 0..20 {
            target.halve_light_samples();
        }

        assert_eq!(1, target.light_sample_count);

        target.nudge_temporal_history_multiplier(100);
        assert_eq!(100.0, target.temporal_history_multiplier);

        target.nudge_spatial_iterations(-5);
        assert_eq!(0, target.spatial_iterations);

        target.nudge_spatial_neighbours(-5);
        assert_eq!(1, target.spatial_neighbours);

        target.nudge_normal_threshold(-1);
        assert_eq!(20.0, target.normal_threshold);

        target.nudge_normal_threshold(-10);
        assert_eq!(5.0, target.normal_threshold);

        target.nudge_position_threshold(100);
        assert_eq!(1.0, target.position_threshold);

        assert!(target.validate().is_ok());
    }

    #[test]
    fn invalidation() {
        let target = RestirParams::default();

        assert!(!target.is_invalidated_by(&RestirParams {
            temporal_history_multiplier: 50.0,
            ..target
        }));

        assert!(target.is_invalidated_by(&RestirParams {
            spatial_iterations: 3,
            ..target
        }));

        assert!(target.is_invalidated_by(&RestirParams {
            normal_threshold: 30.0,
            ..target
        }));
    }
}
