use core::f32::consts::PI;

use glam::{vec2, UVec2, Vec2};

/// Per-pixel stream of uniformly distributed random numbers.
///
/// Each pixel gets its own state derived from the frame's seed and the pixel's
/// position, so that neighbouring pixels don't produce correlated samples.
#[derive(Clone, Copy, Debug)]
pub struct WhiteNoise {
    state: u32,
}

impl WhiteNoise {
    pub fn new(seed: u32, id: UVec2) -> Self {
        Self {
            state: seed
                ^ 48619u32.wrapping_mul(id.x)
                ^ 95461u32.wrapping_mul(id.y),
        }
    }

    /// Generates a uniform sample in range `<0.0, 1.0>`.
    pub fn sample(&mut self) -> f32 {
        (self.sample_int() as f32) / (u32::MAX as f32)
    }

    /// Generates a uniform sample in range `<0, u32::MAX>`.
    pub fn sample_int(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(747796405)
            .wrapping_add(2891336453);

        let word = ((self.state >> ((self.state >> 28) + 4)) ^ self.state)
            .wrapping_mul(277803737);

        (word >> 22) ^ word
    }

    /// Generates a uniform sample on a circle.
    pub fn sample_circle(&mut self) -> Vec2 {
        let angle = self.sample() * PI * 2.0;

        vec2(angle.cos(), angle.sin())
    }

    /// Generates a uniform sample inside of a disk.
    pub fn sample_disk(&mut self) -> Vec2 {
        let radius = self.sample().sqrt();

        self.sample_circle() * radius
    }

    /// Generates uniformly distributed barycentric coordinates of a point
    /// inside of a triangle.
    pub fn sample_barycentric(&mut self) -> Vec2 {
        let u = self.sample();
        let v = self.sample();

        if u + v > 1.0 {
            vec2(1.0 - u, 1.0 - v)
        } else {
            vec2(u, v)
        }
    }
}
