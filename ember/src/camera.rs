use std::f32::consts::FRAC_PI_2;

use glam::{vec2, Mat4, UVec2, Vec3};

use crate::gpu;

#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,

    /// Vertical field of view, in radians.
    pub fov_y: f32,

    pub z_near: f32,
    pub z_far: f32,
    pub resolution: UVec2,
}

impl Camera {
    pub fn new(
        position: Vec3,
        target: Vec3,
        up: Vec3,
        resolution: UVec2,
    ) -> Self {
        Self {
            position,
            target,
            up,
            fov_y: FRAC_PI_2,
            z_near: 0.01,
            z_far: 1000.0,
            resolution,
        }
    }

    pub fn projection(&self) -> Mat4 {
        let aspect = self.resolution.x as f32 / self.resolution.y.max(1) as f32;

        Mat4::perspective_rh(self.fov_y, aspect, self.z_near, self.z_far)
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_view(&self) -> Mat4 {
        self.projection() * self.view()
    }

    /// Returns the primary ray going through the center of given pixel.
    pub fn ray(&self, screen_pos: UVec2) -> gpu::Ray {
        let ndc = (screen_pos.as_vec2() + 0.5) / self.resolution.as_vec2();
        let ndc = ndc * 2.0 - 1.0;
        let ndc = vec2(ndc.x, -ndc.y);

        let clip_to_world = self.projection_view().inverse();
        let near = clip_to_world.project_point3(ndc.extend(0.0));
        let far = clip_to_world.project_point3(ndc.extend(1.0));

        gpu::Ray::new(self.position, (far - near).normalize())
    }

    pub fn describe(&self) -> String {
        format!(
            "position={}, target={}, resolution={}x{}",
            self.position, self.target, self.resolution.x, self.resolution.y
        )
    }

    pub(crate) fn serialize(&self) -> gpu::Camera {
        gpu::Camera {
            projection_view: self.projection_view(),
            origin: self.position.extend(0.0),
            screen: self.resolution.as_vec2().extend(0.0).extend(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::{uvec2, vec3};

    use super::*;

    fn target() -> Camera {
        Camera::new(
            vec3(0.0, 0.0, 5.0),
            Vec3::ZERO,
            Vec3::Y,
            uvec2(64, 48),
        )
    }

    #[test]
    fn ray_goes_through_pixel() {
        let target = target();
        let camera = target.serialize();

        for pos in [uvec2(0, 0), uvec2(10, 40), uvec2(63, 47), uvec2(32, 24)] {
            let ray = target.ray(pos);

            assert_relative_eq!(1.0, ray.direction().length(), epsilon = 1e-5);

            let hit = ray.origin() + ray.direction() * 3.0;

            assert_eq!(Some(pos), camera.reproject(hit));
        }
    }

    #[test]
    fn center_ray_looks_at_target() {
        let mut target = target();

        target.resolution = uvec2(2, 2);

        let ray = target.ray(uvec2(1, 1));

        assert!(ray.direction().z < 0.0);
        assert!(ray.direction().x > 0.0);
        assert!(ray.direction().y < 0.0);
    }
}
