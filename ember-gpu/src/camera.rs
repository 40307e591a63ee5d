use bytemuck::{Pod, Zeroable};
use glam::{vec2, IVec2, Mat4, UVec2, Vec2, Vec3, Vec4, Vec4Swizzles};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Camera {
    pub projection_view: Mat4,

    /// xyz - camera's position
    pub origin: Vec4,

    /// xy - viewport's size, in pixels
    pub screen: Vec4,
}

impl Camera {
    /// Given a point in world-coordinates, returns it in clip-coordinates.
    pub fn world_to_clip(&self, pos: Vec3) -> Vec4 {
        self.projection_view * pos.extend(1.0)
    }

    /// Given a point in world-coordinates, returns it in screen-coordinates.
    pub fn world_to_screen(&self, pos: Vec3) -> Vec2 {
        self.clip_to_screen(self.world_to_clip(pos))
    }

    /// Given a point in clip-coordinates, returns it in screen-coordinates.
    pub fn clip_to_screen(&self, pos: Vec4) -> Vec2 {
        let ndc = pos.xy() / pos.w;
        let ndc = vec2(ndc.x, -ndc.y);

        (0.5 * ndc + 0.5) * self.screen.xy()
    }

    /// Given a point in world-coordinates, returns the pixel this camera sees
    /// it at, if any.
    ///
    /// Used to find the previous frame's pixel of a surface point, so `self`
    /// is usually the previous frame's camera.
    pub fn reproject(&self, pos: Vec3) -> Option<UVec2> {
        let clip = self.world_to_clip(pos);

        if clip.w <= 0.0 {
            return None;
        }

        let screen = self.clip_to_screen(clip).floor();

        if !screen.is_finite() {
            return None;
        }

        let screen = screen.as_ivec2();

        if self.contains(screen) {
            Some(screen.as_uvec2())
        } else {
            None
        }
    }

    /// Given a point in screen-coordinates, returns a unique index for it; used
    /// to index screen-space structures.
    pub fn screen_to_idx(&self, pos: UVec2) -> usize {
        (pos.y * (self.screen.x as u32) + pos.x) as usize
    }

    /// Inverse of [`Self::screen_to_idx()`].
    pub fn idx_to_screen(&self, idx: usize) -> UVec2 {
        let width = (self.screen.x as usize).max(1);

        UVec2::new((idx % width) as u32, (idx / width) as u32)
    }

    pub fn screen_size(&self) -> UVec2 {
        self.screen.xy().as_uvec2()
    }

    /// Brings given point back into the screen by mirroring it around the
    /// screen's edges.
    pub fn contain(&self, mut pos: IVec2) -> UVec2 {
        let screen_size = self.screen.xy().as_ivec2();

        if pos.x < 0 {
            pos.x = -pos.x;
        }

        if pos.y < 0 {
            pos.y = -pos.y;
        }

        if pos.x >= screen_size.x {
            pos.x = 2 * screen_size.x - pos.x - 1;
        }

        if pos.y >= screen_size.y {
            pos.y = 2 * screen_size.y - pos.y - 1;
        }

        pos.clamp(IVec2::ZERO, (screen_size - 1).max(IVec2::ZERO))
            .as_uvec2()
    }

    /// Returns whether given point lays inside the screen.
    pub fn contains(&self, pos: IVec2) -> bool {
        let screen_size = self.screen.xy().as_ivec2();

        pos.x >= 0
            && pos.y >= 0
            && pos.x < screen_size.x
            && pos.y < screen_size.y
    }
}

#[cfg(test)]
mod tests {
    use glam::{ivec2, uvec2, vec3, vec4};

    use super::*;

    fn target() -> Camera {
        let projection = Mat4::perspective_rh(
            core::f32::consts::FRAC_PI_2,
            1.0,
            0.01,
            1000.0,
        );

        let view = Mat4::look_at_rh(Vec3::ZERO, -Vec3::Z, Vec3::Y);

        Camera {
            projection_view: projection * view,
            origin: Vec4::ZERO,
            screen: vec4(64.0, 64.0, 0.0, 0.0),
        }
    }

    #[test]
    fn reproject() {
        let target = target();

        assert_eq!(
            Some(uvec2(32, 32)),
            target.reproject(vec3(0.01, -0.01, -1.0))
        );

        // Top-left corner
        assert_eq!(
            Some(uvec2(0, 0)),
            target.reproject(vec3(-0.99, 0.99, -1.0))
        );

        // Behind the camera
        assert_eq!(None, target.reproject(vec3(0.0, 0.0, 1.0)));

        // Outside of the frustum
        assert_eq!(None, target.reproject(vec3(2.0, 0.0, -1.0)));
    }

    #[test]
    fn contain() {
        let target = target();

        assert_eq!(uvec2(5, 5), target.contain(ivec2(5, 5)));
        assert_eq!(uvec2(3, 4), target.contain(ivec2(-3, -4)));
        assert_eq!(uvec2(63, 62), target.contain(ivec2(64, 65)));
        assert_eq!(uvec2(0, 63), target.contain(ivec2(500, 63)));
    }

    #[test]
    fn indices() {
        let target = target();

        for pos in [uvec2(0, 0), uvec2(63, 0), uvec2(5, 7), uvec2(63, 63)] {
            assert_eq!(pos, target.idx_to_screen(target.screen_to_idx(pos)));
        }
    }
}
