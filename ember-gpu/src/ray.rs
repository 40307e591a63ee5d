use glam::Vec3;

use crate::SHADOW_EPSILON;

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Ray {
    origin: Vec3,
    direction: Vec3,
    len: f32,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction,
            len: f32::MAX,
        }
    }

    /// Creates a shadow ray going from `surface_point` towards `target`.
    ///
    /// The ray is lifted off the surface along `surface_normal` and stops a
    /// bit before reaching `target`, so that neither the surface nor the light
    /// itself count as occluders.
    pub fn shadow(
        surface_point: Vec3,
        surface_normal: Vec3,
        target: Vec3,
    ) -> Self {
        let origin = surface_point + surface_normal * SHADOW_EPSILON;
        let dir = target - origin;
        let len = dir.length();

        if len <= 2.0 * SHADOW_EPSILON {
            return Self {
                origin,
                direction: surface_normal,
                len: 0.0,
            };
        }

        Self {
            origin,
            direction: dir / len,
            len: len - SHADOW_EPSILON,
        }
    }

    pub fn with_len(mut self, len: f32) -> Self {
        self.len = len;
        self
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn len(&self) -> f32 {
        self.len
    }

    /// Returns the distance at which this ray hits given triangle, if it hits
    /// it before reaching its length (Möller-Trumbore).
    pub fn hit_triangle(&self, [p0, p1, p2]: [Vec3; 3]) -> Option<f32> {
        let edge1 = p1 - p0;
        let edge2 = p2 - p0;
        let pvec = self.direction.cross(edge2);
        let det = edge1.dot(pvec);

        if det.abs() < f32::EPSILON {
            return None;
        }

        let inv_det = 1.0 / det;
        let tvec = self.origin - p0;
        let u = tvec.dot(pvec) * inv_det;

        if u < 0.0 || u > 1.0 {
            return None;
        }

        let qvec = tvec.cross(edge1);
        let v = self.direction.dot(qvec) * inv_det;

        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = edge2.dot(qvec) * inv_det;

        if t > 0.0 && t < self.len {
            Some(t)
        } else {
            None
        }
    }
}

/// Answers visibility queries against the scene's top-level acceleration
/// structure.
pub trait Occluder {
    /// Returns whether anything blocks given ray before it reaches its length.
    fn is_occluded(&self, ray: Ray) -> bool;
}

impl<T> Occluder for &T
where
    T: Occluder + ?Sized,
{
    fn is_occluded(&self, ray: Ray) -> bool {
        (**self).is_occluded(ray)
    }
}
