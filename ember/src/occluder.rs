use glam::Vec3;

use crate::gpu::{Occluder, Ray};

/// Scene with nothing that could cast shadows.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unoccluded;

impl Occluder for Unoccluded {
    fn is_occluded(&self, _: Ray) -> bool {
        false
    }
}

/// Brute-force visibility over a list of triangles.
///
/// Good enough for tests and small scenes rendered through the software
/// device; bigger scenes should provide a proper acceleration structure.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TriangleOccluder {
    triangles: Vec<[Vec3; 3]>,
}

impl TriangleOccluder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, triangle: [Vec3; 3]) {
        self.triangles.push(triangle);
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Returns the closest triangle given ray hits, together with the
    /// distance to it.
    pub fn intersect(&self, ray: Ray) -> Option<(usize, f32)> {
        self.triangles
            .iter()
            .enumerate()
            .filter_map(|(idx, triangle)| {
                ray.hit_triangle(*triangle).map(|distance| (idx, distance))
            })
            .min_by(|(_, lhs), (_, rhs)| lhs.total_cmp(rhs))
    }

    pub fn triangle(&self, idx: usize) -> Option<[Vec3; 3]> {
        self.triangles.get(idx).copied()
    }
}

impl Occluder for TriangleOccluder {
    fn is_occluded(&self, ray: Ray) -> bool {
        self.triangles
            .iter()
            .any(|triangle| ray.hit_triangle(*triangle).is_some())
    }
}

impl FromIterator<[Vec3; 3]> for TriangleOccluder {
    fn from_iter<T: IntoIterator<Item = [Vec3; 3]>>(iter: T) -> Self {
        Self {
            triangles: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::vec3;

    use super::*;

    #[test]
    fn occlusion() {
        let target: TriangleOccluder = [
            [
                vec3(-1.0, 1.0, -1.0),
                vec3(1.0, 1.0, -1.0),
                vec3(0.0, 1.0, 1.0),
            ],
            [
                vec3(-1.0, 3.0, -1.0),
                vec3(1.0, 3.0, -1.0),
                vec3(0.0, 3.0, 1.0),
            ],
        ]
        .into_iter()
        .collect();

        let ray = Ray::new(Vec3::ZERO, Vec3::Y);

        assert!(target.is_occluded(ray));
        assert_eq!(Some((0, 1.0)), target.intersect(ray));

        // Stops right before the first triangle
        assert!(!target.is_occluded(ray.with_len(0.5)));

        // Misses both
        assert!(!target.is_occluded(Ray::new(Vec3::ZERO, Vec3::X)));
        assert!(!Unoccluded.is_occluded(ray));
    }
}
