use glam::Vec3;

use crate::gpu;

#[derive(Clone, Debug, PartialEq)]
pub enum Light {
    Point {
        position: Vec3,
        color: Vec3,
    },

    /// Emissive triangle; emits from both of its sides.
    Triangle {
        vertices: [Vec3; 3],
        emission: Vec3,
    },
}

impl Light {
    /// Returns whether this light can't ever contribute anything, e.g.
    /// because it's a triangle with zero area.
    pub fn is_degenerate(&self) -> bool {
        match self {
            Light::Point { position, color } => {
                !position.is_finite() || !color.is_finite()
            }

            Light::Triangle { vertices, emission } => {
                let [p1, p2, p3] = *vertices;
                let area = 0.5 * (p2 - p1).cross(p3 - p1).length();

                !(area > 0.0) || !area.is_finite() || !emission.is_finite()
            }
        }
    }

    pub(crate) fn serialize(&self) -> gpu::Light {
        match self {
            Light::Point { position, color } => {
                gpu::Light::point(*position, *color)
            }

            Light::Triangle { vertices, emission } => {
                gpu::Light::triangle(*vertices, *emission)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::vec3;

    use super::*;

    #[test]
    fn degenerate() {
        let point = Light::Point {
            position: Vec3::ZERO,
            color: Vec3::ONE,
        };

        assert!(!point.is_degenerate());

        let triangle = Light::Triangle {
            vertices: [Vec3::ZERO, Vec3::X, Vec3::Y],
            emission: Vec3::ONE,
        };

        assert!(!triangle.is_degenerate());

        // Collinear vertices
        let triangle = Light::Triangle {
            vertices: [Vec3::ZERO, Vec3::X, vec3(2.0, 0.0, 0.0)],
            emission: Vec3::ONE,
        };

        assert!(triangle.is_degenerate());
    }

    #[test]
    fn serialize() {
        let light = Light::Triangle {
            vertices: [Vec3::ZERO, vec3(2.0, 0.0, 0.0), vec3(0.0, 0.0, 2.0)],
            emission: vec3(1.0, 1.0, 1.0),
        }
        .serialize();

        assert!(light.is_triangle());
        assert_eq!(2.0, light.area());
        assert_eq!(-Vec3::Y, light.normal());
    }
}
