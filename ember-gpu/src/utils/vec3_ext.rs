use glam::{vec3, Vec3};

pub trait Vec3Ext
where
    Self: Sized,
{
    /// Returns luminance of this color-vector.
    fn luminance(self) -> f32;
}

impl Vec3Ext for Vec3 {
    fn luminance(self) -> f32 {
        self.dot(vec3(0.2126, 0.7152, 0.0722))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn luminance() {
        assert_relative_eq!(1.0, Vec3::ONE.luminance(), epsilon = 1e-6);
        assert_relative_eq!(0.7152, Vec3::Y.luminance());
        assert_relative_eq!(0.0, Vec3::ZERO.luminance());
    }
}
