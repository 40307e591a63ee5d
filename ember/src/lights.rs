use std::ops::Range;

use glam::Vec3;
use log::debug;
use rand::Rng;

use crate::{gpu, AliasTable, Error, Light, Result};

/// Flattened set of the scene's emitters.
///
/// Scene-scoped: built once per scene, then serialized into the lights buffer
/// together with an [`AliasTable`] built over the lights' weights.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LightPopulation {
    lights: Vec<Light>,
}

impl LightPopulation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `count` point lights placed uniformly inside the box spanned by
    /// `a` and `b`, each with a uniformly random color.
    pub fn random_point_lights(
        count: usize,
        a: Vec3,
        b: Vec3,
        rng: &mut impl Rng,
    ) -> Self {
        let min = a.min(b);
        let max = a.max(b);

        (0..count)
            .map(|_| {
                let color = Vec3::new(rng.gen(), rng.gen(), rng.gen());

                let position = Vec3::new(
                    sample_range(rng, min.x..max.x),
                    sample_range(rng, min.y..max.y),
                    sample_range(rng, min.z..max.z),
                );

                Light::Point { position, color }
            })
            .collect()
    }

    /// Returns `self` if there's at least one light, or a population of
    /// random point lights otherwise.
    pub fn or_random_point_lights(
        self,
        count: usize,
        a: Vec3,
        b: Vec3,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        if !self.is_empty() {
            return Ok(self);
        }

        if count == 0 {
            return Err(Error::InvalidParams(
                "scene has no lights and no random lights were requested"
                    .into(),
            ));
        }

        debug!("Scene has no lights; generating {count} random point lights");

        Ok(Self::random_point_lights(count, a, b, rng))
    }

    /// Adds given light, returning whether it was accepted; degenerate lights
    /// are skipped.
    pub fn push(&mut self, light: Light) -> bool {
        if light.is_degenerate() {
            debug!("Skipping degenerate light: {light:?}");
            return false;
        }

        self.lights.push(light);
        true
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Light> + '_ {
        self.lights.iter()
    }

    pub fn weights(&self) -> Vec<f32> {
        self.lights
            .iter()
            .map(|light| light.serialize().weight())
            .collect()
    }

    pub fn build_alias_table(&self) -> Result<AliasTable> {
        AliasTable::build(&self.weights())
    }

    pub(crate) fn serialize(&self) -> Vec<gpu::Light> {
        self.lights.iter().map(Light::serialize).collect()
    }
}

impl FromIterator<Light> for LightPopulation {
    fn from_iter<T: IntoIterator<Item = Light>>(iter: T) -> Self {
        let mut this = Self::default();

        this.extend(iter);
        this
    }
}

impl Extend<Light> for LightPopulation {
    fn extend<T: IntoIterator<Item = Light>>(&mut self, iter: T) {
        for light in iter {
            self.push(light);
        }
    }
}

fn sample_range(rng: &mut impl Rng, range: Range<f32>) -> f32 {
    if range.is_empty() {
        range.start
    } else {
        rng.gen_range(range)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::vec3;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn weights() {
        let target: LightPopulation = [
            Light::Point {
                position: Vec3::ZERO,
                color: vec3(1.0, 0.0, 0.0),
            },
            Light::Triangle {
                vertices: [Vec3::ZERO, Vec3::X, Vec3::Y],
                emission: vec3(0.0, 0.0, 2.0),
            },
            Light::Triangle {
                vertices: [Vec3::ZERO, Vec3::X, Vec3::X],
                emission: Vec3::ONE,
            },
        ]
        .into_iter()
        .collect();

        assert_eq!(2, target.len());

        let weights = target.weights();

        assert_relative_eq!(0.2126, weights[0]);
        assert_relative_eq!(2.0 * 0.0722 * 0.5, weights[1]);

        let alias_table = target.build_alias_table().unwrap();

        assert_eq!(2, alias_table.len());
    }

    #[test]
    fn random_point_lights() {
        let mut rng = StdRng::seed_from_u64(1234);

        let target = LightPopulation::random_point_lights(
            100,
            vec3(10.0, 0.0, 5.0),
            vec3(-10.0, 0.0, -5.0),
            &mut rng,
        );

        assert_eq!(100, target.len());

        for light in target.iter() {
            let Light::Point { position, color } = light else {
                panic!("expected a point light, got: {light:?}");
            };

            assert!(position.x >= -10.0 && position.x < 10.0);
            assert_eq!(0.0, position.y);
            assert!(position.z >= -5.0 && position.z < 5.0);
            assert!(color.cmpge(Vec3::ZERO).all());
            assert!(color.cmplt(Vec3::ONE).all());
        }
    }

    #[test]
    fn or_random_point_lights() {
        let mut rng = StdRng::seed_from_u64(1234);

        let target = LightPopulation::new()
            .or_random_point_lights(8, Vec3::ZERO, Vec3::ONE, &mut rng)
            .unwrap();

        assert_eq!(8, target.len());

        // ---

        let mut target = LightPopulation::new();

        target.push(Light::Point {
            position: Vec3::ZERO,
            color: Vec3::ONE,
        });

        let target = target
            .or_random_point_lights(8, Vec3::ZERO, Vec3::ONE, &mut rng)
            .unwrap();

        assert_eq!(1, target.len());

        // ---

        let actual = LightPopulation::new().or_random_point_lights(
            0,
            Vec3::ZERO,
            Vec3::ONE,
            &mut rng,
        );

        assert!(matches!(actual, Err(Error::InvalidParams(_))));
    }
}
