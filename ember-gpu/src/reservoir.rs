mod di;

pub use self::di::*;
use crate::WhiteNoise;

/// Streaming weighted reservoir.
///
/// Keeps a single sample out of a stream of weighted candidates such that
/// each candidate ends up selected with probability proportional to its
/// weight; reservoirs can be merged with each other, which is what both
/// temporal and spatial reuse build upon.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Reservoir<T> {
    pub sample: T,

    /// Number of candidates this reservoir has seen (its confidence).
    pub m: f32,

    /// Running sum of the candidates' resampling weights.
    pub w_sum: f32,

    /// Contribution weight of the selected sample; valid after
    /// [`Self::normalize()`].
    pub w: f32,
}

impl<T> Reservoir<T>
where
    T: Clone + Copy,
{
    /// Streams a single candidate into this reservoir, returning whether it
    /// has been selected.
    ///
    /// A candidate with zero weight still counts towards `m`, but can never
    /// be selected.
    pub fn update(
        &mut self,
        wnoise: &mut WhiteNoise,
        sample: T,
        weight: f32,
    ) -> bool {
        debug_assert!(weight >= 0.0, "negative resampling weight: {weight}");

        self.m += 1.0;

        if !(weight > 0.0) {
            return false;
        }

        self.w_sum += weight;

        if wnoise.sample() * self.w_sum <= weight {
            self.sample = sample;
            true
        } else {
            false
        }
    }

    /// Merges another, already normalized reservoir into this one.
    ///
    /// `pdf` is the target function of `rhs`'s sample evaluated at this
    /// reservoir's surface, times the Jacobian of moving the sample over.
    pub fn merge(
        &mut self,
        wnoise: &mut WhiteNoise,
        rhs: &Self,
        pdf: f32,
    ) -> bool {
        if rhs.m <= 0.0 {
            return false;
        }

        self.m += rhs.m - 1.0;
        self.update(wnoise, rhs.sample, rhs.w * rhs.m * pdf)
    }

    /// Turns the accumulated weight into the selected sample's contribution
    /// weight.
    pub fn normalize(&mut self, pdf: f32) {
        let t = self.m * pdf;

        self.w = if t > 0.0 { self.w_sum / t } else { 0.0 };
    }

    pub fn clamp_m(&mut self, max: f32) {
        self.m = self.m.min(max);
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::uvec2;

    use super::*;

    #[test]
    fn update() {
        let mut wnoise = WhiteNoise::new(0, uvec2(0, 0));
        let mut target = Reservoir::default();

        assert!(target.update(&mut wnoise, 1, 2.0));
        assert!(!target.update(&mut wnoise, 2, 0.0));

        assert_eq!(1, target.sample);
        assert_eq!(2.0, target.m);
        assert_eq!(2.0, target.w_sum);

        target.normalize(0.5);

        assert_eq!(2.0, target.w);
    }

    #[test]
    fn occluded_candidates_are_never_selected() {
        for seed in 0..1000 {
            let mut wnoise = WhiteNoise::new(seed, uvec2(0, 0));
            let mut target = Reservoir::default();

            target.update(&mut wnoise, 0, 0.0);
            target.update(&mut wnoise, 1, 1.0);
            target.update(&mut wnoise, 2, 0.0);

            assert_eq!(1, target.sample);
            assert_eq!(3.0, target.m);
        }
    }

    #[test]
    fn weight_is_conserved() {
        let mut wnoise = WhiteNoise::new(0, uvec2(0, 0));

        // Three reservoirs that all share the same target function, so
        // merging `w * m * pdf` gives back their original weight sums
        let reservoirs = [(1, 2.0, 4.0), (2, 1.0, 6.0), (3, 3.0, 2.0)]
            .map(|(sample, m, w_sum)| {
                let mut reservoir = Reservoir {
                    sample,
                    m,
                    w_sum,
                    w: 0.0,
                };

                reservoir.normalize(0.5);
                reservoir
            });

        let mut target = Reservoir::default();

        for reservoir in &reservoirs {
            target.merge(&mut wnoise, reservoir, 0.5);
        }

        assert_eq!(6.0, target.m);
        assert_relative_eq!(12.0, target.w_sum, epsilon = 1e-5);
    }

    #[test]
    fn merging_is_order_independent() {
        const TRIALS: u32 = 30_000;

        let reservoirs = [(0, 1.0, 1.0), (1, 2.0, 2.0), (2, 1.0, 5.0)]
            .map(|(sample, m, w_sum)| {
                let mut reservoir = Reservoir {
                    sample,
                    m,
                    w_sum,
                    w: 0.0,
                };

                reservoir.normalize(1.0);
                reservoir
            });

        let orders = [[0, 1, 2], [2, 1, 0], [1, 2, 0]];

        for order in orders {
            let mut histogram = [0u32; 3];

            for trial in 0..TRIALS {
                let mut wnoise = WhiteNoise::new(trial, uvec2(7, 3));
                let mut target = Reservoir::default();

                for idx in order {
                    target.merge(&mut wnoise, &reservoirs[idx], 1.0);
                }

                assert_relative_eq!(8.0, target.w_sum, epsilon = 1e-5);
                assert_eq!(4.0, target.m);

                histogram[target.sample] += 1;
            }

            for (idx, expected) in [1.0 / 8.0, 2.0 / 8.0, 5.0 / 8.0]
                .into_iter()
                .enumerate()
            {
                let actual = histogram[idx] as f32 / TRIALS as f32;

                assert!(
                    (actual - expected).abs() < 0.02,
                    "order={order:?}, idx={idx}, actual={actual}, \
                     expected={expected}"
                );
            }
        }
    }

    #[test]
    fn combined_reservoirs_merge_like_their_parts() {
        const TRIALS: u32 = 30_000;

        let parts = [(0, 1.0, 3.0), (1, 1.0, 1.0), (2, 1.0, 4.0)].map(
            |(sample, m, w_sum)| {
                let mut reservoir = Reservoir {
                    sample,
                    m,
                    w_sum,
                    w: 0.0,
                };

                reservoir.normalize(1.0);
                reservoir
            },
        );

        let mut histogram = [0u32; 3];

        for trial in 0..TRIALS {
            let mut wnoise = WhiteNoise::new(trial, uvec2(1, 1));

            // (A + B) + C
            let mut ab = Reservoir::default();

            ab.merge(&mut wnoise, &parts[0], 1.0);
            ab.merge(&mut wnoise, &parts[1], 1.0);
            ab.normalize(1.0);

            let mut target = Reservoir::default();

            target.merge(&mut wnoise, &ab, 1.0);
            target.merge(&mut wnoise, &parts[2], 1.0);

            assert_relative_eq!(8.0, target.w_sum, epsilon = 1e-5);

            histogram[target.sample] += 1;
        }

        for (idx, expected) in [3.0 / 8.0, 1.0 / 8.0, 4.0 / 8.0]
            .into_iter()
            .enumerate()
        {
            let actual = histogram[idx] as f32 / TRIALS as f32;

            assert!(
                (actual - expected).abs() < 0.02,
                "idx={idx}, actual={actual}, expected={expected}"
            );
        }
    }
}
